pub mod math;
pub mod activation;
pub mod precision;
pub mod layers;
pub mod model;
pub mod loss;
pub mod optim;
pub mod data;
pub mod metrics;
pub mod train;
pub mod error;
pub mod logging;

// Convenience re-exports
pub use math::Matrix;
pub use activation::ActivationFunction;
pub use precision::Precision;
pub use model::{ModelSpec, PixelNet, SegmentationModel};
pub use loss::LossType;
pub use optim::{Adam, Optimizer, OptimizerKind, Sgd};
pub use data::{open_splits, DatasetSplits, SegmentationDataset};
pub use train::{train_loop, CheckpointManager, LoopControl, MetricSink, RunConfig, RunSummary};
pub use error::{Error, Result};
