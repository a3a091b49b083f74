pub mod checkpoint;
pub mod epoch_stats;
pub mod loop_fn;
pub mod sink;
pub mod train_config;
pub mod trainer;
pub mod validate;

pub use checkpoint::{run_timestamp, BestScoreTracker, Checkpoint, CheckpointDecision, CheckpointManager};
pub use epoch_stats::EpochRecord;
pub use loop_fn::{train_loop, LoopControl, RunSummary};
pub use sink::{scalars, FanoutSink, JsonlSink, MemorySink, MetricSink, Scalars, SinkEvent, TracingSink};
pub use train_config::RunConfig;
pub use trainer::{TrainOutcome, TrainStepRunner};
pub use validate::{ValidationRunner, ValidationSummary};
