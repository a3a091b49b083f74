pub mod batch;
pub mod dataset;
pub mod folder;
pub mod registry;
pub mod sample;
pub mod sampler;
pub mod synthetic;

pub use batch::batch_indices;
pub use dataset::{InMemoryDataset, SegmentationDataset, Subset};
pub use folder::FolderDataset;
pub use registry::{open_splits, DatasetSplits};
pub use sample::{Example, Image, Mask};
pub use sampler::{subsample, DEFAULT_SUBSET_CAP};
pub use synthetic::SyntheticDataset;
