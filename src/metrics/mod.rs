pub mod segmentation;

pub use segmentation::{mask_scores, score_prediction, MetricAccumulator, Scores, TRUTH_THRESHOLD};
