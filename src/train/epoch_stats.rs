use serde::{Deserialize, Serialize};

use crate::train::sink::{scalars, Scalars};
use crate::train::validate::ValidationSummary;

/// What happened in one epoch of the fine-tuning loop.
///
/// When `LoopControl::progress_tx` is set, one record is sent at the end of
/// every completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 0-based epoch index.
    pub epoch: usize,
    pub total_epochs: usize,
    /// Mean of the batch losses of this epoch.
    pub train_loss: f64,
    /// Wall-clock duration of the training pass in seconds.
    pub train_secs: f64,
    /// Present only on scheduled validation epochs.
    pub validation: Option<ValidationSummary>,
    /// True when this epoch wrote a new best checkpoint.
    pub checkpoint_saved: bool,
}

impl EpochRecord {
    pub fn train_scalars(&self) -> Scalars {
        scalars([("train_loss", self.train_loss), ("epoch", self.epoch as f64)])
    }

    /// The metric names every validation is logged under; `None` on
    /// epochs without a validation.
    pub fn validation_scalars(&self) -> Option<Scalars> {
        self.validation.as_ref().map(|v| {
            scalars([
                ("val_total_score", v.total_score),
                ("val_iou", v.iou),
                ("val_dice", v.dice),
                ("val_loss", v.loss),
                ("epoch", self.epoch as f64),
            ])
        })
    }
}
