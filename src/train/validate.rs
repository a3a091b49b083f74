use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::data::{batch_indices, Subset};
use crate::error::Result;
use crate::loss::LossType;
use crate::metrics::{score_prediction, MetricAccumulator};
use crate::model::SegmentationModel;
use crate::precision::Precision;

/// Aggregate validation result over one subset.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationSummary {
    /// `(iou + dice) / 2`.
    pub total_score: f64,
    pub iou: f64,
    pub dice: f64,
    /// Mean loss over the examples whose mask matches the prediction shape.
    pub loss: f64,
    pub examples: usize,
}

impl ValidationSummary {
    /// `(total_score, (iou, dice))`.
    pub fn as_tuple(&self) -> (f64, (f64, f64)) {
        (self.total_score, (self.iou, self.dice))
    }
}

/// Scores a model on a subset without touching its parameters.
#[derive(Debug, Clone)]
pub struct ValidationRunner {
    pub batch_size: usize,
    pub loss: LossType,
    pub precision: Precision,
    pub thresholds: Vec<f64>,
}

impl ValidationRunner {
    pub fn new(batch_size: usize, loss: LossType, precision: Precision, thresholds: Vec<f64>) -> Self {
        ValidationRunner { batch_size, loss, precision, thresholds }
    }

    /// Runs inference over every example of `subset` in order.
    ///
    /// The model is only borrowed, so repeated calls on an unchanged model
    /// give identical summaries. An empty subset yields all zeros.
    pub fn run<M: SegmentationModel + ?Sized>(&self, model: &M, subset: &Subset<'_>) -> Result<ValidationSummary> {
        let mut acc = MetricAccumulator::new();
        let mut loss_sum = 0.0;
        let mut loss_count = 0usize;

        for positions in batch_indices::<StdRng>(subset.len(), self.batch_size, None) {
            let examples = subset.load(&positions)?;
            let images: Vec<_> = examples.iter().map(|e| &e.image).collect();
            let predictions = model.predict(&images, self.precision)?;

            for (prediction, example) in predictions.iter().zip(&examples) {
                acc.add(score_prediction(prediction, &example.mask, &self.thresholds));
                if prediction.logits.len() == example.mask.data.len() {
                    loss_sum += self.loss.loss(&prediction.logits, &example.mask.data);
                    loss_count += 1;
                }
            }
        }

        let mean = acc.mean();
        let summary = ValidationSummary {
            total_score: mean.total(),
            iou: mean.iou,
            dice: mean.dice,
            loss: if loss_count == 0 { 0.0 } else { loss_sum / loss_count as f64 },
            examples: acc.count(),
        };
        tracing::debug!(
            examples = summary.examples,
            iou = summary.iou,
            dice = summary.dice,
            loss = summary.loss,
            "validation pass done"
        );
        Ok(summary)
    }
}
