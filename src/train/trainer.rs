use rand::Rng;

use crate::data::{batch_indices, Subset};
use crate::error::{Error, Result};
use crate::loss::LossType;
use crate::model::SegmentationModel;
use crate::optim::Optimizer;
use crate::precision::Precision;

/// Result of one pass over the training subset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOutcome {
    /// Mean of the per-batch losses (0.0 for an empty subset).
    pub mean_loss: f64,
    pub batches: usize,
    pub examples: usize,
}

/// Runs one epoch of gradient updates.
#[derive(Debug, Clone, Copy)]
pub struct TrainStepRunner {
    pub batch_size: usize,
    pub loss: LossType,
    pub precision: Precision,
}

impl TrainStepRunner {
    pub fn new(batch_size: usize, loss: LossType, precision: Precision) -> Self {
        TrainStepRunner { batch_size, loss, precision }
    }

    /// One full pass over `subset` in shuffled batches.
    ///
    /// Per batch: clear gradients, forward in training mode, batch loss as
    /// the mean of per-example losses, backward, one optimizer step. The
    /// final partial batch is trained on too. Any failure aborts the epoch.
    pub fn run_epoch<M, O, R>(
        &self,
        model: &mut M,
        optimizer: &mut O,
        subset: &Subset<'_>,
        rng: &mut R,
    ) -> Result<TrainOutcome>
    where
        M: SegmentationModel + ?Sized,
        O: Optimizer + ?Sized,
        R: Rng + ?Sized,
    {
        let batches = batch_indices(subset.len(), self.batch_size, Some(rng));
        let mut loss_sum = 0.0;
        let mut examples = 0;

        for (i, positions) in batches.iter().enumerate() {
            let batch = subset.load(positions)?;
            let images: Vec<_> = batch.iter().map(|e| &e.image).collect();

            model.zero_grad();
            let predictions = model.forward_train(&images, self.precision)?;

            let scale = 1.0 / batch.len() as f64;
            let mut batch_loss = 0.0;
            let mut grads = Vec::with_capacity(batch.len());
            for (prediction, example) in predictions.iter().zip(&batch) {
                if prediction.logits.len() != example.mask.data.len() {
                    return Err(Error::dataset(format!(
                        "example '{}' has a {}x{} mask for a {}x{} prediction",
                        example.id, example.mask.height, example.mask.width, prediction.height, prediction.width
                    )));
                }
                batch_loss += self.loss.loss(&prediction.logits, &example.mask.data) * scale;
                let mut g = self.loss.derivative(&prediction.logits, &example.mask.data);
                g.iter_mut().for_each(|v| *v *= scale);
                grads.push(g);
            }

            model.backward(&grads)?;
            optimizer.step(&mut model.parameters_mut());

            tracing::debug!(batch = i, size = batch.len(), loss = batch_loss, "train step");
            loss_sum += batch_loss;
            examples += batch.len();
        }

        let mean_loss = if batches.is_empty() { 0.0 } else { loss_sum / batches.len() as f64 };
        Ok(TrainOutcome { mean_loss, batches: batches.len(), examples })
    }
}
