use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::data::{subsample, DatasetSplits, Subset};
use crate::error::Result;
use crate::model::{Mode, SegmentationModel};
use crate::optim::Optimizer;
use crate::train::checkpoint::{BestScoreTracker, CheckpointManager};
use crate::train::epoch_stats::EpochRecord;
use crate::train::sink::MetricSink;
use crate::train::train_config::RunConfig;
use crate::train::trainer::TrainStepRunner;
use crate::train::validate::{ValidationRunner, ValidationSummary};

/// Out-of-band control of a running loop.
///
/// - `progress_tx`: one `EpochRecord` is sent per completed epoch. If the
///   receiver has been dropped the loop stops cleanly.
/// - `stop_flag`: when set from another thread the loop stops before the
///   next epoch starts.
#[derive(Debug, Default, Clone)]
pub struct LoopControl {
    pub progress_tx: Option<mpsc::Sender<EpochRecord>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl LoopControl {
    fn stop_requested(&self) -> bool {
        self.stop_flag.as_ref().is_some_and(|f| f.load(Ordering::Relaxed))
    }
}

/// Everything a finished (or interrupted) run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Validation of the untouched model before the first update.
    pub baseline: Option<ValidationSummary>,
    pub history: Vec<EpochRecord>,
    pub best_dice: Option<f64>,
    pub best_epoch: Option<usize>,
    /// Set once a checkpoint has been written.
    pub checkpoint: Option<PathBuf>,
    /// True when the loop stopped before `epochs` were completed.
    pub interrupted: bool,
}

impl RunSummary {
    /// Epochs that ran a scheduled validation, in order.
    pub fn validation_epochs(&self) -> Vec<usize> {
        self.history.iter().filter(|r| r.validation.is_some()).map(|r| r.epoch).collect()
    }
}

/// Fine-tunes `model` for `config.epochs` epochs.
///
/// Before the first update the untouched model is validated once as a
/// baseline; that result is logged but never competes for the checkpoint.
/// Each epoch then trains on the training subset and, on scheduled epochs,
/// validates on the held-out subset and offers the Dice to `checkpoints`.
///
/// Subsets of at most `config.subset_cap` examples are drawn once per run
/// from `config.seed` (the training subset is redrawn each epoch when
/// `resample_each_epoch` is set).
///
/// `sink.init` is called first and `sink.finish` exactly once on every
/// exit path, including errors. Any training, validation or checkpoint
/// failure ends the run with that error.
pub fn train_loop<M, O, S>(
    model: &mut M,
    optimizer: &mut O,
    splits: &DatasetSplits,
    config: &RunConfig,
    checkpoints: &CheckpointManager,
    sink: &mut S,
    control: &LoopControl,
) -> Result<RunSummary>
where
    M: SegmentationModel + ?Sized,
    O: Optimizer + ?Sized,
    S: MetricSink + ?Sized,
{
    sink.init(config);
    let outcome = config
        .validate()
        .and_then(|_| run_epochs(model, optimizer, splits, config, checkpoints, sink, control));
    if let Err(ref e) = outcome {
        tracing::error!(error = %e, "run aborted");
    }
    sink.finish();
    outcome
}

fn run_epochs<M, O, S>(
    model: &mut M,
    optimizer: &mut O,
    splits: &DatasetSplits,
    config: &RunConfig,
    checkpoints: &CheckpointManager,
    sink: &mut S,
    control: &LoopControl,
) -> Result<RunSummary>
where
    M: SegmentationModel + ?Sized,
    O: Optimizer + ?Sized,
    S: MetricSink + ?Sized,
{
    let mut sample_rng = StdRng::seed_from_u64(config.seed);
    let mut shuffle_rng = StdRng::seed_from_u64(config.seed.wrapping_add(1));

    let train_set = splits.train.as_ref();
    let test_set = splits.test.as_ref();
    let mut train_subset = Subset::new(train_set, subsample(train_set.len(), config.subset_cap, &mut sample_rng));
    let val_subset = Subset::new(test_set, subsample(test_set.len(), config.subset_cap, &mut sample_rng));
    tracing::info!(
        train = train_subset.len(),
        val = val_subset.len(),
        model = model.name(),
        parameters = model.parameter_count(),
        optimizer = optimizer.name(),
        learning_rate = optimizer.learning_rate(),
        "subsets drawn"
    );

    let trainer = TrainStepRunner::new(config.batch_size, config.loss, config.precision);
    let validator = ValidationRunner::new(config.batch_size, config.loss, config.precision, config.thresholds.clone());
    let mut tracker = BestScoreTracker::new();

    let mut summary = RunSummary {
        baseline: None,
        history: Vec::with_capacity(config.epochs),
        best_dice: None,
        best_epoch: None,
        checkpoint: None,
        interrupted: false,
    };

    for epoch in 0..config.epochs {
        if control.stop_requested() {
            tracing::info!(epoch, "stop requested");
            summary.interrupted = true;
            break;
        }

        if epoch == 0 {
            model.set_mode(Mode::Eval);
            let baseline = validator.run(&*model, &val_subset)?;
            tracing::info!(
                total = baseline.total_score,
                iou = baseline.iou,
                dice = baseline.dice,
                "baseline before fine-tuning"
            );
            summary.baseline = Some(baseline);
        } else if config.resample_each_epoch {
            train_subset = Subset::new(train_set, subsample(train_set.len(), config.subset_cap, &mut sample_rng));
        }

        model.set_mode(Mode::Train);
        let start = Instant::now();
        let outcome = trainer.run_epoch(model, optimizer, &train_subset, &mut shuffle_rng)?;
        let train_secs = start.elapsed().as_secs_f64();
        model.set_mode(Mode::Eval);

        tracing::info!(
            epoch,
            loss = outcome.mean_loss,
            batches = outcome.batches,
            secs = train_secs,
            "training pass done"
        );

        let mut record = EpochRecord {
            epoch,
            total_epochs: config.epochs,
            train_loss: outcome.mean_loss,
            train_secs,
            validation: None,
            checkpoint_saved: false,
        };
        sink.log(&record.train_scalars(), epoch);

        if config.is_validation_epoch(epoch) {
            let validation = validator.run(&*model, &val_subset)?;
            tracing::info!(
                epoch,
                total = validation.total_score,
                iou = validation.iou,
                dice = validation.dice,
                "validation"
            );
            record.validation = Some(validation);
            if let Some(values) = record.validation_scalars() {
                sink.log(&values, epoch);
            }

            let decision = checkpoints.consider(&mut tracker, epoch, validation.dice, &*model, sink)?;
            record.checkpoint_saved = decision.is_saved();
            if record.checkpoint_saved {
                summary.checkpoint = Some(checkpoints.path().to_path_buf());
            }
        }

        summary.history.push(record.clone());

        if let Some(ref tx) = control.progress_tx {
            if tx.send(record).is_err() {
                tracing::info!(epoch, "progress receiver dropped, stopping");
                summary.interrupted = epoch + 1 < config.epochs;
                break;
            }
        }
    }

    summary.best_dice = tracker.best_dice();
    summary.best_epoch = tracker.best_epoch();
    Ok(summary)
}
