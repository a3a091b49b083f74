use std::cell::Cell;
use std::sync::atomic::AtomicBool;
use std::sync::{mpsc, Arc};

use rand::{rngs::StdRng, SeedableRng};

use ferrite_seg::data::{DatasetSplits, Example, Image, InMemoryDataset, Mask, SyntheticDataset};
use ferrite_seg::error::{Error, Result};
use ferrite_seg::model::{Mode, ModelMetadata, ModelSpec, ModelState, PixelNet, Prediction, SegmentationModel};
use ferrite_seg::optim::{Adam, ParamView, Sgd};
use ferrite_seg::precision::Precision;
use ferrite_seg::train::{
    train_loop, Checkpoint, CheckpointManager, JsonlSink, LoopControl, MemorySink, RunConfig,
};

const PIXELS: usize = 10;

/// Model whose validation output is scripted per completed training epoch.
///
/// Every ground-truth mask is all foreground; predicting `k` foreground
/// pixels gives Dice `2k / (k + PIXELS)`, so a list of `k` values fixes the
/// Dice sequence the loop observes.
struct ScriptedModel {
    mode: Mode,
    baseline_k: usize,
    script: Vec<usize>,
    epochs_trained: usize,
    predict_calls: Cell<usize>,
    examples_per_epoch: Vec<usize>,
    fail_on_epoch: Option<usize>,
    weight: Vec<f64>,
    grad: Vec<f64>,
}

impl ScriptedModel {
    fn new(script: Vec<usize>) -> Self {
        ScriptedModel {
            mode: Mode::Train,
            baseline_k: 0,
            script,
            epochs_trained: 0,
            predict_calls: Cell::new(0),
            examples_per_epoch: Vec::new(),
            fail_on_epoch: None,
            weight: vec![0.0],
            grad: vec![0.0],
        }
    }

    fn current_k(&self) -> usize {
        match self.epochs_trained {
            0 => self.baseline_k,
            n => self.script[(n - 1).min(self.script.len() - 1)],
        }
    }
}

impl SegmentationModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    fn set_mode(&mut self, mode: Mode) {
        if mode == Mode::Train {
            self.epochs_trained += 1;
            self.examples_per_epoch.push(0);
        }
        self.mode = mode;
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn predict(&self, images: &[&Image], _precision: Precision) -> Result<Vec<Prediction>> {
        self.predict_calls.set(self.predict_calls.get() + 1);
        let k = self.current_k();
        Ok(images
            .iter()
            .map(|img| Prediction {
                height: img.height,
                width: img.width,
                logits: (0..img.pixel_count()).map(|i| if i < k { 10.0 } else { -10.0 }).collect(),
            })
            .collect())
    }

    fn forward_train(&mut self, images: &[&Image], _precision: Precision) -> Result<Vec<Prediction>> {
        if self.fail_on_epoch == Some(self.epochs_trained - 1) {
            return Err(Error::ResourceExhausted("scripted out of memory".into()));
        }
        if let Some(seen) = self.examples_per_epoch.last_mut() {
            *seen += images.len();
        }
        Ok(images
            .iter()
            .map(|img| Prediction { height: img.height, width: img.width, logits: vec![0.0; img.pixel_count()] })
            .collect())
    }

    fn backward(&mut self, _grad_logits: &[Vec<f64>]) -> Result<()> {
        self.grad[0] = 1.0;
        Ok(())
    }

    fn zero_grad(&mut self) {
        self.grad[0] = 0.0;
    }

    fn parameters_mut(&mut self) -> Vec<ParamView<'_>> {
        vec![ParamView { values: &mut self.weight, grads: &self.grad }]
    }

    fn parameter_count(&self) -> usize {
        1
    }

    fn state(&self) -> ModelState {
        ModelState { spec: ModelSpec::default(), layers: Vec::new() }
    }

    fn metadata(&self) -> ModelMetadata {
        ModelMetadata { name: "scripted".into(), total_parameters: 1, ..ModelMetadata::default() }
    }
}

fn foreground_dataset(len: usize) -> InMemoryDataset {
    let examples = (0..len)
        .map(|i| Example {
            image: Image::zeros(1, 1, PIXELS),
            mask: Mask::new(1, PIXELS, vec![1.0; PIXELS]),
            id: format!("fg_{}", i),
        })
        .collect();
    InMemoryDataset::new(examples)
}

fn splits(train: usize, test: usize) -> DatasetSplits {
    DatasetSplits { train: Box::new(foreground_dataset(train)), test: Box::new(foreground_dataset(test)) }
}

fn config(epochs: usize, validation_frequency: usize) -> RunConfig {
    RunConfig { epochs, validation_frequency, batch_size: 64, precision: Precision::Full, ..RunConfig::default() }
}

fn dice(k: usize) -> f64 {
    2.0 * k as f64 / (k + PIXELS) as f64
}

#[test]
fn checkpoint_written_only_on_strict_improvement() {
    let tmp = tempfile::tempdir().unwrap();
    // Dice ordering 0.2, 0.5, 0.3, 0.7, 0.7, 0.6
    let mut model = ScriptedModel::new(vec![1, 3, 2, 5, 5, 4]);
    let checkpoints = CheckpointManager::new(tmp.path());
    let mut sink = MemorySink::new();

    let summary = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(4, 3),
        &config(6, 1),
        &checkpoints,
        &mut sink,
        &LoopControl::default(),
    )
    .unwrap();

    let saved: Vec<bool> = summary.history.iter().map(|r| r.checkpoint_saved).collect();
    assert_eq!(saved, vec![true, true, false, true, false, false]);
    assert_eq!(summary.best_epoch, Some(3));
    assert!((summary.best_dice.unwrap() - dice(5)).abs() < 1e-12);
    assert_eq!(summary.checkpoint.as_deref(), Some(checkpoints.path()));
    assert_eq!(sink.artifacts().len(), 3);

    let on_disk = Checkpoint::load_json(checkpoints.path()).unwrap();
    assert_eq!(on_disk.epoch, 3);
    assert_eq!(on_disk.parameter.name, "scripted");
}

#[test]
fn validation_schedule_covers_baseline_frequency_and_last_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1, 2, 3]);
    let mut sink = MemorySink::new();

    let summary = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(4, 3),
        &config(3, 2),
        &CheckpointManager::new(tmp.path()),
        &mut sink,
        &LoopControl::default(),
    )
    .unwrap();

    assert!(summary.baseline.is_some());
    assert_eq!(summary.validation_epochs(), vec![0, 2]);
    // baseline + epoch 0 + epoch 2, one batch each
    assert_eq!(model.predict_calls.get(), 3);
    let steps: Vec<usize> = sink.series("val_dice").into_iter().map(|(s, _)| s).collect();
    assert_eq!(steps, vec![0, 2]);
    assert_eq!(sink.series("train_loss").len(), 3);
    assert_eq!(sink.finish_count(), 1);
}

#[test]
fn baseline_never_seeds_the_best_score() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1]);
    model.baseline_k = PIXELS;

    let summary = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(2, 2),
        &config(1, 1),
        &CheckpointManager::new(tmp.path()),
        &mut MemorySink::new(),
        &LoopControl::default(),
    )
    .unwrap();

    assert_eq!(summary.baseline.map(|b| b.dice), Some(1.0));
    assert!(summary.history[0].checkpoint_saved);
    assert_eq!(summary.best_dice, Some(dice(1)));
}

#[test]
fn small_split_is_used_whole() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1, 1]);
    let cfg = RunConfig { batch_size: 8, ..config(2, 1) };

    train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(50, 5),
        &cfg,
        &CheckpointManager::new(tmp.path()),
        &mut MemorySink::new(),
        &LoopControl::default(),
    )
    .unwrap();

    assert_eq!(model.examples_per_epoch, vec![50, 50]);
}

#[test]
fn large_split_is_capped() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1]);
    let cfg = RunConfig { subset_cap: 100, ..config(1, 1) };

    train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(1000, 5),
        &cfg,
        &CheckpointManager::new(tmp.path()),
        &mut MemorySink::new(),
        &LoopControl::default(),
    )
    .unwrap();

    assert_eq!(model.examples_per_epoch, vec![100]);
}

#[test]
fn resource_exhaustion_aborts_and_still_finishes_sink() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1, 2, 3]);
    model.fail_on_epoch = Some(1);
    let checkpoints = CheckpointManager::new(tmp.path().join("run"));
    let mut sink = MemorySink::new();

    let err = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(4, 3),
        &config(3, 1),
        &checkpoints,
        &mut sink,
        &LoopControl::default(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::ResourceExhausted(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(sink.finish_count(), 1);
    // epoch 0 completed and saved before the failure
    assert_eq!(sink.artifacts().len(), 1);
    assert_eq!(sink.series("train_loss").len(), 1);
}

#[test]
fn checkpoint_write_failure_aborts_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let blocker = tmp.path().join("not_a_dir");
    std::fs::write(&blocker, b"x").unwrap();
    let mut model = ScriptedModel::new(vec![1, 2, 3]);
    let mut sink = MemorySink::new();

    let err = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(4, 3),
        &config(3, 1),
        &CheckpointManager::for_run(&blocker, "scripted", "run"),
        &mut sink,
        &LoopControl::default(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Checkpoint { .. }));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(sink.finish_count(), 1);
    assert!(sink.artifacts().is_empty());
    // the first validation tried to save, so no second epoch ran
    assert_eq!(model.examples_per_epoch, vec![4]);
}

#[test]
fn invalid_config_fails_before_any_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1]);
    let mut sink = MemorySink::new();
    let cfg = RunConfig { dataset: "REFUGE".into(), ..config(2, 1) };

    let err = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(2, 2),
        &cfg,
        &CheckpointManager::new(tmp.path()),
        &mut sink,
        &LoopControl::default(),
    )
    .unwrap_err();

    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(model.epochs_trained, 0);
    assert_eq!(model.predict_calls.get(), 0);
    assert_eq!(sink.finish_count(), 1);
}

#[test]
fn stop_flag_prevents_further_epochs() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1, 2]);
    let control = LoopControl { stop_flag: Some(Arc::new(AtomicBool::new(true))), progress_tx: None };

    let summary = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(2, 2),
        &config(2, 1),
        &CheckpointManager::new(tmp.path()),
        &mut MemorySink::new(),
        &control,
    )
    .unwrap();

    assert!(summary.interrupted);
    assert!(summary.history.is_empty());
    assert!(summary.checkpoint.is_none());
}

#[test]
fn progress_channel_reports_each_epoch() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1, 2, 3]);
    let (tx, rx) = mpsc::channel();
    let control = LoopControl { progress_tx: Some(tx), stop_flag: None };

    let summary = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(2, 2),
        &config(3, 2),
        &CheckpointManager::new(tmp.path()),
        &mut MemorySink::new(),
        &control,
    )
    .unwrap();
    drop(control);

    let records: Vec<_> = rx.iter().collect();
    assert_eq!(records, summary.history);
    assert_eq!(records.len(), 3);
    assert!(records[1].validation.is_none());
}

#[test]
fn dropped_progress_receiver_stops_the_run() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ScriptedModel::new(vec![1, 2, 3]);
    let (tx, rx) = mpsc::channel();
    drop(rx);
    let control = LoopControl { progress_tx: Some(tx), stop_flag: None };

    let summary = train_loop(
        &mut model,
        &mut Sgd::new(0.1),
        &splits(2, 2),
        &config(3, 1),
        &CheckpointManager::new(tmp.path()),
        &mut MemorySink::new(),
        &control,
    )
    .unwrap();

    assert_eq!(summary.history.len(), 1);
    assert!(summary.interrupted);
}

#[test]
fn pixel_net_fine_tunes_on_synthetic_data() {
    let tmp = tempfile::tempdir().unwrap();
    let mut model = ModelSpec::default().build(&mut StdRng::seed_from_u64(7)).unwrap();
    let splits = DatasetSplits {
        train: Box::new(SyntheticDataset::new(24, 12, 1)),
        test: Box::new(SyntheticDataset::new(8, 12, 2)),
    };
    let cfg = RunConfig {
        epochs: 3,
        batch_size: 4,
        learning_rate: 1e-2,
        subset_cap: 16,
        seed: 11,
        ..RunConfig::default()
    };
    let checkpoints = CheckpointManager::for_run(tmp.path(), model.name(), "test_run");
    let log_path = tmp.path().join("metrics.jsonl");
    let mut sink = JsonlSink::create(&log_path).unwrap();

    let summary = train_loop(
        &mut model,
        &mut Adam::new(cfg.learning_rate),
        &splits,
        &cfg,
        &checkpoints,
        &mut sink,
        &LoopControl::default(),
    )
    .unwrap();

    assert_eq!(summary.history.len(), 3);
    assert!(summary.history.iter().all(|r| r.train_loss.is_finite()));
    let path = summary.checkpoint.expect("first validation always saves");
    assert!(path.ends_with("pixelnet/test_run/latest_epoch.json"));

    let restored = PixelNet::load_checkpoint(&path).unwrap();
    let best = Checkpoint::load_json(&path).unwrap();
    assert_eq!(Some(best.epoch), summary.best_epoch);
    assert_eq!(restored.parameter_count(), model.parameter_count());

    let lines = std::fs::read_to_string(&log_path).unwrap();
    assert!(lines.lines().last().unwrap().contains("\"finish\""));
    assert_eq!(model.mode(), Mode::Eval);
}
