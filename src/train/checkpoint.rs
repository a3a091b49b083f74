use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ModelMetadata, ModelState, SegmentationModel};
use crate::train::sink::MetricSink;

/// strftime pattern of the per-run directory name.
pub const RUN_TIMESTAMP_FORMAT: &str = "%A_%d_%B_%Y_%Hh_%Mm_%Ss";

/// Local-time run identifier, e.g. `Monday_03_March_2025_14h_05m_09s`.
pub fn run_timestamp() -> String {
    chrono::Local::now().format(RUN_TIMESTAMP_FORMAT).to_string()
}

// ---------------------------------------------------------------------------
// Best-score tracking
// ---------------------------------------------------------------------------

/// Highest validation Dice seen so far in a run.
///
/// Starts empty, so the first scheduled validation always counts as an
/// improvement. After that only a strictly greater Dice does. NaN never
/// improves.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestScoreTracker {
    best: Option<(usize, f64)>,
}

impl BestScoreTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best_dice(&self) -> Option<f64> {
        self.best.map(|(_, d)| d)
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best.map(|(e, _)| e)
    }

    pub fn is_improvement(&self, dice: f64) -> bool {
        if dice.is_nan() {
            return false;
        }
        match self.best {
            None => true,
            Some((_, best)) => dice > best,
        }
    }

    /// Records `dice` unconditionally. Callers check `is_improvement` first.
    pub fn record(&mut self, epoch: usize, dice: f64) {
        self.best = Some((epoch, dice));
    }
}

// ---------------------------------------------------------------------------
// Checkpoint file
// ---------------------------------------------------------------------------

/// On-disk checkpoint: weights under `model`, descriptive metadata under
/// `parameter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub model: ModelState,
    pub parameter: ModelMetadata,
    pub epoch: usize,
    pub dice: f64,
    /// RFC 3339 UTC time of the write.
    pub saved_at: String,
}

impl Checkpoint {
    pub fn load_json(path: &Path) -> Result<Checkpoint> {
        let file = File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Outcome of offering a validation score to the manager.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointDecision {
    Saved(PathBuf),
    Skipped,
}

impl CheckpointDecision {
    pub fn is_saved(&self) -> bool {
        matches!(self, CheckpointDecision::Saved(_))
    }
}

/// Keeps a single "best so far" checkpoint file per run.
///
/// The file lives at `<root>/<model name>/<run timestamp>/latest_epoch.json`
/// and is overwritten on every improvement. Writes go to a temporary file
/// that is renamed into place, so the path never holds a half-written
/// checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    path: PathBuf,
}

impl CheckpointManager {
    pub const FILE_NAME: &'static str = "latest_epoch.json";

    /// Manager writing `FILE_NAME` inside `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        CheckpointManager { path: dir.as_ref().join(Self::FILE_NAME) }
    }

    pub fn for_run(root: &Path, model_name: &str, run_timestamp: &str) -> Self {
        Self::new(root.join(model_name).join(run_timestamp))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Saves `model` when `dice` beats the tracker's best.
    ///
    /// The tracker is only updated after the file is safely on disk; a
    /// failed write leaves it untouched and is returned as
    /// `Error::Checkpoint`. Weights that are not finite are refused with
    /// `Error::Model` before anything is written. On success the path is
    /// reported to `sink` as an artifact.
    pub fn consider<M, S>(
        &self,
        tracker: &mut BestScoreTracker,
        epoch: usize,
        dice: f64,
        model: &M,
        sink: &mut S,
    ) -> Result<CheckpointDecision>
    where
        M: SegmentationModel + ?Sized,
        S: MetricSink + ?Sized,
    {
        if !tracker.is_improvement(dice) {
            tracing::debug!(epoch, dice, best = ?tracker.best_dice(), "no improvement, checkpoint kept");
            return Ok(CheckpointDecision::Skipped);
        }

        let state = model.state();
        if !state.is_finite() {
            return Err(Error::model(format!(
                "refusing to checkpoint epoch {}: model weights are not finite",
                epoch
            )));
        }
        let checkpoint = Checkpoint {
            model: state,
            parameter: model.metadata(),
            epoch,
            dice,
            saved_at: chrono::Utc::now().to_rfc3339(),
        };
        self.write(&checkpoint)?;
        tracker.record(epoch, dice);
        sink.save_artifact(&self.path);

        tracing::info!(epoch, dice, path = %self.path.display(), "new best checkpoint saved");
        Ok(CheckpointDecision::Saved(self.path.clone()))
    }

    fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        let fail = |source: std::io::Error| Error::Checkpoint { path: self.path.clone(), source };

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(fail)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let outcome = Self::write_tmp(&tmp, checkpoint).and_then(|_| std::fs::rename(&tmp, &self.path));
        if outcome.is_err() {
            // Best effort.
            let _ = std::fs::remove_file(&tmp);
        }
        outcome.map_err(fail)
    }

    fn write_tmp(tmp: &Path, checkpoint: &Checkpoint) -> std::io::Result<()> {
        let file = File::create(tmp)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, checkpoint)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    }
}
