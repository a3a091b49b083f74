use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::registry::check_identifier;
use crate::data::DEFAULT_SUBSET_CAP;
use crate::error::{Error, Result};
use crate::loss::LossType;
use crate::optim::OptimizerKind;
use crate::precision::Precision;

/// Everything a fine-tuning run needs to know up front.
///
/// Built once at startup (JSON file and/or CLI flags), checked with
/// [`RunConfig::validate`], then only read.
///
/// # Fields
/// - `epochs`: number of train/validate iterations
/// - `batch_size`: examples per optimizer step (last batch may be smaller)
/// - `validation_frequency`: validate when `epoch % validation_frequency == 0`,
///   and always on the final epoch
/// - `subset_cap`: at most this many examples are drawn from each split
/// - `thresholds`: probability cut-offs the metrics are averaged over
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub experiment_name: String,
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub validation_frequency: usize,
    pub image_size: usize,
    pub dataset: String,
    pub data_path: Option<PathBuf>,
    pub subset_cap: usize,
    pub seed: u64,
    pub precision: Precision,
    pub optimizer: OptimizerKind,
    pub loss: LossType,
    pub thresholds: Vec<f64>,
    pub checkpoint_root: PathBuf,
    /// Draw a fresh training subset every epoch instead of once per run.
    pub resample_each_epoch: bool,
    /// Architecture file for a fresh model (ignored when `pretrained` is set).
    pub model_spec: Option<PathBuf>,
    /// Checkpoint to start fine-tuning from.
    pub pretrained: Option<PathBuf>,
    pub memory_limit_mb: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            experiment_name: "ferrite-seg".to_string(),
            epochs: 100,
            batch_size: 4,
            learning_rate: 1e-3,
            validation_frequency: 1,
            image_size: 64,
            dataset: "synthetic".to_string(),
            data_path: None,
            subset_cap: DEFAULT_SUBSET_CAP,
            seed: 0,
            precision: Precision::default(),
            optimizer: OptimizerKind::default(),
            loss: LossType::default(),
            thresholds: vec![0.5],
            checkpoint_root: PathBuf::from("checkpoints"),
            resample_each_epoch: false,
            model_spec: None,
            pretrained: None,
            memory_limit_mb: None,
        }
    }
}

impl RunConfig {
    pub fn load_json(path: &Path) -> Result<RunConfig> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::config(format!("cannot open config {}: {}", path.display(), e)))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| Error::config(format!("invalid config {}: {}", path.display(), e)))
    }

    /// Rejects configurations that cannot run. Called before any epoch.
    pub fn validate(&self) -> Result<()> {
        check_identifier(&self.dataset)?;
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be at least 1"));
        }
        if self.validation_frequency == 0 {
            return Err(Error::config("validation_frequency must be at least 1"));
        }
        if self.image_size == 0 {
            return Err(Error::config("image_size must be at least 1"));
        }
        if self.subset_cap == 0 {
            return Err(Error::config("subset_cap must be at least 1"));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(Error::config(format!("learning_rate must be positive, got {}", self.learning_rate)));
        }
        if self.thresholds.is_empty() {
            return Err(Error::config("at least one metric threshold is required"));
        }
        if let Some(t) = self.thresholds.iter().find(|t| !(**t > 0.0 && **t < 1.0)) {
            return Err(Error::config(format!("metric thresholds must lie in (0, 1), got {}", t)));
        }
        Ok(())
    }

    /// Whether `epoch` runs a scheduled validation.
    pub fn is_validation_epoch(&self, epoch: usize) -> bool {
        epoch % self.validation_frequency == 0 || epoch + 1 == self.epochs
    }

    pub fn memory_limit_bytes(&self) -> Option<usize> {
        self.memory_limit_mb.map(|mb| mb.saturating_mul(1024 * 1024))
    }
}
