use std::path::PathBuf;

use clap::Parser;
use rand::{rngs::StdRng, SeedableRng};
use serde::de::DeserializeOwned;

use ferrite_seg::data::open_splits;
use ferrite_seg::error::Result;
use ferrite_seg::loss::LossType;
use ferrite_seg::model::{ModelSpec, PixelNet, SegmentationModel};
use ferrite_seg::optim::OptimizerKind;
use ferrite_seg::precision::Precision;
use ferrite_seg::train::{
    run_timestamp, train_loop, CheckpointManager, FanoutSink, JsonlSink, LoopControl, RunConfig, TracingSink,
};

/// Fine-tune a segmentation model and keep the best checkpoint by validation Dice.
///
/// Settings come from `--config` (JSON, every field optional) and are then
/// overridden by the flags below.
#[derive(Parser, Debug)]
#[command(name = "ferrite-seg", version)]
struct Cli {
    /// JSON run configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long)]
    experiment: Option<String>,
    #[arg(short, long)]
    epochs: Option<usize>,
    #[arg(short, long)]
    batch_size: Option<usize>,
    #[arg(long)]
    lr: Option<f64>,
    /// Validate every N epochs (the last epoch always validates).
    #[arg(long)]
    val_freq: Option<usize>,
    #[arg(long)]
    image_size: Option<usize>,
    /// Dataset identifier: synthetic or folder.
    #[arg(short, long)]
    dataset: Option<String>,
    /// Root of a folder dataset (holds train/ and test/).
    #[arg(long)]
    data_path: Option<PathBuf>,
    /// Maximum examples drawn from each split.
    #[arg(long)]
    subset_cap: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// full, f32 or bf16.
    #[arg(long, value_parser = parse_name::<Precision>)]
    precision: Option<Precision>,
    /// adam or sgd.
    #[arg(long, value_parser = parse_name::<OptimizerKind>)]
    optimizer: Option<OptimizerKind>,
    /// bce, dice or dice_bce.
    #[arg(long, value_parser = parse_name::<LossType>)]
    loss: Option<LossType>,
    /// Comma-separated metric thresholds, e.g. 0.3,0.5,0.7.
    #[arg(long, value_delimiter = ',')]
    thresholds: Option<Vec<f64>>,
    #[arg(long)]
    checkpoint_root: Option<PathBuf>,
    /// Architecture JSON for a fresh model.
    #[arg(long)]
    model_spec: Option<PathBuf>,
    /// Checkpoint to fine-tune from.
    #[arg(long)]
    pretrained: Option<PathBuf>,
    #[arg(long)]
    memory_limit_mb: Option<usize>,
    /// Draw a new training subset every epoch.
    #[arg(long)]
    resample_each_epoch: bool,
    /// Metrics JSONL file (defaults to metrics.jsonl next to the checkpoint).
    #[arg(long)]
    metrics_log: Option<PathBuf>,
    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(short, long)]
    quiet: bool,
}

/// Parses a lowercase variant name through the type's serde representation.
fn parse_name<T: DeserializeOwned>(s: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

impl Cli {
    fn resolve_config(&self) -> Result<RunConfig> {
        let mut cfg = match &self.config {
            Some(path) => RunConfig::load_json(path)?,
            None => RunConfig::default(),
        };
        if let Some(v) = &self.experiment {
            cfg.experiment_name = v.clone();
        }
        if let Some(v) = self.epochs {
            cfg.epochs = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.lr {
            cfg.learning_rate = v;
        }
        if let Some(v) = self.val_freq {
            cfg.validation_frequency = v;
        }
        if let Some(v) = self.image_size {
            cfg.image_size = v;
        }
        if let Some(v) = &self.dataset {
            cfg.dataset = v.clone();
        }
        if let Some(v) = &self.data_path {
            cfg.data_path = Some(v.clone());
        }
        if let Some(v) = self.subset_cap {
            cfg.subset_cap = v;
        }
        if let Some(v) = self.seed {
            cfg.seed = v;
        }
        if let Some(v) = self.precision {
            cfg.precision = v;
        }
        if let Some(v) = self.optimizer {
            cfg.optimizer = v;
        }
        if let Some(v) = self.loss {
            cfg.loss = v;
        }
        if let Some(v) = &self.thresholds {
            cfg.thresholds = v.clone();
        }
        if let Some(v) = &self.checkpoint_root {
            cfg.checkpoint_root = v.clone();
        }
        if let Some(v) = &self.model_spec {
            cfg.model_spec = Some(v.clone());
        }
        if let Some(v) = &self.pretrained {
            cfg.pretrained = Some(v.clone());
        }
        if let Some(v) = self.memory_limit_mb {
            cfg.memory_limit_mb = Some(v);
        }
        if self.resample_each_epoch {
            cfg.resample_each_epoch = true;
        }
        Ok(cfg)
    }
}

fn main() {
    let cli = Cli::parse();
    ferrite_seg::logging::init(cli.verbose, cli.quiet);

    if let Err(e) = run(&cli) {
        eprintln!("error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.resolve_config()?;
    config.validate()?;
    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let model = match (&config.pretrained, &config.model_spec) {
        (Some(path), _) => {
            tracing::info!(path = %path.display(), "loading pretrained checkpoint");
            PixelNet::load_checkpoint(path)?
        }
        (None, Some(path)) => ModelSpec::load_json(path)?.build(&mut StdRng::seed_from_u64(config.seed))?,
        (None, None) => ModelSpec::default().build(&mut StdRng::seed_from_u64(config.seed))?,
    };
    let mut model = model.with_memory_limit(config.memory_limit_bytes());

    let splits = open_splits(&config.dataset, config.data_path.as_deref(), config.image_size, config.seed)?;
    let mut optimizer = config.optimizer.build(config.learning_rate);

    let checkpoints = CheckpointManager::for_run(&config.checkpoint_root, model.name(), &run_timestamp());
    let metrics_path = cli
        .metrics_log
        .clone()
        .unwrap_or_else(|| checkpoints.path().with_file_name("metrics.jsonl"));
    let mut sink = FanoutSink::new().with(TracingSink).with(JsonlSink::create(&metrics_path)?);

    let summary = train_loop(
        &mut model,
        &mut optimizer,
        &splits,
        &config,
        &checkpoints,
        &mut sink,
        &LoopControl::default(),
    )?;

    if let Some(base) = summary.baseline {
        println!("baseline     total={:.4} iou={:.4} dice={:.4}", base.total_score, base.iou, base.dice);
    }
    match (summary.best_dice, summary.best_epoch, &summary.checkpoint) {
        (Some(dice), Some(epoch), Some(path)) => {
            println!("best dice    {:.4} at epoch {}", dice, epoch);
            println!("checkpoint   {}", path.display());
        }
        _ => println!("no checkpoint written"),
    }
    if summary.interrupted {
        println!("run stopped early after {} epoch(s)", summary.history.len());
    }
    Ok(())
}
