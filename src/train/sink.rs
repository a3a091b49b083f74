//! Where run metrics go.
//!
//! The loop reports through [`MetricSink`] only. Sinks never fail a run:
//! a sink that cannot write logs a warning and carries on.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::error::Result;
use crate::train::train_config::RunConfig;

/// Named scalar values logged for one step.
pub type Scalars = BTreeMap<String, f64>;

/// Builds a [`Scalars`] map from literal pairs.
pub fn scalars<const N: usize>(pairs: [(&str, f64); N]) -> Scalars {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

/// Experiment tracking backend.
pub trait MetricSink {
    /// Called once before the first epoch.
    fn init(&mut self, config: &RunConfig);

    fn log(&mut self, values: &Scalars, step: usize);

    /// A file worth keeping alongside the run (the checkpoint).
    fn save_artifact(&mut self, path: &Path);

    /// Called exactly once, whether the run succeeded or not.
    fn finish(&mut self);
}

impl<S: MetricSink + ?Sized> MetricSink for Box<S> {
    fn init(&mut self, config: &RunConfig) {
        (**self).init(config)
    }

    fn log(&mut self, values: &Scalars, step: usize) {
        (**self).log(values, step)
    }

    fn save_artifact(&mut self, path: &Path) {
        (**self).save_artifact(path)
    }

    fn finish(&mut self) {
        (**self).finish()
    }
}

// ---------------------------------------------------------------------------
// TracingSink
// ---------------------------------------------------------------------------

/// Emits every call as a `tracing` event.
#[derive(Debug, Default)]
pub struct TracingSink;

impl MetricSink for TracingSink {
    fn init(&mut self, config: &RunConfig) {
        tracing::info!(
            experiment = %config.experiment_name,
            dataset = %config.dataset,
            epochs = config.epochs,
            batch_size = config.batch_size,
            learning_rate = config.learning_rate,
            precision = %config.precision,
            "run started"
        );
    }

    fn log(&mut self, values: &Scalars, step: usize) {
        let rendered: Vec<String> = values.iter().map(|(k, v)| format!("{}={:.4}", k, v)).collect();
        tracing::info!(step, "{}", rendered.join(" "));
    }

    fn save_artifact(&mut self, path: &Path) {
        tracing::info!(path = %path.display(), "artifact saved");
    }

    fn finish(&mut self) {
        tracing::info!("run finished");
    }
}

// ---------------------------------------------------------------------------
// JsonlSink
// ---------------------------------------------------------------------------

/// Appends one JSON object per call to a local file.
pub struct JsonlSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    /// Creates (or truncates) the file, creating parent directories.
    pub fn create(path: impl Into<PathBuf>) -> Result<JsonlSink> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        Ok(JsonlSink { path, writer: Some(BufWriter::new(file)) })
    }

    fn write_line(&mut self, value: serde_json::Value) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let outcome = serde_json::to_writer(&mut *writer, &value)
            .map_err(std::io::Error::from)
            .and_then(|_| writer.write_all(b"\n"))
            .and_then(|_| writer.flush());
        if let Err(e) = outcome {
            tracing::warn!(path = %self.path.display(), error = %e, "metric log write failed, disabling sink");
            self.writer = None;
        }
    }
}

impl MetricSink for JsonlSink {
    fn init(&mut self, config: &RunConfig) {
        self.write_line(json!({ "event": "init", "config": config }));
    }

    fn log(&mut self, values: &Scalars, step: usize) {
        self.write_line(json!({ "event": "log", "step": step, "values": values }));
    }

    fn save_artifact(&mut self, path: &Path) {
        self.write_line(json!({ "event": "artifact", "path": path }));
    }

    fn finish(&mut self) {
        self.write_line(json!({ "event": "finish" }));
        self.writer = None;
    }
}

// ---------------------------------------------------------------------------
// MemorySink
// ---------------------------------------------------------------------------

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Init { experiment: String },
    Log { step: usize, values: Scalars },
    Artifact(PathBuf),
    Finish,
}

/// Records every call; used by tests and embedding code.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub events: Vec<SinkEvent>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(step, value)` for every logged occurrence of `key`, in order.
    pub fn series(&self, key: &str) -> Vec<(usize, f64)> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Log { step, values } => values.get(key).map(|v| (*step, *v)),
                _ => None,
            })
            .collect()
    }

    pub fn artifacts(&self) -> Vec<&Path> {
        self.events
            .iter()
            .filter_map(|e| match e {
                SinkEvent::Artifact(p) => Some(p.as_path()),
                _ => None,
            })
            .collect()
    }

    pub fn finish_count(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, SinkEvent::Finish)).count()
    }
}

impl MetricSink for MemorySink {
    fn init(&mut self, config: &RunConfig) {
        self.events.push(SinkEvent::Init { experiment: config.experiment_name.clone() });
    }

    fn log(&mut self, values: &Scalars, step: usize) {
        self.events.push(SinkEvent::Log { step, values: values.clone() });
    }

    fn save_artifact(&mut self, path: &Path) {
        self.events.push(SinkEvent::Artifact(path.to_path_buf()));
    }

    fn finish(&mut self) {
        self.events.push(SinkEvent::Finish);
    }
}

// ---------------------------------------------------------------------------
// FanoutSink
// ---------------------------------------------------------------------------

/// Forwards every call to each inner sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn MetricSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl MetricSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl MetricSink for FanoutSink {
    fn init(&mut self, config: &RunConfig) {
        self.sinks.iter_mut().for_each(|s| s.init(config));
    }

    fn log(&mut self, values: &Scalars, step: usize) {
        self.sinks.iter_mut().for_each(|s| s.log(values, step));
    }

    fn save_artifact(&mut self, path: &Path) {
        self.sinks.iter_mut().for_each(|s| s.save_artifact(path));
    }

    fn finish(&mut self) {
        self.sinks.iter_mut().for_each(|s| s.finish());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_series_filters_by_key() {
        let mut sink = MemorySink::new();
        sink.log(&scalars([("train_loss", 0.9)]), 0);
        sink.log(&scalars([("val_dice", 0.4)]), 0);
        sink.log(&scalars([("train_loss", 0.7)]), 1);
        assert_eq!(sink.series("train_loss"), vec![(0, 0.9), (1, 0.7)]);
        assert_eq!(sink.series("val_dice"), vec![(0, 0.4)]);
        assert!(sink.series("val_iou").is_empty());
    }

    #[test]
    fn jsonl_sink_writes_one_object_per_line() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logs").join("metrics.jsonl");
        let mut sink = JsonlSink::create(&path).unwrap();
        sink.init(&RunConfig::default());
        sink.log(&scalars([("val_dice", 0.25), ("epoch", 3.0)]), 3);
        sink.save_artifact(Path::new("ckpt/latest_epoch.json"));
        sink.finish();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            text.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["event"], "init");
        assert_eq!(lines[0]["config"]["dataset"], "synthetic");
        assert_eq!(lines[1]["step"], 3);
        assert_eq!(lines[1]["values"]["val_dice"], 0.25);
        assert_eq!(lines[2]["path"], "ckpt/latest_epoch.json");
        assert_eq!(lines[3]["event"], "finish");
    }

    #[test]
    fn jsonl_sink_ignores_calls_after_finish() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("metrics.jsonl");
        let mut sink = JsonlSink::create(&path).unwrap();
        sink.finish();
        sink.log(&scalars([("train_loss", 1.0)]), 0);
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
    }

    #[test]
    fn fanout_reaches_every_sink() {
        struct Counter(std::rc::Rc<std::cell::Cell<usize>>);
        impl MetricSink for Counter {
            fn init(&mut self, _: &RunConfig) {}
            fn log(&mut self, _: &Scalars, _: usize) {
                self.0.set(self.0.get() + 1);
            }
            fn save_artifact(&mut self, _: &Path) {}
            fn finish(&mut self) {}
        }

        let hits = std::rc::Rc::new(std::cell::Cell::new(0));
        let mut fan = FanoutSink::new()
            .with(Counter(hits.clone()))
            .with(Counter(hits.clone()))
            .with(TracingSink);
        assert_eq!(fan.len(), 3);
        fan.log(&scalars([("epoch", 0.0)]), 0);
        assert_eq!(hits.get(), 2);
    }
}
