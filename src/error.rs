//! Error types for ferrite-seg.

use std::path::PathBuf;
use thiserror::Error;

/// Everything that can abort a fine-tuning run.
///
/// Metric degenerate inputs are deliberately absent: empty or mismatched
/// masks score zero instead of failing.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad run configuration, detected before the first epoch.
    #[error("configuration error: {0}")]
    Config(String),

    /// Device/host memory budget exceeded during a batch.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("failed to write checkpoint {path}: {source}")]
    Checkpoint {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Process exit status used by the binary.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
