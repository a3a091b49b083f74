//! The trainable model seen by the fine-tuning loop.
//!
//! The loop only talks to [`SegmentationModel`]; [`PixelNet`] is the bundled
//! implementation.

pub mod metadata;
pub mod pixel_net;
pub mod spec;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::Image;
use crate::error::Result;
use crate::optim::ParamView;
use crate::precision::Precision;

pub use metadata::{ModelMetadata, ParameterInfo};
pub use pixel_net::{ModelState, PixelNet};
pub use spec::{HiddenLayerSpec, ModelSpec};

/// Training or inference behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Train,
    Eval,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Train => "train",
            Mode::Eval => "eval",
        })
    }
}

/// Per-pixel foreground logits for one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub height: usize,
    pub width: usize,
    /// Row-major, length `height * width`.
    pub logits: Vec<f64>,
}

/// A trainable binary segmentation model.
///
/// Inference (`predict`) borrows the model immutably, so evaluation and
/// checkpointing can never change the weights. Only the training path
/// (`forward_train`, `backward`, `parameters_mut`) needs `&mut self`.
pub trait SegmentationModel {
    fn name(&self) -> &str;

    fn set_mode(&mut self, mode: Mode);

    fn mode(&self) -> Mode;

    /// Inference without gradient bookkeeping.
    fn predict(&self, images: &[&Image], precision: Precision) -> Result<Vec<Prediction>>;

    /// Training forward pass; keeps whatever `backward` needs.
    /// Fails when the model is in `Mode::Eval`.
    fn forward_train(&mut self, images: &[&Image], precision: Precision) -> Result<Vec<Prediction>>;

    /// Accumulates parameter gradients from dL/dlogit of the last
    /// `forward_train` batch (one vector per image, same order).
    fn backward(&mut self, grad_logits: &[Vec<f64>]) -> Result<()>;

    /// Resets gradients and drops cached activations.
    fn zero_grad(&mut self);

    /// Parameters with their gradients, always in the same order.
    fn parameters_mut(&mut self) -> Vec<ParamView<'_>>;

    fn parameter_count(&self) -> usize;

    /// Serializable snapshot of the weights.
    fn state(&self) -> ModelState;

    fn metadata(&self) -> ModelMetadata;
}
