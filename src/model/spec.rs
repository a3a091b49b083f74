use std::path::Path;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::activation::ActivationFunction;
use crate::error::{Error, Result};
use crate::layers::Layer;
use crate::math::Matrix;
use crate::model::pixel_net::PixelNet;

/// One hidden layer of the per-pixel network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenLayerSpec {
    pub size: usize,
    pub activation: ActivationFunction,
}

/// Architecture of a [`PixelNet`], independent of its weights.
///
/// Every pixel is classified from a `(2·patch_radius + 1)²` neighbourhood of
/// all input channels, passed through the hidden layers and a single-unit
/// identity output (the logit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Human-readable name; also the checkpoint directory name.
    pub name: String,
    pub input_channels: usize,
    pub patch_radius: usize,
    pub hidden: Vec<HiddenLayerSpec>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        ModelSpec {
            name: "pixelnet".to_string(),
            input_channels: 3,
            patch_radius: 1,
            hidden: vec![
                HiddenLayerSpec { size: 16, activation: ActivationFunction::ReLU },
                HiddenLayerSpec { size: 8, activation: ActivationFunction::ReLU },
            ],
            description: None,
        }
    }
}

impl ModelSpec {
    /// Features seen by the first layer for each pixel.
    pub fn feature_count(&self) -> usize {
        let side = 2 * self.patch_radius + 1;
        self.input_channels * side * side
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_channels == 0 {
            return Err(Error::config("model input_channels must be at least 1"));
        }
        if self.hidden.iter().any(|h| h.size == 0) {
            return Err(Error::config("hidden layer sizes must be at least 1"));
        }
        Ok(())
    }

    /// Builds a freshly initialised network: He init before ReLU-family
    /// activations, Xavier elsewhere, zero biases.
    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<PixelNet> {
        self.validate()?;
        let mut layers = Vec::with_capacity(self.hidden.len() + 1);
        let mut fan_in = self.feature_count();
        for h in &self.hidden {
            let weights = match h.activation {
                ActivationFunction::ReLU | ActivationFunction::LeakyReLU { .. } => Matrix::he(fan_in, h.size, rng),
                _ => Matrix::xavier(fan_in, h.size, rng),
            };
            layers.push(Layer::new(weights, Matrix::zeros(1, h.size), h.activation));
            fan_in = h.size;
        }
        layers.push(Layer::new(
            Matrix::xavier(fan_in, 1, rng),
            Matrix::zeros(1, 1),
            ActivationFunction::Identity,
        ));
        PixelNet::from_layers(self.clone(), layers)
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `ModelSpec` from a JSON file.
    pub fn load_json(path: &Path) -> Result<ModelSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}
