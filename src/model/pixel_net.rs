use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::Image;
use crate::error::{Error, Result};
use crate::layers::{Layer, LayerWeights};
use crate::math::Matrix;
use crate::model::metadata::{ModelMetadata, ParameterInfo};
use crate::model::spec::ModelSpec;
use crate::model::{Mode, Prediction, SegmentationModel};
use crate::optim::ParamView;
use crate::precision::Precision;

/// Weights-only snapshot of a [`PixelNet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelState {
    pub spec: ModelSpec,
    pub layers: Vec<LayerWeights>,
}

impl ModelState {
    /// True when no weight or bias is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.layers
            .iter()
            .all(|l| l.weights.data.iter().chain(&l.biases.data).all(|v| v.is_finite()))
    }
}

/// Per-pixel MLP segmentation head.
///
/// Each pixel becomes one row of features (its zero-padded neighbourhood in
/// every channel), so a batch of images is a single matrix pass through the
/// dense layers.
#[derive(Debug)]
pub struct PixelNet {
    spec: ModelSpec,
    layers: Vec<Layer>,
    mode: Mode,
    /// Upper bound on activation memory for one batch.
    memory_limit_bytes: Option<usize>,
    /// `(height, width)` of each image in the last training batch.
    cached_shapes: Vec<(usize, usize)>,
}

impl PixelNet {
    pub(crate) fn from_layers(spec: ModelSpec, layers: Vec<Layer>) -> Result<PixelNet> {
        check_layer_chain(&spec, layers.iter().map(|l| (l.input_size, l.size, l.biases.data.len())))?;
        Ok(PixelNet { spec, layers, mode: Mode::Train, memory_limit_bytes: None, cached_shapes: Vec::new() })
    }

    /// Rebuilds a network from a checkpointed state.
    pub fn from_state(state: ModelState) -> Result<PixelNet> {
        state.spec.validate()?;
        let layers = state.layers.into_iter().map(Layer::from_weights).collect();
        PixelNet::from_layers(state.spec, layers)
    }

    /// Loads the weights stored in a checkpoint file.
    pub fn load_checkpoint(path: &Path) -> Result<PixelNet> {
        #[derive(Deserialize)]
        struct Stored {
            model: ModelState,
        }
        let file = std::fs::File::open(path)?;
        let stored: Stored = serde_json::from_reader(std::io::BufReader::new(file))?;
        PixelNet::from_state(stored.model)
    }

    pub fn with_memory_limit(mut self, bytes: Option<usize>) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn check_memory(&self, rows: usize) -> Result<()> {
        let Some(limit) = self.memory_limit_bytes else {
            return Ok(());
        };
        // Features plus pre-activation and activation per layer, per pixel.
        let per_row = self.spec.feature_count() + self.layers.iter().map(|l| 2 * l.size).sum::<usize>();
        let needed = rows.saturating_mul(per_row).saturating_mul(std::mem::size_of::<f64>());
        if needed > limit {
            return Err(Error::ResourceExhausted(format!(
                "batch needs {} bytes of activations, limit is {}",
                needed, limit
            )));
        }
        Ok(())
    }

    /// Builds the `(pixels, features)` input matrix for a batch.
    fn features(&self, images: &[&Image]) -> Result<(Matrix, Vec<(usize, usize)>)> {
        let channels = self.spec.input_channels;
        let r = self.spec.patch_radius as isize;
        let cols = self.spec.feature_count();
        let mut shapes = Vec::with_capacity(images.len());
        let rows: usize = images.iter().map(|i| i.pixel_count()).sum();
        self.check_memory(rows)?;

        let mut data = Vec::with_capacity(rows * cols);
        for image in images {
            if image.channels != channels {
                return Err(Error::model(format!(
                    "model expects {} channels, image has {}",
                    channels, image.channels
                )));
            }
            let (h, w) = (image.height as isize, image.width as isize);
            for y in 0..h {
                for x in 0..w {
                    for c in 0..channels {
                        for dy in -r..=r {
                            for dx in -r..=r {
                                let (yy, xx) = (y + dy, x + dx);
                                let v = if yy >= 0 && yy < h && xx >= 0 && xx < w {
                                    image.at(c, yy as usize, xx as usize)
                                } else {
                                    0.0
                                };
                                data.push(v);
                            }
                        }
                    }
                }
            }
            shapes.push((image.height, image.width));
        }
        Ok((Matrix::from_vec(rows, cols, data), shapes))
    }
}

/// Checks that layer shapes chain from the spec's feature count down to a
/// single logit.
fn check_layer_chain(spec: &ModelSpec, layers: impl Iterator<Item = (usize, usize, usize)>) -> Result<()> {
    let mut expected_in = spec.feature_count();
    let mut last_out = None;
    for (i, (input, size, bias_len)) in layers.enumerate() {
        if input != expected_in || bias_len != size {
            return Err(Error::model(format!(
                "layer {} has shape {}x{} (bias {}), expected input {}",
                i, input, size, bias_len, expected_in
            )));
        }
        expected_in = size;
        last_out = Some(size);
    }
    match last_out {
        Some(1) => Ok(()),
        other => Err(Error::model(format!("output layer must have 1 unit, got {:?}", other))),
    }
}

fn split_logits(output: &Matrix, shapes: &[(usize, usize)]) -> Vec<Prediction> {
    let mut offset = 0;
    shapes
        .iter()
        .map(|&(height, width)| {
            let n = height * width;
            let logits = output.data[offset..offset + n].to_vec();
            offset += n;
            Prediction { height, width, logits }
        })
        .collect()
}

impl SegmentationModel for PixelNet {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn predict(&self, images: &[&Image], precision: Precision) -> Result<Vec<Prediction>> {
        let (mut current, shapes) = self.features(images)?;
        precision.round_slice(&mut current.data);
        for layer in &self.layers {
            current = layer.infer(&current, precision);
        }
        Ok(split_logits(&current, &shapes))
    }

    fn forward_train(&mut self, images: &[&Image], precision: Precision) -> Result<Vec<Prediction>> {
        if self.mode != Mode::Train {
            return Err(Error::model("forward_train called while the model is in eval mode"));
        }
        let (mut current, shapes) = self.features(images)?;
        precision.round_slice(&mut current.data);
        for layer in &mut self.layers {
            current = layer.feed_from(current, precision);
        }
        let predictions = split_logits(&current, &shapes);
        self.cached_shapes = shapes;
        Ok(predictions)
    }

    fn backward(&mut self, grad_logits: &[Vec<f64>]) -> Result<()> {
        if grad_logits.len() != self.cached_shapes.len() {
            return Err(Error::model(format!(
                "backward got {} gradients for a batch of {}",
                grad_logits.len(),
                self.cached_shapes.len()
            )));
        }
        let mut data = Vec::with_capacity(grad_logits.iter().map(Vec::len).sum());
        for (grad, &(h, w)) in grad_logits.iter().zip(&self.cached_shapes) {
            if grad.len() != h * w {
                return Err(Error::model(format!("gradient has {} values for a {}x{} image", grad.len(), h, w)));
            }
            data.extend_from_slice(grad);
        }
        let mut delta = Matrix::from_vec(data.len(), 1, data);
        for layer in self.layers.iter_mut().rev() {
            delta = layer.backward(&delta);
        }
        Ok(())
    }

    fn zero_grad(&mut self) {
        for layer in &mut self.layers {
            layer.zero_grad();
            layer.clear_cache();
        }
        self.cached_shapes.clear();
    }

    fn parameters_mut(&mut self) -> Vec<ParamView<'_>> {
        self.layers.iter_mut().flat_map(|l| l.params_mut()).collect()
    }

    fn parameter_count(&self) -> usize {
        self.layers.iter().map(Layer::parameter_count).sum()
    }

    fn state(&self) -> ModelState {
        ModelState {
            spec: self.spec.clone(),
            layers: self.layers.iter().map(Layer::to_weights).collect(),
        }
    }

    fn metadata(&self) -> ModelMetadata {
        let parameters: Vec<ParameterInfo> = self
            .layers
            .iter()
            .enumerate()
            .flat_map(|(i, l)| {
                [
                    ParameterInfo { name: format!("layers.{i}.weight"), shape: vec![l.input_size, l.size] },
                    ParameterInfo { name: format!("layers.{i}.bias"), shape: vec![l.size] },
                ]
            })
            .collect();
        ModelMetadata {
            name: self.spec.name.clone(),
            description: self.spec.description.clone(),
            input_channels: self.spec.input_channels,
            patch_radius: self.spec.patch_radius,
            total_parameters: parameters.iter().map(ParameterInfo::numel).sum(),
            parameters,
        }
    }
}
