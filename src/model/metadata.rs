use serde::{Deserialize, Serialize};

/// Name and shape of one parameter tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParameterInfo {
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }
}

/// Descriptive data stored next to the weights in a checkpoint.
/// Optional fields keep older checkpoints readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ModelMetadata {
    pub name: String,
    pub description: Option<String>,
    pub input_channels: usize,
    pub patch_radius: usize,
    #[serde(default)]
    pub parameters: Vec<ParameterInfo>,
    #[serde(default)]
    pub total_parameters: usize,
}
