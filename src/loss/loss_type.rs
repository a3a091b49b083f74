use serde::{Deserialize, Serialize};

use crate::loss::{bce::BceLoss, dice::DiceLoss};

/// Selects the segmentation loss used by the training and validation runners.
///
/// - `Bce`: pixel-wise binary cross-entropy on logits.
/// - `Dice`: soft Dice over the whole mask.
/// - `DiceBce`: sum of the two; the default for medical masks where the
///   foreground is small.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossType {
    Bce,
    Dice,
    #[default]
    DiceBce,
}

impl LossType {
    /// Scalar loss for one example.
    pub fn loss(self, logits: &[f64], targets: &[f64]) -> f64 {
        match self {
            LossType::Bce => BceLoss::loss(logits, targets),
            LossType::Dice => DiceLoss::loss(logits, targets),
            LossType::DiceBce => BceLoss::loss(logits, targets) + DiceLoss::loss(logits, targets),
        }
    }

    /// Gradient of `loss` with respect to each logit of one example.
    pub fn derivative(self, logits: &[f64], targets: &[f64]) -> Vec<f64> {
        match self {
            LossType::Bce => BceLoss::derivative(logits, targets),
            LossType::Dice => DiceLoss::derivative(logits, targets),
            LossType::DiceBce => BceLoss::derivative(logits, targets)
                .into_iter()
                .zip(DiceLoss::derivative(logits, targets))
                .map(|(a, b)| a + b)
                .collect(),
        }
    }
}
