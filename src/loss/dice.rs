use crate::activation::sigmoid;

/// Smoothing term added to numerator and denominator.
const SMOOTH: f64 = 1e-5;

/// Soft Dice loss on logits: `1 - (2·Σpy + s) / (Σp + Σy + s)` with `p = σ(z)`.
///
/// Computed over one example; an empty prediction against an empty target
/// gives zero loss thanks to the smoothing term.
pub struct DiceLoss;

impl DiceLoss {
    pub fn loss(logits: &[f64], targets: &[f64]) -> f64 {
        let (intersection, total) = Self::sums(logits, targets);
        1.0 - (2.0 * intersection + SMOOTH) / (total + SMOOTH)
    }

    pub fn derivative(logits: &[f64], targets: &[f64]) -> Vec<f64> {
        let (intersection, total) = Self::sums(logits, targets);
        let num = 2.0 * intersection + SMOOTH;
        let den = total + SMOOTH;
        logits.iter().zip(targets)
            .map(|(&z, &y)| {
                let p = sigmoid(z);
                // d/dp of -(num/den), then chain through σ'(z) = p(1-p).
                let d_p = -(2.0 * y * den - num) / (den * den);
                d_p * p * (1.0 - p)
            })
            .collect()
    }

    fn sums(logits: &[f64], targets: &[f64]) -> (f64, f64) {
        logits.iter().zip(targets).fold((0.0, 0.0), |(inter, total), (&z, &y)| {
            let p = sigmoid(z);
            (inter + p * y, total + p + y)
        })
    }
}
