use crate::activation::sigmoid;

/// Binary cross-entropy computed directly on logits.
pub struct BceLoss;

impl BceLoss {
    /// Mean over pixels of `max(z,0) - z·y + ln(1 + e^{-|z|})`, the
    /// overflow-free form of `-(y·ln σ(z) + (1-y)·ln(1-σ(z)))`.
    pub fn loss(logits: &[f64], targets: &[f64]) -> f64 {
        if logits.is_empty() {
            return 0.0;
        }
        let n = logits.len() as f64;
        logits.iter().zip(targets)
            .map(|(&z, &y)| z.max(0.0) - z * y + (-z.abs()).exp().ln_1p())
            .sum::<f64>() / n
    }

    /// Per-logit gradient of `loss`: `(σ(z) - y) / n`.
    pub fn derivative(logits: &[f64], targets: &[f64]) -> Vec<f64> {
        let n = logits.len().max(1) as f64;
        logits.iter().zip(targets)
            .map(|(&z, &y)| (sigmoid(z) - y) / n)
            .collect()
    }
}
