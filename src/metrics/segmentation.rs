use serde::{Deserialize, Serialize};

use crate::activation::sigmoid;
use crate::data::Mask;
use crate::model::Prediction;

/// Ground-truth pixels above this value count as foreground.
pub const TRUTH_THRESHOLD: f64 = 0.5;

/// Overlap scores for one example.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub iou: f64,
    pub dice: f64,
}

impl Scores {
    /// The composite score used for monitoring: mean of IoU and Dice.
    pub fn total(&self) -> f64 {
        (self.iou + self.dice) / 2.0
    }
}

/// IoU and Dice of two binary masks.
///
/// When both masks are empty the ratios are 0/0; that case scores 0 for both
/// metrics rather than NaN.
pub fn mask_scores(predicted: &[bool], truth: &[bool]) -> Scores {
    let (mut inter, mut pred, mut real) = (0usize, 0usize, 0usize);
    for (&p, &t) in predicted.iter().zip(truth) {
        pred += p as usize;
        real += t as usize;
        inter += (p && t) as usize;
    }
    let union = pred + real - inter;
    if union == 0 {
        return Scores::default();
    }
    Scores {
        iou: inter as f64 / union as f64,
        dice: 2.0 * inter as f64 / (pred + real) as f64,
    }
}

/// Scores one prediction against its mask, averaged over `thresholds`
/// applied to σ(logit).
///
/// A shape mismatch is not an error: the example scores zero and a warning
/// is logged.
pub fn score_prediction(prediction: &Prediction, mask: &Mask, thresholds: &[f64]) -> Scores {
    if prediction.height != mask.height || prediction.width != mask.width {
        tracing::warn!(
            predicted = ?(prediction.height, prediction.width),
            truth = ?(mask.height, mask.width),
            "prediction and mask shapes differ, scoring as zero"
        );
        return Scores::default();
    }
    if thresholds.is_empty() {
        return Scores::default();
    }

    let truth: Vec<bool> = mask.data.iter().map(|&v| v > TRUTH_THRESHOLD).collect();
    let probs: Vec<f64> = prediction.logits.iter().map(|&z| sigmoid(z)).collect();

    let mut sum = Scores::default();
    for &t in thresholds {
        let predicted: Vec<bool> = probs.iter().map(|&p| p > t).collect();
        let s = mask_scores(&predicted, &truth);
        sum.iou += s.iou;
        sum.dice += s.dice;
    }
    let n = thresholds.len() as f64;
    Scores { iou: sum.iou / n, dice: sum.dice / n }
}

/// Running per-example average.
///
/// Every example contributes equally regardless of region size, and the
/// result does not depend on the order examples arrive in.
#[derive(Debug, Clone, Default)]
pub struct MetricAccumulator {
    iou_sum: f64,
    dice_sum: f64,
    count: usize,
}

impl MetricAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, scores: Scores) {
        self.iou_sum += scores.iou;
        self.dice_sum += scores.dice;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean scores; zero when nothing was added.
    pub fn mean(&self) -> Scores {
        if self.count == 0 {
            return Scores::default();
        }
        let n = self.count as f64;
        Scores { iou: self.iou_sum / n, dice: self.dice_sum / n }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction_from_bits(bits: &[bool], h: usize, w: usize) -> Prediction {
        let logits = bits.iter().map(|&b| if b { 10.0 } else { -10.0 }).collect();
        Prediction { height: h, width: w, logits }
    }

    #[test]
    fn both_empty_scores_zero_not_nan() {
        let s = mask_scores(&[false; 9], &[false; 9]);
        assert_eq!(s, Scores { iou: 0.0, dice: 0.0 });
        assert!(!s.total().is_nan());
    }

    #[test]
    fn identical_non_empty_masks_score_one() {
        let m = [true, false, true, true];
        let s = mask_scores(&m, &m);
        assert_eq!(s.iou, 1.0);
        assert_eq!(s.dice, 1.0);
    }

    #[test]
    fn partial_overlap() {
        // pred = {0,1}, truth = {1,2}: inter 1, union 3.
        let s = mask_scores(&[true, true, false], &[false, true, true]);
        assert!((s.iou - 1.0 / 3.0).abs() < 1e-12);
        assert!((s.dice - 0.5).abs() < 1e-12);
    }

    #[test]
    fn prediction_against_empty_truth_scores_zero() {
        let s = mask_scores(&[true, false], &[false, false]);
        assert_eq!(s, Scores::default());
    }

    #[test]
    fn score_prediction_thresholds_sigmoid() {
        let mask = Mask::new(1, 3, vec![1.0, 0.0, 1.0]);
        let pred = prediction_from_bits(&[true, false, true], 1, 3);
        let s = score_prediction(&pred, &mask, &[0.3, 0.5, 0.7]);
        assert_eq!(s, Scores { iou: 1.0, dice: 1.0 });
    }

    #[test]
    fn score_prediction_averages_over_thresholds() {
        let mask = Mask::new(1, 2, vec![1.0, 0.0]);
        // σ(0) = 0.5: foreground at t=0.3, background at t=0.7.
        let pred = Prediction { height: 1, width: 2, logits: vec![0.0, -10.0] };
        let s = score_prediction(&pred, &mask, &[0.3, 0.7]);
        assert!((s.dice - 0.5).abs() < 1e-12);
    }

    #[test]
    fn shape_mismatch_scores_zero() {
        let mask = Mask::new(2, 2, vec![1.0; 4]);
        let pred = prediction_from_bits(&[true; 6], 2, 3);
        assert_eq!(score_prediction(&pred, &mask, &[0.5]), Scores::default());
    }

    #[test]
    fn accumulator_averages_per_example_not_per_pixel() {
        // Large region predicted perfectly, tiny region missed entirely.
        let big_truth = vec![true; 99];
        let small_truth = vec![true];
        let mut acc = MetricAccumulator::new();
        acc.add(mask_scores(&big_truth, &big_truth));
        acc.add(mask_scores(&[false], &small_truth));
        assert!((acc.mean().dice - 0.5).abs() < 1e-12);

        // Pooled over all 100 pixels the Dice would be 198/199.
        let pooled_pred: Vec<bool> = big_truth.iter().copied().chain([false]).collect();
        let pooled_truth: Vec<bool> = big_truth.iter().copied().chain([true]).collect();
        assert!(mask_scores(&pooled_pred, &pooled_truth).dice > 0.99);
    }

    #[test]
    fn accumulator_is_order_invariant() {
        let scores = [
            Scores { iou: 0.1, dice: 0.2 },
            Scores { iou: 0.7, dice: 0.8 },
            Scores { iou: 0.4, dice: 0.5 },
        ];
        let mut forward = MetricAccumulator::new();
        scores.iter().for_each(|s| forward.add(*s));
        let mut backward = MetricAccumulator::new();
        scores.iter().rev().for_each(|s| backward.add(*s));
        let (a, b) = (forward.mean(), backward.mean());
        assert!((a.iou - b.iou).abs() < 1e-12);
        assert!((a.dice - b.dice).abs() < 1e-12);
    }

    #[test]
    fn empty_accumulator_is_zero() {
        assert_eq!(MetricAccumulator::new().mean(), Scores::default());
    }
}
