use rand::seq::SliceRandom;
use rand::Rng;

/// Default number of examples drawn from each split.
pub const DEFAULT_SUBSET_CAP: usize = 100;

/// Uniformly random permutation of `0..len`, truncated to `min(len, cap)`.
///
/// The caller owns the generator, so a seeded one gives the same subset on
/// every run.
pub fn subsample<R: Rng + ?Sized>(len: usize, cap: usize, rng: &mut R) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(rng);
    indices.truncate(cap.min(len));
    indices
}
