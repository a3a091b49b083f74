use rand::seq::SliceRandom;
use rand::Rng;

/// Splits positions `0..len` into batches of `batch_size`.
///
/// With a generator the order is shuffled first (training); without one the
/// natural order is kept (validation). The final partial batch is always
/// included, so every position appears exactly once.
pub fn batch_indices<R: Rng + ?Sized>(
    len: usize,
    batch_size: usize,
    shuffle: Option<&mut R>,
) -> Vec<Vec<usize>> {
    assert!(batch_size > 0, "batch_size must be at least 1");
    let mut order: Vec<usize> = (0..len).collect();
    if let Some(rng) = shuffle {
        order.shuffle(rng);
    }
    order.chunks(batch_size).map(|c| c.to_vec()).collect()
}
