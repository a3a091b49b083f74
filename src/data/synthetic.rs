use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::data::dataset::SegmentationDataset;
use crate::data::sample::{Example, Image, Mask};
use crate::error::{Error, Result};

/// Procedurally generated lesion-like blobs.
///
/// Every example is a noisy RGB image with one bright ellipse (or none, for
/// a fraction of examples) and the matching binary mask. Examples are
/// generated on demand from `(seed, index)`, so the dataset is reproducible
/// and costs no memory up front.
#[derive(Debug, Clone)]
pub struct SyntheticDataset {
    len: usize,
    image_size: usize,
    seed: u64,
    /// Fraction of examples with an empty mask.
    empty_fraction: f64,
}

impl SyntheticDataset {
    pub fn new(len: usize, image_size: usize, seed: u64) -> Self {
        Self { len, image_size, seed, empty_fraction: 0.1 }
    }

    pub fn with_empty_fraction(mut self, fraction: f64) -> Self {
        self.empty_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    fn generate(&self, index: usize) -> Example {
        let mut rng = StdRng::seed_from_u64(self.seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let size = self.image_size;
        let s = size as f64;

        let has_lesion = rng.gen::<f64>() >= self.empty_fraction;
        let cx = rng.gen_range(0.3..0.7) * s;
        let cy = rng.gen_range(0.3..0.7) * s;
        let rx = rng.gen_range(0.12..0.3) * s;
        let ry = rng.gen_range(0.12..0.3) * s;
        let tint: [f64; 3] = [rng.gen_range(0.8..1.0), rng.gen_range(0.4..0.7), rng.gen_range(0.2..0.5)];

        let mut mask = Mask::zeros(size, size);
        let mut image = Image::zeros(3, size, size);
        for y in 0..size {
            for x in 0..size {
                let dx = (x as f64 + 0.5 - cx) / rx;
                let dy = (y as f64 + 0.5 - cy) / ry;
                let inside = has_lesion && dx * dx + dy * dy <= 1.0;
                mask.data[y * size + x] = if inside { 1.0 } else { 0.0 };
                for (c, t) in tint.iter().enumerate() {
                    let base = if inside { 0.35 + 0.5 * t } else { 0.25 * t };
                    let noise: f64 = rng.gen_range(-0.08..0.08);
                    image.data[(c * size + y) * size + x] = (base + noise).clamp(0.0, 1.0);
                }
            }
        }

        Example { image, mask, id: format!("synthetic_{:05}", index) }
    }
}

impl SegmentationDataset for SyntheticDataset {
    fn len(&self) -> usize {
        self.len
    }

    fn get(&self, index: usize) -> Result<Example> {
        if index >= self.len {
            return Err(Error::dataset(format!("index {} out of range ({} examples)", index, self.len)));
        }
        Ok(self.generate(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn examples_are_reproducible() {
        let ds = SyntheticDataset::new(4, 16, 42);
        assert_eq!(ds.get(2).unwrap(), ds.get(2).unwrap());
        assert_ne!(ds.get(1).unwrap().image, ds.get(2).unwrap().image);
    }

    #[test]
    fn shapes_follow_image_size() {
        let ex = SyntheticDataset::new(1, 12, 0).get(0).unwrap();
        assert_eq!((ex.image.channels, ex.image.height, ex.image.width), (3, 12, 12));
        assert_eq!(ex.mask.data.len(), 144);
        assert!(ex.mask.data.iter().all(|&v| v == 0.0 || v == 1.0));
    }

    #[test]
    fn pixel_values_stay_in_unit_range() {
        let ds = SyntheticDataset::new(6, 10, 9);
        for i in 0..6 {
            let ex = ds.get(i).unwrap();
            assert!(ex.image.data.iter().all(|&v| (0.0..=1.0).contains(&v)));
        }
    }

    #[test]
    fn empty_fraction_one_gives_empty_masks() {
        let ds = SyntheticDataset::new(5, 8, 3).with_empty_fraction(1.0);
        for i in 0..5 {
            assert!(ds.get(i).unwrap().mask.data.iter().all(|&v| v == 0.0));
        }
    }

    #[test]
    fn out_of_range_is_an_error() {
        assert!(SyntheticDataset::new(2, 8, 0).get(2).is_err());
    }
}
