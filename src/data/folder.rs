//! Image/mask pairs stored as ordinary image files.
//!
//! Layout under a split directory:
//!
//! ```text
//! <split>/images/<stem>.<png|jpg|bmp|gif>
//! <split>/masks/<stem>.<png|jpg|bmp|gif>
//! ```
//!
//! Images are decoded as RGB, masks as grayscale; both are resized to a
//! square `image_size` when loaded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::imageops::FilterType;

use crate::data::dataset::SegmentationDataset;
use crate::data::sample::{Example, Image, Mask};
use crate::error::{Error, Result};

const EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "gif"];

#[derive(Debug, Clone)]
struct Pair {
    id: String,
    image: PathBuf,
    mask: PathBuf,
}

#[derive(Debug, Clone)]
pub struct FolderDataset {
    pairs: Vec<Pair>,
    image_size: u32,
}

impl FolderDataset {
    /// Scans `split_dir` and pairs images with masks by file stem.
    ///
    /// Images without a mask are skipped with a warning.
    pub fn open(split_dir: &Path, image_size: u32) -> Result<Self> {
        let images = list_images(&split_dir.join("images"))?;
        let masks: HashMap<String, PathBuf> = list_images(&split_dir.join("masks"))?.into_iter().collect();

        let mut pairs = Vec::with_capacity(images.len());
        for (stem, image) in images {
            match masks.get(&stem) {
                Some(mask) => pairs.push(Pair { id: stem, image, mask: mask.clone() }),
                None => tracing::warn!(image = %image.display(), "no mask for image, skipping"),
            }
        }
        pairs.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(Self { pairs, image_size })
    }
}

fn list_images(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    if !dir.is_dir() {
        return Err(Error::dataset(format!("missing directory {}", dir.display())));
    }
    let mut out = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            out.push((stem.to_string(), path.clone()));
        }
    }
    Ok(out)
}

fn load_rgb(path: &Path, size: u32) -> Result<Image> {
    let img = image::open(path)?;
    let resized = img.resize_exact(size, size, FilterType::Triangle);
    let rgb = resized.to_rgb8();
    let (w, h) = (size as usize, size as usize);
    let mut image = Image::zeros(3, h, w);
    for (x, y, p) in rgb.enumerate_pixels() {
        for c in 0..3 {
            image.data[(c * h + y as usize) * w + x as usize] = p.0[c] as f64 / 255.0;
        }
    }
    Ok(image)
}

fn load_mask(path: &Path, size: u32) -> Result<Mask> {
    let img = image::open(path)?;
    // Nearest keeps the mask binary after resizing.
    let gray = img.resize_exact(size, size, FilterType::Nearest).to_luma8();
    let data = gray.pixels().map(|p| if p.0[0] > 127 { 1.0 } else { 0.0 }).collect();
    Ok(Mask::new(size as usize, size as usize, data))
}

impl SegmentationDataset for FolderDataset {
    fn len(&self) -> usize {
        self.pairs.len()
    }

    fn get(&self, index: usize) -> Result<Example> {
        let pair = self
            .pairs
            .get(index)
            .ok_or_else(|| Error::dataset(format!("index {} out of range ({} examples)", index, self.pairs.len())))?;
        Ok(Example {
            image: load_rgb(&pair.image, self.image_size)?,
            mask: load_mask(&pair.mask, self.image_size)?,
            id: pair.id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn write_pair(dir: &Path, stem: &str) {
        let mut img = RgbImage::new(8, 8);
        for p in img.pixels_mut() {
            *p = Rgb([255, 0, 0]);
        }
        img.save(dir.join("images").join(format!("{stem}.png"))).unwrap();

        let mut mask = GrayImage::new(8, 8);
        for (x, _, p) in mask.enumerate_pixels_mut() {
            *p = if x < 4 { Luma([255]) } else { Luma([0]) };
        }
        mask.save(dir.join("masks").join(format!("{stem}.png"))).unwrap();
    }

    #[test]
    fn pairs_images_and_masks_by_stem() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("images")).unwrap();
        std::fs::create_dir_all(tmp.path().join("masks")).unwrap();
        write_pair(tmp.path(), "b");
        write_pair(tmp.path(), "a");
        // Orphan image without a mask.
        RgbImage::new(8, 8).save(tmp.path().join("images").join("c.png")).unwrap();

        let ds = FolderDataset::open(tmp.path(), 4).unwrap();
        assert_eq!(ds.len(), 2);
        let ex = ds.get(0).unwrap();
        assert_eq!(ex.id, "a");
        assert_eq!((ex.image.channels, ex.image.height, ex.image.width), (3, 4, 4));
        assert!((ex.image.at(0, 0, 0) - 1.0).abs() < 1e-2);
        assert!(ex.image.at(1, 0, 0) < 1e-2);
        assert_eq!(ex.mask.data[0], 1.0);
        assert_eq!(ex.mask.data[3], 0.0);
    }

    #[test]
    fn missing_directory_is_a_dataset_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(FolderDataset::open(tmp.path(), 4), Err(Error::Dataset(_))));
    }
}
