use serde::{Deserialize, Serialize};

/// Channel-major image, values normalized to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    /// Length `channels * height * width`, laid out as `[c][y][x]`.
    pub data: Vec<f64>,
}

impl Image {
    pub fn new(channels: usize, height: usize, width: usize, data: Vec<f64>) -> Image {
        assert_eq!(data.len(), channels * height * width, "image buffer has wrong length");
        Image { channels, height, width, data }
    }

    pub fn zeros(channels: usize, height: usize, width: usize) -> Image {
        Image { channels, height, width, data: vec![0.0; channels * height * width] }
    }

    #[inline]
    pub fn at(&self, c: usize, y: usize, x: usize) -> f64 {
        self.data[(c * self.height + y) * self.width + x]
    }

    pub fn pixel_count(&self) -> usize {
        self.height * self.width
    }
}

/// Single-channel ground-truth mask, values in [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mask {
    pub height: usize,
    pub width: usize,
    pub data: Vec<f64>,
}

impl Mask {
    pub fn new(height: usize, width: usize, data: Vec<f64>) -> Mask {
        assert_eq!(data.len(), height * width, "mask buffer has wrong length");
        Mask { height, width, data }
    }

    pub fn zeros(height: usize, width: usize) -> Mask {
        Mask { height, width, data: vec![0.0; height * width] }
    }
}

/// One dataset item: image, ground truth and a stable identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub image: Image,
    pub mask: Mask,
    pub id: String,
}
