use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric precision used for model activations during a run.
///
/// Chosen once in `RunConfig` and handed to the training and validation
/// runners when they are built. Parameters and optimizer moments always stay
/// in f64; only the values flowing through the forward pass are rounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    /// No rounding (f64 end to end).
    Full,
    F32,
    /// bfloat16: f32 exponent range, 8-bit mantissa.
    #[default]
    Bf16,
}

impl Precision {
    /// Rounds `x` to the nearest value representable in this precision.
    #[inline]
    pub fn round(self, x: f64) -> f64 {
        match self {
            Precision::Full => x,
            Precision::F32 => x as f32 as f64,
            Precision::Bf16 => round_bf16(x as f32) as f64,
        }
    }

    pub fn round_slice(self, values: &mut [f64]) {
        if self == Precision::Full {
            return;
        }
        for v in values {
            *v = self.round(*v);
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Precision::Full => "full",
            Precision::F32 => "f32",
            Precision::Bf16 => "bf16",
        };
        f.write_str(name)
    }
}

/// Round-to-nearest-even truncation of an f32 to its upper 16 bits.
fn round_bf16(x: f32) -> f32 {
    if x.is_nan() {
        return x;
    }
    let bits = x.to_bits();
    let lsb = (bits >> 16) & 1;
    let rounded = bits.wrapping_add(0x7FFF + lsb) & 0xFFFF_0000;
    f32::from_bits(rounded)
}
