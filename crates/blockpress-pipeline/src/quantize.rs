//! Quantization tables and coefficient (de)quantization.
//!
//! Provides [`QuantTable`] for the 64-entry quantization matrices. The
//! standard tables are the ITU-T T.81 Annex K examples scaled by the
//! IJG quality formula, which is what virtually every JPEG encoder
//! ships with.

use crate::dct::BLOCK_LEN;
use crate::types::{ChannelIndex, Quality};

/// Annex K luminance table, natural (row-major) order.
const LUMA_BASE: [u16; BLOCK_LEN] = [
    16, 11, 10, 16, 24, 40, 51, 61, //
    12, 12, 14, 19, 26, 58, 60, 55, //
    14, 13, 16, 24, 40, 57, 69, 56, //
    14, 17, 22, 29, 51, 87, 80, 62, //
    18, 22, 37, 56, 68, 109, 103, 77, //
    24, 35, 55, 64, 81, 104, 113, 92, //
    49, 64, 78, 87, 103, 121, 120, 101, //
    72, 92, 95, 98, 112, 100, 103, 99, //
];

/// Annex K chrominance table, natural (row-major) order.
const CHROMA_BASE: [u16; BLOCK_LEN] = [
    17, 18, 24, 47, 99, 99, 99, 99, //
    18, 21, 26, 66, 99, 99, 99, 99, //
    24, 26, 56, 99, 99, 99, 99, 99, //
    47, 66, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
    99, 99, 99, 99, 99, 99, 99, 99, //
];

/// Quantization table: 64 step sizes in natural (row-major) order.
///
/// Entry `v * 8 + u` is the step for vertical frequency `v` and
/// horizontal frequency `u`. Every step is at least 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    /// Step sizes, indexed by row * 8 + col.
    pub values: [u16; BLOCK_LEN],
}

impl QuantTable {
    /// Wrap raw step sizes, raising zero steps to 1.
    #[must_use]
    pub fn new(mut values: [u16; BLOCK_LEN]) -> Self {
        for v in &mut values {
            *v = (*v).max(1);
        }
        Self { values }
    }

    /// The standard table for `channel` at the given quality.
    ///
    /// Luma uses the luminance table; both chroma channels share the
    /// coarser chrominance table.
    #[must_use]
    pub fn standard(quality: Quality, channel: ChannelIndex) -> Self {
        let base = if channel.is_luma() {
            &LUMA_BASE
        } else {
            &CHROMA_BASE
        };
        let q = u32::from(quality.get());
        let scale = if q < 50 { 5000 / q } else { 200 - 2 * q };

        let values = std::array::from_fn(|i| {
            let scaled = (u32::from(base[i]) * scale + 50) / 100;
            u16::try_from(scaled.clamp(1, 255)).unwrap_or(255)
        });
        Self { values }
    }

    /// A table with the same step for every coefficient.
    #[must_use]
    pub fn uniform(step: u16) -> Self {
        Self::new([step; BLOCK_LEN])
    }

    /// Divide each coefficient by its step and round half away from zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn quantize(&self, coeffs: &[f32; BLOCK_LEN]) -> [i32; BLOCK_LEN] {
        std::array::from_fn(|i| (coeffs[i] / f32::from(self.values[i])).round() as i32)
    }

    /// Multiply each quantized coefficient by its step.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn dequantize(&self, quantized: &[i32; BLOCK_LEN]) -> [f32; BLOCK_LEN] {
        std::array::from_fn(|i| quantized[i] as f32 * f32::from(self.values[i]))
    }
}
