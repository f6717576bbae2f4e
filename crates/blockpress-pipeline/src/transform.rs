//! Per-block lossy transform round trip.
//!
//! Each block is level shifted by -128, moved to the frequency domain,
//! quantized, immediately dequantized and moved back. No bitstream is
//! produced; the round trip reproduces exactly the information a
//! decoder would recover, so the only loss is the rounding done by the
//! quantizer.

use image::Luma;

use crate::blocks::{Block, TransformedBlock};
use crate::dct::{self, BLOCK_LEN, BLOCK_SIZE};
use crate::quantize::QuantTable;
use crate::types::{ChannelIndex, PipelineError, Plane, Quantization};

/// Level shift applied before the forward transform.
pub const LEVEL_SHIFT: f32 = 128.0;

/// Applies the transform round trip with one fixed quantization setting.
///
/// Holds the luma and chroma tables so they are built once per job
/// rather than once per block.
#[derive(Debug, Clone)]
pub struct BlockTransformer {
    tables: Option<(QuantTable, QuantTable)>,
}

impl BlockTransformer {
    /// Build a transformer for `quantization`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a uniform step of 0.
    pub fn new(quantization: Quantization) -> Result<Self, PipelineError> {
        let tables = match quantization {
            Quantization::Standard(quality) => Some((
                QuantTable::standard(quality, ChannelIndex::Luma),
                QuantTable::standard(quality, ChannelIndex::ChromaRed),
            )),
            Quantization::Uniform(0) => {
                return Err(PipelineError::InvalidConfig(
                    "uniform quantization step must be at least 1".to_string(),
                ));
            }
            Quantization::Uniform(step) => {
                let table = QuantTable::uniform(step);
                Some((table.clone(), table))
            }
            Quantization::Disabled => None,
        };
        Ok(Self { tables })
    }

    /// The table used for `channel`, or `None` when quantization is off.
    #[must_use]
    pub fn table(&self, channel: ChannelIndex) -> Option<&QuantTable> {
        self.tables.as_ref().map(|(luma, chroma)| {
            if channel.is_luma() { luma } else { chroma }
        })
    }

    /// Level shift and transform a block, returning its quantized
    /// coefficients in natural order.
    ///
    /// With quantization disabled the coefficients are rounded to the
    /// nearest integer.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the block is not
    /// [`BLOCK_SIZE`] square.
    pub fn coefficients(
        &self,
        block: &Block,
        channel: ChannelIndex,
    ) -> Result<[i32; BLOCK_LEN], PipelineError> {
        let coeffs = dct::forward(&shifted_samples(&block.pixels)?);
        Ok(self
            .table(channel)
            .map_or_else(|| QuantTable::uniform(1).quantize(&coeffs), |t| t.quantize(&coeffs)))
    }

    /// Run the forward transform, quantize, dequantize and inverse
    /// transform on one block.
    ///
    /// The result stays in the shifted domain and is not clamped;
    /// channel reassembly restores and clamps it.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the block is not
    /// [`BLOCK_SIZE`] square.
    pub fn round_trip(
        &self,
        block: &Block,
        channel: ChannelIndex,
    ) -> Result<TransformedBlock, PipelineError> {
        let coeffs = dct::forward(&shifted_samples(&block.pixels)?);
        let restored = match self.table(channel) {
            Some(table) => table.dequantize(&table.quantize(&coeffs)),
            None => coeffs,
        };
        let samples = dct::inverse(&restored);

        let pixels = Plane::from_fn(BLOCK_SIZE, BLOCK_SIZE, |x, y| {
            Luma([samples[(y * BLOCK_SIZE + x) as usize]])
        });
        Ok(TransformedBlock {
            pixels,
            bounds: block.bounds,
            plane: block.plane,
        })
    }
}

/// Copy a block's samples into a row-major array, shifted by -128.
fn shifted_samples(pixels: &Plane) -> Result<[f32; BLOCK_LEN], PipelineError> {
    if pixels.dimensions() != (BLOCK_SIZE, BLOCK_SIZE) {
        return Err(PipelineError::InvalidConfig(format!(
            "block of {}x{} cannot be transformed (expected {BLOCK_SIZE}x{BLOCK_SIZE})",
            pixels.width(),
            pixels.height(),
        )));
    }
    let raw = pixels.as_raw();
    Ok(std::array::from_fn(|i| raw[i] - LEVEL_SHIFT))
}
