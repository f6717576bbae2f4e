//! Image decoding and block-aligned truncation.
//!
//! This is the leaf stage of the pipeline: raw bytes or decoded images
//! in, images whose sides are whole multiples of the block alignment
//! out.

use image::DynamicImage;

use crate::types::{ChromaSubsampling, PipelineConfig, PipelineError};

/// Decode raw image bytes.
///
/// Supports PNG, JPEG, BMP, and WebP formats (whatever the `image` crate
/// was built with). The color type is left as decoded; the color
/// transform decides whether it is usable.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty.
/// Returns [`PipelineError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
#[must_use = "returns the decoded image"]
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    Ok(image::load_from_memory(bytes)?)
}

/// Side length both image dimensions must be a multiple of.
///
/// Equal to the block size, or twice the block size when chroma is
/// halved so the chroma planes tile into whole blocks too.
#[must_use]
pub const fn alignment(config: &PipelineConfig) -> u32 {
    match config.chroma_subsampling {
        ChromaSubsampling::None => config.block_size,
        ChromaSubsampling::Half => config.block_size * 2,
    }
}

/// Crop `image` to the largest top-left region whose sides are
/// multiples of `alignment`.
///
/// Already aligned images are returned as-is.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] for a zero alignment and
/// [`PipelineError::ImageTooSmall`] if either side is shorter than
/// `alignment`.
pub fn truncate(image: DynamicImage, alignment: u32) -> Result<DynamicImage, PipelineError> {
    if alignment == 0 {
        return Err(PipelineError::InvalidConfig(
            "alignment must be at least 1".to_string(),
        ));
    }

    let (width, height) = (image.width(), image.height());
    let aligned_width = width - width % alignment;
    let aligned_height = height - height % alignment;

    if aligned_width == 0 || aligned_height == 0 {
        return Err(PipelineError::ImageTooSmall {
            width,
            height,
            alignment,
        });
    }
    if (aligned_width, aligned_height) == (width, height) {
        return Ok(image);
    }

    Ok(image.crop_imm(0, 0, aligned_width, aligned_height))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn rgb(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(image::RgbImage::from_fn(w, h, |x, y| {
            image::Rgb([x as u8, y as u8, 7])
        }))
    }

    /// Encode an image as PNG bytes.
    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        image.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn empty_input_returns_error() {
        assert!(matches!(decode(&[]), Err(PipelineError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode(&[0xFF, 0xFE, 0x00, 0x01]);
        assert!(matches!(result, Err(PipelineError::ImageDecode(_))));
    }

    #[test]
    fn valid_png_decodes_with_its_color_type() {
        let decoded = decode(&png_bytes(&rgb(17, 31))).unwrap();
        assert_eq!(decoded.width(), 17);
        assert_eq!(decoded.height(), 31);
        assert_eq!(decoded.color().channel_count(), 3);
    }

    #[test]
    fn alignment_doubles_under_subsampling() {
        let mut config = PipelineConfig::default();
        assert_eq!(alignment(&config), 8);
        config.chroma_subsampling = ChromaSubsampling::Half;
        assert_eq!(alignment(&config), 16);
    }

    #[test]
    fn aligned_image_is_unchanged() {
        let out = truncate(rgb(16, 24), 8).unwrap();
        assert_eq!((out.width(), out.height()), (16, 24));
    }

    #[test]
    fn unaligned_image_is_cropped_down() {
        let out = truncate(rgb(21, 30), 8).unwrap();
        assert_eq!((out.width(), out.height()), (16, 24));
    }

    #[test]
    fn crop_is_anchored_top_left() {
        let out = truncate(rgb(10, 10), 8).unwrap().to_rgb8();
        assert_eq!(out.get_pixel(7, 3).0, [7, 3, 7]);
    }

    #[test]
    fn too_small_image_is_rejected() {
        assert!(matches!(
            truncate(rgb(7, 40), 8),
            Err(PipelineError::ImageTooSmall {
                width: 7,
                height: 40,
                alignment: 8
            })
        ));
    }

    #[test]
    fn zero_alignment_is_rejected() {
        assert!(matches!(
            truncate(rgb(8, 8), 0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
