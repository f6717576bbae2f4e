//! RGB <-> Y/Cr/Cb color conversion.
//!
//! Uses the full-range ITU-R BT.601 matrix from JFIF, with the chroma
//! zero point at 128 so every plane covers `[0, 255]`. Planes are
//! produced in channel index order: luma, red-difference,
//! blue-difference.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

use crate::resample::{self, ResampleFilter};
use crate::types::{ChromaSubsampling, PipelineError, Plane};

/// Convert one RGB pixel to `(Y, Cr, Cb)`.
#[inline]
#[must_use]
pub fn rgb_to_ycrcb(r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    let y = 0.114f32.mul_add(b, 0.299f32.mul_add(r, 0.587 * g));
    let cr = 128.0 + 0.081_312f32.mul_add(-b, 0.5f32.mul_add(r, -0.418_688 * g));
    let cb = 128.0 + 0.5f32.mul_add(b, (-0.168_736f32).mul_add(r, -0.331_264 * g));
    (y, cr, cb)
}

/// Convert one `(Y, Cr, Cb)` triple back to unclamped RGB.
#[inline]
#[must_use]
pub fn ycrcb_to_rgb(y: f32, cr: f32, cb: f32) -> (f32, f32, f32) {
    let cr = cr - 128.0;
    let cb = cb - 128.0;
    let r = 1.402f32.mul_add(cr, y);
    let g = (-0.714_136f32).mul_add(cr, (-0.344_136f32).mul_add(cb, y));
    let b = 1.772f32.mul_add(cb, y);
    (r, g, b)
}

/// Round and clamp a sample into the 8-bit range.
#[inline]
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

/// Split an image into luma, red-difference and blue-difference planes.
///
/// With [`ChromaSubsampling::Half`] the two chroma planes are resized to
/// half the image size (rounded up) using `filter`; luma always keeps
/// the full resolution.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidShape`] if the image does not have
/// exactly three color channels (grayscale and alpha images are
/// rejected rather than guessed at).
pub fn to_channels(
    image: &DynamicImage,
    subsampling: ChromaSubsampling,
    filter: ResampleFilter,
) -> Result<[Plane; 3], PipelineError> {
    let channels = image.color().channel_count();
    if channels != 3 {
        return Err(PipelineError::InvalidShape { channels });
    }

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut luma = Plane::new(width, height);
    let mut chroma_red = Plane::new(width, height);
    let mut chroma_blue = Plane::new(width, height);

    for (x, y, Rgb([r, g, b])) in rgb.enumerate_pixels() {
        let (yv, cr, cb) = rgb_to_ycrcb(f32::from(*r), f32::from(*g), f32::from(*b));
        luma.put_pixel(x, y, Luma([yv]));
        chroma_red.put_pixel(x, y, Luma([cr]));
        chroma_blue.put_pixel(x, y, Luma([cb]));
    }

    let factor = subsampling.factor();
    if factor > 1 {
        let (w, h) = (width.div_ceil(factor), height.div_ceil(factor));
        chroma_red = resample::resize_plane(&chroma_red, w, h, filter);
        chroma_blue = resample::resize_plane(&chroma_blue, w, h, filter);
    }

    Ok([luma, chroma_red, chroma_blue])
}

/// Interleave three restored 8-bit planes and convert them to RGB.
///
/// Planes are taken in channel index order (Y, Cr, Cb) and must share
/// the same dimensions; the output has the luma plane's size.
#[must_use]
pub fn to_rgb(luma: &GrayImage, chroma_red: &GrayImage, chroma_blue: &GrayImage) -> RgbImage {
    debug_assert_eq!(luma.dimensions(), chroma_red.dimensions());
    debug_assert_eq!(luma.dimensions(), chroma_blue.dimensions());

    RgbImage::from_fn(luma.width(), luma.height(), |x, y| {
        let yv = f32::from(luma.get_pixel(x, y).0[0]);
        let cr = f32::from(chroma_red.get_pixel(x, y).0[0]);
        let cb = f32::from(chroma_blue.get_pixel(x, y).0[0]);
        let (r, g, b) = ycrcb_to_rgb(yv, cr, cb);
        Rgb([to_u8(r), to_u8(g), to_u8(b)])
    })
}
