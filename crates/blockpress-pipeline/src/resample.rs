//! Plane resampling for chroma subsampling.
//!
//! Chroma planes are shrunk after the color transform when
//! [`ChromaSubsampling::Half`](crate::types::ChromaSubsampling::Half) is
//! selected, and grown back to the image size during channel
//! reassembly. Both directions go through [`resize_plane`].

use std::fmt;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use crate::types::Plane;

/// Resampling filter used when resizing planes.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResampleFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest.
    Lanczos3,
}

impl ResampleFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> FilterType {
        match self {
            Self::Nearest => FilterType::Nearest,
            Self::Triangle => FilterType::Triangle,
            Self::CatmullRom => FilterType::CatmullRom,
            Self::Gaussian => FilterType::Gaussian,
            Self::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResampleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Resize a plane whose values lie in `[0, 255]` to `width` x `height`.
///
/// The `image` crate clamps floating point samples to the unit interval
/// while filtering, so the plane is scaled into `[0, 1]` for the resize
/// and back afterwards, clamping values outside `[0, 255]`.
///
/// Returns an unclamped copy of the input when the size already matches.
#[must_use]
pub fn resize_plane(plane: &Plane, width: u32, height: u32, filter: ResampleFilter) -> Plane {
    if plane.dimensions() == (width, height) {
        return plane.clone();
    }

    let mut unit = plane.clone();
    for sample in unit.iter_mut() {
        *sample = sample.clamp(0.0, 255.0) / 255.0;
    }

    let mut resized = imageops::resize(&unit, width, height, filter.to_image_filter());
    for sample in resized.iter_mut() {
        *sample *= 255.0;
    }
    resized
}
