//! Plane tiling into fixed-size square blocks.
//!
//! [`split`] cuts a plane into a complete grid of non-overlapping
//! blocks. Each block carries its absolute bounds and the shape of the
//! plane it came from, so blocks can be transformed and merged back in
//! any order.

use image::imageops;

use crate::types::{Dimensions, PipelineError, Plane};

/// Absolute, half-open bounds of a block within its plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockBounds {
    /// First row covered.
    pub row_start: u32,
    /// One past the last row covered.
    pub row_end: u32,
    /// First column covered.
    pub col_start: u32,
    /// One past the last column covered.
    pub col_end: u32,
}

impl BlockBounds {
    /// Number of rows covered.
    #[must_use]
    pub const fn rows(&self) -> u32 {
        self.row_end - self.row_start
    }

    /// Number of columns covered.
    #[must_use]
    pub const fn cols(&self) -> u32 {
        self.col_end - self.col_start
    }
}

/// Row and column count of the plane a block belongs to.
///
/// Differs from the image [`Dimensions`] when chroma is subsampled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaneShape {
    /// Plane row count.
    pub rows: u32,
    /// Plane column count.
    pub cols: u32,
}

impl PlaneShape {
    /// Shape of an existing plane.
    #[must_use]
    pub fn of(plane: &Plane) -> Self {
        Self {
            rows: plane.height(),
            cols: plane.width(),
        }
    }

    /// A zero-filled plane of this shape.
    #[must_use]
    pub fn zeros(self) -> Plane {
        Plane::new(self.cols, self.rows)
    }
}

/// One block of a channel plane, before the transform.
#[derive(Debug, Clone)]
pub struct Block {
    /// Block samples, `block_size` x `block_size`.
    pub pixels: Plane,
    /// Where the block sits in its plane.
    pub bounds: BlockBounds,
    /// Size of the source image the plane was derived from.
    pub image: Dimensions,
    /// Size of the plane itself.
    pub plane: PlaneShape,
}

/// One block after the transform round trip.
///
/// Samples are left shifted by -128 and unclamped.
#[derive(Debug, Clone)]
pub struct TransformedBlock {
    /// Reconstructed block samples.
    pub pixels: Plane,
    /// Where the block sits in its plane.
    pub bounds: BlockBounds,
    /// Size of the plane the block belongs to.
    pub plane: PlaneShape,
}

impl TransformedBlock {
    /// Copy this block's samples into `plane` at its recorded bounds.
    ///
    /// `plane` must have the recorded [`PlaneShape`].
    pub fn write_into(&self, plane: &mut Plane) {
        debug_assert_eq!(PlaneShape::of(plane), self.plane);
        imageops::replace(
            plane,
            &self.pixels,
            i64::from(self.bounds.col_start),
            i64::from(self.bounds.row_start),
        );
    }
}

/// Split `plane` into `block_size` x `block_size` blocks.
///
/// Blocks come out in row-major grid order, although nothing downstream
/// depends on it. `image` is the size of the source image and is copied
/// onto every block.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `block_size` is zero and
/// [`PipelineError::UnalignedDimension`] if either plane dimension is
/// not a multiple of `block_size`. A partial block is never dropped
/// silently since it would leave a hole at reassembly.
pub fn split(
    plane: &Plane,
    block_size: u32,
    image: Dimensions,
) -> Result<Vec<Block>, PipelineError> {
    if block_size == 0 {
        return Err(PipelineError::InvalidConfig(
            "block size must be at least 1".to_string(),
        ));
    }

    let shape = PlaneShape::of(plane);
    if shape.rows % block_size != 0 || shape.cols % block_size != 0 {
        return Err(PipelineError::UnalignedDimension {
            rows: shape.rows,
            cols: shape.cols,
            block_size,
        });
    }

    let grid_rows = shape.rows / block_size;
    let grid_cols = shape.cols / block_size;
    let mut blocks = Vec::with_capacity((grid_rows * grid_cols) as usize);

    for block_row in 0..grid_rows {
        for block_col in 0..grid_cols {
            let row_start = block_row * block_size;
            let col_start = block_col * block_size;
            let pixels =
                imageops::crop_imm(plane, col_start, row_start, block_size, block_size).to_image();
            blocks.push(Block {
                pixels,
                bounds: BlockBounds {
                    row_start,
                    row_end: row_start + block_size,
                    col_start,
                    col_end: col_start + block_size,
                },
                image,
                plane: shape,
            });
        }
    }

    Ok(blocks)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn numbered_plane(w: u32, h: u32) -> Plane {
        Plane::from_fn(w, h, |x, y| image::Luma([(y * w + x) as f32]))
    }

    fn dims(plane: &Plane) -> Dimensions {
        Dimensions::new(plane.width(), plane.height())
    }

    #[test]
    fn block_count_matches_grid() {
        let plane = numbered_plane(24, 16);
        let blocks = split(&plane, 8, dims(&plane)).unwrap();
        assert_eq!(blocks.len(), 6);
    }

    #[test]
    fn blocks_have_exact_size_and_metadata() {
        let plane = numbered_plane(16, 8);
        let blocks = split(&plane, 8, Dimensions::new(32, 16)).unwrap();
        for block in &blocks {
            assert_eq!(block.pixels.dimensions(), (8, 8));
            assert_eq!(block.bounds.rows(), 8);
            assert_eq!(block.bounds.cols(), 8);
            assert_eq!(block.plane, PlaneShape { rows: 8, cols: 16 });
            assert_eq!(block.image, Dimensions::new(32, 16));
        }
    }

    #[test]
    fn block_samples_come_from_their_bounds() {
        let plane = numbered_plane(16, 16);
        let blocks = split(&plane, 8, dims(&plane)).unwrap();
        for block in &blocks {
            for (x, y, px) in block.pixels.enumerate_pixels() {
                let expected =
                    plane.get_pixel(block.bounds.col_start + x, block.bounds.row_start + y);
                assert_eq!(px, expected);
            }
        }
    }

    #[test]
    fn blocks_tile_plane_without_overlap() {
        let plane = numbered_plane(24, 16);
        let blocks = split(&plane, 4, dims(&plane)).unwrap();
        let mut covered = vec![0u8; 24 * 16];
        for block in &blocks {
            for row in block.bounds.row_start..block.bounds.row_end {
                for col in block.bounds.col_start..block.bounds.col_end {
                    covered[(row * 24 + col) as usize] += 1;
                }
            }
        }
        assert!(covered.iter().all(|&c| c == 1));
    }

    #[test]
    fn unaligned_rows_fail_fast() {
        let plane = numbered_plane(16, 12);
        let result = split(&plane, 8, dims(&plane));
        assert!(matches!(
            result,
            Err(PipelineError::UnalignedDimension {
                rows: 12,
                cols: 16,
                block_size: 8
            })
        ));
    }

    #[test]
    fn unaligned_cols_fail_fast() {
        let plane = numbered_plane(9, 8);
        assert!(matches!(
            split(&plane, 8, dims(&plane)),
            Err(PipelineError::UnalignedDimension { .. })
        ));
    }

    #[test]
    fn zero_block_size_is_rejected() {
        let plane = numbered_plane(8, 8);
        assert!(matches!(
            split(&plane, 0, dims(&plane)),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn write_into_places_block_at_bounds() {
        let plane = numbered_plane(16, 8);
        let blocks = split(&plane, 8, dims(&plane)).unwrap();
        let second = &blocks[1];
        let transformed = TransformedBlock {
            pixels: second.pixels.clone(),
            bounds: second.bounds,
            plane: second.plane,
        };
        let mut target = second.plane.zeros();
        transformed.write_into(&mut target);
        assert_eq!(target.get_pixel(8, 0), plane.get_pixel(8, 0));
        assert_eq!(target.get_pixel(15, 7), plane.get_pixel(15, 7));
        assert_eq!(target.get_pixel(0, 0).0[0], 0.0);
    }
}
