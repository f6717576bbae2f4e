//! 8x8 two-dimensional discrete cosine transform.
//!
//! Coefficients use the orthonormal JPEG scaling:
//!
//! ```text
//! F(u,v) = 1/4 C(u) C(v) sum_x sum_y f(x,y) cos((2x+1)u pi/16) cos((2y+1)v pi/16)
//! ```
//!
//! with `C(0) = 1/sqrt(2)` and `C(k) = 1` otherwise, so a flat block of
//! value `a` has DC coefficient `8a` and every AC coefficient zero. Both
//! directions run the 1-D `rustdct` plans over rows, then columns.

use std::f32::consts::FRAC_1_SQRT_2;
use std::sync::{Arc, OnceLock};

use rustdct::{Dct2, Dct3, DctPlanner, TransformType2And3};

/// Side length of a transform block.
pub const BLOCK_SIZE: u32 = 8;

/// Coefficients (or samples) in one block.
pub const BLOCK_LEN: usize = 64;

const N: usize = 8;

/// Cached 8-point DCT-II/DCT-III plan.
fn dct8() -> &'static Arc<dyn TransformType2And3<f32>> {
    static DCT8: OnceLock<Arc<dyn TransformType2And3<f32>>> = OnceLock::new();
    DCT8.get_or_init(|| {
        let mut planner = DctPlanner::new();
        planner.plan_dct2(N)
    })
}

/// `C(k)` normalization factor.
#[inline]
fn c(k: usize) -> f32 {
    if k == 0 { FRAC_1_SQRT_2 } else { 1.0 }
}

/// Apply `pass` to every row of `data`, writing the results transposed.
///
/// Running this twice processes rows and then columns and leaves the
/// block back in row-major order.
fn transposed_pass(data: &[f32; BLOCK_LEN], pass: impl Fn(&mut [f32])) -> [f32; BLOCK_LEN] {
    let mut out = [0.0f32; BLOCK_LEN];
    let mut line = [0.0f32; N];
    for row in 0..N {
        line.copy_from_slice(&data[row * N..(row + 1) * N]);
        pass(&mut line);
        for (col, value) in line.iter().enumerate() {
            out[col * N + row] = *value;
        }
    }
    out
}

/// Forward 2-D DCT of a row-major 8x8 block.
#[must_use]
pub fn forward(block: &[f32; BLOCK_LEN]) -> [f32; BLOCK_LEN] {
    let plan = dct8();
    let rows = transposed_pass(block, |line| plan.process_dct2(line));
    let mut coeffs = transposed_pass(&rows, |line| plan.process_dct2(line));

    for v in 0..N {
        for u in 0..N {
            coeffs[v * N + u] *= 0.25 * c(u) * c(v);
        }
    }
    coeffs
}

/// Inverse 2-D DCT of a row-major 8x8 coefficient block.
#[must_use]
pub fn inverse(coeffs: &[f32; BLOCK_LEN]) -> [f32; BLOCK_LEN] {
    let plan = dct8();

    // rustdct's DCT-III halves the first input, so pre-scaling by
    // 1/C(k) turns it into the JPEG inverse up to a constant.
    let mut scaled = *coeffs;
    for v in 0..N {
        for u in 0..N {
            scaled[v * N + u] /= c(u) * c(v);
        }
    }

    let rows = transposed_pass(&scaled, |line| plan.process_dct3(line));
    let mut samples = transposed_pass(&rows, |line| plan.process_dct3(line));
    for sample in &mut samples {
        *sample *= 0.25;
    }
    samples
}
