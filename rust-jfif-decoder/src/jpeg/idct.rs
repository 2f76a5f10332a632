use std::{f32::consts::PI, sync::LazyLock};

use super::quantization::{BLOCK_SIDE, BLOCK_SIZE};

/// Level shift applied after the transform to get unsigned samples
const LEVEL_SHIFT: f32 = 128.0;

/// `BASIS[n][k] = C(k) * cos((2n + 1) * k * PI / 16)` with `C(0) = 1 / sqrt(2)`, else 1.
static BASIS: LazyLock<[[f32; BLOCK_SIDE]; BLOCK_SIDE]> = LazyLock::new(|| {
    let mut basis = [[0f32; BLOCK_SIDE]; BLOCK_SIDE];
    for (n, row) in basis.iter_mut().enumerate() {
        for (k, value) in row.iter_mut().enumerate() {
            let scale = if k == 0 { 1f32 / f32::sqrt(2.0) } else { 1f32 };
            *value = scale * f32::cos((2.0 * n as f32 + 1.0) * k as f32 * PI / 16.0);
        }
    }
    basis
});

/// Inverse DCT of a dequantized block in natural order. The result is level shifted but not
/// clipped.
///
/// <https://www.w3.org/Graphics/JPEG/itu-t81.pdf> A.3.3, evaluated one axis at a time.
pub fn inverse_dct(coefficients: &[i32; BLOCK_SIZE]) -> [f32; BLOCK_SIZE] {
    let basis = &*BASIS;

    // Horizontal pass: row v of frequencies into row v of spatial columns
    let mut rows = [0f32; BLOCK_SIZE];
    for v in 0..BLOCK_SIDE {
        for x in 0..BLOCK_SIDE {
            let mut sum = 0f32;
            for u in 0..BLOCK_SIDE {
                sum += basis[x][u] * coefficients[v * BLOCK_SIDE + u] as f32;
            }
            rows[v * BLOCK_SIDE + x] = sum;
        }
    }

    let mut pixels = [0f32; BLOCK_SIZE];
    for y in 0..BLOCK_SIDE {
        for x in 0..BLOCK_SIDE {
            let mut sum = 0f32;
            for v in 0..BLOCK_SIDE {
                sum += basis[y][v] * rows[v * BLOCK_SIDE + x];
            }
            pixels[y * BLOCK_SIDE + x] = sum / 4.0 + LEVEL_SHIFT;
        }
    }
    pixels
}
