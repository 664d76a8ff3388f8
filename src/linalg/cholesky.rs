// SPDX-License-Identifier: GPL-3.0-only

//! Cholesky decomposition and triangular solves

use super::Matrix;
use std::ops::{Add, Div, Mul, Sub};

/// Decompose the symmetric leading `n×n` block of `a` into lower-triangular `L`
/// with `L·Lᵗ = A`.
///
/// Only the lower triangle of `a` is read. The input must be positive
/// definite: callers add a small diagonal regularizer before every call.
/// A non-PD input produces non-finite entries instead of an error.
pub fn cholesky<const N: usize>(a: &Matrix<N>, n: usize) -> Matrix<N> {
    debug_assert!(n <= N);
    let mut l = Matrix::<N>::zeros();
    for row in 0..n {
        for col in 0..=row {
            let mut sum = a[(row, col)];
            for k in 0..col {
                sum -= l[(row, k)] * l[(col, k)];
            }
            l[(row, col)] = if row == col {
                sum.max(0.0).sqrt()
            } else {
                sum / l[(col, col)]
            };
        }
    }
    l
}

/// Solve `L·Lᵗ·x = b` in place, `rhs` holding `b` on entry and `x` on return.
///
/// Generic over the right-hand side so RGB systems are solved in one pass.
pub fn solve_cholesky<const N: usize, T>(l: &Matrix<N>, rhs: &mut [T])
where
    T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T> + Div<f32, Output = T>,
{
    let n = rhs.len();
    debug_assert!(n <= N);

    // L·y = b
    for i in 0..n {
        let mut s = rhs[i];
        for j in 0..i {
            s = s - rhs[j] * l[(i, j)];
        }
        rhs[i] = s / l[(i, i)];
    }

    // Lᵗ·x = y
    for i in (0..n).rev() {
        let mut s = rhs[i];
        for j in (i + 1)..n {
            s = s - rhs[j] * l[(j, i)];
        }
        rhs[i] = s / l[(i, i)];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    fn spd3() -> Matrix<4> {
        let mut a = Matrix::<4>::zeros();
        let values = [[4.0, 12.0, -16.0], [12.0, 37.0, -43.0], [-16.0, -43.0, 98.0]];
        for (r, row) in values.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                a[(r, c)] = *v;
            }
        }
        a
    }

    #[test]
    fn test_cholesky_known_factor() {
        let l = cholesky(&spd3(), 3);
        let expected = [[2.0, 0.0, 0.0], [6.0, 1.0, 0.0], [-8.0, 5.0, 3.0]];
        for r in 0..3 {
            for c in 0..3 {
                assert!((l[(r, c)] - expected[r][c]).abs() < 1e-4, "L[{r}][{c}]");
            }
        }
    }

    #[test]
    fn test_solve_scalar_and_rgb() {
        let a = spd3();
        let l = cholesky(&a, 3);

        let x = [1.0f32, -2.0, 0.5];
        let mut b = [0.0f32; 3];
        for r in 0..3 {
            for c in 0..3 {
                b[r] += a[(r, c)] * x[c];
            }
        }
        solve_cholesky(&l, &mut b);
        for i in 0..3 {
            assert!((b[i] - x[i]).abs() < 1e-3);
        }

        let mut rgb = [Vec3::new(4.0, 8.0, 0.0), Vec3::new(12.0, 24.0, 0.0), Vec3::new(-16.0, -32.0, 0.0)];
        solve_cholesky(&l, &mut rgb);
        // b is the first column of A, so x = e1 scaled per channel
        assert!((rgb[0] - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-3);
        assert!(rgb[1].length() < 1e-3);
        assert!(rgb[2].length() < 1e-3);
    }

    #[test]
    fn test_regularized_singular_matrix_stays_finite() {
        let mut a = Matrix::<3>::zeros();
        a[(0, 0)] = 1.0;
        a[(0, 1)] = 1.0;
        a[(1, 1)] = 1.0;
        a.mirror_upper(2);
        a.add_diagonal(2, 1e-4);
        let l = cholesky(&a, 2);
        assert!(l[(1, 1)].is_finite() && l[(1, 1)] > 0.0);
    }
}
