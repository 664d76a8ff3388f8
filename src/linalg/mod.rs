// SPDX-License-Identifier: GPL-3.0-only

//! Small dense linear algebra on the stack
//!
//! The filter only ever solves systems of a bounded size: 9 feature
//! dimensions, 10 unknowns for a local linear fit and 19 for the quadratic
//! pilot fit. Every matrix is therefore a fixed-capacity [`Matrix<N>`] value
//! of which only the leading `n×n` block is in use, so the per-pixel hot loop
//! never touches the heap.

mod cholesky;
mod eigen;

pub use cholesky::{cholesky, solve_cholesky};
pub use eigen::{Eigen, svd};

use std::ops::{Index, IndexMut};

/// Row-major `N×N` single precision matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix<const N: usize> {
    rows: [[f32; N]; N],
}

impl<const N: usize> Default for Matrix<N> {
    fn default() -> Self {
        Self::zeros()
    }
}

impl<const N: usize> Matrix<N> {
    /// Capacity of the matrix (the largest usable `n`)
    pub const CAPACITY: usize = N;

    pub const fn zeros() -> Self {
        Self {
            rows: [[0.0; N]; N],
        }
    }

    /// Identity on the leading `n×n` block, zero elsewhere
    pub fn identity(n: usize) -> Self {
        debug_assert!(n <= N);
        let mut m = Self::zeros();
        for i in 0..n {
            m.rows[i][i] = 1.0;
        }
        m
    }

    /// Copy the upper triangle of the leading `n×n` block onto the lower one.
    ///
    /// Accumulators only fill `row <= col` entries of symmetric matrices.
    pub fn mirror_upper(&mut self, n: usize) {
        for r in 1..n {
            for c in 0..r {
                self.rows[r][c] = self.rows[c][r];
            }
        }
    }

    /// Add `eps` to the first `n` diagonal entries
    pub fn add_diagonal(&mut self, n: usize, eps: f32) {
        for i in 0..n {
            self.rows[i][i] += eps;
        }
    }

    /// Add `weight * a[r] * a[c]` to the upper triangle of the leading block
    #[inline]
    pub fn add_outer_upper(&mut self, a: &[f32], weight: f32) {
        let n = a.len();
        for r in 0..n {
            let wr = weight * a[r];
            for c in r..n {
                self.rows[r][c] += wr * a[c];
            }
        }
    }

    pub fn row(&self, r: usize) -> &[f32; N] {
        &self.rows[r]
    }
}

impl<const N: usize> Index<(usize, usize)> for Matrix<N> {
    type Output = f32;

    #[inline]
    fn index(&self, (r, c): (usize, usize)) -> &f32 {
        &self.rows[r][c]
    }
}

impl<const N: usize> IndexMut<(usize, usize)> for Matrix<N> {
    #[inline]
    fn index_mut(&mut self, (r, c): (usize, usize)) -> &mut f32 {
        &mut self.rows[r][c]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_upper() {
        let mut m = Matrix::<3>::zeros();
        m[(0, 1)] = 2.0;
        m[(0, 2)] = 3.0;
        m[(1, 2)] = 4.0;
        m.mirror_upper(3);
        assert_eq!(m[(1, 0)], 2.0);
        assert_eq!(m[(2, 0)], 3.0);
        assert_eq!(m[(2, 1)], 4.0);
    }

    #[test]
    fn test_outer_product_only_touches_active_block() {
        let mut m = Matrix::<4>::zeros();
        m.add_outer_upper(&[1.0, 2.0], 0.5);
        assert_eq!(m[(0, 0)], 0.5);
        assert_eq!(m[(0, 1)], 1.0);
        assert_eq!(m[(1, 1)], 2.0);
        assert_eq!(m[(1, 0)], 0.0);
        assert_eq!(m[(2, 2)], 0.0);
    }
}
