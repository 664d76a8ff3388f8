// SPDX-License-Identifier: GPL-3.0-only

//! Symmetric eigen-decomposition (cyclic Jacobi)
//!
//! Every matrix decomposed by the filter is a Gram ("scatter") matrix, so its
//! singular value decomposition is its eigen-decomposition. Jacobi rotations
//! keep the eigenvectors orthonormal even when most eigenvalues are zero,
//! which is the common case for windows with flat auxiliary features.

use super::Matrix;

/// Upper bound on Jacobi sweeps; 9×9 inputs converge in well under ten
const MAX_SWEEPS: usize = 32;

/// Eigenvalues below this fraction of the largest one count as zero
const RANK_EPSILON: f32 = 1e-6;

/// Result of [`svd`]
#[derive(Debug, Clone, Copy)]
pub struct Eigen<const N: usize> {
    /// Eigenvalues sorted in descending order
    pub values: [f32; N],
    /// Eigenvectors stored as columns: `vectors[(row, k)]` is component `row`
    /// of the `k`-th eigenvector
    pub vectors: Matrix<N>,
    /// Number of eigenvalues that are numerically non-zero
    pub rank: usize,
}

/// Decompose the symmetric leading `n×n` block of `a`.
///
/// Both triangles of `a` must be filled.
pub fn svd<const N: usize>(a: &Matrix<N>, n: usize) -> Eigen<N> {
    debug_assert!(n <= N);
    let mut m = *a;
    let mut v = Matrix::<N>::identity(n);

    let scale = (0..n).map(|i| m[(i, i)].abs()).fold(0.0f32, f32::max);
    let tolerance = (scale * 1e-6).powi(2).max(f32::MIN_POSITIVE);

    for _ in 0..MAX_SWEEPS {
        let mut off_diagonal = 0.0f32;
        for p in 0..n {
            for q in (p + 1)..n {
                off_diagonal += m[(p, q)] * m[(p, q)];
            }
        }
        if off_diagonal <= tolerance {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                let apq = m[(p, q)];
                if apq == 0.0 {
                    continue;
                }
                let theta = (m[(q, q)] - m[(p, p)]) / (2.0 * apq);
                let t = if theta.abs() > 1e15 {
                    0.5 / theta
                } else {
                    theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt())
                };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;
                rotate(&mut m, &mut v, n, p, q, c, s);
            }
        }
    }

    // Selection sort by descending eigenvalue, carrying the vector columns along
    let mut values = [0.0f32; N];
    for (i, value) in values.iter_mut().enumerate().take(n) {
        *value = m[(i, i)];
    }
    for i in 0..n {
        let mut best = i;
        for j in (i + 1)..n {
            if values[j] > values[best] {
                best = j;
            }
        }
        if best != i {
            values.swap(i, best);
            for r in 0..n {
                let tmp = v[(r, i)];
                v[(r, i)] = v[(r, best)];
                v[(r, best)] = tmp;
            }
        }
    }

    let largest = values.first().copied().unwrap_or(0.0).max(0.0);
    let cutoff = (largest * RANK_EPSILON).max(1e-12);
    let rank = values.iter().take(n).filter(|&&value| value > cutoff).count();

    Eigen {
        values,
        vectors: v,
        rank,
    }
}

/// Apply the rotation `Jᵗ·M·J` to `m` and accumulate `V·J` into `v`
fn rotate<const N: usize>(
    m: &mut Matrix<N>,
    v: &mut Matrix<N>,
    n: usize,
    p: usize,
    q: usize,
    c: f32,
    s: f32,
) {
    for k in 0..n {
        let mkp = m[(k, p)];
        let mkq = m[(k, q)];
        m[(k, p)] = c * mkp - s * mkq;
        m[(k, q)] = s * mkp + c * mkq;
    }
    for k in 0..n {
        let mpk = m[(p, k)];
        let mqk = m[(q, k)];
        m[(p, k)] = c * mpk - s * mqk;
        m[(q, k)] = s * mpk + c * mqk;
    }
    for k in 0..n {
        let vkp = v[(k, p)];
        let vkq = v[(k, q)];
        v[(k, p)] = c * vkp - s * vkq;
        v[(k, q)] = s * vkp + c * vkq;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct<const N: usize>(e: &Eigen<N>, n: usize, r: usize, c: usize) -> f32 {
        (0..n)
            .map(|k| e.vectors[(r, k)] * e.values[k] * e.vectors[(c, k)])
            .sum()
    }

    #[test]
    fn test_diagonal_matrix_sorted() {
        let mut a = Matrix::<4>::zeros();
        a[(0, 0)] = 1.0;
        a[(1, 1)] = 5.0;
        a[(2, 2)] = 3.0;
        let e = svd(&a, 3);
        assert_eq!(e.values[..3], [5.0, 3.0, 1.0]);
        assert_eq!(e.rank, 3);
        // Largest eigenvector is the second basis vector
        assert!((e.vectors[(1, 0)].abs() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reconstructs_symmetric_matrix() {
        let mut a = Matrix::<9>::zeros();
        let values = [[2.0, -1.0, 0.5], [-1.0, 3.0, 0.25], [0.5, 0.25, 1.0]];
        for r in 0..3 {
            for c in 0..3 {
                a[(r, c)] = values[r][c];
            }
        }
        let e = svd(&a, 3);
        for r in 0..3 {
            for c in 0..3 {
                assert!((reconstruct(&e, 3, r, c) - a[(r, c)]).abs() < 1e-4);
            }
        }
        for k in 0..3 {
            let norm: f32 = (0..3).map(|r| e.vectors[(r, k)].powi(2)).sum();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_rank_deficient_scatter() {
        // Outer product of a single vector has rank one
        let d = [1.0f32, 2.0, 0.0, -1.0];
        let mut a = Matrix::<9>::zeros();
        a.add_outer_upper(&d, 1.0);
        a.mirror_upper(4);
        let e = svd(&a, 9);
        assert_eq!(e.rank, 1);
        assert!((e.values[0] - 6.0).abs() < 1e-4);
    }

    #[test]
    fn test_zero_matrix_has_rank_zero() {
        let e = svd(&Matrix::<9>::zeros(), 9);
        assert_eq!(e.rank, 0);
    }
}
