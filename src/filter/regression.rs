// SPDX-License-Identifier: GPL-3.0-only

//! Kernel-weighted regression shared by both filter stages

use super::{FilterContext, PixelFeatures, Window, average};
use crate::constants::{
    FEATURE_DIMS, LINEAR_REGULARIZER, LINEAR_UNKNOWNS, MIN_POSITIVE_WEIGHT, OUTLIER_SIGMAS,
    OUTLIER_SLACK,
};
use crate::linalg::{Matrix, cholesky, solve_cholesky};
use glam::Vec3;

/// Projection from raw feature deltas into the reduced regression space.
///
/// Column `c < rank` maps the 9-D delta `[dx, dy, dD, dN, dT]` to the `c`-th
/// reduced coordinate. Normalization of each feature is folded into the rows.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FeatureTransform {
    pub matrix: Matrix<FEATURE_DIMS>,
    pub rank: usize,
}

impl FeatureTransform {
    /// Reduced coordinates of a raw delta; entries past `rank` are zero
    #[inline]
    pub fn project(&self, delta: &[f32; FEATURE_DIMS]) -> [f32; FEATURE_DIMS] {
        let mut z = [0.0; FEATURE_DIMS];
        for (col, out) in z.iter_mut().enumerate().take(self.rank) {
            *out = delta
                .iter()
                .enumerate()
                .map(|(row, d)| self.matrix[(row, col)] * d)
                .sum();
        }
        z
    }
}

/// Raw (unnormalized) feature delta of pixel `(px, py)` against the center
#[inline]
pub(crate) fn feature_delta(
    px: usize,
    py: usize,
    x: usize,
    y: usize,
    features: &PixelFeatures,
    center: &PixelFeatures,
) -> [f32; FEATURE_DIMS] {
    let n = features.normal - center.normal;
    let t = features.tangent - center.tangent;
    [
        px as f32 - x as f32,
        py as f32 - y as f32,
        features.depth - center.depth,
        n.x,
        n.y,
        n.z,
        t.x,
        t.y,
        t.z,
    ]
}

/// Product Epanechnikov kernel `Π 0.75·(1 - (z/h)²)`, zero outside the support
#[inline]
pub(crate) fn kernel_weight(z: &[f32], bandwidths: &[f32]) -> f32 {
    let mut weight = 1.0;
    for (z, h) in z.iter().zip(bandwidths) {
        let t = z / h;
        if t.abs() >= 1.0 {
            return 0.0;
        }
        weight *= 0.75 * (1.0 - t * t);
    }
    weight
}

/// One weighted observation of a local regression
#[derive(Debug, Clone, Copy)]
pub(crate) struct NeighborSample {
    pub z: [f32; FEATURE_DIMS],
    pub weight: f32,
    pub color: Vec3,
    pub variance: f32,
}

/// Estimate at the center of a local linear fit
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LocalFit {
    pub value: Vec3,
    pub variance: f32,
    /// The intercept went negative and was replaced by the positive-weight
    /// average
    pub used_fallback: bool,
}

/// Local linear regression evaluated at the window center.
///
/// `samples` is called twice: once to build the normal equations and once to
/// apply the first row of their inverse. Each neighbor contributes
/// `l = w·(u₀ + Σ z_f·u_{f+1})` to the estimate, which is then linear in the
/// observed colors. If any channel comes out negative the estimate falls back
/// to the average over neighbors with a positive `l`.
pub(crate) fn fit_local_linear<F, I>(rank: usize, samples: F) -> LocalFit
where
    F: Fn() -> I,
    I: Iterator<Item = NeighborSample>,
{
    debug_assert!(rank < LINEAR_UNKNOWNS);
    let size = rank + 1;

    let mut normal = Matrix::<LINEAR_UNKNOWNS>::zeros();
    let mut basis = [0.0f32; LINEAR_UNKNOWNS];
    basis[0] = 1.0;
    for sample in samples() {
        basis[1..size].copy_from_slice(&sample.z[..rank]);
        normal.add_outer_upper(&basis[..size], sample.weight);
    }
    normal.mirror_upper(size);
    normal.add_diagonal(size, LINEAR_REGULARIZER);

    let factor = cholesky(&normal, size);
    let mut inverse_row = [0.0f32; LINEAR_UNKNOWNS];
    inverse_row[0] = 1.0;
    solve_cholesky(&factor, &mut inverse_row[..size]);

    let mut value = Vec3::ZERO;
    let mut variance = 0.0f32;
    let mut positive_value = Vec3::ZERO;
    let mut positive_variance = 0.0f32;
    let mut positive_sum = 0.0f32;
    for sample in samples() {
        let mut l = inverse_row[0];
        for f in 0..rank {
            l += sample.z[f] * inverse_row[f + 1];
        }
        l *= sample.weight;

        let contribution = l * l * sample.variance.max(0.0);
        value += sample.color * l;
        variance += contribution;
        if l > 0.0 {
            positive_value += sample.color * l;
            positive_variance += contribution;
            positive_sum += l;
        }
    }

    let used_fallback = value.min_element() < 0.0;
    if used_fallback {
        (value, variance) = positive_estimate(positive_value, positive_variance, positive_sum);
    }

    LocalFit {
        value,
        variance,
        used_fallback,
    }
}

/// Average over the positively weighted neighbors; the weight sum is clamped
/// once and shared by value and variance
fn positive_estimate(weighted_color: Vec3, weighted_variance: f32, weight_sum: f32) -> (Vec3, f32) {
    let weight_sum = weight_sum.max(MIN_POSITIVE_WEIGHT);
    (
        weighted_color / weight_sum,
        weighted_variance / (weight_sum * weight_sum),
    )
}

/// Neighbors of one pixel as seen by a local fit at fixed bandwidths.
///
/// Neighbors whose mean color is a statistical outlier against the center
/// are dropped, as are those outside the kernel support.
pub(crate) struct Neighborhood<'a> {
    ctx: FilterContext<'a>,
    x: usize,
    y: usize,
    window: Window,
    transform: &'a FeatureTransform,
    center: PixelFeatures,
    bandwidths: &'a [f32],
    center_mean: f32,
    center_sigma: f32,
}

impl<'a> Neighborhood<'a> {
    pub fn new(
        ctx: &FilterContext<'a>,
        x: usize,
        y: usize,
        transform: &'a FeatureTransform,
        center: PixelFeatures,
        bandwidths: &'a [f32],
    ) -> Self {
        Self {
            ctx: *ctx,
            x,
            y,
            window: ctx.window(x, y),
            transform,
            center,
            bandwidths,
            center_mean: average(ctx.color(x, y)),
            center_sigma: ctx.color_variance(x, y).max(0.0).sqrt(),
        }
    }

    pub fn samples(&self) -> impl Iterator<Item = NeighborSample> + '_ {
        let rank = self.transform.rank;
        self.window.pixels().filter_map(move |(px, py)| {
            let color = self.ctx.color(px, py);
            let variance = self.ctx.color_variance(px, py);
            let limit = OUTLIER_SIGMAS * (self.center_sigma + variance.max(0.0).sqrt()) + OUTLIER_SLACK;
            if (average(color) - self.center_mean).abs() > limit {
                return None;
            }

            let delta = feature_delta(px, py, self.x, self.y, &self.ctx.features(px, py), &self.center);
            let z = self.transform.project(&delta);
            let weight = kernel_weight(&z[..rank], self.bandwidths);
            if weight <= 0.0 {
                return None;
            }

            Some(NeighborSample {
                z,
                weight: weight / variance.max(1.0),
                color,
                variance,
            })
        })
    }

    /// Local linear estimate at the center pixel
    pub fn fit(&self) -> LocalFit {
        fit_local_linear(self.transform.rank, || self.samples())
    }
}

/// Least-squares line `y = c₀ + c₁·x` accumulated in double precision
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct LineFit {
    xtx: [f64; 4],
    xty: [f64; 2],
}

impl LineFit {
    pub fn add(&mut self, x: f64, y: f64) {
        self.xtx[0] += 1.0;
        self.xtx[1] += x;
        self.xtx[2] += x;
        self.xtx[3] += x * x;
        self.xty[0] += y;
        self.xty[1] += x * y;
    }

    /// Coefficients `[c₀, c₁]`; the determinant is lightly regularized
    pub fn solve(&self) -> [f64; 2] {
        let [a, b, c, d] = self.xtx;
        let inv_det = 1.0 / (a * d - b * c + 1e-4);
        [
            inv_det * (d * self.xty[0] - b * self.xty[1]),
            inv_det * (a * self.xty[1] - c * self.xty[0]),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(z: f32, color: f32) -> NeighborSample {
        let mut coords = [0.0; FEATURE_DIMS];
        coords[0] = z;
        NeighborSample {
            z: coords,
            weight: 1.0,
            color: Vec3::splat(color),
            variance: 0.0,
        }
    }

    #[test]
    fn test_kernel_weight_support() {
        assert_eq!(kernel_weight(&[0.0, 0.0], &[1.0, 1.0]), 0.5625);
        assert_eq!(kernel_weight(&[1.0], &[1.0]), 0.0);
        assert_eq!(kernel_weight(&[0.3], &[0.2]), 0.0);
        let w = kernel_weight(&[0.1], &[0.2]);
        assert!((w - 0.75 * 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_linear_fit_recovers_intercept() {
        // color = 0.5 + 2·z sampled symmetrically around the center
        let neighbors: Vec<_> = [-0.4f32, -0.2, 0.0, 0.2, 0.4]
            .iter()
            .map(|&z| sample(z, 0.5 + 2.0 * z))
            .collect();
        let fit = fit_local_linear(1, || neighbors.iter().copied());
        assert!(!fit.used_fallback);
        assert!((fit.value.x - 0.5).abs() < 1e-3, "value = {}", fit.value);
    }

    #[test]
    fn test_negative_intercept_falls_back_to_positive_weights() {
        // The steep line extrapolates to about -0.9 at z = 0
        let neighbors: Vec<_> = [(0.2f32, 0.1f32), (0.4, 1.0), (0.6, 2.0), (0.8, 3.0)]
            .iter()
            .map(|&(z, c)| sample(z, c))
            .collect();
        let fit = fit_local_linear(1, || neighbors.iter().copied());
        assert!(fit.used_fallback);
        assert!(fit.value.min_element() >= 0.0);
        // Only the two nearest neighbors keep a positive weight
        assert!(fit.value.x > 0.1 && fit.value.x < 1.0, "value = {}", fit.value);
    }

    #[test]
    fn test_positive_estimate_clamps_tiny_weight_sums() {
        let (value, variance) = positive_estimate(Vec3::splat(2e-4), 1e-7, 0.0);
        assert!((value.x - 0.2).abs() < 1e-5, "value = {value}");
        assert!((variance - 0.1).abs() < 1e-5, "variance = {variance}");

        let (value, variance) = positive_estimate(Vec3::splat(1.0), 0.5, 2.0);
        assert_eq!(value, Vec3::splat(0.5));
        assert_eq!(variance, 0.125);
    }

    #[test]
    fn test_line_fit_solves_exact_line() {
        let mut line = LineFit::default();
        for x in [0.04, 0.16, 0.36, 0.64, 1.0] {
            line.add(x, 3.0 - 2.0 * x);
        }
        let [c0, c1] = line.solve();
        assert!((c0 - 3.0).abs() < 1e-3);
        assert!((c1 + 2.0).abs() < 1e-3);
    }
}
