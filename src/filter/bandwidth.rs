// SPDX-License-Identifier: GPL-3.0-only

//! Bandwidth estimation (first filter stage)
//!
//! For every pixel the window around it is reduced to the feature directions
//! that actually vary more than their noise, a quadratic pilot fit measures
//! the curvature along each of them, and five local linear fits at shrinking
//! bandwidths feed a bias/variance model whose minimum is `h_opt`.

use super::regression::{FeatureTransform, LineFit, Neighborhood, feature_delta, kernel_weight};
use super::{FilterContext, PixelFeatures, StorageRecord, Window, average};
use crate::constants::{
    ALWAYS_KEPT_DIMS, CANDIDATE_BANDWIDTHS, CURVATURE_OFFSET, FEATURE_DIMS, H_OPT_MAX, H_OPT_MIN,
    MIN_FEATURE_RANGE, PILOT_REGULARIZER, QUADRATIC_UNKNOWNS,
};
use crate::linalg::{Matrix, cholesky, solve_cholesky, svd};
use glam::{DVec3, Vec3};

/// Run the bandwidth stage for pixel `(x, y)`
pub fn estimate_pixel(ctx: &FilterContext<'_>, x: usize, y: usize) -> StorageRecord {
    let transform = feature_transform(ctx, x, y);
    let center = ctx.features(x, y);
    let bandwidths = pilot_bandwidths(ctx, x, y, &transform, &center);
    let h_opt = optimal_bandwidth(ctx, x, y, &transform, &center, &bandwidths);

    StorageRecord {
        bandwidths,
        transform,
        center,
        h_opt,
    }
}

/// Feature-space rotation of the window around `(x, y)`.
///
/// The scatter of normalized `[position, depth, normal, tangent]` deltas is
/// decomposed and every direction whose singular value does not rise above
/// the accumulated feature noise is dropped. The two leading directions are
/// always kept.
pub fn feature_transform(ctx: &FilterContext<'_>, x: usize, y: usize) -> FeatureTransform {
    let window = ctx.window(x, y);
    let inv_hw = 1.0 / ctx.half_window as f32;
    let inv_s = ctx.inv_samples();

    let means = window_means(ctx, window);
    let (range_depth, range_normal, range_tangent) = window_ranges(ctx, window, &means);
    let n_depth = 1.0 / range_depth.max(MIN_FEATURE_RANGE);
    let n_normal = 1.0 / range_normal.max(MIN_FEATURE_RANGE);
    let n_tangent = 1.0 / range_tangent.max(MIN_FEATURE_RANGE);

    let mut scatter = Matrix::<FEATURE_DIMS>::zeros();
    let mut noise = 0.0f32;
    for (px, py) in window.pixels() {
        let features = ctx.features(px, py);
        let n = (features.normal - means.normal) * n_normal;
        let t = (features.tangent - means.tangent) * n_tangent;
        let delta = [
            (px as f32 - x as f32) * inv_hw,
            (py as f32 - y as f32) * inv_hw,
            (features.depth - means.depth) * n_depth,
            n.x,
            n.y,
            n.z,
            t.x,
            t.y,
            t.z,
        ];
        scatter.add_outer_upper(&delta, 1.0);

        let (var_depth, var_normal, var_tangent) = ctx.feature_variances(px, py);
        noise += n_depth * n_depth * var_depth.clamp(0.0, 1.0) * inv_s;
        noise += n_normal * n_normal * 3.0 * average(saturate(var_normal)) * inv_s;
        noise += n_tangent * n_tangent * 3.0 * average(saturate(var_tangent)) * inv_s;
    }
    scatter.mirror_upper(FEATURE_DIMS);

    let eigen = svd(&scatter, FEATURE_DIMS);
    let full_rank = eigen.rank.max(1) as f32;
    let threshold = 0.01 + 2.0 * (noise.sqrt() / (full_rank.sqrt() * 0.5));

    // Row scales take a raw delta straight into the normalized frame
    let scales = [
        inv_hw, inv_hw, n_depth, n_normal, n_normal, n_normal, n_tangent, n_tangent, n_tangent,
    ];
    let mut transform = FeatureTransform::default();
    for c in 0..FEATURE_DIMS {
        let singular = eigen.values[c].abs().sqrt();
        if singular.sqrt() > threshold || c < ALWAYS_KEPT_DIMS {
            for (r, scale) in scales.iter().enumerate() {
                transform.matrix[(r, transform.rank)] = eigen.vectors[(r, c)] * scale;
            }
            transform.rank += 1;
        }
    }
    transform
}

/// Window means, accumulated in f64 so that a flat window gives back its
/// value exactly
fn window_means(ctx: &FilterContext<'_>, window: Window) -> PixelFeatures {
    let mut depth = 0.0f64;
    let mut normal = DVec3::ZERO;
    let mut tangent = DVec3::ZERO;
    for (px, py) in window.pixels() {
        let features = ctx.features(px, py);
        depth += features.depth as f64;
        normal += features.normal.as_dvec3();
        tangent += features.tangent.as_dvec3();
    }
    let n = window.len() as f64;
    PixelFeatures {
        depth: (depth / n) as f32,
        normal: (normal / n).as_vec3(),
        tangent: (tangent / n).as_vec3(),
    }
}

/// Largest deviation from the window mean per feature group
fn window_ranges(ctx: &FilterContext<'_>, window: Window, means: &PixelFeatures) -> (f32, f32, f32) {
    let (mut depth, mut normal2, mut tangent2) = (0.0f32, 0.0f32, 0.0f32);
    for (px, py) in window.pixels() {
        let features = ctx.features(px, py);
        depth = depth.max((features.depth - means.depth).abs());
        normal2 = normal2.max((features.normal - means.normal).length_squared());
        tangent2 = tangent2.max((features.tangent - means.tangent).length_squared());
    }
    (depth, normal2.sqrt(), tangent2.sqrt())
}

fn saturate(v: Vec3) -> Vec3 {
    v.clamp(Vec3::ZERO, Vec3::ONE)
}

/// Per-dimension pilot bandwidths from a quadratic fit without cross terms.
///
/// The fit `c + Σ aᵢzᵢ + Σ qᵢzᵢ²` over the full window yields curvatures
/// `qᵢ`; strongly curved directions get a narrow bandwidth.
fn pilot_bandwidths(
    ctx: &FilterContext<'_>,
    x: usize,
    y: usize,
    transform: &FeatureTransform,
    center: &PixelFeatures,
) -> [f32; FEATURE_DIMS] {
    let rank = transform.rank;
    let size = 2 * rank + 1;
    let unit = [1.0f32; FEATURE_DIMS];

    let mut normal = Matrix::<QUADRATIC_UNKNOWNS>::zeros();
    let mut rhs = [Vec3::ZERO; QUADRATIC_UNKNOWNS];
    let mut basis = [0.0f32; QUADRATIC_UNKNOWNS];
    basis[0] = 1.0;

    for (px, py) in ctx.window(x, y).pixels() {
        let delta = feature_delta(px, py, x, y, &ctx.features(px, py), center);
        let z = transform.project(&delta);
        let mut weight = kernel_weight(&z[..rank], &unit[..rank]);
        if weight <= 0.0 {
            continue;
        }
        weight /= ctx.color_variance(px, py).max(1.0);

        for f in 0..rank {
            basis[1 + f] = z[f];
            basis[1 + rank + f] = z[f] * z[f];
        }
        normal.add_outer_upper(&basis[..size], weight);

        let color = ctx.color(px, py) * weight;
        for (b, r) in basis[..size].iter().zip(rhs.iter_mut()) {
            *r += color * *b;
        }
    }
    normal.mirror_upper(size);
    normal.add_diagonal(size, PILOT_REGULARIZER);

    let factor = cholesky(&normal, size);
    solve_cholesky(&factor, &mut rhs[..size]);

    let mut bandwidths = [0.0f32; FEATURE_DIMS];
    for (f, bandwidth) in bandwidths.iter_mut().enumerate().take(rank) {
        let curvature = average(rhs[1 + rank + f].abs());
        *bandwidth = ctx.bandwidth_factor / ((2.0 * curvature).abs() + CURVATURE_OFFSET).sqrt();
    }
    bandwidths
}

/// Fit the bias/variance model over the candidate bandwidths and minimize it.
///
/// With `h` the bandwidth scale, bias is modeled as `b₀ + b₁·h²` and the
/// variance of the estimate times the sample count as `v₀ + v₁·h^-rank`.
fn optimal_bandwidth(
    ctx: &FilterContext<'_>,
    x: usize,
    y: usize,
    transform: &FeatureTransform,
    center: &PixelFeatures,
    pilot: &[f32; FEATURE_DIMS],
) -> f32 {
    let rank = transform.rank;
    let center_color = ctx.color(x, y);
    let samples = ctx.samples as f64;

    let mut bias_model = LineFit::default();
    let mut variance_model = LineFit::default();
    for g in 0..CANDIDATE_BANDWIDTHS {
        let scale = (g + 1) as f32 / CANDIDATE_BANDWIDTHS as f32;
        let mut bandwidths = [0.0f32; FEATURE_DIMS];
        for (b, p) in bandwidths.iter_mut().zip(pilot).take(rank) {
            *b = scale * p;
        }

        let fit = Neighborhood::new(ctx, x, y, transform, *center, &bandwidths[..rank]).fit();

        let scale = scale as f64;
        let bias = average(fit.value - center_color) as f64;
        let variance = (samples * fit.variance as f64).max(0.0);
        bias_model.add(scale * scale, bias);
        variance_model.add(scale.powi(-(rank as i32)), variance);
    }

    let bias = bias_model.solve();
    let mut variance = variance_model.solve();
    if variance[1] < 0.0 {
        variance = [0.0, variance[1].abs()];
    }

    optimal_scale(rank, bias[1], variance[1], samples) as f32
}

/// Minimizer of `(b₁h²)² + v₁h^-rank / samples`, clamped to the allowed range
pub(crate) fn optimal_scale(rank: usize, bias_slope: f64, variance_slope: f64, samples: f64) -> f64 {
    let rank = rank as f64;
    let h = ((rank * variance_slope) / (4.0 * bias_slope * bias_slope * samples)).powf(1.0 / (4.0 + rank));
    if h.is_nan() {
        H_OPT_MAX
    } else {
        h.clamp(H_OPT_MIN, H_OPT_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{LightPasses, RenderBuffers, SampleFeatures};
    use crate::config::FilterConfig;
    use crate::filter::FilterMode;

    /// Noise-free scene with constant features and radiance
    fn flat_buffers(width: usize, height: usize, samples: u32) -> RenderBuffers {
        constant_buffers(width, height, samples, 4.0, Vec3::splat(0.5))
    }

    fn constant_buffers(
        width: usize,
        height: usize,
        samples: u32,
        depth: f32,
        albedo: Vec3,
    ) -> RenderBuffers {
        let mut buffers = RenderBuffers::new(width, height, LightPasses::NONE).unwrap();
        let features = SampleFeatures {
            depth,
            normal: Vec3::Z,
            tangent: albedo,
            radiance: Vec3::new(0.25, 0.5, 0.75),
            alpha: 1.0,
            ..Default::default()
        };
        for y in 0..height {
            for x in 0..width {
                for s in 0..samples {
                    buffers.accumulate_sample(x, y, s, &features);
                }
            }
        }
        buffers
    }

    #[test]
    fn test_flat_features_keep_only_position() {
        let buffers = flat_buffers(12, 12, 8);
        let config = FilterConfig {
            half_window: 4,
            ..Default::default()
        };
        let ctx = FilterContext::new(&buffers, &config, 8, FilterMode::Combined).unwrap();
        for (x, y) in [(0, 0), (5, 6), (11, 3)] {
            let record = estimate_pixel(&ctx, x, y);
            assert_eq!(record.rank(), 2, "pixel ({x}, {y})");
            assert!(record.bandwidths[..2].iter().all(|b| b.is_finite() && *b > 0.0));
        }
    }

    #[test]
    fn test_flat_features_rank_two_at_every_pixel() {
        // Values whose window sums do not divide back exactly in f32
        for (depth, albedo) in [(0.1, Vec3::new(0.3, 0.7, 0.1)), (10.0, Vec3::splat(0.5))] {
            let buffers = constant_buffers(16, 16, 4, depth, albedo);
            for half_window in 3..=8 {
                let config = FilterConfig {
                    half_window,
                    ..Default::default()
                };
                let ctx = FilterContext::new(&buffers, &config, 4, FilterMode::Combined).unwrap();
                for y in 0..16 {
                    for x in 0..16 {
                        assert_eq!(
                            feature_transform(&ctx, x, y).rank,
                            2,
                            "depth {depth}, hw {half_window}, pixel ({x}, {y})"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_depth_edge_adds_a_dimension() {
        let mut buffers = RenderBuffers::new(12, 12, LightPasses::NONE).unwrap();
        for y in 0..12 {
            for x in 0..12 {
                let features = SampleFeatures {
                    depth: if x < 6 { 1.0 } else { 3.0 },
                    normal: Vec3::Z,
                    radiance: Vec3::splat(0.5),
                    ..Default::default()
                };
                for s in 0..4 {
                    buffers.accumulate_sample(x, y, s, &features);
                }
            }
        }
        let config = FilterConfig {
            half_window: 4,
            ..Default::default()
        };
        let ctx = FilterContext::new(&buffers, &config, 4, FilterMode::Combined).unwrap();
        assert_eq!(feature_transform(&ctx, 6, 6).rank, 3);
    }

    #[test]
    fn test_h_opt_stays_in_range() {
        let buffers = flat_buffers(10, 10, 4);
        let ctx = FilterContext::new(&buffers, &FilterConfig::default(), 4, FilterMode::Combined)
            .unwrap();
        for y in 0..10 {
            for x in 0..10 {
                let h = estimate_pixel(&ctx, x, y).h_opt;
                assert!((0.2..=1.0).contains(&h), "h_opt = {h}");
            }
        }
    }

    #[test]
    fn test_optimal_scale_guards() {
        assert_eq!(optimal_scale(2, 0.0, 0.0, 16.0), H_OPT_MAX);
        assert_eq!(optimal_scale(2, 1e6, 1e-6, 16.0), H_OPT_MIN);
        assert_eq!(optimal_scale(2, 1e-6, 1e6, 16.0), H_OPT_MAX);
        let h = optimal_scale(2, 1.0, 0.5, 1.0);
        assert!((h - 0.25f64.powf(1.0 / 6.0)).abs() < 1e-12);
    }
}
