// SPDX-License-Identifier: GPL-3.0-only

//! Filter-wide constants

/// Edge length of the square tiles the driver dispatches
pub const LWR_FILTER_TILE: usize = 128;

/// Number of raw feature dimensions: image x/y, depth, normal (3), tangent (3)
pub const FEATURE_DIMS: usize = 9;

/// Unknowns of the local linear fit: intercept plus one slope per kept dimension
pub const LINEAR_UNKNOWNS: usize = FEATURE_DIMS + 1;

/// Unknowns of the quadratic pilot fit: intercept, slopes and squared terms
pub const QUADRATIC_UNKNOWNS: usize = 2 * FEATURE_DIMS + 1;

/// Number of candidate bandwidth scales fitted by the bandwidth estimator
pub const CANDIDATE_BANDWIDTHS: usize = 5;

/// Bounds applied to the optimal bandwidth scale
pub const H_OPT_MIN: f64 = 0.2;
pub const H_OPT_MAX: f64 = 1.0;

/// Radius of the Gaussian used to smooth `h_opt` before reconstruction
pub const SMOOTHING_RADIUS: i64 = 3;

/// Leading eigenvectors (image position) that are never truncated
pub const ALWAYS_KEPT_DIMS: usize = 2;

/// Floor applied to the per-channel feature ranges before normalization
pub const MIN_FEATURE_RANGE: f32 = 0.01;

/// Diagonal regularizer of the quadratic pilot fit
pub const PILOT_REGULARIZER: f32 = 1e-3;

/// Diagonal regularizer of every local linear fit
pub const LINEAR_REGULARIZER: f32 = 1e-4;

/// Offset added to the pilot curvature before deriving base bandwidths
pub const CURVATURE_OFFSET: f32 = 0.16;

/// Floor of the positive weight sum in the positivity fallback
pub const MIN_POSITIVE_WEIGHT: f32 = 0.001;

/// Neighbors further than `OUTLIER_SIGMAS` standard deviations (plus
/// `OUTLIER_SLACK`) from the center color are excluded from a fit
pub const OUTLIER_SIGMAS: f32 = 3.0;
pub const OUTLIER_SLACK: f32 = 0.005;

/// Floats in the LWR feature block: depth (1+1), normal (3+3), tangent (3+3),
/// combined color (3+3)
pub const LWR_BLOCK_FLOATS: usize = 20;

/// Default window half-width in pixels
pub const DEFAULT_HALF_WINDOW: usize = 8;

/// Default global bandwidth multiplier
pub const DEFAULT_BANDWIDTH_FACTOR: f32 = 1.0;

/// Application information utilities
pub mod app_info {
    /// Get the application version from build-time environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    /// Directory name used below the platform config directory
    pub const CONFIG_DIR_NAME: &str = "lwr-denoise";
}
