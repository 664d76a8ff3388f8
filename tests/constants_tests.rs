// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use lwr_denoise::constants::*;

#[test]
fn test_system_sizes_fit_feature_dims() {
    assert_eq!(LINEAR_UNKNOWNS, FEATURE_DIMS + 1);
    assert_eq!(QUADRATIC_UNKNOWNS, 2 * FEATURE_DIMS + 1);
}

#[test]
fn test_bandwidth_bounds_are_ordered() {
    assert!(H_OPT_MIN > 0.0);
    assert!(H_OPT_MIN < H_OPT_MAX);
    // The largest candidate bandwidth is the pilot bandwidth itself
    assert!(CANDIDATE_BANDWIDTHS >= 2);
}

#[test]
fn test_regularizers_are_small() {
    assert!(LINEAR_REGULARIZER > 0.0 && LINEAR_REGULARIZER < 1e-2);
    assert!(PILOT_REGULARIZER > 0.0 && PILOT_REGULARIZER < 1e-2);
}

#[test]
fn test_version_is_set() {
    assert!(!app_info::version().is_empty());
}
