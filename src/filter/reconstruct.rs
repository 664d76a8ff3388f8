// SPDX-License-Identifier: GPL-3.0-only

//! Reconstruction (second filter stage)

use super::regression::Neighborhood;
use super::{FilterContext, FilterMode, StorageTile};
use crate::buffers::RenderBuffers;
use crate::constants::{FEATURE_DIMS, SMOOTHING_RADIUS};
use glam::Vec3;

/// `h_opt` after Gaussian smoothing over neighboring storage records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothedBandwidth {
    pub h: f32,
    /// Number of records that contributed; fewer near tile borders
    pub contributions: usize,
}

/// Gaussian-weighted average of `h_opt` over a 7×7 neighborhood.
///
/// Neighbors outside the storage tile are skipped and the remaining weights
/// renormalized.
pub fn smooth_bandwidth(storage: &StorageTile, x: usize, y: usize) -> SmoothedBandwidth {
    let tile = storage.tile();
    let mut h = 0.0f32;
    let mut weight_sum = 0.0f32;
    let mut contributions = 0;
    for dy in -SMOOTHING_RADIUS..=SMOOTHING_RADIUS {
        for dx in -SMOOTHING_RADIUS..=SMOOTHING_RADIUS {
            let (nx, ny) = (x as i64 + dx, y as i64 + dy);
            if !tile.contains(nx, ny) {
                continue;
            }
            let weight = (-0.5 * (dx * dx + dy * dy) as f32).exp();
            h += weight * storage.get(nx as usize, ny as usize).h_opt;
            weight_sum += weight;
            contributions += 1;
        }
    }
    SmoothedBandwidth {
        h: h / weight_sum,
        contributions,
    }
}

/// Denoised value of one pixel, ready to be written back
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reconstruction {
    /// Regression estimate scaled back to a sample sum
    pub value: Vec3,
    /// Smoothed bandwidth scale the estimate was computed with
    pub h: f32,
    pub used_fallback: bool,
}

/// Run the reconstruction stage for pixel `(x, y)`
pub fn reconstruct_pixel(
    ctx: &FilterContext<'_>,
    storage: &StorageTile,
    x: usize,
    y: usize,
) -> Reconstruction {
    let record = storage.get(x, y);
    let rank = record.rank();
    let h = smooth_bandwidth(storage, x, y).h;

    let mut bandwidths = [0.0f32; FEATURE_DIMS];
    for (b, pilot) in bandwidths.iter_mut().zip(&record.bandwidths).take(rank) {
        *b = h * pilot;
    }

    let fit = Neighborhood::new(ctx, x, y, &record.transform, record.center, &bandwidths[..rank]).fit();

    Reconstruction {
        value: fit.value * ctx.samples as f32,
        h,
        used_fallback: fit.used_fallback,
    }
}

impl RenderBuffers {
    /// Write a reconstruction into the output slots of pixel `(x, y)`.
    ///
    /// The bandwidth diagnostic always receives `h · samples`. The combined
    /// filter replaces the output color and keeps the alpha; light passes are
    /// summed into the same slot with zero alpha.
    pub fn apply_reconstruction(
        &mut self,
        x: usize,
        y: usize,
        mode: FilterMode,
        samples: u32,
        reconstruction: &Reconstruction,
    ) {
        let mut pixel = self.pixel_mut(x, y);
        pixel.set_bandwidth(reconstruction.h * samples as f32);

        let [r, g, b] = reconstruction.value.to_array();
        match mode {
            FilterMode::Combined => pixel.set_combined_rgb([r, g, b]),
            FilterMode::Light(_) => pixel.add_combined([r, g, b, 0.0]),
        }
    }
}
