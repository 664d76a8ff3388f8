// SPDX-License-Identifier: GPL-3.0-only

//! Reference producer for the feature passes
//!
//! The path tracer that feeds the filter is not part of this crate, but the
//! filter depends on the exact running statistics it writes. This module
//! implements that contract so synthetic scenes and tests can fill a buffer
//! sample by sample:
//!
//! - mean slots accumulate the plain sum of all samples
//! - variance slots accumulate `(x - old/n)·(x - (old + x)/(n + 1))`, the
//!   incremental form of Welford's update, so that `var / (n - 1)` is the
//!   sample variance after `n` samples

use super::{LightPass, RenderBuffers};
use glam::Vec3;

/// Everything one camera sample contributes to a pixel
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleFeatures {
    pub depth: f32,
    pub normal: Vec3,
    /// Third feature channel (albedo / texture color in practice)
    pub tangent: Vec3,
    pub radiance: Vec3,
    pub alpha: f32,
    /// Per light-pass radiance, indexed by [`LightPass::index`]; entries for
    /// passes missing from the layout are ignored
    pub light: [Vec3; 6],
}

impl SampleFeatures {
    pub fn with_light(mut self, pass: LightPass, value: Vec3) -> Self {
        self.light[pass.index()] = value;
        self
    }
}

impl RenderBuffers {
    /// Add the `sample`-th (zero-based) sample of pixel `(x, y)`.
    ///
    /// Sample 0 overwrites whatever the slots held before.
    pub fn accumulate_sample(&mut self, x: usize, y: usize, sample: u32, features: &SampleFeatures) {
        let mut pixel = self.pixel_mut(x, y);
        let layout = pixel.layout().clone();
        let n = sample as f32;

        let [r, g, b] = features.radiance.to_array();
        for (offset, value) in [r, g, b, features.alpha].into_iter().enumerate() {
            add_pass(pixel.slot_mut(layout.combined + offset), sample, value);
        }

        write_running(&mut pixel, layout.depth_mean(), layout.depth_variance(), n, features.depth);
        write_running3(&mut pixel, layout.normal_mean(), layout.normal_variance(), n, features.normal);
        write_running3(&mut pixel, layout.tangent_mean(), layout.tangent_variance(), n, features.tangent);

        let combined = layout.combined_color();
        write_running3(&mut pixel, combined.mean, combined.variance, n, features.radiance);

        for pass in layout.passes().iter() {
            if let Some(slots) = layout.light(pass) {
                write_running3(&mut pixel, slots.mean, slots.variance, n, features.light[pass.index()]);
            }
        }
    }
}

/// Sum a value into a slot, overwriting on the first sample; returns the old sum
fn add_pass(slot: &mut f32, sample: u32, value: f32) -> f32 {
    if sample > 0 {
        let old = *slot;
        *slot += value;
        old
    } else {
        *slot = value;
        0.0
    }
}

fn write_running(pixel: &mut super::PixelMut<'_>, mean: usize, variance: usize, n: f32, value: f32) {
    let sample = n as u32;
    let old = add_pass(pixel.slot_mut(mean), sample, value);
    let delta = if sample > 0 {
        (value - old / n) * (value - (old + value) / (n + 1.0))
    } else {
        0.0
    };
    add_pass(pixel.slot_mut(variance), sample, delta);
}

fn write_running3(pixel: &mut super::PixelMut<'_>, mean: usize, variance: usize, n: f32, value: Vec3) {
    for (channel, v) in value.to_array().into_iter().enumerate() {
        write_running(pixel, mean + channel, variance + channel, n, v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::LightPasses;

    #[test]
    fn test_running_sum_and_variance() {
        let mut buffers = RenderBuffers::new(1, 1, LightPasses::NONE).unwrap();
        let values = [1.0f32, 3.0, 2.0, 6.0];
        for (i, depth) in values.iter().enumerate() {
            let features = SampleFeatures {
                depth: *depth,
                ..Default::default()
            };
            buffers.accumulate_sample(0, 0, i as u32, &features);
        }
        let pixel = buffers.pixel(0, 0);
        assert_eq!(pixel.depth_mean(), 12.0);

        // Sample variance of [1, 3, 2, 6] is 14/3
        let variance = pixel.depth_variance() / (values.len() as f32 - 1.0);
        assert!((variance - 14.0 / 3.0).abs() < 1e-5, "variance = {variance}");
    }

    #[test]
    fn test_first_sample_overwrites() {
        let mut buffers = RenderBuffers::new(1, 1, LightPasses::NONE).unwrap();
        buffers.pixel_mut(0, 0).set_combined([9.0; 4]);
        let features = SampleFeatures {
            radiance: Vec3::splat(0.5),
            alpha: 1.0,
            ..Default::default()
        };
        buffers.accumulate_sample(0, 0, 0, &features);
        assert_eq!(buffers.pixel(0, 0).combined(), [0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn test_light_passes_follow_layout() {
        let passes: LightPasses = [LightPass::GlossyDirect].into_iter().collect();
        let mut buffers = RenderBuffers::new(1, 1, passes).unwrap();
        for sample in 0..2 {
            let features = SampleFeatures::default()
                .with_light(LightPass::GlossyDirect, Vec3::new(1.0, 2.0, 3.0))
                .with_light(LightPass::DiffuseDirect, Vec3::ONE);
            buffers.accumulate_sample(0, 0, sample, &features);
        }
        let slots = buffers.layout().light(LightPass::GlossyDirect).unwrap();
        let pixel = buffers.pixel(0, 0);
        assert_eq!(pixel.color_mean(slots), Vec3::new(2.0, 4.0, 6.0));
        assert_eq!(pixel.color_variance(slots), Vec3::ZERO);
    }
}
