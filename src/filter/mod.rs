// SPDX-License-Identifier: GPL-3.0-only

//! Feature-driven local weighted regression filter
//!
//! The filter runs in two stages per tile:
//!
//! ```text
//! Stage 1 (bandwidth)    window statistics → feature-space rotation (svd)
//!                        → pilot fit → 5 candidate fits → h_opt
//!        │ StorageRecord per pixel
//!        ▼
//! Stage 2 (reconstruct)  smooth h_opt inside the tile → one local linear fit
//!                        → write the denoised color
//! ```
//!
//! Both stages read the same render buffer through a [`FilterContext`], which
//! carries everything a kernel needs: the buffer, the regression target of the
//! current [`FilterMode`], the sample count and the window parameters.

pub mod bandwidth;
pub mod reconstruct;
pub(crate) mod regression;
pub mod storage;
pub mod window;

pub use bandwidth::{estimate_pixel, feature_transform};
pub use reconstruct::{Reconstruction, SmoothedBandwidth, reconstruct_pixel, smooth_bandwidth};
pub use regression::FeatureTransform;
pub use storage::{StorageRecord, StorageTile};
pub use window::Window;

use crate::buffers::{ColorSlots, LightPass, PassLayout, RenderBuffers};
use crate::config::FilterConfig;
use crate::errors::FilterError;
use glam::Vec3;

/// Which color pass is the regression target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Combined radiance; the result replaces the output slot
    Combined,
    /// A single light pass; the result is added to the output slot
    Light(LightPass),
}

impl FilterMode {
    pub fn name(self) -> &'static str {
        match self {
            FilterMode::Combined => "combined",
            FilterMode::Light(pass) => pass.name(),
        }
    }

    /// Mean/variance slots of the regression target, if the layout has them
    pub fn color_slots(self, layout: &PassLayout) -> Option<ColorSlots> {
        match self {
            FilterMode::Combined => Some(layout.combined_color()),
            FilterMode::Light(pass) => layout.light(pass),
        }
    }
}

/// Auxiliary features of one pixel, already divided by the sample count
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PixelFeatures {
    pub depth: f32,
    pub normal: Vec3,
    pub tangent: Vec3,
}

/// Per-invocation view of the buffer shared by both stages
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    pub buffers: &'a RenderBuffers,
    pub mode: FilterMode,
    pub samples: u32,
    pub half_window: usize,
    pub bandwidth_factor: f32,
    color: ColorSlots,
    inv_s: f32,
    inv_sv: f32,
}

impl<'a> FilterContext<'a> {
    pub fn new(
        buffers: &'a RenderBuffers,
        config: &FilterConfig,
        samples: u32,
        mode: FilterMode,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        if samples == 0 {
            return Err(FilterError::ZeroSamples);
        }
        let color = mode
            .color_slots(buffers.layout())
            .ok_or_else(|| FilterError::PassNotInLayout(mode.name().to_string()))?;

        Ok(Self {
            buffers,
            mode,
            samples,
            half_window: config.half_window,
            bandwidth_factor: config.bandwidth_factor,
            color,
            inv_s: 1.0 / samples as f32,
            // A single sample carries no variance information
            inv_sv: if samples > 1 {
                1.0 / (samples - 1) as f32
            } else {
                0.0
            },
        })
    }

    /// Regression window around `(x, y)`, clamped to the image
    pub fn window(&self, x: usize, y: usize) -> Window {
        Window::around(
            x,
            y,
            self.half_window,
            self.buffers.width(),
            self.buffers.height(),
        )
    }

    pub fn inv_samples(&self) -> f32 {
        self.inv_s
    }

    #[inline]
    pub fn features(&self, x: usize, y: usize) -> PixelFeatures {
        let pixel = self.buffers.pixel(x, y);
        PixelFeatures {
            depth: pixel.depth_mean() * self.inv_s,
            normal: pixel.normal_mean() * self.inv_s,
            tangent: pixel.tangent_mean() * self.inv_s,
        }
    }

    /// Sample variances of depth, normal and tangent (not yet divided by the
    /// sample count)
    #[inline]
    pub fn feature_variances(&self, x: usize, y: usize) -> (f32, Vec3, Vec3) {
        let pixel = self.buffers.pixel(x, y);
        (
            pixel.depth_variance() * self.inv_sv,
            pixel.normal_variance() * self.inv_sv,
            pixel.tangent_variance() * self.inv_sv,
        )
    }

    /// Per-sample mean of the regression target
    #[inline]
    pub fn color(&self, x: usize, y: usize) -> Vec3 {
        self.buffers.pixel(x, y).color_mean(self.color) * self.inv_s
    }

    /// Channel-averaged variance of the mean of the regression target
    #[inline]
    pub fn color_variance(&self, x: usize, y: usize) -> f32 {
        average(self.buffers.pixel(x, y).color_variance(self.color)) * self.inv_s * self.inv_sv
    }
}

#[inline]
pub(crate) fn average(v: Vec3) -> f32 {
    v.element_sum() / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::LightPasses;

    #[test]
    fn test_context_rejects_zero_samples() {
        let buffers = RenderBuffers::new(4, 4, LightPasses::NONE).unwrap();
        let result = FilterContext::new(&buffers, &FilterConfig::default(), 0, FilterMode::Combined);
        assert!(matches!(result, Err(FilterError::ZeroSamples)));
    }

    #[test]
    fn test_context_rejects_missing_light_pass() {
        let buffers = RenderBuffers::new(4, 4, LightPasses::NONE).unwrap();
        let mode = FilterMode::Light(LightPass::GlossyDirect);
        let result = FilterContext::new(&buffers, &FilterConfig::default(), 4, mode);
        assert!(matches!(result, Err(FilterError::PassNotInLayout(_))));
    }

    #[test]
    fn test_single_sample_disables_variance() {
        let mut buffers = RenderBuffers::new(1, 1, LightPasses::NONE).unwrap();
        let variance = buffers.layout().combined_color().variance;
        *buffers.pixel_mut(0, 0).slot_mut(variance) = 5.0;
        let ctx = FilterContext::new(&buffers, &FilterConfig::default(), 1, FilterMode::Combined)
            .unwrap();
        assert_eq!(ctx.color_variance(0, 0), 0.0);
    }
}
