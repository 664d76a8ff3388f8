// SPDX-License-Identifier: GPL-3.0-only

//! Tile-by-tile driver for the two filter stages
//!
//! Each tile runs the bandwidth stage for all of its pixels in parallel, then
//! the reconstruction stage in parallel, then writes the results back. The
//! storage records of a tile are complete before the second stage starts.

use crate::buffers::{LightPass, RenderBuffers, Tile};
use crate::config::FilterConfig;
use crate::errors::FilterError;
use crate::filter::{
    FilterContext, FilterMode, Reconstruction, StorageTile, estimate_pixel, reconstruct_pixel,
};
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Progress callback for filtering
///
/// Called with progress value (0.0 - 1.0) after every finished tile.
pub type ProgressCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Counters of a completed filter run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub tiles: usize,
    pub pixels: usize,
    /// Pixels whose estimate went negative and used the positive-weight average
    pub fallback_pixels: usize,
}

impl FilterStats {
    fn merge(&mut self, other: FilterStats) {
        self.tiles += other.tiles;
        self.pixels += other.pixels;
        self.fallback_pixels += other.fallback_pixels;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOutcome {
    Completed(FilterStats),
    /// Stopped between tiles; finished tiles stay written
    Cancelled,
}

/// Filters render buffers tile by tile
pub struct TiledFilter {
    config: FilterConfig,
    cancel: Arc<AtomicBool>,
    progress: Option<ProgressCallback>,
}

impl TiledFilter {
    pub fn new(config: FilterConfig) -> Result<Self, FilterError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            progress: None,
        })
    }

    /// Share an externally owned cancellation flag
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Run both stages over the whole image for one regression target
    pub fn filter_buffer(
        &self,
        buffers: &mut RenderBuffers,
        samples: u32,
        mode: FilterMode,
    ) -> Result<FilterOutcome, FilterError> {
        FilterContext::new(buffers, &self.config, samples, mode)?;
        self.run(buffers, samples, mode, (0.0, 1.0))
    }

    /// Filter the combined pass, then add each enabled light pass in order
    pub fn filter_lwr(
        &self,
        buffers: &mut RenderBuffers,
        samples: u32,
    ) -> Result<FilterOutcome, FilterError> {
        let modes = self.modes();
        // Validate every pass before the buffer is touched
        for mode in &modes {
            FilterContext::new(buffers, &self.config, samples, *mode)?;
        }

        let mut stats = FilterStats::default();
        let span = 1.0 / modes.len() as f32;
        for (i, mode) in modes.iter().enumerate() {
            let range = (i as f32 * span, (i + 1) as f32 * span);
            match self.run(buffers, samples, *mode, range)? {
                FilterOutcome::Completed(pass) => stats.merge(pass),
                FilterOutcome::Cancelled => return Ok(FilterOutcome::Cancelled),
            }
        }
        Ok(FilterOutcome::Completed(stats))
    }

    /// Regression targets of [`Self::filter_lwr`]
    pub fn modes(&self) -> Vec<FilterMode> {
        std::iter::once(FilterMode::Combined)
            .chain(self.config.passes.iter().map(FilterMode::Light))
            .collect()
    }

    fn report(&self, value: f32) {
        if let Some(cb) = &self.progress {
            cb(value);
        }
    }

    fn run(
        &self,
        buffers: &mut RenderBuffers,
        samples: u32,
        mode: FilterMode,
        (start, end): (f32, f32),
    ) -> Result<FilterOutcome, FilterError> {
        let total_start = std::time::Instant::now();
        let tiles = Tile::grid(buffers.width(), buffers.height(), self.config.tile_size);
        info!(
            mode = mode.name(),
            width = buffers.width(),
            height = buffers.height(),
            samples,
            tiles = tiles.len(),
            "Filtering render buffer"
        );

        let mut stats = FilterStats::default();
        for (index, tile) in tiles.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                info!(mode = mode.name(), finished = index, "Filtering cancelled");
                return Ok(FilterOutcome::Cancelled);
            }

            let outputs = {
                let ctx = FilterContext::new(buffers, &self.config, samples, mode)?;
                filter_tile(&ctx, *tile)
            };

            for (i, output) in outputs.iter().enumerate() {
                let (x, y) = tile.pixel_at(i);
                buffers.apply_reconstruction(x, y, mode, samples, output);
            }

            let fallback = outputs.iter().filter(|o| o.used_fallback).count();
            debug!(
                mode = mode.name(),
                tile = index,
                x = tile.x,
                y = tile.y,
                fallback,
                "Tile filtered"
            );
            stats.merge(FilterStats {
                tiles: 1,
                pixels: tile.len(),
                fallback_pixels: fallback,
            });

            let fraction = (index + 1) as f32 / tiles.len() as f32;
            self.report(start + (end - start) * fraction);
        }

        info!(
            mode = mode.name(),
            elapsed_ms = total_start.elapsed().as_millis(),
            fallback_pixels = stats.fallback_pixels,
            "Filtering complete"
        );
        Ok(FilterOutcome::Completed(stats))
    }
}

/// Both stages for one tile; nothing is written to the buffer
fn filter_tile(ctx: &FilterContext<'_>, tile: Tile) -> Vec<Reconstruction> {
    let records = (0..tile.len())
        .into_par_iter()
        .map(|i| {
            let (x, y) = tile.pixel_at(i);
            estimate_pixel(ctx, x, y)
        })
        .collect();
    let storage = StorageTile::new(tile, records);

    (0..tile.len())
        .into_par_iter()
        .map(|i| {
            let (x, y) = tile.pixel_at(i);
            reconstruct_pixel(ctx, &storage, x, y)
        })
        .collect()
}

/// Light passes a config enables that the buffer does not carry
pub fn missing_passes(config: &FilterConfig, buffers: &RenderBuffers) -> Vec<LightPass> {
    config
        .passes
        .iter()
        .filter(|pass| !buffers.layout().passes().contains(*pass))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffers::{LightPasses, SampleFeatures};
    use glam::Vec3;
    use std::sync::Mutex;

    fn constant_buffers(width: usize, height: usize, passes: LightPasses) -> RenderBuffers {
        let mut buffers = RenderBuffers::new(width, height, passes).unwrap();
        let mut features = SampleFeatures {
            depth: 2.0,
            normal: Vec3::Y,
            radiance: Vec3::splat(0.5),
            alpha: 1.0,
            ..Default::default()
        };
        for pass in passes.iter() {
            features = features.with_light(pass, Vec3::splat(0.25));
        }
        for y in 0..height {
            for x in 0..width {
                for s in 0..4 {
                    buffers.accumulate_sample(x, y, s, &features);
                }
            }
        }
        buffers
    }

    fn small_config() -> FilterConfig {
        FilterConfig {
            half_window: 2,
            tile_size: 4,
            ..Default::default()
        }
    }

    #[test]
    fn test_progress_reaches_one() {
        let mut buffers = constant_buffers(6, 5, LightPasses::NONE);
        let seen = Arc::new(Mutex::new(Vec::<f32>::new()));
        let sink = Arc::clone(&seen);
        let filter = TiledFilter::new(small_config())
            .unwrap()
            .with_progress(Arc::new(move |p: f32| sink.lock().unwrap().push(p)));

        let outcome = filter.filter_buffer(&mut buffers, 4, FilterMode::Combined).unwrap();
        let FilterOutcome::Completed(stats) = outcome else {
            panic!("filter was cancelled");
        };
        assert_eq!(stats.tiles, 4);
        assert_eq!(stats.pixels, 30);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 4);
        assert!((seen[3] - 1.0).abs() < 1e-6);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_cancelled_before_start_leaves_buffer_untouched() {
        let mut buffers = constant_buffers(6, 6, LightPasses::NONE);
        let before = buffers.clone();
        let filter = TiledFilter::new(small_config()).unwrap();
        filter.cancel_flag().store(true, Ordering::Relaxed);

        let outcome = filter.filter_lwr(&mut buffers, 4).unwrap();
        assert_eq!(outcome, FilterOutcome::Cancelled);
        assert_eq!(buffers.data(), before.data());
    }

    #[test]
    fn test_missing_light_pass_fails_before_writing() {
        let mut buffers = constant_buffers(4, 4, LightPasses::NONE);
        let before = buffers.clone();
        let config = FilterConfig {
            passes: [LightPass::DiffuseDirect].into_iter().collect(),
            ..small_config()
        };
        assert_eq!(missing_passes(&config, &buffers), vec![LightPass::DiffuseDirect]);

        let filter = TiledFilter::new(config).unwrap();
        assert!(matches!(
            filter.filter_lwr(&mut buffers, 4),
            Err(FilterError::PassNotInLayout(_))
        ));
        assert_eq!(buffers.data(), before.data());
    }

    #[test]
    fn test_modes_put_combined_first() {
        let config = FilterConfig {
            passes: [LightPass::TransmissionIndirect, LightPass::DiffuseDirect]
                .into_iter()
                .collect(),
            ..small_config()
        };
        let filter = TiledFilter::new(config).unwrap();
        assert_eq!(
            filter.modes(),
            vec![
                FilterMode::Combined,
                FilterMode::Light(LightPass::DiffuseDirect),
                FilterMode::Light(LightPass::TransmissionIndirect),
            ]
        );
    }
}
