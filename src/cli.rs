// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands for denoising operations
//!
//! This module provides command-line functionality for:
//! - Generating synthetic noisy render buffers
//! - Filtering render buffers
//! - Inspecting render buffer files

use lwr_denoise::buffers::io::{read_raw, save_png, write_raw};
use lwr_denoise::buffers::{LightPass, LightPasses, PassKind};
use lwr_denoise::config::Config;
use lwr_denoise::pipelines::{FilterOutcome, TiledFilter, missing_passes};
use lwr_denoise::synthetic::{SceneKind, SceneParams, render};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::warn;

/// Options of the `synth` command
pub struct SynthOptions {
    pub width: usize,
    pub height: usize,
    pub samples: u32,
    pub kind: SceneKind,
    pub noise: f32,
    pub passes: Vec<LightPass>,
    pub seed: u64,
    pub output: PathBuf,
    pub preview: Option<PathBuf>,
}

/// Options of the `filter` command; `None` keeps the config value
pub struct FilterOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub png: Option<PathBuf>,
    pub bandwidth_png: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub half_window: Option<usize>,
    pub bandwidth_factor: Option<f32>,
    pub passes: Option<Vec<LightPass>>,
    pub tile_size: Option<usize>,
}

/// Generate a synthetic scene and save it as a raw buffer
pub fn synth(options: SynthOptions) -> Result<(), Box<dyn std::error::Error>> {
    let params = SceneParams {
        width: options.width,
        height: options.height,
        samples: options.samples,
        kind: options.kind,
        noise_variance: options.noise,
        passes: options.passes.into_iter().collect(),
        seed: options.seed,
    };

    println!(
        "Rendering {:?} scene {}x{} with {} samples...",
        params.kind, params.width, params.height, params.samples
    );
    let start = Instant::now();
    let buffers = render(&params)?;
    println!("Rendered in {:.2}s", start.elapsed().as_secs_f64());

    write_raw(&options.output, &buffers, params.samples)?;
    println!("Buffer saved: {}", options.output.display());

    if let Some(preview) = options.preview {
        save_png(&preview, &buffers, PassKind::Combined, params.samples)?;
        println!("Preview saved: {}", preview.display());
    }

    Ok(())
}

/// Denoise a raw buffer
pub fn filter(options: FilterOptions) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default(options.config.as_deref());
    if let Some(half_window) = options.half_window {
        config.filter.half_window = half_window;
    }
    if let Some(factor) = options.bandwidth_factor {
        config.filter.bandwidth_factor = factor;
    }
    if let Some(passes) = options.passes {
        config.filter.passes = passes.into_iter().collect();
    }
    if let Some(tile_size) = options.tile_size {
        config.filter.tile_size = tile_size;
    }
    init_thread_pool(config.threads);
    if !config.filter.passes.is_empty() {
        let names: Vec<_> = config.filter.passes.iter().map(|p| p.name()).collect();
        warn!(
            passes = %names.join(", "),
            "Light passes are added onto the combined output"
        );
    }

    let (mut buffers, samples) = read_raw(&options.input)?;
    println!(
        "Loaded {}x{} buffer with {} samples",
        buffers.width(),
        buffers.height(),
        samples
    );

    let missing = missing_passes(&config.filter, &buffers);
    if !missing.is_empty() {
        let names: Vec<_> = missing.iter().map(|p| p.name()).collect();
        return Err(format!("Buffer does not carry light passes: {}", names.join(", ")).into());
    }

    // Set up Ctrl+C handler
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let mut filter = TiledFilter::new(config.filter.clone())?.with_cancel_flag(stop_flag);
    if config.show_progress {
        filter = filter.with_progress(Arc::new(|progress: f32| {
            print!("\rFiltering: {:3.0}%", progress * 100.0);
            let _ = std::io::Write::flush(&mut std::io::stdout());
        }));
    }

    println!("Filtering... (press Ctrl+C to stop early)");
    let start = Instant::now();
    let outcome = filter.filter_lwr(&mut buffers, samples)?;
    println!();

    match outcome {
        FilterOutcome::Completed(stats) => println!(
            "Filtered {} pixels in {} tiles in {:.2}s ({} used the positive fallback)",
            stats.pixels,
            stats.tiles,
            start.elapsed().as_secs_f64(),
            stats.fallback_pixels
        ),
        FilterOutcome::Cancelled => {
            println!("Cancelled, nothing written");
            return Ok(());
        }
    }

    if let Some(output) = &options.output {
        write_raw(output, &buffers, samples)?;
        println!("Buffer saved: {}", output.display());
    }
    let png = options
        .png
        .unwrap_or_else(|| options.input.with_extension("png"));
    save_png(&png, &buffers, PassKind::Combined, samples)?;
    println!("Image saved: {}", png.display());

    if let Some(path) = &options.bandwidth_png {
        save_png(path, &buffers, PassKind::Bandwidth, samples)?;
        println!("Bandwidth map saved: {}", path.display());
    }

    Ok(())
}

/// Print the header and pass layout of a raw buffer
pub fn info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let (buffers, samples) = read_raw(input)?;
    let layout = buffers.layout();

    println!("File:        {}", input.display());
    println!("Size:        {}x{}", buffers.width(), buffers.height());
    println!("Samples:     {}", samples);
    println!("Pass stride: {} floats", layout.pass_stride);
    println!("Light passes:");
    print_passes(layout.passes());

    if let Some(combined) = buffers.pass_rect(PassKind::Combined, samples) {
        let pixels = (buffers.width() * buffers.height()) as f64;
        let mean: f64 = combined
            .chunks_exact(4)
            .map(|p| (p[0] + p[1] + p[2]) as f64 / 3.0)
            .sum::<f64>()
            / pixels;
        println!("Mean radiance: {:.4}", mean);
    }

    Ok(())
}

fn print_passes(passes: LightPasses) {
    if passes.is_empty() {
        println!("  (none)");
        return;
    }
    for pass in passes.iter() {
        println!("  {}", pass.name());
    }
}

fn init_thread_pool(threads: Option<usize>) {
    let Some(threads) = threads else {
        return;
    };
    if let Err(e) = rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
    {
        warn!(threads, error = %e, "Could not size the worker pool");
    }
}
