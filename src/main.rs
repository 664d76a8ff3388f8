// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use lwr_denoise::buffers::LightPass;
use lwr_denoise::synthetic::SceneKind;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "lwr-denoise")]
#[command(about = "Feature-driven local weighted regression denoiser for render buffers")]
#[command(version = lwr_denoise::constants::app_info::version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic noisy render buffer
    Synth {
        #[arg(long, default_value = "64")]
        width: usize,

        #[arg(long, default_value = "64")]
        height: usize,

        /// Samples accumulated per pixel
        #[arg(short, long, default_value = "16")]
        samples: u32,

        #[arg(short, long, value_enum, default_value = "split")]
        kind: SceneKind,

        /// Per-sample radiance noise variance
        #[arg(short, long, default_value = "0.01")]
        noise: f32,

        /// Light passes to fill (comma separated)
        #[arg(long, value_enum, value_delimiter = ',')]
        passes: Vec<LightPass>,

        #[arg(long, default_value = "0")]
        seed: u64,

        /// Output raw buffer path
        #[arg(short, long)]
        output: PathBuf,

        /// Also save the noisy combined pass as PNG
        #[arg(long)]
        preview: Option<PathBuf>,
    },

    /// Denoise a raw render buffer
    Filter {
        /// Input raw buffer
        input: PathBuf,

        /// Write the filtered buffer as raw
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output image path (default: input path with .png extension)
        #[arg(long)]
        png: Option<PathBuf>,

        /// Save the bandwidth diagnostic as PNG
        #[arg(long)]
        bandwidth_png: Option<PathBuf>,

        /// Config file (default: user config directory)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Regression window half-width in pixels
        #[arg(long)]
        half_window: Option<usize>,

        /// Scale applied to the pilot bandwidths
        #[arg(long)]
        bandwidth_factor: Option<f32>,

        /// Light passes to filter after the combined pass (comma separated).
        /// Each filtered pass is added onto the combined output.
        #[arg(long, value_enum, value_delimiter = ',')]
        passes: Option<Vec<LightPass>>,

        #[arg(long)]
        tile_size: Option<usize>,
    },

    /// Show the header of a raw render buffer
    Info {
        input: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=lwr_denoise=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Synth {
            width,
            height,
            samples,
            kind,
            noise,
            passes,
            seed,
            output,
            preview,
        } => cli::synth(cli::SynthOptions {
            width,
            height,
            samples,
            kind,
            noise,
            passes,
            seed,
            output,
            preview,
        }),
        Commands::Filter {
            input,
            output,
            png,
            bandwidth_png,
            config,
            half_window,
            bandwidth_factor,
            passes,
            tile_size,
        } => cli::filter(cli::FilterOptions {
            input,
            output,
            png,
            bandwidth_png,
            config,
            half_window,
            bandwidth_factor,
            passes,
            tile_size,
        }),
        Commands::Info { input } => cli::info(&input),
    }
}
