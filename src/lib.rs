// SPDX-License-Identifier: GPL-3.0-only

//! LWR Denoise - Feature-driven local weighted regression denoiser
//!
//! This library filters the render buffers of a path tracer. Per pixel it
//! estimates a bandwidth from auxiliary features (depth, normal, texture
//! color) and then reconstructs the radiance with a kernel-weighted local
//! linear fit in a reduced feature space.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`buffers`]: Render buffer layout, accumulation, raw files and previews
//! - [`linalg`]: Stack-allocated Cholesky and symmetric eigen solvers
//! - [`filter`]: The bandwidth and reconstruction stages for single pixels
//! - [`pipelines`]: Tiled, parallel, cancellable driver over whole buffers
//! - [`synthetic`]: Noisy scenes with known ground truth
//! - [`config`]: User configuration handling
//!
//! # Example
//!
//! ```no_run
//! use lwr_denoise::config::FilterConfig;
//! use lwr_denoise::pipelines::TiledFilter;
//! use lwr_denoise::synthetic::{SceneParams, render};
//!
//! let params = SceneParams::default();
//! let mut buffers = render(&params).unwrap();
//! let filter = TiledFilter::new(FilterConfig::default()).unwrap();
//! filter.filter_lwr(&mut buffers, params.samples).unwrap();
//! ```

pub mod buffers;
pub mod config;
pub mod constants;
pub mod errors;
pub mod filter;
pub mod linalg;
pub mod pipelines;
pub mod synthetic;

// Re-export commonly used types
pub use buffers::{LightPass, LightPasses, RenderBuffers};
pub use config::{Config, FilterConfig};
pub use errors::{AppError, AppResult, BufferError, FilterError};
pub use filter::FilterMode;
pub use pipelines::{FilterOutcome, TiledFilter};
