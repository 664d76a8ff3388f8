// SPDX-License-Identifier: GPL-3.0-only

//! Processing pipelines over whole render buffers
//!
//! # Pipeline Architecture
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────────┐     ┌──────────────┐
//! │ RenderBuffer │ ──▶ │  Tiled LWR filter     │ ──▶ │ Combined slot│
//! │ (sums, vars) │     │  - bandwidth (tile)   │     │ + bandwidth  │
//! │              │     │  - reconstruct (tile) │     │   diagnostic │
//! └──────────────┘     └───────────────────────┘     └──────────────┘
//! ```
//!
//! Tiles are processed one after another; inside a tile every pixel of a
//! stage runs in parallel. Cancellation is checked between tiles.

pub mod tiled;

pub use tiled::{FilterOutcome, FilterStats, ProgressCallback, TiledFilter, missing_passes};
