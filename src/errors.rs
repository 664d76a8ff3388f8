// SPDX-License-Identifier: MPL-2.0

//! Error types for the denoiser
//!
//! Numerical trouble inside the filter never surfaces here: degenerate
//! windows are handled by rank truncation, regularization and the positivity
//! fallback. These errors cover invalid invocations and buffer I/O.

use std::fmt;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main error type
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Invalid filter invocation
    Filter(FilterError),
    /// Render buffer construction or file errors
    Buffer(BufferError),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
}

/// Invalid filter parameters
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    /// A filter call needs at least one accumulated sample
    ZeroSamples,
    /// Window half-width must be at least one pixel
    InvalidHalfWindow(usize),
    /// Bandwidth factor must be finite and positive
    InvalidBandwidthFactor(f32),
    /// Tile edge length must be at least one pixel
    InvalidTileSize(usize),
    /// A light pass was requested that the buffer layout does not carry
    PassNotInLayout(String),
}

/// Render buffer errors
#[derive(Debug, Clone, PartialEq)]
pub enum BufferError {
    /// Width or height is zero
    InvalidDimensions { width: usize, height: usize },
    /// Data length does not match `width * height * pass_stride`
    SizeMismatch { expected: usize, actual: usize },
    /// Stored pass stride disagrees with the stride derived from the pass bitmask
    StrideMismatch { expected: usize, actual: usize },
    /// File does not start with the raw buffer magic
    BadMagic,
    /// File was written by an incompatible version
    UnsupportedVersion(u32),
    /// Stored light-pass mask has bits that name no pass
    UnknownPasses(u32),
    /// File ended before the payload was complete
    Truncated,
    /// Image encoding failed
    Image(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Filter(e) => write!(f, "Filter error: {}", e),
            AppError::Buffer(e) => write!(f, "Buffer error: {}", e),
            AppError::Config(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::ZeroSamples => write!(f, "No samples accumulated"),
            FilterError::InvalidHalfWindow(hw) => write!(f, "Invalid half window: {}", hw),
            FilterError::InvalidBandwidthFactor(b) => {
                write!(f, "Invalid bandwidth factor: {}", b)
            }
            FilterError::InvalidTileSize(size) => write!(f, "Invalid tile size: {}", size),
            FilterError::PassNotInLayout(pass) => {
                write!(f, "Pass {} is not present in the buffer layout", pass)
            }
        }
    }
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::InvalidDimensions { width, height } => {
                write!(f, "Invalid dimensions: {}x{}", width, height)
            }
            BufferError::SizeMismatch { expected, actual } => {
                write!(f, "Expected {} floats, got {}", expected, actual)
            }
            BufferError::StrideMismatch { expected, actual } => {
                write!(f, "Pass stride {} does not match layout stride {}", actual, expected)
            }
            BufferError::BadMagic => write!(f, "Not a render buffer file"),
            BufferError::UnsupportedVersion(v) => write!(f, "Unsupported file version: {}", v),
            BufferError::UnknownPasses(bits) => write!(f, "Unknown light pass mask: {:#x}", bits),
            BufferError::Truncated => write!(f, "File is truncated"),
            BufferError::Image(msg) => write!(f, "Image encoding failed: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for FilterError {}
impl std::error::Error for BufferError {}

impl From<FilterError> for AppError {
    fn from(err: FilterError) -> Self {
        AppError::Filter(err)
    }
}

impl From<BufferError> for AppError {
    fn from(err: BufferError) -> Self {
        AppError::Buffer(err)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Buffer(BufferError::Image(err.to_string()))
    }
}
