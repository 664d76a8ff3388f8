// SPDX-License-Identifier: GPL-3.0-only

use crate::buffers::LightPasses;
use crate::constants::{DEFAULT_BANDWIDTH_FACTOR, DEFAULT_HALF_WINDOW, LWR_FILTER_TILE, app_info};
use crate::errors::{AppError, AppResult, FilterError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Parameters of one filter run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Regression window half-width in pixels
    pub half_window: usize,
    /// Scale applied to the pilot bandwidths
    pub bandwidth_factor: f32,
    /// Light passes filtered after the combined pass
    pub passes: LightPasses,
    /// Edge length of a filter tile
    pub tile_size: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            half_window: DEFAULT_HALF_WINDOW,
            bandwidth_factor: DEFAULT_BANDWIDTH_FACTOR,
            passes: LightPasses::NONE,
            tile_size: LWR_FILTER_TILE,
        }
    }
}

impl FilterConfig {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.half_window == 0 {
            return Err(FilterError::InvalidHalfWindow(self.half_window));
        }
        if !self.bandwidth_factor.is_finite() || self.bandwidth_factor <= 0.0 {
            return Err(FilterError::InvalidBandwidthFactor(self.bandwidth_factor));
        }
        if self.tile_size == 0 {
            return Err(FilterError::InvalidTileSize(self.tile_size));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Config format version
    pub version: u32,
    pub filter: FilterConfig,
    /// Worker threads for the filter stages (None = one per core)
    pub threads: Option<usize>,
    /// Print per-tile progress on the command line
    pub show_progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            filter: FilterConfig::default(),
            threads: None,
            show_progress: true,
        }
    }
}

impl Config {
    /// `<config dir>/lwr-denoise/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app_info::CONFIG_DIR_NAME).join("config.json"))
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.filter.validate()?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, text)?;
        debug!(path = %path.display(), "Saved config");
        Ok(())
    }

    /// Load from `path` (or the default location); a missing file yields the
    /// defaults, a broken one is reported and replaced by the defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => return Self::default(),
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring invalid config");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_bad_parameters() {
        let config = FilterConfig {
            half_window: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(FilterError::InvalidHalfWindow(0)));

        let config = FilterConfig {
            bandwidth_factor: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(FilterError::InvalidBandwidthFactor(_))
        ));

        let config = FilterConfig {
            tile_size: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(FilterError::InvalidTileSize(0)));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"filter": {"half_window": 5}}"#).unwrap();
        assert_eq!(config.filter.half_window, 5);
        assert_eq!(config.filter.tile_size, LWR_FILTER_TILE);
        assert!(config.show_progress);
    }
}
