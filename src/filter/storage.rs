// SPDX-License-Identifier: GPL-3.0-only

//! Per-pixel results of the bandwidth stage

use super::{FeatureTransform, PixelFeatures};
use crate::buffers::Tile;
use crate::constants::FEATURE_DIMS;

/// Everything the reconstruction stage needs to know about one pixel
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StorageRecord {
    /// Pilot bandwidth per reduced dimension; only the first `rank` are used
    pub bandwidths: [f32; FEATURE_DIMS],
    pub transform: FeatureTransform,
    /// Features of the pixel itself, the origin of every regression around it
    pub center: PixelFeatures,
    /// Bandwidth scale minimizing the estimated MSE, within `[0.2, 1.0]`
    pub h_opt: f32,
}

impl StorageRecord {
    pub fn rank(&self) -> usize {
        self.transform.rank
    }
}

/// Storage records of every pixel of one tile, row-major inside the tile
#[derive(Debug, Clone)]
pub struct StorageTile {
    tile: Tile,
    records: Vec<StorageRecord>,
}

impl StorageTile {
    pub fn new(tile: Tile, records: Vec<StorageRecord>) -> Self {
        assert_eq!(records.len(), tile.len(), "one storage record per tile pixel");
        Self { tile, records }
    }

    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    /// Record of the pixel at absolute image coordinates `(x, y)`
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> &StorageRecord {
        &self.records[self.tile.index_of(x, y)]
    }

    pub fn records(&self) -> &[StorageRecord] {
        &self.records
    }
}
