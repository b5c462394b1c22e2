mod spatial_hash;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use spatial_hash::{should_pair, CellKey, CellRange, SpatialHashBroadPhase};

/// Spatial hash settings
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BroadPhaseConfig {
    /// Edge length of a grid cell
    pub cell_size: f32,
    /// Bodies covering more cells than this are tracked outside the grid
    pub max_cells_per_body: usize,
}

impl Default for BroadPhaseConfig {
    fn default() -> Self {
        Self {
            cell_size: 2.0,
            max_cells_per_body: 64,
        }
    }
}
