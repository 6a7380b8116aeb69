//! Load-time failures.
//!
//! Everything else the core meets at runtime (missing layers, out-of-grid
//! lookups, a camera outside the built world) has a defined non-error
//! resolution and never surfaces here.

use thiserror::Error;

/// Rejected level input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LoadError {
    /// A layer row does not match the width of the first row.
    #[error("layer `{layer}` row {row} has {found} tiles, expected {expected}")]
    RaggedGrid {
        layer: String,
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("sector size must be positive, got {0}")]
    InvalidSectorSize(i32),
    #[error("layer `{layer}` tile size must be positive, got {tilesize}")]
    InvalidTileSize { layer: String, tilesize: f32 },
}

impl LoadError {
    pub(crate) fn invalid_tilesize(layer: &str, tilesize: f32) -> Self {
        Self::InvalidTileSize { layer: layer.to_owned(), tilesize }
    }
}
