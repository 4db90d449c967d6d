//! Matcher configuration.

use crate::aggregate::{AggregatorConfig, MAX_DEDUP_DECIMALS};
use crate::image::Quality;
use crate::select::{PreselectionConfig, TileSelection, DEFAULT_MAX_TILE_PAIRS};
use crate::tiling::TilingConfig;
use crate::util::{TileMatchError, TileMatchResult};
use crate::verify::GeometricMethod;
use std::path::PathBuf;

/// Parameters of one tiled matching run.
#[derive(Clone, Debug, PartialEq)]
pub struct MatcherConfig {
    /// Tile size and overlap at working resolution.
    pub tiling: TilingConfig,
    /// How tile pairs are chosen; `None` matches the full images.
    pub tile_selection: TileSelection,
    /// Ceiling on tile pairs per image pair.
    pub max_tile_pairs: usize,
    /// Downscale size and vote threshold of `Preselection`.
    pub preselection: PreselectionConfig,
    /// Working-resolution preset.
    pub quality: Quality,
    /// Border rejection margin in working pixels.
    pub border_margin: f32,
    /// Whether duplicate image0 points are removed.
    pub select_unique: bool,
    /// Rounding precision of the dedup key.
    pub dedup_decimals: u32,
    /// Two-view model used for verification.
    pub geom_verification: GeometricMethod,
    /// Base verification threshold in native pixels.
    pub gv_threshold: f64,
    /// Verification confidence.
    pub gv_confidence: f64,
    /// Pairs with fewer inliers are discarded without writing.
    pub min_inliers_per_pair: usize,
    /// Root of the on-disk tile scratch; tiles stay in memory when unset.
    pub output_dir: Option<PathBuf>,
    /// Keep scratch tiles after the run.
    pub keep_tiles: bool,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        let aggregate = AggregatorConfig::default();
        Self {
            tiling: TilingConfig::default(),
            tile_selection: TileSelection::default(),
            max_tile_pairs: DEFAULT_MAX_TILE_PAIRS,
            preselection: PreselectionConfig::default(),
            quality: Quality::default(),
            border_margin: aggregate.border_margin,
            select_unique: true,
            dedup_decimals: aggregate.dedup_decimals.unwrap_or(1),
            geom_verification: GeometricMethod::default(),
            gv_threshold: 4.0,
            gv_confidence: 0.99999,
            min_inliers_per_pair: 15,
            output_dir: None,
            keep_tiles: false,
        }
    }
}

impl MatcherConfig {
    /// Checks value ranges.
    pub fn validate(&self) -> TileMatchResult<()> {
        if self.tile_selection != TileSelection::None {
            self.tiling.validate()?;
        }
        if !(self.gv_threshold > 0.0) {
            return Err(TileMatchError::InvalidConfig {
                reason: "gv_threshold must be positive",
            });
        }
        if !(self.gv_confidence > 0.0 && self.gv_confidence < 1.0) {
            return Err(TileMatchError::InvalidConfig {
                reason: "gv_confidence must be in (0, 1)",
            });
        }
        if !(self.border_margin >= 0.0) {
            return Err(TileMatchError::InvalidConfig {
                reason: "border_margin must be non-negative",
            });
        }
        if self.dedup_decimals > MAX_DEDUP_DECIMALS {
            return Err(TileMatchError::InvalidConfig {
                reason: "dedup_decimals must be at most 6",
            });
        }
        if self.tile_selection == TileSelection::Preselection && self.preselection.size == 0 {
            return Err(TileMatchError::InvalidConfig {
                reason: "tile_preselection_size must be > 0",
            });
        }
        Ok(())
    }

    /// Aggregation parameters derived from this configuration.
    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            border_margin: self.border_margin,
            dedup_decimals: self.select_unique.then_some(self.dedup_decimals),
        }
    }

    /// Longer tile side, used to scale the verification threshold.
    pub fn tile_size(&self) -> usize {
        self.tiling.tile_width.max(self.tiling.tile_height)
    }
}
