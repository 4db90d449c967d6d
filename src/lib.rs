//! Tilematch orchestrates dense correspondence matching between large images.
//!
//! Images are brought to a working resolution, cut into overlapping tiles,
//! and the selected tile pairs are matched one at a time by a dense backend.
//! Tile-local correspondences are stitched into full-image coordinates,
//! border artifacts and duplicates are removed, and the result is filtered
//! by a robust two-view model before being written to a feature store.
//!
//! Every external collaborator sits behind a trait (`WarpPredictor`,
//! `SparseMatcher`, `CoarseMatcher`, `GeometricVerifier`, `FeatureStore`)
//! with a CPU reference implementation. The `rayon` feature parallelizes
//! RANSAC scoring, `image-io` adds file loading and on-disk tile scratch, and
//! `tracing` emits spans and events for every stage.

pub mod aggregate;
pub mod correspondence;
pub mod engine;
pub mod image;
pub mod pipeline;
pub mod select;
pub mod store;
pub mod tiling;
mod trace;
pub mod util;
pub mod verify;

#[cfg(feature = "image-io")]
pub use image::io;
pub use image::{ImageView, OwnedImage, Quality};

pub use aggregate::{AggregatorConfig, ImageFrame, MatchAggregator, MAX_DEDUP_DECIMALS};
pub use correspondence::{Correspondences, Point2};
pub use engine::{
    DenseWarp, Device, MatchBackend, MatchContext, MatchUnit, SampledMatches, SparseMatcher,
    WarpPredictor, WarpSampling, ZnccPredictorConfig, ZnccWarpPredictor,
};
pub use pipeline::{MatchStage, MatchStats, MatcherConfig, PairInput, TiledMatcher};
pub use select::{
    CoarseMatcher, PreselectionConfig, TilePair, TilePairSelector, TileSelection,
    WarpCoarseMatcher, ZnccCoarseMatcher,
};
pub use store::{FeatureStore, JsonFeatureStore, MatchIndexArray, MemoryFeatureStore};
pub use tiling::{Tile, TileGrid, Tiler, TilingConfig};
pub use util::{TileMatchError, TileMatchResult};
pub use verify::{
    GeometricMethod, GeometricModel, GeometricVerifier, RansacConfig, RansacVerifier,
    Verification,
};
