//! Tile-pair selection and the tile-pair budget.
//!
//! `Exhaustive` pairs every tile of image0 with every tile of image1.
//! `Preselection` runs a cheap coarse matcher on downscaled copies of both
//! images and keeps the tile pairs that enough coarse correspondences fall
//! into. Either way the result must fit under `max_tile_pairs`; exceeding it
//! is an error raised before any dense prediction.

use crate::correspondence::Correspondences;
use crate::engine::{MatchUnit, WarpPredictor, ZnccWarpPredictor};
use crate::image::{resize_bilinear, ImageView};
use crate::tiling::TileGrid;
use crate::trace::{trace_event, trace_span};
use crate::util::{TileMatchError, TileMatchResult};
use std::collections::BTreeMap;

/// Default ceiling on tile pairs per image pair.
pub const DEFAULT_MAX_TILE_PAIRS: usize = 50;

/// How tile pairs are chosen.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TileSelection {
    /// No tiling: the full images are matched as one unit.
    None,
    /// Every tile of image0 against every tile of image1.
    Exhaustive,
    /// Tile pairs proposed by a coarse matcher.
    #[default]
    Preselection,
}

/// Ordered `(tile index in image0, tile index in image1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TilePair {
    pub tile0: usize,
    pub tile1: usize,
}

impl TilePair {
    /// Creates a pair.
    pub const fn new(tile0: usize, tile1: usize) -> Self {
        Self { tile0, tile1 }
    }
}

/// Cheap matcher used only to propose tile pairs.
pub trait CoarseMatcher {
    /// Correspondences between two (downscaled) images in their pixel frames.
    fn coarse_matches(
        &mut self,
        a: ImageView<'_, u8>,
        b: ImageView<'_, u8>,
    ) -> TileMatchResult<Correspondences>;
}

/// Adapts any warp predictor into a coarse matcher.
pub struct WarpCoarseMatcher<P> {
    predictor: P,
}

impl<P: WarpPredictor> WarpCoarseMatcher<P> {
    /// Wraps `predictor`.
    pub fn new(predictor: P) -> Self {
        Self { predictor }
    }
}

impl<P: WarpPredictor> CoarseMatcher for WarpCoarseMatcher<P> {
    fn coarse_matches(
        &mut self,
        a: ImageView<'_, u8>,
        b: ImageView<'_, u8>,
    ) -> TileMatchResult<Correspondences> {
        let warp = self
            .predictor
            .predict(MatchUnit::in_memory(a), MatchUnit::in_memory(b))?;
        let sampled = self.predictor.sample(&warp)?;
        let (pa, pb) = self.predictor.to_pixel_coordinates(
            &sampled,
            a.height(),
            a.width(),
            b.height(),
            b.width(),
        );
        Correspondences::from_parts(pa, pb, sampled.certainty)
    }
}

/// Coarse matcher running the ZNCC block matcher on the downscaled images.
pub type ZnccCoarseMatcher = WarpCoarseMatcher<ZnccWarpPredictor>;

/// Parameters of coarse preselection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreselectionConfig {
    /// Longer side of the downscaled images fed to the coarse matcher.
    pub size: usize,
    /// Minimum number of coarse correspondences a tile pair must receive.
    pub min_matches_per_tile: usize,
}

impl Default for PreselectionConfig {
    fn default() -> Self {
        Self {
            size: 1024,
            min_matches_per_tile: 5,
        }
    }
}

/// All tile pairs, image0-major.
pub fn exhaustive_pairs(grid0: &TileGrid, grid1: &TileGrid) -> Vec<TilePair> {
    let mut pairs = Vec::with_capacity(grid0.len() * grid1.len());
    for t0 in 0..grid0.len() {
        for t1 in 0..grid1.len() {
            pairs.push(TilePair::new(t0, t1));
        }
    }
    pairs
}

/// Counts, for each tile pair, the correspondences whose two points fall in
/// the (non-padded) area of those tiles. Points are in working resolution.
pub fn vote_tile_pairs(
    matches: &Correspondences,
    grid0: &TileGrid,
    grid1: &TileGrid,
) -> BTreeMap<TilePair, usize> {
    let mut votes = BTreeMap::new();
    for (p0, p1, _) in matches.iter() {
        for t0 in grid0.tiles_containing(p0.x, p0.y) {
            for t1 in grid1.tiles_containing(p1.x, p1.y) {
                *votes.entry(TilePair::new(t0, t1)).or_insert(0) += 1;
            }
        }
    }
    votes
}

fn downscale_for_preselection(
    image: ImageView<'_, u8>,
    size: usize,
) -> TileMatchResult<(Option<crate::image::OwnedImage>, f32)> {
    let longer = image.width().max(image.height());
    if longer <= size {
        return Ok((None, 1.0));
    }
    let scale = size as f32 / longer as f32;
    let w = ((image.width() as f32 * scale).round() as usize).max(1);
    let h = ((image.height() as f32 * scale).round() as usize).max(1);
    let small = resize_bilinear(image, w, h)?;
    Ok((Some(small), scale))
}

/// Tile pairs supported by at least `min_matches_per_tile` coarse matches.
pub fn preselect_pairs(
    image0: ImageView<'_, u8>,
    image1: ImageView<'_, u8>,
    grid0: &TileGrid,
    grid1: &TileGrid,
    matcher: &mut dyn CoarseMatcher,
    cfg: PreselectionConfig,
) -> TileMatchResult<Vec<TilePair>> {
    if cfg.size == 0 {
        return Err(TileMatchError::InvalidConfig {
            reason: "tile_preselection_size must be > 0",
        });
    }
    let (small0, s0) = downscale_for_preselection(image0, cfg.size)?;
    let (small1, s1) = downscale_for_preselection(image1, cfg.size)?;
    let view0 = small0.as_ref().map_or(image0, |img| img.view());
    let view1 = small1.as_ref().map_or(image1, |img| img.view());

    let mut coarse = matcher.coarse_matches(view0, view1)?;
    coarse.map_points(|p| p.scale(1.0 / s0, 1.0 / s0), |p| p.scale(1.0 / s1, 1.0 / s1));
    trace_event!("coarse_matches", count = coarse.len());

    Ok(vote_tile_pairs(&coarse, grid0, grid1)
        .into_iter()
        .filter(|(_, count)| *count >= cfg.min_matches_per_tile)
        .map(|(pair, _)| pair)
        .collect())
}

/// Fails when `count` exceeds the ceiling.
pub fn enforce_pair_budget(count: usize, max_tile_pairs: usize) -> TileMatchResult<()> {
    if count > max_tile_pairs {
        return Err(TileMatchError::TooManyTilePairs {
            count,
            max: max_tile_pairs,
        });
    }
    Ok(())
}

/// Chooses the tile pairs to submit to the dense predictor.
#[derive(Clone, Copy, Debug)]
pub struct TilePairSelector {
    method: TileSelection,
    max_tile_pairs: usize,
    preselection: PreselectionConfig,
}

impl TilePairSelector {
    /// Creates a selector.
    pub fn new(
        method: TileSelection,
        max_tile_pairs: usize,
        preselection: PreselectionConfig,
    ) -> Self {
        Self {
            method,
            max_tile_pairs,
            preselection,
        }
    }

    /// Selection strategy.
    pub fn method(&self) -> TileSelection {
        self.method
    }

    /// Applies the ceiling to an exhaustive selection from the grid shapes
    /// alone, so an oversized run fails before any tile is cut.
    ///
    /// Other strategies only know their pair count after selection.
    pub fn check_grid_shapes(
        &self,
        shape0: (usize, usize),
        shape1: (usize, usize),
    ) -> TileMatchResult<()> {
        if self.method == TileSelection::Exhaustive {
            let count = (shape0.0 * shape0.1).saturating_mul(shape1.0 * shape1.1);
            enforce_pair_budget(count, self.max_tile_pairs)?;
        }
        Ok(())
    }

    /// Returns the bounded, ordered list of tile pairs.
    ///
    /// `coarse` is only consulted for `Preselection`, where it is required.
    pub fn select(
        &self,
        image0: ImageView<'_, u8>,
        image1: ImageView<'_, u8>,
        grid0: &TileGrid,
        grid1: &TileGrid,
        coarse: Option<&mut dyn CoarseMatcher>,
    ) -> TileMatchResult<Vec<TilePair>> {
        let _span = trace_span!("tile_selection", tiles0 = grid0.len(), tiles1 = grid1.len())
            .entered();
        let pairs = match self.method {
            TileSelection::None => {
                return Err(TileMatchError::InvalidConfig {
                    reason: "tile selection requested with tiling disabled",
                })
            }
            TileSelection::Exhaustive => exhaustive_pairs(grid0, grid1),
            TileSelection::Preselection => {
                let matcher = coarse.ok_or(TileMatchError::InvalidConfig {
                    reason: "preselection requires a coarse matcher",
                })?;
                preselect_pairs(image0, image1, grid0, grid1, matcher, self.preselection)?
            }
        };
        enforce_pair_budget(pairs.len(), self.max_tile_pairs)?;
        trace_event!("tile_pairs", count = pairs.len());
        Ok(pairs)
    }
}
