//! Stitching of per-unit correspondences into one full-image set.
//!
//! For every matched tile pair the aggregator shifts tile-local points by the
//! tile origins, drops rows where either point falls outside the true image
//! or within `border_margin` pixels of its edge, and appends the survivors in
//! submission order. `finish` rescales working-resolution coordinates to
//! native resolution and removes duplicates rediscovered by overlapping tiles.

mod dedup;

pub use dedup::dedup_by_rounding;

use crate::correspondence::{Correspondences, Point2};
use crate::tiling::{Tile, TileOrigin};
use crate::trace::{trace_event, trace_span};
use crate::util::{TileMatchError, TileMatchResult};

/// Finest dedup precision accepted by configuration; `f32` coordinates carry
/// no meaningful digits beyond it.
pub const MAX_DEDUP_DECIMALS: u32 = 6;

/// Aggregation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregatorConfig {
    /// Rows with a point closer than this to an image edge are dropped.
    pub border_margin: f32,
    /// Rounding precision of the image0 dedup key; `None` disables dedup.
    pub dedup_decimals: Option<u32>,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            border_margin: 2.0,
            dedup_decimals: Some(1),
        }
    }
}

/// Native and working sizes of one image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageFrame {
    pub native: (usize, usize),
    pub working: (usize, usize),
}

impl ImageFrame {
    /// A frame whose working resolution equals its native resolution.
    pub fn native(width: usize, height: usize) -> Self {
        Self {
            native: (width, height),
            working: (width, height),
        }
    }

    /// Per-axis factors taking working coordinates to native coordinates.
    pub fn working_to_native(&self) -> (f32, f32) {
        (
            self.native.0 as f32 / self.working.0 as f32,
            self.native.1 as f32 / self.working.1 as f32,
        )
    }
}

/// Shifts tile-local points into the parent images' frames.
pub fn to_global(local: &mut Correspondences, origin0: TileOrigin, origin1: TileOrigin) {
    let (dx0, dy0) = (origin0.x as f32, origin0.y as f32);
    let (dx1, dy1) = (origin1.x as f32, origin1.y as f32);
    local.map_points(|p| p.offset(dx0, dy0), |p| p.offset(dx1, dy1));
}

/// `margin <= x < width - margin` and likewise for `y`.
pub fn inside_with_margin(p: Point2, width: usize, height: usize, margin: f32) -> bool {
    p.x >= margin
        && p.x < width as f32 - margin
        && p.y >= margin
        && p.y < height as f32 - margin
}

/// Keeps rows whose two points both lie inside their image with margin.
///
/// Returns the number of dropped rows.
pub fn border_filter(
    c: &mut Correspondences,
    size0: (usize, usize),
    size1: (usize, usize),
    margin: f32,
) -> TileMatchResult<usize> {
    let mask: Vec<bool> = c
        .iter()
        .map(|(p0, p1, _)| {
            inside_with_margin(p0, size0.0, size0.1, margin)
                && inside_with_margin(p1, size1.0, size1.1, margin)
        })
        .collect();
    let before = c.len();
    c.retain_mask(&mask)?;
    Ok(before - c.len())
}

/// Accumulates correspondences of one image pair across matched units.
#[derive(Debug)]
pub struct MatchAggregator {
    cfg: AggregatorConfig,
    frame0: ImageFrame,
    frame1: ImageFrame,
    acc: Correspondences,
    raw: usize,
    rejected: usize,
}

impl MatchAggregator {
    /// Creates an empty aggregator for images with the given frames.
    pub fn new(cfg: AggregatorConfig, frame0: ImageFrame, frame1: ImageFrame) -> Self {
        Self {
            cfg,
            frame0,
            frame1,
            acc: Correspondences::new(),
            raw: 0,
            rejected: 0,
        }
    }

    /// Adds the predictor output of one tile pair; returns the rows kept.
    pub fn add_tile_pair(
        &mut self,
        mut local: Correspondences,
        tile0: &Tile,
        tile1: &Tile,
    ) -> TileMatchResult<usize> {
        self.raw += local.len();
        to_global(&mut local, tile0.origin(), tile1.origin());
        self.rejected += border_filter(
            &mut local,
            self.frame0.working,
            self.frame1.working,
            self.cfg.border_margin,
        )?;
        let kept = local.len();
        self.acc.extend(local);
        Ok(kept)
    }

    /// Adds correspondences already expressed in full working-image frames.
    pub fn add_full(&mut self, global: Correspondences) {
        self.raw += global.len();
        self.acc.extend(global);
    }

    /// Rows received from the predictor so far.
    pub fn raw_count(&self) -> usize {
        self.raw
    }

    /// Rows dropped by the border filter so far.
    pub fn rejected_count(&self) -> usize {
        self.rejected
    }

    /// Rows currently accumulated.
    pub fn len(&self) -> usize {
        self.acc.len()
    }

    /// Whether nothing has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.acc.is_empty()
    }

    /// Rescales to native resolution and deduplicates.
    pub fn finish(self) -> TileMatchResult<Correspondences> {
        let _span = trace_span!("aggregate", rows = self.acc.len()).entered();
        if self.frame0.working.0 == 0
            || self.frame0.working.1 == 0
            || self.frame1.working.0 == 0
            || self.frame1.working.1 == 0
        {
            return Err(TileMatchError::InvalidDimensions {
                width: self.frame0.working.0.min(self.frame1.working.0),
                height: self.frame0.working.1.min(self.frame1.working.1),
            });
        }
        if self.cfg.dedup_decimals.is_some_and(|d| d > MAX_DEDUP_DECIMALS) {
            return Err(TileMatchError::InvalidConfig {
                reason: "dedup_decimals must be at most 6",
            });
        }
        let (sx0, sy0) = self.frame0.working_to_native();
        let (sx1, sy1) = self.frame1.working_to_native();
        let mut out = self.acc;
        out.map_points(|p| p.scale(sx0, sy0), |p| p.scale(sx1, sy1));

        let before = out.len();
        if let Some(decimals) = self.cfg.dedup_decimals {
            out = dedup_by_rounding(out, decimals);
        }
        trace_event!("aggregated", before_dedup = before, after_dedup = out.len());
        Ok(out)
    }
}
