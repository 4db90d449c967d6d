//! Per-pair orchestration: select, match, stitch, verify, filter, persist.
//!
//! One call to [`TiledMatcher::match_pair`] walks the stages of
//! [`MatchStage`] in order. Nothing is written to the store until the pair
//! has passed verification and the inlier floor, so a discarded pair leaves
//! the store untouched.

mod config;

pub use config::MatcherConfig;

use crate::aggregate::{ImageFrame, MatchAggregator};
use crate::correspondence::Correspondences;
use crate::engine::{MatchContext, MatchUnit};
use crate::image::{ImageView, OwnedImage};
use crate::select::{CoarseMatcher, TilePairSelector, TileSelection};
use crate::store::{FeatureStore, MatchIndexArray};
use crate::tiling::{TileScratch, Tiler};
use crate::trace::{trace_debug, trace_event, trace_span};
use crate::util::{TileMatchError, TileMatchResult};
use crate::verify::{scaled_threshold, GeometricVerifier};

/// Stages of one pair's matching run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchStage {
    Start,
    Selecting,
    Matching,
    Verifying,
    Filtering,
    Persisting,
    Done,
}

impl MatchStage {
    /// Lowercase stage name.
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStage::Start => "start",
            MatchStage::Selecting => "selecting",
            MatchStage::Matching => "matching",
            MatchStage::Verifying => "verifying",
            MatchStage::Filtering => "filtering",
            MatchStage::Persisting => "persisting",
            MatchStage::Done => "done",
        }
    }
}

impl std::fmt::Display for MatchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn enter(stage: MatchStage) {
    trace_debug!("stage", stage = stage.as_str());
}

/// Counters collected during one run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchStats {
    /// Units submitted to the backend (tile pairs, or one for full images).
    pub units: usize,
    /// Rows produced by the backend.
    pub raw: usize,
    /// Rows dropped by the border filter.
    pub border_rejected: usize,
    /// Rows left after rescaling and deduplication.
    pub after_dedup: usize,
    /// Rows accepted by the verifier.
    pub inliers: usize,
}

/// Two named images at native resolution.
#[derive(Clone, Copy)]
pub struct PairInput<'a> {
    pub name0: &'a str,
    pub image0: ImageView<'a, u8>,
    pub name1: &'a str,
    pub image1: ImageView<'a, u8>,
}

/// Tiled dense matcher for image pairs.
pub struct TiledMatcher<V> {
    cfg: MatcherConfig,
    verifier: V,
    coarse: Option<Box<dyn CoarseMatcher>>,
}

impl<V: GeometricVerifier> TiledMatcher<V> {
    /// Creates a matcher; `Preselection` additionally needs
    /// [`with_coarse_matcher`](Self::with_coarse_matcher).
    pub fn new(cfg: MatcherConfig, verifier: V) -> TileMatchResult<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            verifier,
            coarse: None,
        })
    }

    /// Sets the matcher that proposes tile pairs for `Preselection`.
    pub fn with_coarse_matcher<C: CoarseMatcher + 'static>(mut self, coarse: C) -> Self {
        self.coarse = Some(Box::new(coarse));
        self
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MatcherConfig {
        &self.cfg
    }

    /// Returns the verifier.
    pub fn verifier(&self) -> &V {
        &self.verifier
    }

    /// Matches one pair and persists the verified matches.
    ///
    /// Returns `None` when the pair has fewer than `min_inliers_per_pair`
    /// inliers; nothing is written in that case.
    pub fn match_pair(
        &mut self,
        ctx: &mut MatchContext,
        store: &mut dyn FeatureStore,
        pair: PairInput<'_>,
    ) -> TileMatchResult<Option<MatchIndexArray>> {
        self.match_pair_with_stats(ctx, store, pair)
            .map(|(matches, _)| matches)
    }

    /// Like [`match_pair`](Self::match_pair), also returning run counters.
    pub fn match_pair_with_stats(
        &mut self,
        ctx: &mut MatchContext,
        store: &mut dyn FeatureStore,
        pair: PairInput<'_>,
    ) -> TileMatchResult<(Option<MatchIndexArray>, MatchStats)> {
        let _span = trace_span!("match_pair", image0 = pair.name0, image1 = pair.name1).entered();
        let mut stats = MatchStats::default();

        enter(MatchStage::Start);
        if store.has_matches(pair.name0, pair.name1) {
            return Err(TileMatchError::DuplicateMatches {
                image0: pair.name0.to_owned(),
                image1: pair.name1.to_owned(),
            });
        }
        let work0 = self.cfg.quality.apply(pair.image0)?;
        let work1 = self.cfg.quality.apply(pair.image1)?;
        let frame0 = ImageFrame {
            native: (pair.image0.width(), pair.image0.height()),
            working: (work0.width(), work0.height()),
        };
        let frame1 = ImageFrame {
            native: (pair.image1.width(), pair.image1.height()),
            working: (work1.width(), work1.height()),
        };
        let mut aggregator = MatchAggregator::new(self.cfg.aggregator(), frame0, frame1);

        if self.cfg.tile_selection == TileSelection::None {
            enter(MatchStage::Selecting);
            enter(MatchStage::Matching);
            let local = ctx.match_units(
                MatchUnit::in_memory(work0.view()),
                MatchUnit::in_memory(work1.view()),
            )?;
            stats.units = 1;
            aggregator.add_full(local);
        } else {
            self.match_tiles(ctx, &pair, &work0, &work1, &mut aggregator, &mut stats)?;
        }
        stats.raw = aggregator.raw_count();
        stats.border_rejected = aggregator.rejected_count();
        let matches = aggregator.finish()?;
        stats.after_dedup = matches.len();

        enter(MatchStage::Verifying);
        let max_side = frame0
            .native
            .0
            .max(frame0.native.1)
            .max(frame1.native.0)
            .max(frame1.native.1);
        let threshold = scaled_threshold(self.cfg.gv_threshold, max_side, self.cfg.tile_size());
        let verification = self.verifier.verify(
            matches.points0(),
            matches.points1(),
            self.cfg.geom_verification,
            threshold,
            self.cfg.gv_confidence,
        )?;
        if verification.inliers.len() != matches.len() {
            return Err(TileMatchError::LengthMismatch {
                left: matches.len(),
                right: verification.inliers.len(),
                context: "correspondences/inlier mask",
            });
        }
        stats.inliers = verification.inlier_count();
        trace_event!("verified", threshold = threshold, inliers = stats.inliers);

        enter(MatchStage::Filtering);
        if stats.inliers < self.cfg.min_inliers_per_pair {
            trace_debug!(
                "not enough inliers, pair discarded",
                inliers = stats.inliers,
                required = self.cfg.min_inliers_per_pair,
            );
            enter(MatchStage::Done);
            return Ok((None, stats));
        }

        enter(MatchStage::Persisting);
        let indices = persist(store, pair.name0, pair.name1, &matches, &verification.inliers)?;

        enter(MatchStage::Done);
        Ok((Some(indices), stats))
    }

    fn match_tiles(
        &mut self,
        ctx: &mut MatchContext,
        pair: &PairInput<'_>,
        work0: &OwnedImage,
        work1: &OwnedImage,
        aggregator: &mut MatchAggregator,
        stats: &mut MatchStats,
    ) -> TileMatchResult<()> {
        enter(MatchStage::Selecting);
        let tiler = Tiler::new(self.cfg.tiling)?;
        let selector = TilePairSelector::new(
            self.cfg.tile_selection,
            self.cfg.max_tile_pairs,
            self.cfg.preselection,
        );
        selector.check_grid_shapes(
            tiler.config().grid_shape(work0.width(), work0.height()),
            tiler.config().grid_shape(work1.width(), work1.height()),
        )?;
        let grid0 = tiler.compute(work0.view())?;
        let grid1 = tiler.compute(work1.view())?;
        let coarse = self
            .coarse
            .as_mut()
            .map(|m| &mut **m as &mut dyn CoarseMatcher);
        let pairs = selector.select(work0.view(), work1.view(), &grid0, &grid1, coarse)?;

        enter(MatchStage::Matching);
        let scratch = self.scratch(pair.name0, pair.name1);
        scratch.materialize(pair.name0, &grid0)?;
        scratch.materialize(pair.name1, &grid1)?;
        for tp in &pairs {
            let tile0 = grid0.get(tp.tile0)?;
            let tile1 = grid1.get(tp.tile1)?;
            let path0 = scratch.tile_path(pair.name0, tile0.index());
            let path1 = scratch.tile_path(pair.name1, tile1.index());
            let local = ctx.match_units(
                MatchUnit {
                    image: tile0.image().view(),
                    path: path0.as_deref(),
                },
                MatchUnit {
                    image: tile1.image().view(),
                    path: path1.as_deref(),
                },
            )?;
            let kept = aggregator.add_tile_pair(local, tile0, tile1)?;
            trace_debug!("tile pair matched", tile0 = tp.tile0, tile1 = tp.tile1, kept = kept);
        }
        stats.units = pairs.len();
        Ok(())
    }

    #[cfg(feature = "image-io")]
    fn scratch(&self, name0: &str, name1: &str) -> TileScratch {
        match &self.cfg.output_dir {
            Some(dir) => TileScratch::disk(dir, &format!("{name0}-{name1}"), self.cfg.keep_tiles),
            None => TileScratch::in_memory(),
        }
    }

    #[cfg(not(feature = "image-io"))]
    fn scratch(&self, _name0: &str, _name1: &str) -> TileScratch {
        TileScratch::in_memory()
    }

    /// Matches two image files and writes into the JSON stores at
    /// `features` and `matches`.
    ///
    /// The feature file must already exist. Images are named by file name.
    #[cfg(feature = "image-io")]
    pub fn match_paths<P: AsRef<std::path::Path>>(
        &mut self,
        ctx: &mut MatchContext,
        features: P,
        matches: P,
        image0: P,
        image1: P,
    ) -> TileMatchResult<Option<MatchIndexArray>> {
        use crate::image::io::load_gray_image;
        use crate::store::JsonFeatureStore;

        let mut store = JsonFeatureStore::open(features, matches)?;
        let name0 = image_name(image0.as_ref());
        let name1 = image_name(image1.as_ref());
        let img0 = load_gray_image(image0)?;
        let img1 = load_gray_image(image1)?;
        self.match_pair(
            ctx,
            &mut store,
            PairInput {
                name0: &name0,
                image0: img0.view(),
                name1: &name1,
                image1: img1.view(),
            },
        )
    }
}

#[cfg(feature = "image-io")]
fn image_name(path: &std::path::Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Appends both point sets as keypoints and writes the inlier rows.
fn persist(
    store: &mut dyn FeatureStore,
    name0: &str,
    name1: &str,
    matches: &Correspondences,
    inliers: &[bool],
) -> TileMatchResult<MatchIndexArray> {
    let range0 = store.append_keypoints(name0, matches.points0())?;
    let range1 = store.append_keypoints(name1, matches.points1())?;
    let mut indices = MatchIndexArray::identity(range0.start, range1.start, matches.len());
    indices.retain_mask(inliers)?;
    store.write_matches(name0, name1, indices.clone())?;
    store.flush()?;
    trace_event!("persisted", keypoints = matches.len(), matches = indices.len());
    Ok(indices)
}
