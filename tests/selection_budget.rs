use tilematch::select::{enforce_pair_budget, exhaustive_pairs};
use tilematch::{
    CoarseMatcher, Correspondences, ImageView, OwnedImage, Point2, PreselectionConfig,
    TileMatchError, TileMatchResult, TilePair, TilePairSelector, TileSelection, Tiler,
    TilingConfig,
};

/// Scripted coarse matcher returning fixed points at the downscaled size.
struct Scripted {
    seen: Vec<(usize, usize)>,
    rows: Vec<(Point2, Point2)>,
}

impl CoarseMatcher for Scripted {
    fn coarse_matches(
        &mut self,
        a: ImageView<'_, u8>,
        b: ImageView<'_, u8>,
    ) -> TileMatchResult<Correspondences> {
        self.seen.push((a.width(), a.height()));
        self.seen.push((b.width(), b.height()));
        let mut c = Correspondences::new();
        for &(p0, p1) in &self.rows {
            c.push(p0, p1, 1.0);
        }
        Ok(c)
    }
}

fn tiler(tile: usize) -> Tiler {
    Tiler::new(TilingConfig {
        tile_width: tile,
        tile_height: tile,
        overlap: 0,
    })
    .unwrap()
}

#[test]
fn preselection_keeps_pairs_with_enough_votes() {
    let img = OwnedImage::filled(256, 128, 3).unwrap();
    let grid = tiler(64).compute(img.view()).unwrap();
    assert_eq!(grid.len(), 8);

    let mut rows = Vec::new();
    // Six votes for (tile 0, tile 2) once scaled back by 4.
    for i in 0..6 {
        let y = 4.0 + i as f32;
        rows.push((Point2::new(5.0, y), Point2::new(45.0, y)));
    }
    // Three votes for (tile 1, tile 3): below the default minimum of five.
    for i in 0..3 {
        let y = 4.0 + i as f32;
        rows.push((Point2::new(20.0, y), Point2::new(60.0, y)));
    }
    let mut coarse = Scripted {
        seen: Vec::new(),
        rows,
    };

    let selector = TilePairSelector::new(
        TileSelection::Preselection,
        50,
        PreselectionConfig {
            size: 64,
            min_matches_per_tile: 5,
        },
    );
    let matcher: &mut dyn CoarseMatcher = &mut coarse;
    let pairs = selector
        .select(img.view(), img.view(), &grid, &grid, Some(matcher))
        .unwrap();
    assert_eq!(pairs, vec![TilePair::new(0, 2)]);
    assert_eq!(coarse.seen, vec![(64, 32), (64, 32)]);
}

#[test]
fn preselection_over_budget_is_rejected() {
    let img = OwnedImage::filled(256, 128, 3).unwrap();
    let grid = tiler(64).compute(img.view()).unwrap();
    // Five votes for every one of the 64 pairs.
    let mut rows = Vec::new();
    for t0 in grid.iter() {
        for t1 in grid.iter() {
            for k in 0..5 {
                let (o0, o1) = (t0.origin(), t1.origin());
                let p0 = Point2::new((o0.x + 10 + k) as f32, (o0.y + 10) as f32);
                let p1 = Point2::new((o1.x + 10) as f32, (o1.y + 10 + k) as f32);
                rows.push((p0, p1));
            }
        }
    }
    let mut coarse = Scripted {
        seen: Vec::new(),
        rows,
    };
    let selector = TilePairSelector::new(
        TileSelection::Preselection,
        50,
        PreselectionConfig::default(),
    );
    let matcher: &mut dyn CoarseMatcher = &mut coarse;
    let err = selector
        .select(img.view(), img.view(), &grid, &grid, Some(matcher))
        .unwrap_err();
    assert_eq!(err, TileMatchError::TooManyTilePairs { count: 64, max: 50 });
    // Images below the preselection size are passed through unscaled.
    assert_eq!(coarse.seen[0], (256, 128));
}

#[test]
fn exhaustive_order_and_budget() {
    let img0 = OwnedImage::filled(128, 64, 0).unwrap();
    let img1 = OwnedImage::filled(64, 64, 0).unwrap();
    let g0 = tiler(64).compute(img0.view()).unwrap();
    let g1 = tiler(32).compute(img1.view()).unwrap();
    let pairs = exhaustive_pairs(&g0, &g1);
    assert_eq!(pairs.len(), 2 * 4);
    assert_eq!(pairs[0], TilePair::new(0, 0));
    assert_eq!(pairs[3], TilePair::new(0, 3));
    assert_eq!(pairs[4], TilePair::new(1, 0));

    assert!(enforce_pair_budget(50, 50).is_ok());
    assert!(matches!(
        enforce_pair_budget(51, 50),
        Err(TileMatchError::TooManyTilePairs { count: 51, max: 50 })
    ));
}
