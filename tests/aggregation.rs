use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tilematch::aggregate::{border_filter, dedup_by_rounding, inside_with_margin};
use tilematch::{
    AggregatorConfig, Correspondences, ImageFrame, MatchAggregator, OwnedImage, Point2, Tiler,
    TilingConfig,
};

fn random_points(rng: &mut StdRng, n: usize, w: f32, h: f32) -> Correspondences {
    let mut c = Correspondences::with_capacity(n);
    for _ in 0..n {
        let p0 = Point2::new(rng.random_range(0.0..w), rng.random_range(0.0..h));
        let p1 = Point2::new(rng.random_range(0.0..w), rng.random_range(0.0..h));
        c.push(p0, p1, rng.random_range(0.0..1.0));
    }
    c
}

#[test]
fn stitched_points_are_local_plus_origin() {
    let img = OwnedImage::filled(900, 500, 1).unwrap();
    let tiler = Tiler::new(TilingConfig {
        tile_width: 256,
        tile_height: 256,
        overlap: 32,
    })
    .unwrap();
    let grid = tiler.compute(img.view()).unwrap();
    let mut rng = StdRng::seed_from_u64(7);

    let cfg = AggregatorConfig {
        border_margin: 0.0,
        dedup_decimals: None,
    };
    for tile0 in grid.iter() {
        for tile1 in grid.iter() {
            let local = random_points(
                &mut rng,
                20,
                tile0.valid_width().min(tile1.valid_width()) as f32,
                tile0.valid_height().min(tile1.valid_height()) as f32,
            );
            let frame = ImageFrame::native(900, 500);
            let mut agg = MatchAggregator::new(cfg, frame, frame);
            let kept = agg.add_tile_pair(local.clone(), tile0, tile1).unwrap();
            assert_eq!(kept, local.len());
            let global = agg.finish().unwrap();
            for ((l0, l1, lc), (g0, g1, gc)) in local.iter().zip(global.iter()) {
                assert_eq!(g0.x, l0.x + tile0.origin().x as f32);
                assert_eq!(g0.y, l0.y + tile0.origin().y as f32);
                assert_eq!(g1.x, l1.x + tile1.origin().x as f32);
                assert_eq!(g1.y, l1.y + tile1.origin().y as f32);
                assert_eq!(lc, gc);
            }
        }
    }
}

#[test]
fn no_surviving_point_lies_within_the_margin() {
    let mut rng = StdRng::seed_from_u64(11);
    let mut c = random_points(&mut rng, 2000, 120.0, 80.0);
    let dropped = border_filter(&mut c, (100, 60), (120, 80), 2.0).unwrap();
    assert!(dropped > 0);
    for (p0, p1, _) in c.iter() {
        assert!(inside_with_margin(p0, 100, 60, 2.0));
        assert!(inside_with_margin(p1, 120, 80, 2.0));
    }
}

#[test]
fn margin_boundaries() {
    assert!(inside_with_margin(Point2::new(2.0, 2.0), 100, 100, 2.0));
    assert!(!inside_with_margin(Point2::new(1.99, 50.0), 100, 100, 2.0));
    assert!(inside_with_margin(Point2::new(97.99, 50.0), 100, 100, 2.0));
    assert!(!inside_with_margin(Point2::new(98.0, 50.0), 100, 100, 2.0));
}

#[test]
fn dedup_is_idempotent_and_keeps_first_rows() {
    let mut rng = StdRng::seed_from_u64(3);
    let mut c = Correspondences::new();
    for _ in 0..3000 {
        // Coarse lattice so many rows collide after rounding.
        let x = (rng.random_range(0..200) as f32) * 0.03;
        let y = (rng.random_range(0..50) as f32) * 0.03;
        c.push(Point2::new(x, y), Point2::new(y, x), 1.0);
    }
    let once = dedup_by_rounding(c.clone(), 1);
    assert!(once.len() < c.len());
    let twice = dedup_by_rounding(once.clone(), 1);
    assert_eq!(once, twice);
    assert_eq!(once.points0()[0], c.points0()[0]);
}

#[test]
fn finish_rescales_before_dedup() {
    let frame = ImageFrame {
        native: (200, 100),
        working: (100, 50),
    };
    let mut agg = MatchAggregator::new(AggregatorConfig::default(), frame, frame);
    let mut c = Correspondences::new();
    c.push(Point2::new(10.0, 10.0), Point2::new(20.0, 5.0), 0.5);
    c.push(Point2::new(10.02, 10.0), Point2::new(30.0, 5.0), 0.6);
    agg.add_full(c);
    let out = agg.finish().unwrap();
    // Both image0 points round to (20.0, 20.0) once rescaled.
    assert_eq!(out.len(), 1);
    assert_eq!(out.points0()[0], Point2::new(20.0, 20.0));
    assert_eq!(out.points1()[0], Point2::new(40.0, 10.0));
}
