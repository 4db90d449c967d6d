use std::fs;
use std::path::PathBuf;
use tilematch::{
    Correspondences, Device, FeatureStore, GeometricMethod, GeometricVerifier, JsonFeatureStore,
    MatchBackend, MatchContext, MatchUnit, MatcherConfig, OwnedImage, PairInput, Point2,
    SparseMatcher, TileMatchError, TileMatchResult, TileSelection, TiledMatcher, TilingConfig,
    Verification,
};

fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("tilematch-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// One correspondence at the centre of every unit.
struct Centre;

impl SparseMatcher for Centre {
    fn match_units(
        &mut self,
        a: MatchUnit<'_>,
        b: MatchUnit<'_>,
    ) -> TileMatchResult<Correspondences> {
        let mut c = Correspondences::new();
        c.push(
            Point2::new(a.width() as f32 / 2.0, a.height() as f32 / 2.0),
            Point2::new(b.width() as f32 / 2.0, b.height() as f32 / 2.0),
            1.0,
        );
        Ok(c)
    }
}

struct Threshold {
    min_rows: usize,
}

impl GeometricVerifier for Threshold {
    fn verify(
        &mut self,
        points0: &[Point2],
        _points1: &[Point2],
        _method: GeometricMethod,
        _threshold: f64,
        _confidence: f64,
    ) -> TileMatchResult<Verification> {
        let accept = points0.len() >= self.min_rows;
        Ok(Verification {
            model: None,
            inliers: vec![accept; points0.len()],
        })
    }
}

fn config(min_inliers: usize) -> MatcherConfig {
    MatcherConfig {
        tiling: TilingConfig {
            tile_width: 64,
            tile_height: 64,
            overlap: 0,
        },
        tile_selection: TileSelection::Exhaustive,
        min_inliers_per_pair: min_inliers,
        ..MatcherConfig::default()
    }
}

fn context() -> MatchContext {
    MatchContext::new(Device::Cpu, MatchBackend::Sparse(Box::new(Centre)))
}

#[test]
fn missing_feature_file_is_a_precondition_failure() {
    let dir = temp_dir("missing");
    let err = JsonFeatureStore::open(dir.join("features.json"), dir.join("matches.json"))
        .unwrap_err();
    assert!(matches!(err, TileMatchError::MissingFeatureFile { .. }));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn written_pair_survives_reopen_and_cannot_be_rewritten() {
    let dir = temp_dir("reopen");
    let features = dir.join("features.json");
    let matches = dir.join("matches.json");
    JsonFeatureStore::create_feature_file(&features).unwrap();

    // 2 x 1 tiles each: four exhaustive pairs, one centre match per pair.
    let img = OwnedImage::filled(128, 64, 10).unwrap();
    let pair = PairInput {
        name0: "a",
        image0: img.view(),
        name1: "b",
        image1: img.view(),
    };
    let mut matcher = TiledMatcher::new(config(1), Threshold { min_rows: 1 }).unwrap();
    let mut ctx = context();
    {
        let mut store = JsonFeatureStore::open(&features, &matches).unwrap();
        let written = matcher.match_pair(&mut ctx, &mut store, pair).unwrap().unwrap();
        // Centres (32, 32) and (96, 32) in image0, deduplicated.
        assert_eq!(written.len(), 2);
    }

    let mut store = JsonFeatureStore::open(&features, &matches).unwrap();
    assert_eq!(store.keypoint_count("a"), 2);
    assert_eq!(store.keypoints("b").unwrap()[0], Point2::new(32.0, 32.0));
    assert_eq!(store.matches("a", "b").unwrap().rows(), &[[0, 0], [1, 1]]);

    let err = matcher.match_pair(&mut ctx, &mut store, pair).unwrap_err();
    assert!(matches!(err, TileMatchError::DuplicateMatches { .. }));
    fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn discarded_pair_leaves_files_untouched() {
    let dir = temp_dir("discard");
    let features = dir.join("features.json");
    let matches = dir.join("matches.json");
    JsonFeatureStore::create_feature_file(&features).unwrap();
    let before = fs::read(&features).unwrap();

    let img = OwnedImage::filled(128, 64, 10).unwrap();
    let pair = PairInput {
        name0: "a",
        image0: img.view(),
        name1: "b",
        image1: img.view(),
    };
    let mut matcher = TiledMatcher::new(config(10), Threshold { min_rows: 100 }).unwrap();
    let mut store = JsonFeatureStore::open(&features, &matches).unwrap();
    let result = matcher.match_pair(&mut context(), &mut store, pair).unwrap();
    assert!(result.is_none());

    assert_eq!(fs::read(&features).unwrap(), before);
    assert!(!matches.exists());
    fs::remove_dir_all(&dir).unwrap();
}

#[cfg(feature = "image-io")]
mod paths {
    use super::{config, context, temp_dir, Centre, Threshold};
    use std::fs;
    use tilematch::io::save_gray_image;
    use tilematch::{
        Correspondences, Device, JsonFeatureStore, MatchBackend, MatchContext, MatchUnit,
        MatcherConfig, OwnedImage, SparseMatcher, TileMatchError, TileMatchResult, TiledMatcher,
    };

    /// Succeeds once, then fails every later unit.
    struct FailsAfterFirst {
        calls: usize,
    }

    impl SparseMatcher for FailsAfterFirst {
        fn match_units(
            &mut self,
            a: MatchUnit<'_>,
            b: MatchUnit<'_>,
        ) -> TileMatchResult<Correspondences> {
            self.calls += 1;
            if self.calls > 1 {
                return Err(TileMatchError::Predictor {
                    reason: "backend crashed".to_string(),
                });
            }
            Centre.match_units(a, b)
        }
    }

    #[test]
    fn match_paths_requires_feature_file() {
        let dir = temp_dir("paths-missing");
        let img = OwnedImage::filled(128, 64, 10).unwrap();
        save_gray_image(&img, dir.join("left.png")).unwrap();
        save_gray_image(&img, dir.join("right.png")).unwrap();
        let mut matcher = TiledMatcher::new(config(1), Threshold { min_rows: 1 }).unwrap();
        let mut ctx = context();
        let err = matcher
            .match_paths(
                &mut ctx,
                dir.join("features.json"),
                dir.join("matches.json"),
                dir.join("left.png"),
                dir.join("right.png"),
            )
            .unwrap_err();
        assert!(matches!(err, TileMatchError::MissingFeatureFile { .. }));
        assert_eq!(ctx.predictor_calls(), 0);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn scratch_tiles_are_removed_unless_kept() {
        for keep in [false, true] {
            let dir = temp_dir(if keep { "paths-keep" } else { "paths-drop" });
            let img = OwnedImage::filled(128, 64, 10).unwrap();
            save_gray_image(&img, dir.join("left.png")).unwrap();
            save_gray_image(&img, dir.join("right.png")).unwrap();
            JsonFeatureStore::create_feature_file(dir.join("features.json")).unwrap();

            let cfg = MatcherConfig {
                output_dir: Some(dir.join("out")),
                keep_tiles: keep,
                ..config(1)
            };
            let mut matcher = TiledMatcher::new(cfg, Threshold { min_rows: 1 }).unwrap();
            let result = matcher
                .match_paths(
                    &mut context(),
                    dir.join("features.json"),
                    dir.join("matches.json"),
                    dir.join("left.png"),
                    dir.join("right.png"),
                )
                .unwrap();
            assert_eq!(result.unwrap().len(), 2);

            let tile = dir
                .join("out")
                .join("tiles")
                .join("left.png-right.png")
                .join("left.png")
                .join("tile_1.png");
            assert_eq!(tile.exists(), keep);
            fs::remove_dir_all(&dir).unwrap();
        }
    }

    #[test]
    fn scratch_is_removed_when_matching_stops_early() {
        for failing in [true, false] {
            let dir = temp_dir(if failing { "paths-error" } else { "paths-discard" });
            let img = OwnedImage::filled(128, 64, 10).unwrap();
            save_gray_image(&img, dir.join("left.png")).unwrap();
            save_gray_image(&img, dir.join("right.png")).unwrap();
            JsonFeatureStore::create_feature_file(dir.join("features.json")).unwrap();

            let cfg = MatcherConfig {
                output_dir: Some(dir.join("out")),
                ..config(10)
            };
            let mut matcher = TiledMatcher::new(cfg, Threshold { min_rows: 100 }).unwrap();
            let mut ctx = if failing {
                MatchContext::new(
                    Device::Cpu,
                    MatchBackend::Sparse(Box::new(FailsAfterFirst { calls: 0 })),
                )
            } else {
                context()
            };
            let result = matcher.match_paths(
                &mut ctx,
                dir.join("features.json"),
                dir.join("matches.json"),
                dir.join("left.png"),
                dir.join("right.png"),
            );
            if failing {
                assert!(matches!(result, Err(TileMatchError::Predictor { .. })));
                assert_eq!(ctx.predictor_calls(), 2);
            } else {
                assert_eq!(result.unwrap(), None);
                assert_eq!(ctx.predictor_calls(), 4);
            }

            let tiles = dir.join("out").join("tiles");
            assert!(!tiles.join("left.png-right.png").exists());
            assert!(!tiles.exists());
            assert!(!dir.join("matches.json").exists());
            fs::remove_dir_all(&dir).unwrap();
        }
    }
}
