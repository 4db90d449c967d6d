use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tilematch::{
    GeometricMethod, JsonFeatureStore, MatchContext, MatcherConfig, PreselectionConfig, Quality,
    RansacConfig, RansacVerifier, TileSelection, TiledMatcher, TilingConfig, WarpSampling,
    ZnccCoarseMatcher, ZnccPredictorConfig, ZnccWarpPredictor,
};
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "Tilematch CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file.
    #[arg(short, long, value_name = "FILE", default_value = "config.json")]
    config: PathBuf,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long)]
    trace: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TileSelectionConfig {
    None,
    Exhaustive,
    Preselection,
}

impl From<TileSelectionConfig> for TileSelection {
    fn from(value: TileSelectionConfig) -> Self {
        match value {
            TileSelectionConfig::None => TileSelection::None,
            TileSelectionConfig::Exhaustive => TileSelection::Exhaustive,
            TileSelectionConfig::Preselection => TileSelection::Preselection,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum QualityConfig {
    Highest,
    High,
    Medium,
    Low,
    Lowest,
}

impl From<QualityConfig> for Quality {
    fn from(value: QualityConfig) -> Self {
        match value {
            QualityConfig::Highest => Quality::Highest,
            QualityConfig::High => Quality::High,
            QualityConfig::Medium => Quality::Medium,
            QualityConfig::Low => Quality::Low,
            QualityConfig::Lowest => Quality::Lowest,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum GeometricMethodConfig {
    Fundamental,
    Homography,
}

impl From<GeometricMethodConfig> for GeometricMethod {
    fn from(value: GeometricMethodConfig) -> Self {
        match value {
            GeometricMethodConfig::Fundamental => GeometricMethod::Fundamental,
            GeometricMethodConfig::Homography => GeometricMethod::Homography,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatcherConfigJson {
    tile_width: usize,
    tile_height: usize,
    tile_overlap: usize,
    tile_selection: TileSelectionConfig,
    max_tile_pairs: usize,
    tile_preselection_size: usize,
    min_matches_per_tile: usize,
    quality: QualityConfig,
    border_margin: f32,
    select_unique: bool,
    dedup_decimals: u32,
    geom_verification: GeometricMethodConfig,
    gv_threshold: f64,
    gv_confidence: f64,
    min_inliers_per_pair: usize,
    output_dir: Option<PathBuf>,
    keep_tiles: bool,
}

impl Default for MatcherConfigJson {
    fn default() -> Self {
        let cfg = MatcherConfig::default();
        Self {
            tile_width: cfg.tiling.tile_width,
            tile_height: cfg.tiling.tile_height,
            tile_overlap: cfg.tiling.overlap,
            tile_selection: TileSelectionConfig::Preselection,
            max_tile_pairs: cfg.max_tile_pairs,
            tile_preselection_size: cfg.preselection.size,
            min_matches_per_tile: cfg.preselection.min_matches_per_tile,
            quality: QualityConfig::High,
            border_margin: cfg.border_margin,
            select_unique: cfg.select_unique,
            dedup_decimals: cfg.dedup_decimals,
            geom_verification: GeometricMethodConfig::Fundamental,
            gv_threshold: cfg.gv_threshold,
            gv_confidence: cfg.gv_confidence,
            min_inliers_per_pair: cfg.min_inliers_per_pair,
            output_dir: cfg.output_dir,
            keep_tiles: cfg.keep_tiles,
        }
    }
}

impl From<MatcherConfigJson> for MatcherConfig {
    fn from(value: MatcherConfigJson) -> Self {
        Self {
            tiling: TilingConfig {
                tile_width: value.tile_width,
                tile_height: value.tile_height,
                overlap: value.tile_overlap,
            },
            tile_selection: value.tile_selection.into(),
            max_tile_pairs: value.max_tile_pairs,
            preselection: PreselectionConfig {
                size: value.tile_preselection_size,
                min_matches_per_tile: value.min_matches_per_tile,
            },
            quality: value.quality.into(),
            border_margin: value.border_margin,
            select_unique: value.select_unique,
            dedup_decimals: value.dedup_decimals,
            geom_verification: value.geom_verification.into(),
            gv_threshold: value.gv_threshold,
            gv_confidence: value.gv_confidence,
            min_inliers_per_pair: value.min_inliers_per_pair,
            output_dir: value.output_dir,
            keep_tiles: value.keep_tiles,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PredictorConfigJson {
    cell_step: usize,
    patch_radius: usize,
    search_radius: usize,
    coarse_levels: usize,
    min_std: f32,
    min_score: f32,
    num_samples: usize,
    min_certainty: f32,
}

impl Default for PredictorConfigJson {
    fn default() -> Self {
        let cfg = ZnccPredictorConfig::default();
        Self {
            cell_step: cfg.cell_step,
            patch_radius: cfg.patch_radius,
            search_radius: cfg.search_radius,
            coarse_levels: cfg.coarse_levels,
            min_std: cfg.min_std,
            min_score: cfg.min_score,
            num_samples: cfg.sampling.num_samples,
            min_certainty: cfg.sampling.min_certainty,
        }
    }
}

impl From<&PredictorConfigJson> for ZnccPredictorConfig {
    fn from(value: &PredictorConfigJson) -> Self {
        Self {
            cell_step: value.cell_step,
            patch_radius: value.patch_radius,
            search_radius: value.search_radius,
            coarse_levels: value.coarse_levels,
            min_std: value.min_std,
            min_score: value.min_score,
            sampling: WarpSampling {
                num_samples: value.num_samples,
                min_certainty: value.min_certainty,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RansacConfigJson {
    max_iterations: usize,
    min_iterations: usize,
    seed: u64,
}

impl Default for RansacConfigJson {
    fn default() -> Self {
        let cfg = RansacConfig::default();
        Self {
            max_iterations: cfg.max_iterations,
            min_iterations: cfg.min_iterations,
            seed: cfg.seed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    features_path: String,
    matches_path: String,
    image0_path: String,
    image1_path: String,
    create_features: bool,
    output_path: Option<String>,
    matcher: MatcherConfigJson,
    predictor: PredictorConfigJson,
    ransac: RansacConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            features_path: String::new(),
            matches_path: String::new(),
            image0_path: String::new(),
            image1_path: String::new(),
            create_features: false,
            output_path: None,
            matcher: MatcherConfigJson::default(),
            predictor: PredictorConfigJson::default(),
            ransac: RansacConfigJson::default(),
        }
    }
}

#[derive(Debug, Serialize)]
struct Output {
    image0: String,
    image1: String,
    device: String,
    predictor_calls: usize,
    status: &'static str,
    matches: usize,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("tilematch=debug".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config_text = fs::read_to_string(&cli.config)?;
    let config: Config = serde_json::from_str(&config_text)?;
    if config.image0_path.is_empty() || config.image1_path.is_empty() {
        return Err("image0_path and image1_path must be set in the config".into());
    }
    if config.features_path.is_empty() || config.matches_path.is_empty() {
        return Err("features_path and matches_path must be set in the config".into());
    }
    if config.create_features && !Path::new(&config.features_path).exists() {
        JsonFeatureStore::create_feature_file(&config.features_path)?;
    }

    let predictor_cfg = ZnccPredictorConfig::from(&config.predictor);
    let mut ctx = MatchContext::with_predictor(ZnccWarpPredictor::new(predictor_cfg)?);
    let verifier = RansacVerifier::new(RansacConfig {
        max_iterations: config.ransac.max_iterations,
        min_iterations: config.ransac.min_iterations,
        seed: config.ransac.seed,
    })?;
    let mut matcher = TiledMatcher::new(config.matcher.into(), verifier)?
        .with_coarse_matcher(ZnccCoarseMatcher::new(ZnccWarpPredictor::new(predictor_cfg)?));

    let result = matcher.match_paths(
        &mut ctx,
        Path::new(&config.features_path),
        Path::new(&config.matches_path),
        Path::new(&config.image0_path),
        Path::new(&config.image1_path),
    )?;

    let output = Output {
        image0: config.image0_path,
        image1: config.image1_path,
        device: ctx.device().to_string(),
        predictor_calls: ctx.predictor_calls(),
        status: if result.is_some() { "written" } else { "discarded" },
        matches: result.map_or(0, |m| m.len()),
    };
    let json = serde_json::to_string_pretty(&output)?;

    match config.output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }

    Ok(())
}
