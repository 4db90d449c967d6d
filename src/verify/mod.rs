//! Geometric verification of stitched correspondences.
//!
//! A verifier fits a two-view model robustly and reports an inlier mask. The
//! pixel threshold is given at native resolution; `scaled_threshold` widens
//! it for images much larger than one tile so the tolerance tracks the scale
//! the dense matches were produced at.

mod models;
mod ransac;

pub use models::{
    fit_fundamental, fit_homography, homography_transfer_error, sampson_error, GeometricModel,
};
pub use ransac::{RansacConfig, RansacVerifier};

use crate::correspondence::Point2;
use crate::util::TileMatchResult;

/// Two-view model used for verification.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GeometricMethod {
    /// Fundamental matrix (general 3D scenes).
    #[default]
    Fundamental,
    /// Plane-induced homography.
    Homography,
}

impl GeometricMethod {
    /// Minimal sample size.
    pub fn sample_size(self) -> usize {
        match self {
            GeometricMethod::Fundamental => 8,
            GeometricMethod::Homography => 4,
        }
    }
}

/// Fitted model and per-row inlier mask.
#[derive(Clone, Debug, PartialEq)]
pub struct Verification {
    /// Best model, or `None` when too few correspondences were given.
    pub model: Option<GeometricModel>,
    /// `true` for rows consistent with `model`.
    pub inliers: Vec<bool>,
}

impl Verification {
    /// Number of inliers.
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&v| v).count()
    }

    /// Inlier fraction (zero for an empty input).
    pub fn inlier_ratio(&self) -> f64 {
        if self.inliers.is_empty() {
            return 0.0;
        }
        self.inlier_count() as f64 / self.inliers.len() as f64
    }
}

/// Robust two-view filter.
pub trait GeometricVerifier {
    /// Returns the model and inlier mask for paired points.
    fn verify(
        &mut self,
        points0: &[Point2],
        points1: &[Point2],
        method: GeometricMethod,
        threshold: f64,
        confidence: f64,
    ) -> TileMatchResult<Verification>;
}

/// Verification threshold for an image whose longer native side is
/// `max_side`, matched with tiles whose longer side is `tile_size`.
///
/// The factor is `floor(max_side / tile_size / 2)`, never below one.
pub fn scaled_threshold(base: f64, max_side: usize, tile_size: usize) -> f64 {
    let factor = (max_side as f64 / tile_size.max(1) as f64 / 2.0).floor();
    base * factor.max(1.0)
}
