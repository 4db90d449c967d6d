//! Seeded RANSAC over the linear two-view models.

use super::models::{fit_fundamental, fit_homography, GeometricModel};
use super::{GeometricMethod, GeometricVerifier, Verification};
use crate::correspondence::Point2;
use crate::trace::{trace_event, trace_span};
use crate::util::{TileMatchError, TileMatchResult};
use rand::rngs::SmallRng;
use rand::seq::index;
use rand::SeedableRng;
#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Iteration limits and seed for [`RansacVerifier`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RansacConfig {
    /// Hard upper bound on hypotheses.
    pub max_iterations: usize,
    /// Hypotheses drawn before the adaptive stop may trigger.
    pub min_iterations: usize,
    /// Seed of the sampling generator; every call restarts from it.
    pub seed: u64,
}

impl Default for RansacConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10_000,
            min_iterations: 32,
            seed: 0,
        }
    }
}

/// Reference verifier: minimal-sample RANSAC with a refit on the inliers.
#[derive(Clone, Debug, Default)]
pub struct RansacVerifier {
    cfg: RansacConfig,
}

impl RansacVerifier {
    /// Creates a verifier.
    pub fn new(cfg: RansacConfig) -> TileMatchResult<Self> {
        if cfg.max_iterations == 0 {
            return Err(TileMatchError::InvalidConfig {
                reason: "max_iterations must be positive",
            });
        }
        Ok(Self { cfg })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &RansacConfig {
        &self.cfg
    }
}

fn fit(method: GeometricMethod, p0: &[Point2], p1: &[Point2]) -> Option<GeometricModel> {
    match method {
        GeometricMethod::Fundamental => fit_fundamental(p0, p1).map(GeometricModel::Fundamental),
        GeometricMethod::Homography => fit_homography(p0, p1).map(GeometricModel::Homography),
    }
}

#[cfg(not(feature = "rayon"))]
fn score(model: &GeometricModel, p0: &[Point2], p1: &[Point2], thresh_sq: f64) -> Vec<bool> {
    p0.iter()
        .zip(p1.iter())
        .map(|(&a, &b)| model.error(a, b) <= thresh_sq)
        .collect()
}

#[cfg(feature = "rayon")]
fn score(model: &GeometricModel, p0: &[Point2], p1: &[Point2], thresh_sq: f64) -> Vec<bool> {
    p0.par_iter()
        .zip(p1.par_iter())
        .map(|(&a, &b)| model.error(a, b) <= thresh_sq)
        .collect()
}

fn count(mask: &[bool]) -> usize {
    mask.iter().filter(|&&v| v).count()
}

/// Hypotheses needed to draw one all-inlier sample with `confidence`.
fn required_iterations(inlier_ratio: f64, sample_size: usize, confidence: f64) -> usize {
    let good = inlier_ratio.powi(sample_size as i32);
    if good >= 1.0 - f64::EPSILON {
        return 0;
    }
    if good <= f64::EPSILON {
        return usize::MAX;
    }
    let n = (1.0 - confidence).ln() / (1.0 - good).ln();
    if n.is_finite() && n >= 0.0 {
        n.ceil() as usize
    } else {
        usize::MAX
    }
}

fn select(points: &[Point2], mask: &[bool]) -> Vec<Point2> {
    points
        .iter()
        .zip(mask.iter())
        .filter_map(|(p, &m)| m.then_some(*p))
        .collect()
}

impl GeometricVerifier for RansacVerifier {
    fn verify(
        &mut self,
        points0: &[Point2],
        points1: &[Point2],
        method: GeometricMethod,
        threshold: f64,
        confidence: f64,
    ) -> TileMatchResult<Verification> {
        if points0.len() != points1.len() {
            return Err(TileMatchError::LengthMismatch {
                left: points0.len(),
                right: points1.len(),
                context: "verify points0/points1",
            });
        }
        if !(threshold > 0.0) {
            return Err(TileMatchError::InvalidConfig {
                reason: "verification threshold must be positive",
            });
        }
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(TileMatchError::InvalidConfig {
                reason: "verification confidence must be in (0, 1)",
            });
        }

        let n = points0.len();
        let sample_size = method.sample_size();
        if n < sample_size {
            return Ok(Verification {
                model: None,
                inliers: vec![false; n],
            });
        }

        let _span = trace_span!("ransac", points = n, method = ?method).entered();
        let thresh_sq = threshold * threshold;
        let mut rng = SmallRng::seed_from_u64(self.cfg.seed);
        let mut best: Option<(GeometricModel, Vec<bool>, usize)> = None;
        let mut needed = self.cfg.max_iterations;
        let mut iterations = 0;
        let mut s0 = Vec::with_capacity(sample_size);
        let mut s1 = Vec::with_capacity(sample_size);

        while iterations < needed.max(self.cfg.min_iterations).min(self.cfg.max_iterations) {
            iterations += 1;
            s0.clear();
            s1.clear();
            for i in index::sample(&mut rng, n, sample_size).iter() {
                s0.push(points0[i]);
                s1.push(points1[i]);
            }
            let Some(model) = fit(method, &s0, &s1) else {
                continue;
            };
            let mask = score(&model, points0, points1, thresh_sq);
            let inliers = count(&mask);
            if best.as_ref().map_or(true, |(_, _, b)| inliers > *b) {
                let ratio = inliers as f64 / n as f64;
                needed = required_iterations(ratio, sample_size, confidence);
                best = Some((model, mask, inliers));
                if inliers == n {
                    break;
                }
            }
        }

        let Some((mut model, mut mask, mut inliers)) = best else {
            trace_event!("ransac_degenerate", iterations = iterations);
            return Ok(Verification {
                model: None,
                inliers: vec![false; n],
            });
        };

        if inliers >= sample_size {
            let in0 = select(points0, &mask);
            let in1 = select(points1, &mask);
            if let Some(refit) = fit(method, &in0, &in1) {
                let refit_mask = score(&refit, points0, points1, thresh_sq);
                let refit_inliers = count(&refit_mask);
                if refit_inliers >= inliers {
                    model = refit;
                    mask = refit_mask;
                    inliers = refit_inliers;
                }
            }
        }

        trace_event!("ransac_done", iterations = iterations, inliers = inliers);
        Ok(Verification {
            model: Some(model),
            inliers: mask,
        })
    }
}
