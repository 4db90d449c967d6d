//! Dense-matching backends and the per-pipeline matching context.
//!
//! A backend turns two match units (whole images or tiles) into pixel
//! correspondences in the units' local frames. Dense-warp predictors and
//! sparse keypoint matchers sit behind the same `MatchBackend` enum, selected
//! by configuration, so stitching and filtering are shared across them.
//!
//! The predictor is not reentrant: a `MatchContext` owns it and every call
//! goes through `&mut self`, so one context drives one pipeline at a time.

mod subpixel;
pub mod warp;
pub mod zncc;

pub use warp::{DenseWarp, SampledMatches, WarpPredictor, WarpSampling};
pub use zncc::{ZnccPredictorConfig, ZnccWarpPredictor};

use crate::correspondence::Correspondences;
use crate::image::ImageView;
use crate::trace::{trace_event, trace_span};
use crate::util::TileMatchResult;
use std::path::Path;

/// One image or tile submitted to a backend.
#[derive(Clone, Copy)]
pub struct MatchUnit<'a> {
    /// Pixel content at working resolution.
    pub image: ImageView<'a, u8>,
    /// On-disk location, for backends that read files.
    pub path: Option<&'a Path>,
}

impl<'a> MatchUnit<'a> {
    /// A unit held only in memory.
    pub fn in_memory(image: ImageView<'a, u8>) -> Self {
        Self { image, path: None }
    }

    /// Unit width in pixels.
    pub fn width(&self) -> usize {
        self.image.width()
    }

    /// Unit height in pixels.
    pub fn height(&self) -> usize {
        self.image.height()
    }
}

/// Backend that matches two units directly into correspondences.
pub trait SparseMatcher {
    /// Returns correspondences in the units' pixel frames.
    fn match_units(
        &mut self,
        a: MatchUnit<'_>,
        b: MatchUnit<'_>,
    ) -> TileMatchResult<Correspondences>;
}

/// Dense-matching backend chosen by configuration.
pub enum MatchBackend {
    /// Warp-field predictor followed by sampling and pixel conversion.
    DenseWarp(Box<dyn WarpPredictor>),
    /// Sparse keypoint matcher.
    Sparse(Box<dyn SparseMatcher>),
}

impl MatchBackend {
    /// Matches two units and returns local pixel correspondences.
    pub fn match_units(
        &mut self,
        a: MatchUnit<'_>,
        b: MatchUnit<'_>,
    ) -> TileMatchResult<Correspondences> {
        match self {
            MatchBackend::DenseWarp(predictor) => {
                let warp = predictor.predict(a, b)?;
                let sampled = predictor.sample(&warp)?;
                let (points_a, points_b) = predictor.to_pixel_coordinates(
                    &sampled,
                    a.height(),
                    a.width(),
                    b.height(),
                    b.width(),
                );
                Correspondences::from_parts(points_a, points_b, sampled.certainty)
            }
            MatchBackend::Sparse(matcher) => matcher.match_units(a, b),
        }
    }
}

/// Compute device the predictor runs on.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Device {
    #[default]
    Cpu,
    /// Accelerator with an ordinal (e.g. `cuda:0`).
    Accelerator(usize),
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

/// Device handle plus predictor, threaded explicitly through every match call.
pub struct MatchContext {
    device: Device,
    backend: MatchBackend,
    calls: usize,
}

impl MatchContext {
    /// Creates a context owning `backend` on `device`.
    pub fn new(device: Device, backend: MatchBackend) -> Self {
        Self {
            device,
            backend,
            calls: 0,
        }
    }

    /// Shorthand for a CPU context around a warp predictor.
    pub fn with_predictor<P: WarpPredictor + 'static>(predictor: P) -> Self {
        Self::new(Device::Cpu, MatchBackend::DenseWarp(Box::new(predictor)))
    }

    /// Device the backend runs on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Number of backend invocations made through this context.
    pub fn predictor_calls(&self) -> usize {
        self.calls
    }

    /// Runs the backend on one unit pair.
    pub fn match_units(
        &mut self,
        a: MatchUnit<'_>,
        b: MatchUnit<'_>,
    ) -> TileMatchResult<Correspondences> {
        let _span = trace_span!("predict", call = self.calls).entered();
        self.calls += 1;
        let out = self.backend.match_units(a, b)?;
        trace_event!("unit_matches", count = out.len());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{MatchBackend, MatchContext, MatchUnit, SparseMatcher};
    use crate::correspondence::{Correspondences, Point2};
    use crate::image::OwnedImage;
    use crate::util::TileMatchResult;

    struct Echo;

    impl SparseMatcher for Echo {
        fn match_units(
            &mut self,
            a: MatchUnit<'_>,
            _b: MatchUnit<'_>,
        ) -> TileMatchResult<Correspondences> {
            let mut c = Correspondences::new();
            let p = Point2::new(a.width() as f32 / 2.0, a.height() as f32 / 2.0);
            c.push(p, p, 1.0);
            Ok(c)
        }
    }

    #[test]
    fn context_counts_backend_calls() {
        let img = OwnedImage::filled(10, 8, 1).unwrap();
        let mut ctx = MatchContext::new(
            super::Device::Accelerator(1),
            MatchBackend::Sparse(Box::new(Echo)),
        );
        assert_eq!(ctx.device().to_string(), "cuda:1");
        let unit = MatchUnit::in_memory(img.view());
        let out = ctx.match_units(unit, unit).unwrap();
        assert_eq!(out.points0()[0], Point2::new(5.0, 4.0));
        ctx.match_units(unit, unit).unwrap();
        assert_eq!(ctx.predictor_calls(), 2);
    }
}
