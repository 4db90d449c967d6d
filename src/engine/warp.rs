//! Dense warp fields and their conversion to pixel correspondences.
//!
//! A warp field stores, for every sample cell, a correspondence in normalized
//! coordinates (`[-1, 1]` on both axes, `-1` at the left/top edge) plus a
//! certainty. Conversion to pixels follows `x_px = w / 2 * (x_n + 1)`.

use crate::correspondence::Point2;
use crate::util::{TileMatchError, TileMatchResult};

/// Per-cell correspondences `[xa, ya, xb, yb]` in normalized coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DenseWarp {
    width: usize,
    height: usize,
    warp: Vec<[f32; 4]>,
    certainty: Vec<f32>,
}

impl DenseWarp {
    /// Builds a warp field of `width x height` cells.
    pub fn new(
        width: usize,
        height: usize,
        warp: Vec<[f32; 4]>,
        certainty: Vec<f32>,
    ) -> TileMatchResult<Self> {
        let needed = width
            .checked_mul(height)
            .ok_or(TileMatchError::InvalidDimensions { width, height })?;
        if warp.len() != needed {
            return Err(TileMatchError::LengthMismatch {
                left: needed,
                right: warp.len(),
                context: "warp cells",
            });
        }
        if certainty.len() != needed {
            return Err(TileMatchError::LengthMismatch {
                left: needed,
                right: certainty.len(),
                context: "certainty cells",
            });
        }
        Ok(Self {
            width,
            height,
            warp,
            certainty,
        })
    }

    /// Grid width in cells.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Grid height in cells.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Row-major normalized correspondences.
    pub fn warp(&self) -> &[[f32; 4]] {
        &self.warp
    }

    /// Row-major certainties.
    pub fn certainty(&self) -> &[f32] {
        &self.certainty
    }
}

/// Correspondences drawn from a warp field, still normalized.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampledMatches {
    pub matches: Vec<[f32; 4]>,
    pub certainty: Vec<f32>,
}

/// Sampling policy for turning a warp field into a correspondence list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WarpSampling {
    /// Maximum number of correspondences returned.
    pub num_samples: usize,
    /// Cells below this certainty are never sampled.
    pub min_certainty: f32,
}

impl Default for WarpSampling {
    fn default() -> Self {
        Self {
            num_samples: 10_000,
            min_certainty: 0.05,
        }
    }
}

/// Draws up to `num_samples` confident cells, evenly spread over the
/// confident set in row-major order. Deterministic.
pub fn sample_warp(warp: &DenseWarp, sampling: WarpSampling) -> SampledMatches {
    let confident: Vec<usize> = warp
        .certainty
        .iter()
        .enumerate()
        .filter(|(_, &c)| c.is_finite() && c >= sampling.min_certainty)
        .map(|(idx, _)| idx)
        .collect();

    let take = confident.len().min(sampling.num_samples);
    let mut out = SampledMatches {
        matches: Vec::with_capacity(take),
        certainty: Vec::with_capacity(take),
    };
    if take == 0 {
        return out;
    }
    for k in 0..take {
        let idx = confident[k * confident.len() / take];
        out.matches.push(warp.warp[idx]);
        out.certainty.push(warp.certainty[idx]);
    }
    out
}

/// Converts normalized correspondences to pixel coordinates of A and B.
pub fn normalized_to_pixels(
    matches: &SampledMatches,
    h_a: usize,
    w_a: usize,
    h_b: usize,
    w_b: usize,
) -> (Vec<Point2>, Vec<Point2>) {
    let to_px = |n: f32, size: usize| size as f32 / 2.0 * (n + 1.0);
    matches
        .matches
        .iter()
        .map(|m| {
            (
                Point2::new(to_px(m[0], w_a), to_px(m[1], h_a)),
                Point2::new(to_px(m[2], w_b), to_px(m[3], h_b)),
            )
        })
        .unzip()
}

/// Converts a pixel coordinate to the normalized range.
pub fn pixels_to_normalized(px: f32, size: usize) -> f32 {
    2.0 * px / size as f32 - 1.0
}

/// A dense predictor producing warp fields.
///
/// `sample` and `to_pixel_coordinates` have default implementations; a
/// predictor only needs to override them when its output layout differs.
pub trait WarpPredictor {
    /// Predicts the warp field and certainty between two units.
    fn predict(
        &mut self,
        a: super::MatchUnit<'_>,
        b: super::MatchUnit<'_>,
    ) -> TileMatchResult<DenseWarp>;

    /// Sampling policy used by the default `sample`.
    fn sampling(&self) -> WarpSampling {
        WarpSampling::default()
    }

    /// Draws correspondences from a warp field.
    fn sample(&mut self, warp: &DenseWarp) -> TileMatchResult<SampledMatches> {
        Ok(sample_warp(warp, self.sampling()))
    }

    /// Converts sampled correspondences to pixel coordinates.
    fn to_pixel_coordinates(
        &self,
        matches: &SampledMatches,
        h_a: usize,
        w_a: usize,
        h_b: usize,
        w_b: usize,
    ) -> (Vec<Point2>, Vec<Point2>) {
        normalized_to_pixels(matches, h_a, w_a, h_b, w_b)
    }
}
