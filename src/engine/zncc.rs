//! CPU block-matching warp predictor based on zero-mean normalized
//! cross-correlation (ZNCC).
//!
//! Prediction runs coarse-to-fine. Both units are halved with a box filter
//! down to a coarse level where the global translation is found by exhaustive
//! ZNCC over all shifts that keep at least half of each axis overlapping. The
//! shift is then refined level by level within one pixel. Finally a regular
//! grid of patches in A is searched in B around the global shift, and each
//! cell's best ZNCC score (with sub-pixel refinement) becomes its warp entry
//! and certainty.

use crate::engine::subpixel::peak_offset;
use crate::engine::warp::{pixels_to_normalized, DenseWarp, WarpPredictor, WarpSampling};
use crate::engine::MatchUnit;
use crate::image::resize::halve;
use crate::image::{ImageView, OwnedImage};
use crate::trace::trace_event;
use crate::util::{TileMatchError, TileMatchResult};

/// Parameters of the ZNCC block-matching predictor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ZnccPredictorConfig {
    /// Spacing of warp cells in A, in pixels.
    pub cell_step: usize,
    /// Half size of the correlation patch (`2r + 1` square).
    pub patch_radius: usize,
    /// Local search radius around the global shift, in pixels.
    pub search_radius: usize,
    /// Maximum number of halvings used for the global shift search.
    pub coarse_levels: usize,
    /// Patches with an intensity standard deviation below this are skipped.
    pub min_std: f32,
    /// Cells scoring below this get zero certainty.
    pub min_score: f32,
    /// Sampling policy applied to the warp field.
    pub sampling: WarpSampling,
}

impl Default for ZnccPredictorConfig {
    fn default() -> Self {
        Self {
            cell_step: 8,
            patch_radius: 5,
            search_radius: 6,
            coarse_levels: 3,
            min_std: 2.0,
            min_score: 0.6,
            sampling: WarpSampling::default(),
        }
    }
}

/// ZNCC block-matching predictor.
#[derive(Clone, Debug, Default)]
pub struct ZnccWarpPredictor {
    cfg: ZnccPredictorConfig,
}

/// Zero-mean patch with its L2 norm.
struct Patch {
    values: Vec<f32>,
    norm: f32,
}

impl Patch {
    fn extract(view: ImageView<'_, u8>, cx: usize, cy: usize, r: usize) -> Option<Self> {
        if cx < r || cy < r || cx + r >= view.width() || cy + r >= view.height() {
            return None;
        }
        let side = 2 * r + 1;
        let mut values = Vec::with_capacity(side * side);
        for y in cy - r..=cy + r {
            let row = view.row(y)?;
            values.extend(row[cx - r..=cx + r].iter().map(|&v| f32::from(v)));
        }
        let mean = values.iter().sum::<f32>() / values.len() as f32;
        let mut sum_sq = 0.0f32;
        for v in values.iter_mut() {
            *v -= mean;
            sum_sq += *v * *v;
        }
        Some(Self {
            values,
            norm: sum_sq.sqrt(),
        })
    }

    fn std(&self) -> f32 {
        self.norm / (self.values.len() as f32).sqrt()
    }

    /// ZNCC between this patch and the patch of `view` centred at `(cx, cy)`.
    fn score(&self, view: ImageView<'_, u8>, cx: usize, cy: usize, r: usize) -> f32 {
        match Patch::extract(view, cx, cy, r) {
            Some(other) if other.norm > 1e-6 && self.norm > 1e-6 => {
                let dot: f32 = self
                    .values
                    .iter()
                    .zip(other.values.iter())
                    .map(|(a, b)| a * b)
                    .sum();
                dot / (self.norm * other.norm)
            }
            _ => f32::NEG_INFINITY,
        }
    }
}

/// ZNCC over the overlap of `a` and `b` shifted by `(dx, dy)` (b = a + shift).
fn overlap_zncc(a: ImageView<'_, u8>, b: ImageView<'_, u8>, dx: isize, dy: isize) -> Option<f32> {
    let x0 = 0isize.max(-dx);
    let y0 = 0isize.max(-dy);
    let x1 = (a.width() as isize).min(b.width() as isize - dx);
    let y1 = (a.height() as isize).min(b.height() as isize - dy);
    if x1 - x0 < 2 || y1 - y0 < 2 {
        return None;
    }

    let n = ((x1 - x0) * (y1 - y0)) as f64;
    let (mut sa, mut sb, mut saa, mut sbb, mut sab) = (0.0f64, 0.0f64, 0.0f64, 0.0f64, 0.0f64);
    for y in y0..y1 {
        let row_a = a.row(y as usize)?;
        let row_b = b.row((y + dy) as usize)?;
        for x in x0..x1 {
            let va = f64::from(row_a[x as usize]);
            let vb = f64::from(row_b[(x + dx) as usize]);
            sa += va;
            sb += vb;
            saa += va * va;
            sbb += vb * vb;
            sab += va * vb;
        }
    }
    let var_a = saa - sa * sa / n;
    let var_b = sbb - sb * sb / n;
    if var_a <= 1e-8 || var_b <= 1e-8 {
        return None;
    }
    Some(((sab - sa * sb / n) / (var_a * var_b).sqrt()) as f32)
}

fn best_shift(
    a: ImageView<'_, u8>,
    b: ImageView<'_, u8>,
    x_range: (isize, isize),
    y_range: (isize, isize),
) -> Option<(isize, isize)> {
    let mut best: Option<(f32, isize, isize)> = None;
    for dy in y_range.0..=y_range.1 {
        for dx in x_range.0..=x_range.1 {
            if let Some(score) = overlap_zncc(a, b, dx, dy) {
                if best.map_or(true, |(s, _, _)| score > s) {
                    best = Some((score, dx, dy));
                }
            }
        }
    }
    best.map(|(_, dx, dy)| (dx, dy))
}

impl ZnccWarpPredictor {
    /// Creates a predictor with the given parameters.
    pub fn new(cfg: ZnccPredictorConfig) -> TileMatchResult<Self> {
        if cfg.cell_step == 0 || cfg.patch_radius == 0 {
            return Err(TileMatchError::InvalidConfig {
                reason: "cell_step and patch_radius must be > 0",
            });
        }
        Ok(Self { cfg })
    }

    /// Returns the predictor parameters.
    pub fn config(&self) -> &ZnccPredictorConfig {
        &self.cfg
    }

    /// Estimates the translation taking A into B, coarse-to-fine.
    pub fn estimate_shift(
        &self,
        a: ImageView<'_, u8>,
        b: ImageView<'_, u8>,
    ) -> TileMatchResult<(isize, isize)> {
        let mut levels_a: Vec<OwnedImage> = vec![OwnedImage::from_view(a)?];
        let mut levels_b: Vec<OwnedImage> = vec![OwnedImage::from_view(b)?];
        while levels_a.len() <= self.cfg.coarse_levels {
            let (la, lb) = match (levels_a.last(), levels_b.last()) {
                (Some(la), Some(lb)) => (la.view(), lb.view()),
                _ => break,
            };
            if la.width().min(la.height()).min(lb.width()).min(lb.height()) < 32 {
                break;
            }
            levels_a.push(halve(la)?);
            levels_b.push(halve(lb)?);
        }

        let (coarse_a, coarse_b) = match (levels_a.last(), levels_b.last()) {
            (Some(la), Some(lb)) => (la.view(), lb.view()),
            _ => return Ok((0, 0)),
        };
        let min_w = coarse_a.width().min(coarse_b.width()) as isize;
        let min_h = coarse_a.height().min(coarse_b.height()) as isize;
        let x_range = (
            -(coarse_a.width() as isize) + min_w / 2,
            coarse_b.width() as isize - min_w / 2,
        );
        let y_range = (
            -(coarse_a.height() as isize) + min_h / 2,
            coarse_b.height() as isize - min_h / 2,
        );
        let Some(mut shift) = best_shift(coarse_a, coarse_b, x_range, y_range) else {
            return Ok((0, 0));
        };

        for level in (0..levels_a.len() - 1).rev() {
            let (dx, dy) = (shift.0 * 2, shift.1 * 2);
            shift = best_shift(
                levels_a[level].view(),
                levels_b[level].view(),
                (dx - 1, dx + 1),
                (dy - 1, dy + 1),
            )
            .unwrap_or((dx, dy));
        }
        Ok(shift)
    }

    fn match_cell(
        &self,
        patch: &Patch,
        b: ImageView<'_, u8>,
        guess_x: isize,
        guess_y: isize,
    ) -> Option<(f32, f32, f32)> {
        let r = self.cfg.patch_radius;
        let sr = self.cfg.search_radius as isize;
        let mut best: Option<(f32, usize, usize)> = None;
        for y in guess_y - sr..=guess_y + sr {
            for x in guess_x - sr..=guess_x + sr {
                if x < 0 || y < 0 {
                    continue;
                }
                let score = patch.score(b, x as usize, y as usize, r);
                if score.is_finite() && best.map_or(true, |(s, _, _)| score > s) {
                    best = Some((score, x as usize, y as usize));
                }
            }
        }
        let (score, bx, by) = best?;

        let mut s = [[f32::NEG_INFINITY; 3]; 3];
        for (row, oy) in (-1isize..=1).enumerate() {
            for (col, ox) in (-1isize..=1).enumerate() {
                let (x, y) = (bx as isize + ox, by as isize + oy);
                if x >= 0 && y >= 0 {
                    s[row][col] = patch.score(b, x as usize, y as usize, r);
                }
            }
        }
        let (dx, dy) = peak_offset(s);
        Some((bx as f32 + dx, by as f32 + dy, score))
    }
}

impl WarpPredictor for ZnccWarpPredictor {
    fn predict(&mut self, a: MatchUnit<'_>, b: MatchUnit<'_>) -> TileMatchResult<DenseWarp> {
        let (shift_x, shift_y) = self.estimate_shift(a.image, b.image)?;
        let r = self.cfg.patch_radius;
        let step = self.cfg.cell_step;
        let (wa, ha) = (a.width(), a.height());
        if wa <= 2 * r || ha <= 2 * r {
            return DenseWarp::new(0, 0, Vec::new(), Vec::new());
        }
        let grid_w = (wa - 2 * r - 1) / step + 1;
        let grid_h = (ha - 2 * r - 1) / step + 1;

        let mut warp = Vec::with_capacity(grid_w * grid_h);
        let mut certainty = Vec::with_capacity(grid_w * grid_h);
        for gy in 0..grid_h {
            for gx in 0..grid_w {
                let cx = r + gx * step;
                let cy = r + gy * step;
                let na = [
                    pixels_to_normalized(cx as f32, wa),
                    pixels_to_normalized(cy as f32, ha),
                ];
                let matched = Patch::extract(a.image, cx, cy, r)
                    .filter(|patch| patch.std() >= self.cfg.min_std)
                    .and_then(|patch| {
                        self.match_cell(
                            &patch,
                            b.image,
                            cx as isize + shift_x,
                            cy as isize + shift_y,
                        )
                    });
                match matched {
                    Some((bx, by, score)) if score >= self.cfg.min_score => {
                        warp.push([
                            na[0],
                            na[1],
                            pixels_to_normalized(bx, b.width()),
                            pixels_to_normalized(by, b.height()),
                        ]);
                        certainty.push(score.clamp(0.0, 1.0));
                    }
                    _ => {
                        warp.push([na[0], na[1], na[0], na[1]]);
                        certainty.push(0.0);
                    }
                }
            }
        }

        trace_event!(
            "zncc_warp",
            cells = certainty.len(),
            shift_x = shift_x,
            shift_y = shift_y
        );
        DenseWarp::new(grid_w, grid_h, warp, certainty)
    }

    fn sampling(&self) -> WarpSampling {
        self.cfg.sampling
    }
}

#[cfg(test)]
mod tests {
    use super::{ZnccPredictorConfig, ZnccWarpPredictor};
    use crate::engine::{MatchBackend, MatchUnit};
    use crate::image::OwnedImage;

    /// Bilinearly interpolated random lattice with 4 px cells.
    fn texture(width: usize, height: usize, seed: u64) -> OwnedImage {
        use rand::{rngs::SmallRng, Rng, SeedableRng};
        let cell = 4usize;
        let (lw, lh) = (width / cell + 2, height / cell + 2);
        let mut rng = SmallRng::seed_from_u64(seed);
        let lattice: Vec<f32> = (0..lw * lh).map(|_| rng.random_range(0.0..255.0)).collect();
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let (fx, fy) = (x as f32 / cell as f32, y as f32 / cell as f32);
                let (x0, y0) = (fx as usize, fy as usize);
                let (wx, wy) = (fx - x0 as f32, fy - y0 as f32);
                let at = |xx: usize, yy: usize| lattice[yy * lw + xx];
                let top = at(x0, y0) * (1.0 - wx) + at(x0 + 1, y0) * wx;
                let bottom = at(x0, y0 + 1) * (1.0 - wx) + at(x0 + 1, y0 + 1) * wx;
                data.push((top * (1.0 - wy) + bottom * wy) as u8);
            }
        }
        OwnedImage::new(data, width, height).unwrap()
    }

    #[test]
    fn recovers_integer_translation() {
        let big = texture(180, 160, 0);
        let a = OwnedImage::from_view(big.view().roi(10, 20, 128, 112).unwrap()).unwrap();
        let b = OwnedImage::from_view(big.view().roi(22, 14, 128, 112).unwrap()).unwrap();
        let predictor = ZnccWarpPredictor::default();
        let shift = predictor.estimate_shift(a.view(), b.view()).unwrap();
        assert_eq!(shift, (-12, 6));
    }

    #[test]
    fn identical_units_map_points_onto_themselves() {
        let img = texture(80, 64, 3);
        let mut backend = MatchBackend::DenseWarp(Box::new(
            ZnccWarpPredictor::new(ZnccPredictorConfig::default()).unwrap(),
        ));
        let unit = MatchUnit::in_memory(img.view());
        let out = backend.match_units(unit, unit).unwrap();
        assert!(out.len() > 20);
        for (p0, p1, c) in out.iter() {
            assert!((p0.x - p1.x).abs() <= 0.5 && (p0.y - p1.y).abs() <= 0.5);
            assert!(c > 0.99);
        }
    }
}
