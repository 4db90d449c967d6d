//! Rounding-based deduplication of stitched correspondences.

use crate::correspondence::Correspondences;
use crate::util::math::quantize;
use std::collections::HashSet;

/// Keeps the first row for every distinct image0 coordinate rounded to
/// `decimals` places. The image1 point and confidence travel with their row.
///
/// Two distinct correspondences whose image0 points round to the same key are
/// merged, and true duplicates straddling a rounding boundary are not; the
/// precision is a tuning knob, not an exact tolerance. Idempotent.
pub fn dedup_by_rounding(c: Correspondences, decimals: u32) -> Correspondences {
    let mut seen = HashSet::with_capacity(c.len());
    let mut out = Correspondences::with_capacity(c.len());
    for (p0, p1, conf) in c.iter() {
        if seen.insert((quantize(p0.x, decimals), quantize(p0.y, decimals))) {
            out.push(p0, p1, conf);
        }
    }
    out
}
