//! Point correspondences between two images.

use crate::util::{TileMatchError, TileMatchResult};
use serde::{Deserialize, Serialize};

/// A 2D point in pixel coordinates (`x` is the column, `y` the row).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point2 {
    pub x: f32,
    pub y: f32,
}

impl Point2 {
    /// Creates a point.
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Translates the point.
    pub fn offset(self, dx: f32, dy: f32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Scales both coordinates independently.
    pub fn scale(self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy)
    }
}

impl From<[f32; 2]> for Point2 {
    fn from(value: [f32; 2]) -> Self {
        Self::new(value[0], value[1])
    }
}

impl From<Point2> for [f32; 2] {
    fn from(value: Point2) -> Self {
        [value.x, value.y]
    }
}

/// Parallel arrays of matched points and their confidences.
///
/// Row `i` states that `points0[i]` in image0 corresponds to `points1[i]` in
/// image1 with confidence `confidence[i]`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Correspondences {
    points0: Vec<Point2>,
    points1: Vec<Point2>,
    confidence: Vec<f32>,
}

impl Correspondences {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set with room for `capacity` rows.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points0: Vec::with_capacity(capacity),
            points1: Vec::with_capacity(capacity),
            confidence: Vec::with_capacity(capacity),
        }
    }

    /// Builds a set from parallel arrays of equal length.
    pub fn from_parts(
        points0: Vec<Point2>,
        points1: Vec<Point2>,
        confidence: Vec<f32>,
    ) -> TileMatchResult<Self> {
        if points0.len() != points1.len() {
            return Err(TileMatchError::LengthMismatch {
                left: points0.len(),
                right: points1.len(),
                context: "points0/points1",
            });
        }
        if points0.len() != confidence.len() {
            return Err(TileMatchError::LengthMismatch {
                left: points0.len(),
                right: confidence.len(),
                context: "points/confidence",
            });
        }
        Ok(Self {
            points0,
            points1,
            confidence,
        })
    }

    /// Appends one row.
    pub fn push(&mut self, p0: Point2, p1: Point2, confidence: f32) {
        self.points0.push(p0);
        self.points1.push(p1);
        self.confidence.push(confidence);
    }

    /// Appends all rows of `other`, preserving order.
    pub fn extend(&mut self, other: Correspondences) {
        self.points0.extend(other.points0);
        self.points1.extend(other.points1);
        self.confidence.extend(other.confidence);
    }

    /// Keeps the rows whose mask entry is `true`.
    pub fn retain_mask(&mut self, mask: &[bool]) -> TileMatchResult<()> {
        if mask.len() != self.len() {
            return Err(TileMatchError::LengthMismatch {
                left: self.len(),
                right: mask.len(),
                context: "correspondences/mask",
            });
        }
        let mut keep = mask.iter().copied();
        self.points0.retain(|_| keep.next().unwrap_or(false));
        let mut keep = mask.iter().copied();
        self.points1.retain(|_| keep.next().unwrap_or(false));
        let mut keep = mask.iter().copied();
        self.confidence.retain(|_| keep.next().unwrap_or(false));
        Ok(())
    }

    /// Applies `f0` to every image0 point and `f1` to every image1 point.
    pub fn map_points(&mut self, f0: impl Fn(Point2) -> Point2, f1: impl Fn(Point2) -> Point2) {
        for p in self.points0.iter_mut() {
            *p = f0(*p);
        }
        for p in self.points1.iter_mut() {
            *p = f1(*p);
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.points0.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.points0.is_empty()
    }

    /// Image0 points.
    pub fn points0(&self) -> &[Point2] {
        &self.points0
    }

    /// Image1 points.
    pub fn points1(&self) -> &[Point2] {
        &self.points1
    }

    /// Per-row confidences.
    pub fn confidence(&self) -> &[f32] {
        &self.confidence
    }

    /// Iterates `(point0, point1, confidence)` rows.
    pub fn iter(&self) -> impl Iterator<Item = (Point2, Point2, f32)> + '_ {
        self.points0
            .iter()
            .zip(self.points1.iter())
            .zip(self.confidence.iter())
            .map(|((p0, p1), c)| (*p0, *p1, *c))
    }

    /// Splits into `(points0, points1, confidence)`.
    pub fn into_parts(self) -> (Vec<Point2>, Vec<Point2>, Vec<f32>) {
        (self.points0, self.points1, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::{Correspondences, Point2};
    use crate::util::TileMatchError;

    #[test]
    fn from_parts_rejects_mismatched_lengths() {
        let err = Correspondences::from_parts(vec![Point2::new(0.0, 0.0)], vec![], vec![1.0])
            .err()
            .unwrap();
        assert!(matches!(err, TileMatchError::LengthMismatch { .. }));
    }

    #[test]
    fn retain_mask_keeps_rows_together() {
        let mut c = Correspondences::new();
        for i in 0..4 {
            let v = i as f32;
            c.push(Point2::new(v, v), Point2::new(10.0 + v, v), v / 10.0);
        }
        c.retain_mask(&[true, false, false, true]).unwrap();
        let rows: Vec<_> = c.iter().collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], (Point2::new(3.0, 3.0), Point2::new(13.0, 3.0), 0.3));
    }
}
