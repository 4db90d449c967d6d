//! Keypoint and match persistence.
//!
//! Stores are keyed by image name. Keypoints are append-only; each
//! `(image0, image1)` match dataset is written once and never replaced.

mod json;

pub use json::JsonFeatureStore;

use crate::correspondence::Point2;
use crate::util::{TileMatchError, TileMatchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;

/// N x 2 keypoint indices: row `i` pairs `rows[i][0]` in image0 with
/// `rows[i][1]` in image1.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchIndexArray {
    rows: Vec<[usize; 2]>,
}

impl MatchIndexArray {
    /// Wraps explicit rows.
    pub fn from_rows(rows: Vec<[usize; 2]>) -> Self {
        Self { rows }
    }

    /// `n` rows `[offset0 + i, offset1 + i]`.
    pub fn identity(offset0: usize, offset1: usize, n: usize) -> Self {
        Self {
            rows: (0..n).map(|i| [offset0 + i, offset1 + i]).collect(),
        }
    }

    /// Keeps rows whose mask entry is `true`.
    pub fn retain_mask(&mut self, mask: &[bool]) -> TileMatchResult<()> {
        if mask.len() != self.rows.len() {
            return Err(TileMatchError::LengthMismatch {
                left: self.rows.len(),
                right: mask.len(),
                context: "matches/mask",
            });
        }
        let mut keep = mask.iter().copied();
        self.rows.retain(|_| keep.next().unwrap_or(false));
        Ok(())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row slice.
    pub fn rows(&self) -> &[[usize; 2]] {
        &self.rows
    }
}

/// Persistent per-image keypoints and per-pair matches.
pub trait FeatureStore {
    /// Keypoints stored for `image`, if any.
    fn keypoints(&self, image: &str) -> Option<&[Point2]>;

    /// Number of keypoints stored for `image` (zero when absent).
    fn keypoint_count(&self, image: &str) -> usize {
        self.keypoints(image).map_or(0, <[Point2]>::len)
    }

    /// Appends keypoints and returns the index range they occupy.
    fn append_keypoints(&mut self, image: &str, points: &[Point2]) -> TileMatchResult<Range<usize>>;

    /// Match dataset for a pair, if written.
    fn matches(&self, image0: &str, image1: &str) -> Option<&MatchIndexArray>;

    /// Whether a match dataset exists for the pair.
    fn has_matches(&self, image0: &str, image1: &str) -> bool {
        self.matches(image0, image1).is_some()
    }

    /// Writes the pair's dataset; fails if it already exists.
    fn write_matches(
        &mut self,
        image0: &str,
        image1: &str,
        matches: MatchIndexArray,
    ) -> TileMatchResult<()>;

    /// Persists pending changes.
    fn flush(&mut self) -> TileMatchResult<()>;
}

/// Resolves the keypoint coordinates referenced by a match array.
pub fn lookup_points(
    store: &dyn FeatureStore,
    image0: &str,
    image1: &str,
    matches: &MatchIndexArray,
) -> TileMatchResult<(Vec<Point2>, Vec<Point2>)> {
    let kp0 = store
        .keypoints(image0)
        .ok_or_else(|| TileMatchError::UnknownImage {
            name: image0.to_owned(),
        })?;
    let kp1 = store
        .keypoints(image1)
        .ok_or_else(|| TileMatchError::UnknownImage {
            name: image1.to_owned(),
        })?;
    let mut p0 = Vec::with_capacity(matches.len());
    let mut p1 = Vec::with_capacity(matches.len());
    for &[i0, i1] in matches.rows() {
        p0.push(*kp0.get(i0).ok_or(TileMatchError::IndexOutOfBounds {
            index: i0,
            len: kp0.len(),
            context: "keypoints of image0",
        })?);
        p1.push(*kp1.get(i1).ok_or(TileMatchError::IndexOutOfBounds {
            index: i1,
            len: kp1.len(),
            context: "keypoints of image1",
        })?);
    }
    Ok((p0, p1))
}

/// Keypoints and matches held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFeatureStore {
    keypoints: BTreeMap<String, Vec<Point2>>,
    matches: BTreeMap<String, BTreeMap<String, MatchIndexArray>>,
}

impl MemoryFeatureStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn keypoints(&self, image: &str) -> Option<&[Point2]> {
        self.keypoints.get(image).map(Vec::as_slice)
    }

    fn append_keypoints(&mut self, image: &str, points: &[Point2]) -> TileMatchResult<Range<usize>> {
        let entry = self.keypoints.entry(image.to_owned()).or_default();
        let start = entry.len();
        entry.extend_from_slice(points);
        Ok(start..entry.len())
    }

    fn matches(&self, image0: &str, image1: &str) -> Option<&MatchIndexArray> {
        self.matches.get(image0).and_then(|group| group.get(image1))
    }

    fn write_matches(
        &mut self,
        image0: &str,
        image1: &str,
        matches: MatchIndexArray,
    ) -> TileMatchResult<()> {
        let group = self.matches.entry(image0.to_owned()).or_default();
        if group.contains_key(image1) {
            return Err(TileMatchError::DuplicateMatches {
                image0: image0.to_owned(),
                image1: image1.to_owned(),
            });
        }
        group.insert(image1.to_owned(), matches);
        Ok(())
    }

    fn flush(&mut self) -> TileMatchResult<()> {
        Ok(())
    }
}
