//! File-backed store using two JSON documents.
//!
//! The feature file maps image names to `{"keypoints": [[x, y], ...]}`.
//! The match file nests datasets as `image0 -> image1 -> [[i0, i1], ...]`.
//! The feature file must exist when the store is opened; the match file is
//! created on first flush. Documents are written to a sibling temp file and
//! renamed into place.

use crate::correspondence::Point2;
use crate::store::{FeatureStore, MatchIndexArray};
use crate::util::{TileMatchError, TileMatchResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ImageFeatures {
    keypoints: Vec<[f32; 2]>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct FeatureDocument {
    images: BTreeMap<String, ImageFeatures>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
struct MatchDocument {
    groups: BTreeMap<String, BTreeMap<String, MatchIndexArray>>,
}

/// JSON feature/match store.
#[derive(Debug)]
pub struct JsonFeatureStore {
    feature_path: PathBuf,
    match_path: PathBuf,
    keypoints: BTreeMap<String, Vec<Point2>>,
    matches: MatchDocument,
    dirty_features: bool,
    dirty_matches: bool,
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> TileMatchResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, serde_json::to_vec(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

impl JsonFeatureStore {
    /// Writes an empty feature document at `path`.
    pub fn create_feature_file<P: AsRef<Path>>(path: P) -> TileMatchResult<()> {
        write_atomic(path.as_ref(), &FeatureDocument::default())
    }

    /// Opens a store; the feature file must already exist.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        feature_path: P,
        match_path: Q,
    ) -> TileMatchResult<Self> {
        let feature_path = feature_path.as_ref().to_path_buf();
        let match_path = match_path.as_ref().to_path_buf();
        if !feature_path.exists() {
            return Err(TileMatchError::MissingFeatureFile {
                path: feature_path.display().to_string(),
            });
        }

        let features: FeatureDocument = serde_json::from_slice(&fs::read(&feature_path)?)?;
        let keypoints = features
            .images
            .into_iter()
            .map(|(name, f)| (name, f.keypoints.into_iter().map(Point2::from).collect()))
            .collect();
        let matches = if match_path.exists() {
            serde_json::from_slice(&fs::read(&match_path)?)?
        } else {
            MatchDocument::default()
        };

        Ok(Self {
            feature_path,
            match_path,
            keypoints,
            matches,
            dirty_features: false,
            dirty_matches: false,
        })
    }

    /// Location of the feature document.
    pub fn feature_path(&self) -> &Path {
        &self.feature_path
    }

    /// Location of the match document.
    pub fn match_path(&self) -> &Path {
        &self.match_path
    }
}

impl FeatureStore for JsonFeatureStore {
    fn keypoints(&self, image: &str) -> Option<&[Point2]> {
        self.keypoints.get(image).map(Vec::as_slice)
    }

    fn append_keypoints(&mut self, image: &str, points: &[Point2]) -> TileMatchResult<Range<usize>> {
        let entry = self.keypoints.entry(image.to_owned()).or_default();
        let start = entry.len();
        entry.extend_from_slice(points);
        self.dirty_features = true;
        Ok(start..entry.len())
    }

    fn matches(&self, image0: &str, image1: &str) -> Option<&MatchIndexArray> {
        self.matches
            .groups
            .get(image0)
            .and_then(|group| group.get(image1))
    }

    fn write_matches(
        &mut self,
        image0: &str,
        image1: &str,
        matches: MatchIndexArray,
    ) -> TileMatchResult<()> {
        let group = self.matches.groups.entry(image0.to_owned()).or_default();
        if group.contains_key(image1) {
            return Err(TileMatchError::DuplicateMatches {
                image0: image0.to_owned(),
                image1: image1.to_owned(),
            });
        }
        group.insert(image1.to_owned(), matches);
        self.dirty_matches = true;
        Ok(())
    }

    fn flush(&mut self) -> TileMatchResult<()> {
        if self.dirty_features {
            let doc = FeatureDocument {
                images: self
                    .keypoints
                    .iter()
                    .map(|(name, pts)| {
                        let keypoints = pts.iter().map(|&p| p.into()).collect();
                        (name.clone(), ImageFeatures { keypoints })
                    })
                    .collect(),
            };
            write_atomic(&self.feature_path, &doc)?;
            self.dirty_features = false;
        }
        if self.dirty_matches {
            write_atomic(&self.match_path, &self.matches)?;
            self.dirty_matches = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::JsonFeatureStore;
    use crate::correspondence::Point2;
    use crate::store::{FeatureStore, MatchIndexArray};
    use crate::util::TileMatchError;
    use std::path::PathBuf;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tilematch-json-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn open_requires_feature_file() {
        let dir = temp_dir("missing");
        let err = JsonFeatureStore::open(dir.join("features.json"), dir.join("matches.json"))
            .err()
            .unwrap();
        assert!(matches!(err, TileMatchError::MissingFeatureFile { .. }));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn flushed_data_survives_reopen() {
        let dir = temp_dir("reopen");
        let features = dir.join("features.json");
        let matches = dir.join("matches.json");
        JsonFeatureStore::create_feature_file(&features).unwrap();

        let mut store = JsonFeatureStore::open(&features, &matches).unwrap();
        store
            .append_keypoints("a.png", &[Point2::new(1.5, 2.5)])
            .unwrap();
        store
            .append_keypoints("b.png", &[Point2::new(3.0, 4.0)])
            .unwrap();
        store
            .write_matches("a.png", "b.png", MatchIndexArray::identity(0, 0, 1))
            .unwrap();
        store.flush().unwrap();

        let reopened = JsonFeatureStore::open(&features, &matches).unwrap();
        assert_eq!(reopened.keypoints("a.png"), Some(&[Point2::new(1.5, 2.5)][..]));
        assert_eq!(
            reopened.matches("a.png", "b.png").map(|m| m.rows().to_vec()),
            Some(vec![[0, 0]])
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
