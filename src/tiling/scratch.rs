//! Addressable storage for tiles during one pair's matching.
//!
//! Tiles live in memory by default. Backends that only accept file paths get
//! a disk-backed scratch directory (`image-io` feature), laid out as
//! `<output_dir>/tiles/<image0>-<image1>/<image>/tile_<index>.png`. An existing
//! per-image directory is reused as is. The pair directory, and the `tiles`
//! directory once it is empty, are removed when the scratch is dropped unless
//! it was created with `keep = true`, so cleanup runs on success, early return
//! and error alike.

use crate::tiling::TileGrid;
use crate::util::TileMatchResult;
use std::path::{Path, PathBuf};

/// Tile storage for one image pair.
#[derive(Debug)]
pub enum TileScratch {
    /// Tiles are only held in memory; no paths are available.
    InMemory,
    /// Tiles are written as PNG files below a per-pair directory.
    #[cfg(feature = "image-io")]
    Disk { root: PathBuf, keep: bool },
}

impl TileScratch {
    /// In-memory scratch.
    pub fn in_memory() -> Self {
        TileScratch::InMemory
    }

    /// Disk scratch rooted at `<output_dir>/tiles/<pair_key>`.
    #[cfg(feature = "image-io")]
    pub fn disk(output_dir: &Path, pair_key: &str, keep: bool) -> Self {
        TileScratch::Disk {
            root: output_dir.join("tiles").join(pair_key),
            keep,
        }
    }

    /// Directory holding the tiles of `image_name`, if disk-backed.
    pub fn image_dir(&self, image_name: &str) -> Option<PathBuf> {
        match self {
            TileScratch::InMemory => {
                let _ = image_name;
                None
            }
            #[cfg(feature = "image-io")]
            TileScratch::Disk { root, .. } => Some(root.join(image_name)),
        }
    }

    /// Path of one tile, if disk-backed.
    pub fn tile_path(&self, image_name: &str, index: usize) -> Option<PathBuf> {
        self.image_dir(image_name)
            .map(|dir| dir.join(format!("tile_{index}.png")))
    }

    /// Makes every tile of `grid` addressable.
    ///
    /// For disk scratch the tiles are written unless the image directory
    /// already exists.
    pub fn materialize(&self, image_name: &str, grid: &TileGrid) -> TileMatchResult<()> {
        match self {
            TileScratch::InMemory => {
                let _ = (image_name, grid);
                Ok(())
            }
            #[cfg(feature = "image-io")]
            TileScratch::Disk { root, .. } => {
                let dir = root.join(image_name);
                if dir.exists() {
                    return Ok(());
                }
                std::fs::create_dir_all(&dir)?;
                for tile in grid.iter() {
                    let path = dir.join(format!("tile_{}.png", tile.index()));
                    crate::image::io::save_gray_image(tile.image(), path)?;
                }
                crate::trace::trace_debug!("tiles written", count = grid.len());
                Ok(())
            }
        }
    }

    /// Scratch root, if disk-backed.
    pub fn root(&self) -> Option<&Path> {
        match self {
            TileScratch::InMemory => None,
            #[cfg(feature = "image-io")]
            TileScratch::Disk { root, .. } => Some(root.as_path()),
        }
    }
}

impl Drop for TileScratch {
    fn drop(&mut self) {
        #[cfg(feature = "image-io")]
        if let TileScratch::Disk { root, keep: false } = self {
            if root.exists() {
                if let Err(err) = std::fs::remove_dir_all(&*root) {
                    crate::trace::trace_debug!(
                        "failed to remove tile scratch",
                        error = err.to_string().as_str()
                    );
                }
            }
            // The shared `tiles` directory goes too once no other pair uses it;
            // `remove_dir` refuses non-empty directories.
            if let Some(tiles) = root.parent() {
                let _ = std::fs::remove_dir(tiles);
            }
        }
    }
}
