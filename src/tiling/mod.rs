//! Overlapping fixed-size tiling of working-resolution images.
//!
//! Tiles are laid out row-major with stride `tile - overlap` on each axis.
//! Tiles touching the right or bottom edge are zero-padded up to the full
//! tile size; the padding is recorded so stitched points falling inside it can
//! be rejected. Every source pixel lies inside at least one tile.

mod scratch;

pub use scratch::TileScratch;

use crate::image::{ImageView, OwnedImage};
use crate::trace::{trace_event, trace_span};
use crate::util::math::window_count;
use crate::util::{TileMatchError, TileMatchResult};

/// Tile geometry in working-resolution pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TilingConfig {
    /// Tile width.
    pub tile_width: usize,
    /// Tile height.
    pub tile_height: usize,
    /// Overlap between neighbouring tiles (same on both axes).
    pub overlap: usize,
}

impl Default for TilingConfig {
    fn default() -> Self {
        Self {
            tile_width: 448,
            tile_height: 448,
            overlap: 0,
        }
    }
}

impl TilingConfig {
    /// Checks that the tile is non-empty and the overlap leaves a positive stride.
    pub fn validate(&self) -> TileMatchResult<()> {
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(TileMatchError::InvalidDimensions {
                width: self.tile_width,
                height: self.tile_height,
            });
        }
        if self.overlap >= self.tile_width || self.overlap >= self.tile_height {
            return Err(TileMatchError::InvalidConfig {
                reason: "tile_overlap must be smaller than the tile size",
            });
        }
        Ok(())
    }

    fn step_x(&self) -> usize {
        self.tile_width - self.overlap
    }

    fn step_y(&self) -> usize {
        self.tile_height - self.overlap
    }

    /// Number of tile columns and rows for an image of the given size.
    pub fn grid_shape(&self, width: usize, height: usize) -> (usize, usize) {
        (
            window_count(width, self.tile_width, self.step_x()),
            window_count(height, self.tile_height, self.step_y()),
        )
    }
}

/// Top-left corner of a tile in its parent image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileOrigin {
    pub x: usize,
    pub y: usize,
}

/// Pixels added on the trailing edges to reach the full tile size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TilePadding {
    pub right: usize,
    pub bottom: usize,
}

/// A fixed-size crop of a working-resolution image.
#[derive(Clone, Debug)]
pub struct Tile {
    index: usize,
    origin: TileOrigin,
    padding: TilePadding,
    image: OwnedImage,
}

impl Tile {
    /// Row-major index in the parent grid.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Offset of the tile's top-left pixel in the parent image.
    pub fn origin(&self) -> TileOrigin {
        self.origin
    }

    /// Trailing padding.
    pub fn padding(&self) -> TilePadding {
        self.padding
    }

    /// Padded tile content.
    pub fn image(&self) -> &OwnedImage {
        &self.image
    }

    /// Width of the tile without padding.
    pub fn valid_width(&self) -> usize {
        self.image.width() - self.padding.right
    }

    /// Height of the tile without padding.
    pub fn valid_height(&self) -> usize {
        self.image.height() - self.padding.bottom
    }

    /// Whether a parent-image point lies in the non-padded part of the tile.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let x0 = self.origin.x as f32;
        let y0 = self.origin.y as f32;
        x >= x0
            && y >= y0
            && x < x0 + self.valid_width() as f32
            && y < y0 + self.valid_height() as f32
    }
}

/// All tiles of one image.
#[derive(Clone, Debug)]
pub struct TileGrid {
    tiles: Vec<Tile>,
    cols: usize,
    rows: usize,
    image_width: usize,
    image_height: usize,
}

impl TileGrid {
    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Whether the grid has no tiles (never true for a successfully built grid).
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Grid shape as `(cols, rows)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Size of the tiled (unpadded) source image.
    pub fn image_size(&self) -> (usize, usize) {
        (self.image_width, self.image_height)
    }

    /// Returns the tile with the given index.
    pub fn get(&self, index: usize) -> TileMatchResult<&Tile> {
        self.tiles.get(index).ok_or(TileMatchError::IndexOutOfBounds {
            index,
            len: self.tiles.len(),
            context: "tile",
        })
    }

    /// Iterates tiles in index order.
    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }

    /// Indices of all tiles whose non-padded area contains the point.
    pub fn tiles_containing(&self, x: f32, y: f32) -> impl Iterator<Item = usize> + '_ {
        self.tiles
            .iter()
            .filter(move |tile| tile.contains(x, y))
            .map(Tile::index)
    }
}

/// Splits images into overlapping tiles.
#[derive(Clone, Debug)]
pub struct Tiler {
    cfg: TilingConfig,
}

impl Tiler {
    /// Creates a tiler after validating its geometry.
    pub fn new(cfg: TilingConfig) -> TileMatchResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg })
    }

    /// Returns the tiling configuration.
    pub fn config(&self) -> &TilingConfig {
        &self.cfg
    }

    /// Computes the tile grid of an image.
    pub fn compute(&self, image: ImageView<'_, u8>) -> TileMatchResult<TileGrid> {
        let width = image.width();
        let height = image.height();
        let (cols, rows) = self.cfg.grid_shape(width, height);
        let _span = trace_span!("tiling", cols = cols, rows = rows).entered();

        let mut tiles = Vec::with_capacity(cols * rows);
        for row in 0..rows {
            for col in 0..cols {
                let x = col * self.cfg.step_x();
                let y = row * self.cfg.step_y();
                let valid = image.roi_clipped(x, y, self.cfg.tile_width, self.cfg.tile_height)?;

                let mut content = OwnedImage::filled(self.cfg.tile_width, self.cfg.tile_height, 0)?;
                content.blit(valid, 0, 0);
                tiles.push(Tile {
                    index: tiles.len(),
                    origin: TileOrigin { x, y },
                    padding: TilePadding {
                        right: self.cfg.tile_width - valid.width(),
                        bottom: self.cfg.tile_height - valid.height(),
                    },
                    image: content,
                });
            }
        }

        trace_event!("tiles", count = tiles.len());
        Ok(TileGrid {
            tiles,
            cols,
            rows,
            image_width: width,
            image_height: height,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Tiler, TilingConfig};
    use crate::image::OwnedImage;
    use crate::util::TileMatchError;

    fn gradient(width: usize, height: usize) -> OwnedImage {
        let data = (0..width * height)
            .map(|i| ((i % width) * 7 + (i / width) * 3) as u8)
            .collect();
        OwnedImage::new(data, width, height).unwrap()
    }

    #[test]
    fn rejects_overlap_not_smaller_than_tile() {
        let err = Tiler::new(TilingConfig {
            tile_width: 32,
            tile_height: 32,
            overlap: 32,
        })
        .err()
        .unwrap();
        assert!(matches!(err, TileMatchError::InvalidConfig { .. }));
    }

    #[test]
    fn border_tiles_are_padded_with_zeros() {
        let img = gradient(50, 30);
        let tiler = Tiler::new(TilingConfig {
            tile_width: 32,
            tile_height: 32,
            overlap: 8,
        })
        .unwrap();
        let grid = tiler.compute(img.view()).unwrap();
        assert_eq!(grid.shape(), (2, 1));

        let last = grid.get(1).unwrap();
        assert_eq!((last.origin().x, last.origin().y), (24, 0));
        assert_eq!(last.padding().right, 6);
        assert_eq!(last.padding().bottom, 2);
        assert_eq!(last.image().width(), 32);
        assert_eq!(last.image().view().get(26, 0).copied(), Some(0));
        assert_eq!(last.image().view().get(31, 31).copied(), Some(0));
        assert_eq!(
            last.image().view().get(0, 0).copied(),
            img.view().get(24, 0).copied()
        );
    }

    #[test]
    fn tile_content_matches_source_pixels() {
        let img = gradient(100, 70);
        let tiler = Tiler::new(TilingConfig {
            tile_width: 40,
            tile_height: 30,
            overlap: 10,
        })
        .unwrap();
        let grid = tiler.compute(img.view()).unwrap();
        for tile in grid.iter() {
            let o = tile.origin();
            for y in 0..tile.valid_height() {
                for x in 0..tile.valid_width() {
                    assert_eq!(
                        tile.image().view().get(x, y),
                        img.view().get(o.x + x, o.y + y)
                    );
                }
            }
        }
    }

    #[test]
    fn tiles_containing_reports_overlaps() {
        let img = gradient(60, 20);
        let tiler = Tiler::new(TilingConfig {
            tile_width: 32,
            tile_height: 32,
            overlap: 8,
        })
        .unwrap();
        let grid = tiler.compute(img.view()).unwrap();
        assert_eq!(grid.tiles_containing(26.0, 5.0).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(grid.tiles_containing(10.0, 5.0).collect::<Vec<_>>(), vec![0]);
        assert_eq!(grid.shape(), (3, 1));
        assert_eq!(grid.tiles_containing(50.0, 5.0).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(grid.tiles_containing(59.5, 5.0).collect::<Vec<_>>(), vec![2]);
        assert!(grid.tiles_containing(60.0, 5.0).next().is_none());
    }
}
