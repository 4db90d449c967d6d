//! Image views, owned buffers and working-resolution scaling.
//!
//! `ImageView` is a borrowed 2D view into a 1D buffer with an explicit stride.
//! The stride counts elements between the starts of consecutive rows, so a
//! stride larger than the width represents padded rows. ROI slices are zero-copy
//! views into the same backing slice and retain the original stride; the tiler
//! crops tiles through them.

use crate::util::{TileMatchError, TileMatchResult};

#[cfg(feature = "image-io")]
pub mod io;
mod owned;
pub mod resize;

pub use owned::OwnedImage;
pub use resize::{resize_bilinear, Quality};

/// Borrowed 2D image view with an explicit stride.
#[derive(Copy, Clone)]
pub struct ImageView<'a, T> {
    data: &'a [T],
    width: usize,
    height: usize,
    stride: usize,
}

impl<'a, T> ImageView<'a, T> {
    /// Creates a contiguous view with `stride == width`.
    pub fn from_slice(data: &'a [T], width: usize, height: usize) -> TileMatchResult<Self> {
        Self::new(data, width, height, width)
    }

    /// Creates a view with an explicit stride.
    ///
    /// The last row only needs `width` elements, so a strided ROI may end
    /// before the next full row of its parent.
    pub fn new(data: &'a [T], width: usize, height: usize, stride: usize) -> TileMatchResult<Self> {
        if width == 0 || height == 0 {
            return Err(TileMatchError::InvalidDimensions { width, height });
        }
        if stride < width {
            return Err(TileMatchError::InvalidStride { width, stride });
        }
        let needed = (height - 1)
            .checked_mul(stride)
            .and_then(|v| v.checked_add(width))
            .ok_or(TileMatchError::InvalidDimensions { width, height })?;
        if data.len() < needed {
            return Err(TileMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// `(width, height)`.
    pub fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Elements between the starts of consecutive rows.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Backing slice, row padding included.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Element at `(x, y)`, or `None` outside the view.
    pub fn get(&self, x: usize, y: usize) -> Option<&'a T> {
        if x >= self.width {
            return None;
        }
        self.row(y).and_then(|row| row.get(x))
    }

    /// Row `y` without its padding.
    pub fn row(&self, y: usize) -> Option<&'a [T]> {
        if y >= self.height {
            return None;
        }
        let start = y * self.stride;
        self.data.get(start..start + self.width)
    }

    /// Iterates the rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &'a [T]> + '_ {
        (0..self.height).filter_map(move |y| self.row(y))
    }

    /// Zero-copy view of the `width x height` window at `(x, y)`.
    ///
    /// The window must lie entirely inside the image.
    pub fn roi(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> TileMatchResult<ImageView<'a, T>> {
        if width == 0 || height == 0 {
            return Err(TileMatchError::InvalidDimensions { width, height });
        }
        let out_of_bounds = TileMatchError::RoiOutOfBounds {
            x,
            y,
            width,
            height,
            img_width: self.width,
            img_height: self.height,
        };
        let fits_x = x.checked_add(width).is_some_and(|end| end <= self.width);
        let fits_y = y.checked_add(height).is_some_and(|end| end <= self.height);
        if !(fits_x && fits_y) {
            return Err(out_of_bounds);
        }
        let start = y * self.stride + x;
        ImageView::new(&self.data[start..], width, height, self.stride)
    }

    /// Like [`roi`](Self::roi) but clips the window to the image instead of
    /// failing; the tiler uses it for right and bottom edge tiles.
    pub fn roi_clipped(
        &self,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
    ) -> TileMatchResult<ImageView<'a, T>> {
        let clipped_w = width.min(self.width.saturating_sub(x));
        let clipped_h = height.min(self.height.saturating_sub(y));
        if clipped_w == 0 || clipped_h == 0 {
            return Err(TileMatchError::RoiOutOfBounds {
                x,
                y,
                width,
                height,
                img_width: self.width,
                img_height: self.height,
            });
        }
        self.roi(x, y, clipped_w, clipped_h)
    }
}

#[cfg(test)]
mod tests {
    use super::ImageView;
    use crate::util::TileMatchError;

    #[test]
    fn construction_errors() {
        let data = [0u8; 8];
        assert_eq!(
            ImageView::from_slice(&data, 0, 1).err(),
            Some(TileMatchError::InvalidDimensions {
                width: 0,
                height: 1
            })
        );
        assert_eq!(
            ImageView::new(&data, 4, 1, 3).err(),
            Some(TileMatchError::InvalidStride {
                width: 4,
                stride: 3
            })
        );
        assert_eq!(
            ImageView::new(&data[..3], 2, 2, 2).err(),
            Some(TileMatchError::BufferTooSmall { needed: 4, got: 3 })
        );
    }

    #[test]
    fn roi_shares_parent_stride() {
        let data: Vec<u8> = (0u8..16).collect();
        let view = ImageView::from_slice(&data, 4, 4).unwrap();
        let roi = view.roi(1, 1, 2, 2).unwrap();
        assert_eq!(roi.stride(), 4);
        assert_eq!(roi.row(0), Some(&[5u8, 6][..]));
        assert_eq!(roi.get(1, 1), Some(&10));
        assert_eq!(roi.rows().count(), 2);
        assert!(view.roi(3, 3, 2, 1).is_err());
    }

    #[test]
    fn clipped_roi_stops_at_the_edges() {
        let data: Vec<u8> = (0u8..20).collect();
        let view = ImageView::from_slice(&data, 5, 4).unwrap();
        let roi = view.roi_clipped(3, 2, 8, 8).unwrap();
        assert_eq!(roi.size(), (2, 2));
        assert_eq!(roi.get(0, 0), Some(&13));
        assert!(view.roi_clipped(5, 0, 2, 2).is_err());
    }
}
