//! Owned contiguous grayscale image buffer.

use crate::image::ImageView;
use crate::util::{TileMatchError, TileMatchResult};

/// Owned contiguous grayscale image buffer (`stride == width`).
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedImage {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl OwnedImage {
    /// Wraps a row-major buffer whose length is exactly `width * height`.
    pub fn new(data: Vec<u8>, width: usize, height: usize) -> TileMatchResult<Self> {
        if width == 0 || height == 0 {
            return Err(TileMatchError::InvalidDimensions { width, height });
        }
        let needed = width
            .checked_mul(height)
            .ok_or(TileMatchError::InvalidDimensions { width, height })?;
        if data.len() < needed {
            return Err(TileMatchError::BufferTooSmall {
                needed,
                got: data.len(),
            });
        }
        if data.len() > needed {
            return Err(TileMatchError::InvalidDimensions { width, height });
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Creates an image filled with a constant value.
    pub fn filled(width: usize, height: usize, value: u8) -> TileMatchResult<Self> {
        let len = width
            .checked_mul(height)
            .ok_or(TileMatchError::InvalidDimensions { width, height })?;
        Self::new(vec![value; len], width, height)
    }

    /// Copies a (possibly strided) view into a contiguous buffer.
    pub fn from_view(view: ImageView<'_, u8>) -> TileMatchResult<Self> {
        let width = view.width();
        let height = view.height();
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let row = view.row(y).ok_or(TileMatchError::BufferTooSmall {
                needed: (y + 1) * view.stride(),
                got: view.as_slice().len(),
            })?;
            data.extend_from_slice(row);
        }
        Self::new(data, width, height)
    }

    /// Copies `src` into this image with its top-left corner at `(x, y)`.
    ///
    /// Pixels of `src` falling outside this image are dropped.
    pub(crate) fn blit(&mut self, src: ImageView<'_, u8>, x: usize, y: usize) {
        if x >= self.width || y >= self.height {
            return;
        }
        let copy_w = src.width().min(self.width - x);
        let copy_h = src.height().min(self.height - y);
        for row_idx in 0..copy_h {
            if let Some(src_row) = src.row(row_idx) {
                let start = (y + row_idx) * self.width + x;
                self.data[start..start + copy_w].copy_from_slice(&src_row[..copy_w]);
            }
        }
    }

    /// Returns the image width in pixels.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Returns the image height in pixels.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the row-major pixel buffer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the image and returns its pixel buffer.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Returns a borrowed view of the image.
    pub fn view(&self) -> ImageView<'_, u8> {
        ImageView {
            data: &self.data,
            width: self.width,
            height: self.height,
            stride: self.width,
        }
    }
}
