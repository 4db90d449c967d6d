//! Working-resolution scaling.
//!
//! Downscaling first halves the image with a 2x2 box filter
//! (`dst = ((a + b + c + d) + 2) / 4`) while the target is at most half the
//! current size, then finishes with bilinear interpolation. Upscaling is
//! bilinear only.

use crate::image::{ImageView, OwnedImage};
use crate::util::{TileMatchError, TileMatchResult};

/// Working-resolution preset applied before tiling and matching.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Quality {
    /// Upsample by 2.
    Highest,
    /// Native resolution.
    #[default]
    High,
    /// Half resolution.
    Medium,
    /// Quarter resolution.
    Low,
    /// Eighth resolution.
    Lowest,
}

impl Quality {
    /// Scale factor from native to working resolution.
    pub fn scale(self) -> f32 {
        match self {
            Quality::Highest => 2.0,
            Quality::High => 1.0,
            Quality::Medium => 0.5,
            Quality::Low => 0.25,
            Quality::Lowest => 0.125,
        }
    }

    /// Working-resolution size for a native size (at least one pixel).
    pub fn working_size(self, width: usize, height: usize) -> (usize, usize) {
        let s = self.scale();
        (
            ((width as f32 * s) as usize).max(1),
            ((height as f32 * s) as usize).max(1),
        )
    }

    /// Resizes a native image to working resolution.
    pub fn apply(self, image: ImageView<'_, u8>) -> TileMatchResult<OwnedImage> {
        if self == Quality::High {
            return OwnedImage::from_view(image);
        }
        let (w, h) = self.working_size(image.width(), image.height());
        resize_bilinear(image, w, h)
    }
}

pub(crate) fn halve(src: ImageView<'_, u8>) -> TileMatchResult<OwnedImage> {
    let dst_width = src.width() / 2;
    let dst_height = src.height() / 2;
    let mut dst = Vec::with_capacity(dst_width * dst_height);
    for y in 0..dst_height {
        let (row0, row1) = match (src.row(y * 2), src.row(y * 2 + 1)) {
            (Some(r0), Some(r1)) => (r0, r1),
            _ => {
                return Err(TileMatchError::BufferTooSmall {
                    needed: (y * 2 + 2) * src.stride(),
                    got: src.as_slice().len(),
                })
            }
        };
        for x in 0..dst_width {
            let sum = u16::from(row0[2 * x])
                + u16::from(row0[2 * x + 1])
                + u16::from(row1[2 * x])
                + u16::from(row1[2 * x + 1]);
            dst.push(((sum + 2) / 4) as u8);
        }
    }
    OwnedImage::new(dst, dst_width, dst_height)
}

fn bilinear(src: ImageView<'_, u8>, width: usize, height: usize) -> TileMatchResult<OwnedImage> {
    let sx = src.width() as f32 / width as f32;
    let sy = src.height() as f32 / height as f32;
    let max_x = (src.width() - 1) as f32;
    let max_y = (src.height() - 1) as f32;
    let mut dst = Vec::with_capacity(width * height);
    for y in 0..height {
        let fy = ((y as f32 + 0.5) * sy - 0.5).clamp(0.0, max_y);
        let y0 = fy.floor() as usize;
        let y1 = (y0 + 1).min(src.height() - 1);
        let wy = fy - y0 as f32;
        let (r0, r1) = match (src.row(y0), src.row(y1)) {
            (Some(r0), Some(r1)) => (r0, r1),
            _ => {
                return Err(TileMatchError::BufferTooSmall {
                    needed: (y1 + 1) * src.stride(),
                    got: src.as_slice().len(),
                })
            }
        };
        for x in 0..width {
            let fx = ((x as f32 + 0.5) * sx - 0.5).clamp(0.0, max_x);
            let x0 = fx.floor() as usize;
            let x1 = (x0 + 1).min(src.width() - 1);
            let wx = fx - x0 as f32;
            let top = r0[x0] as f32 * (1.0 - wx) + r0[x1] as f32 * wx;
            let bottom = r1[x0] as f32 * (1.0 - wx) + r1[x1] as f32 * wx;
            let value = top * (1.0 - wy) + bottom * wy;
            dst.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }
    OwnedImage::new(dst, width, height)
}

/// Resizes an image to `width x height`.
pub fn resize_bilinear(
    src: ImageView<'_, u8>,
    width: usize,
    height: usize,
) -> TileMatchResult<OwnedImage> {
    if width == 0 || height == 0 {
        return Err(TileMatchError::InvalidDimensions { width, height });
    }
    if width == src.width() && height == src.height() {
        return OwnedImage::from_view(src);
    }

    let mut current: Option<OwnedImage> = None;
    loop {
        let view = current.as_ref().map_or(src, |img| img.view());
        if view.width() < width * 2 || view.height() < height * 2 {
            break;
        }
        current = Some(halve(view)?);
    }
    let view = current.as_ref().map_or(src, |img| img.view());
    if view.width() == width && view.height() == height {
        return OwnedImage::from_view(view);
    }
    bilinear(view, width, height)
}
