//! Convenience helpers for loading and writing images via the `image` crate.
//!
//! Available when the `image-io` feature is enabled.

use crate::image::OwnedImage;
use crate::util::{TileMatchError, TileMatchResult};
use std::path::Path;

/// Creates an owned image from a grayscale image buffer.
pub fn owned_from_gray_image(img: &image::GrayImage) -> TileMatchResult<OwnedImage> {
    let width = img.width() as usize;
    let height = img.height() as usize;
    OwnedImage::new(img.as_raw().clone(), width, height)
}

/// Loads an image from disk and converts it to a grayscale owned image.
pub fn load_gray_image<P: AsRef<Path>>(path: P) -> TileMatchResult<OwnedImage> {
    let img = image::open(path).map_err(|err| TileMatchError::ImageIo {
        reason: err.to_string(),
    })?;
    owned_from_gray_image(&img.to_luma8())
}

/// Writes a grayscale image to disk; the format follows the file extension.
pub fn save_gray_image<P: AsRef<Path>>(img: &OwnedImage, path: P) -> TileMatchResult<()> {
    let buffer = image::GrayImage::from_raw(
        img.width() as u32,
        img.height() as u32,
        img.data().to_vec(),
    )
    .ok_or(TileMatchError::BufferTooSmall {
        needed: img.width() * img.height(),
        got: img.data().len(),
    })?;
    buffer.save(path).map_err(|err| TileMatchError::ImageIo {
        reason: err.to_string(),
    })
}
