//! Error types for tilematch.

use thiserror::Error;

/// Result alias for tilematch operations.
pub type TileMatchResult<T> = std::result::Result<T, TileMatchError>;

/// Errors that can occur while tiling, matching, verifying or persisting.
#[derive(Debug, Error)]
pub enum TileMatchError {
    /// Image or tile dimensions are zero or overflow.
    #[error("invalid dimensions: {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },
    /// The backing buffer is shorter than the declared layout.
    #[error("buffer too small: needed {needed} elements, got {got}")]
    BufferTooSmall { needed: usize, got: usize },
    /// Row stride is smaller than the row width.
    #[error("invalid stride {stride} for width {width}")]
    InvalidStride { width: usize, stride: usize },
    /// A region of interest does not fit inside the image.
    #[error(
        "roi ({x}, {y}, {width}x{height}) out of bounds for {img_width}x{img_height} image"
    )]
    RoiOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        img_width: usize,
        img_height: usize,
    },
    /// A configuration value is outside its valid range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// The feature file declared for the pair does not exist.
    #[error("feature file {path} does not exist")]
    MissingFeatureFile { path: String },
    /// Tile selection produced more pairs than the configured ceiling.
    #[error(
        "too many tile pairs ({count}, max {max}) to match; matching would be too slow and \
         may be inaccurate. Lower the working resolution with a lower quality setting"
    )]
    TooManyTilePairs { count: usize, max: usize },
    /// A match dataset already exists for this image pair.
    #[error("matches for pair {image0} - {image1} already exist")]
    DuplicateMatches { image0: String, image1: String },
    /// The store has no entry for an image.
    #[error("no keypoints stored for image {name}")]
    UnknownImage { name: String },
    /// Paired arrays have different lengths.
    #[error("length mismatch for {context}: {left} vs {right}")]
    LengthMismatch {
        left: usize,
        right: usize,
        context: &'static str,
    },
    /// An index refers past the end of a collection.
    #[error("index {index} out of bounds for {context} of length {len}")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// The dense predictor failed.
    #[error("predictor failure: {reason}")]
    Predictor { reason: String },
    /// Geometric verification could not run.
    #[error("geometric verification failed: {reason}")]
    Verification { reason: String },
    /// Filesystem access failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// A store document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Image decoding or encoding failed.
    #[cfg(feature = "image-io")]
    #[error("image io error: {reason}")]
    ImageIo { reason: String },
}

// io and serde errors are not comparable; every variant displays all of its
// fields, so the rendered message stands in for field equality.
impl PartialEq for TileMatchError {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
            && self.to_string() == other.to_string()
    }
}
