//! likeness-imaging — Image-backed collaborators for the likeness core.
//!
//! Provides a grayscale vectorizer, a PNG renderer, and a pass-through
//! detector for pre-cropped faces, all built on the `image` crate.

pub mod detect;
pub mod render;
pub mod vector;

pub use detect::WholeImageDetector;
pub use render::PngRenderer;
pub use vector::{GrayVectorizer, Gray16Image};

use likeness_core::VectorError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    #[error("image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("no vectors to reduce")]
    EmptySet,
    #[error("cannot render an empty vector")]
    EmptyVector,
    #[error("vector too large for an image: {width}x{height}")]
    TooLarge { width: usize, height: usize },
    #[error("dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error(transparent)]
    Vector(#[from] VectorError),
}
