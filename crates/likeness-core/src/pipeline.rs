//! Collaborator interfaces the core consumes but does not implement:
//! face detection, vectorization, and rendering.

use crate::types::FeatureVector;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("face detection failed for {}: {reason}", .path.display())]
    Detect { path: PathBuf, reason: String },
    #[error("vectorization failed for {}: {reason}", .path.display())]
    Vectorize { path: PathBuf, reason: String },
    #[error("vector reduction failed: {0}")]
    Reduce(String),
    #[error("render failed for {}: {reason}", .path.display())]
    Render { path: PathBuf, reason: String },
}

/// Crops candidate faces out of an image.
pub trait Detector: Send {
    /// Write one image file per detected face into `out_dir` and return
    /// their paths, in detection order.
    fn detect(&self, image: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, CollaboratorError>;

    /// Like [`Detector::detect`], for an image already decoded in memory.
    /// `label` stands in for the file name: it prefixes the crop names and
    /// identifies the source in errors.
    fn detect_image(
        &self,
        image: &DynamicImage,
        label: &str,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, CollaboratorError>;
}

/// Turns face crops into feature vectors and reduces sets of them.
pub trait Vectorizer: Send {
    fn vectorize(&self, path: &Path) -> Result<FeatureVector, CollaboratorError>;

    /// Per-vector normalized form. Must return exactly one vector per input.
    fn normalize(&self, vectors: &[FeatureVector]) -> Result<Vec<FeatureVector>, CollaboratorError>;

    /// Element-wise mean of the set.
    fn average(&self, vectors: &[FeatureVector]) -> Result<FeatureVector, CollaboratorError>;
}

/// Writes a feature vector to an image file for human inspection.
pub trait Renderer: Send {
    fn render(&self, vector: &FeatureVector, path: &Path) -> Result<(), CollaboratorError>;
}
