//! Pass-through detector for images that are already face crops.

use crate::vector::{load_gray, to_gray, Gray16Image};
use crate::ImagingError;
use likeness_core::{CollaboratorError, Detector, DynamicImage};
use std::path::{Path, PathBuf};

/// Treats the whole input image as a single face.
///
/// The image is converted to 16-bit grayscale, resized to the configured
/// face size, and written into `out_dir` as `<stem>_face_0.png`. If that
/// name is taken the crop becomes `<stem>_<n>_face_0.png`, so sources that
/// share a stem never overwrite each other's crops.
#[derive(Debug, Clone, Copy)]
pub struct WholeImageDetector {
    size: Option<(u32, u32)>,
}

impl WholeImageDetector {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Some((width, height)),
        }
    }

    pub fn native() -> Self {
        Self { size: None }
    }

    fn write_crop(
        gray: &Gray16Image,
        stem: &str,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, ImagingError> {
        let path = unused_crop_path(out_dir, stem);
        gray.save_with_format(&path, image::ImageFormat::Png)
            .map_err(|source| ImagingError::Image {
                path: path.clone(),
                source,
            })?;
        Ok(vec![path])
    }
}

fn unused_crop_path(out_dir: &Path, stem: &str) -> PathBuf {
    let mut path = out_dir.join(format!("{stem}_face_0.png"));
    let mut n = 1usize;
    while path.exists() {
        path = out_dir.join(format!("{stem}_{n}_face_0.png"));
        n += 1;
    }
    path
}

impl Detector for WholeImageDetector {
    fn detect(&self, image: &Path, out_dir: &Path) -> Result<Vec<PathBuf>, CollaboratorError> {
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());

        let crops = load_gray(image, self.size)
            .and_then(|gray| Self::write_crop(&gray, &stem, out_dir))
            .map_err(|e| CollaboratorError::Detect {
                path: image.to_path_buf(),
                reason: e.to_string(),
            })?;
        tracing::debug!(image = %image.display(), crops = ?crops, "detection finished");
        Ok(crops)
    }

    fn detect_image(
        &self,
        image: &DynamicImage,
        label: &str,
        out_dir: &Path,
    ) -> Result<Vec<PathBuf>, CollaboratorError> {
        let gray = to_gray(image, self.size);
        let crops =
            Self::write_crop(&gray, label, out_dir).map_err(|e| CollaboratorError::Detect {
                path: PathBuf::from(label),
                reason: e.to_string(),
            })?;
        tracing::debug!(label, crops = ?crops, "detection finished");
        Ok(crops)
    }
}
