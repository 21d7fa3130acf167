//! Feature vector → PNG rendering for inspection.

use crate::vector::Gray16Image;
use crate::ImagingError;
use likeness_core::{CollaboratorError, FeatureVector, Renderer, INTENSITY_RANGE};
use std::path::Path;

/// Convert a vector back into a 16-bit grayscale image. Intensities are
/// rounded and clamped into `[0, 65535]`.
pub fn to_image(v: &FeatureVector) -> Result<Gray16Image, ImagingError> {
    if !v.has_area() {
        return Err(ImagingError::EmptyVector);
    }
    let too_large = || ImagingError::TooLarge {
        width: v.width(),
        height: v.height(),
    };
    let width = u32::try_from(v.width()).map_err(|_| too_large())?;
    let height = u32::try_from(v.height()).map_err(|_| too_large())?;

    let raw: Vec<u16> = v
        .pixels()
        .iter()
        .map(|&p| p.round().clamp(0.0, INTENSITY_RANGE) as u16)
        .collect();

    Gray16Image::from_raw(width, height, raw).ok_or_else(too_large)
}

/// Writes vectors as 16-bit grayscale PNG files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngRenderer;

impl PngRenderer {
    fn write(vector: &FeatureVector, path: &Path) -> Result<(), ImagingError> {
        to_image(vector)?
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|source| ImagingError::Image {
                path: path.to_path_buf(),
                source,
            })
    }
}

impl Renderer for PngRenderer {
    fn render(&self, vector: &FeatureVector, path: &Path) -> Result<(), CollaboratorError> {
        Self::write(vector, path).map_err(|e| CollaboratorError::Render {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        tracing::debug!(path = %path.display(), "rendered vector");
        Ok(())
    }
}
