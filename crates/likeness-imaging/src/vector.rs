//! Grayscale image ↔ feature vector conversion, normalization, averaging.

use crate::ImagingError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Luma};
use likeness_core::{CollaboratorError, FeatureVector, Vectorizer, INTENSITY_RANGE};
use std::path::Path;

/// 16-bit grayscale image buffer.
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Decode an image file as 16-bit grayscale, resized to `size` if given.
pub fn load_gray(path: &Path, size: Option<(u32, u32)>) -> Result<Gray16Image, ImagingError> {
    let img = image::open(path).map_err(|source| ImagingError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(to_gray(&img, size))
}

/// Convert a decoded image to 16-bit grayscale, resized to `size` if given.
pub fn to_gray(img: &DynamicImage, size: Option<(u32, u32)>) -> Gray16Image {
    let gray = img.to_luma16();
    match size {
        Some((w, h)) if gray.dimensions() != (w, h) => {
            image::imageops::resize(&gray, w, h, FilterType::Triangle)
        }
        _ => gray,
    }
}

/// Flatten a grayscale image row by row.
pub fn gray_to_vector(img: &Gray16Image) -> Result<FeatureVector, ImagingError> {
    let (w, h) = img.dimensions();
    let pixels = img.as_raw().iter().map(|&p| f64::from(p)).collect();
    Ok(FeatureVector::new(w as usize, h as usize, pixels)?)
}

/// Stretch a vector's intensities to span the full 16-bit range.
///
/// Flat vectors (every pixel equal) have no range to stretch and are
/// returned unchanged.
pub fn normalize(v: &FeatureVector) -> Result<FeatureVector, ImagingError> {
    let (min, max) = v
        .pixels()
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &p| (lo.min(p), hi.max(p)));

    let span = max - min;
    if v.is_empty() || span <= 0.0 {
        return Ok(v.clone());
    }

    let pixels = v
        .pixels()
        .iter()
        .map(|&p| (p - min) / span * INTENSITY_RANGE)
        .collect();
    Ok(FeatureVector::new(v.width(), v.height(), pixels)?)
}

/// Element-wise mean. All vectors must share the first vector's size.
pub fn average(vectors: &[FeatureVector]) -> Result<FeatureVector, ImagingError> {
    let first = vectors.first().ok_or(ImagingError::EmptySet)?;

    let mut sum = vec![0.0f64; first.pixels().len()];
    for v in vectors {
        if v.dimensions() != first.dimensions() {
            return Err(ImagingError::DimensionMismatch {
                expected: first.dimensions(),
                got: v.dimensions(),
            });
        }
        for (acc, p) in sum.iter_mut().zip(v.pixels()) {
            *acc += p;
        }
    }

    let n = vectors.len() as f64;
    let pixels = sum.into_iter().map(|s| s / n).collect();
    Ok(FeatureVector::new(first.width(), first.height(), pixels)?)
}

/// Vectorizes image files as 16-bit grayscale, resized to a fixed face size
/// so every vector is comparable.
#[derive(Debug, Clone, Copy)]
pub struct GrayVectorizer {
    size: Option<(u32, u32)>,
}

impl GrayVectorizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: Some((width, height)),
        }
    }

    /// Keep each image at its native size.
    pub fn native() -> Self {
        Self { size: None }
    }
}

impl Vectorizer for GrayVectorizer {
    fn vectorize(&self, path: &Path) -> Result<FeatureVector, CollaboratorError> {
        load_gray(path, self.size)
            .and_then(|img| gray_to_vector(&img))
            .map_err(|e| CollaboratorError::Vectorize {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    fn normalize(&self, vectors: &[FeatureVector]) -> Result<Vec<FeatureVector>, CollaboratorError> {
        vectors
            .iter()
            .map(normalize)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| CollaboratorError::Reduce(e.to_string()))
    }

    fn average(&self, vectors: &[FeatureVector]) -> Result<FeatureVector, CollaboratorError> {
        average(vectors).map_err(|e| CollaboratorError::Reduce(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_gray8(dir: &Path, name: &str, w: u32, h: u32, value: u8) -> std::path::PathBuf {
        let path = dir.join(name);
        image::GrayImage::from_pixel(w, h, Luma([value])).save(&path).unwrap();
        path
    }

    #[test]
    fn test_vectorize_file_scales_to_16_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray8(dir.path(), "face.png", 4, 3, 255);

        let v = GrayVectorizer::native().vectorize(&path).unwrap();
        assert_eq!(v.dimensions(), (4, 3));
        assert!(v.pixels().iter().all(|&p| p == 65535.0));
    }

    #[test]
    fn test_vectorize_resizes_to_face_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_gray8(dir.path(), "face.png", 40, 30, 0);

        let v = GrayVectorizer::new(8, 8).vectorize(&path).unwrap();
        assert_eq!(v.dimensions(), (8, 8));
        assert_eq!(v.pixels().len(), 64);
    }

    #[test]
    fn test_vectorize_missing_file() {
        let err = GrayVectorizer::native()
            .vectorize(Path::new("/nonexistent/face.png"))
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Vectorize { .. }));
    }

    #[test]
    fn test_normalize_stretches_range() {
        let v = FeatureVector::new(3, 1, vec![100.0, 150.0, 200.0]).unwrap();
        let n = normalize(&v).unwrap();
        assert_eq!(n.pixels(), &[0.0, 32767.5, 65535.0]);
    }

    #[test]
    fn test_normalize_flat_vector_unchanged() {
        let v = FeatureVector::filled(2, 2, 42.0);
        assert_eq!(normalize(&v).unwrap(), v);
        assert!(normalize(&FeatureVector::empty()).unwrap().is_empty());
    }

    #[test]
    fn test_average() {
        let a = FeatureVector::new(2, 1, vec![0.0, 10.0]).unwrap();
        let b = FeatureVector::new(2, 1, vec![20.0, 30.0]).unwrap();
        let avg = average(&[a, b]).unwrap();
        assert_eq!(avg.pixels(), &[10.0, 20.0]);
    }

    #[test]
    fn test_average_rejects_mixed_sizes() {
        let a = FeatureVector::filled(2, 2, 0.0);
        let b = FeatureVector::filled(1, 4, 0.0);
        assert!(matches!(
            average(&[a, b]),
            Err(ImagingError::DimensionMismatch { .. })
        ));
        assert!(matches!(average(&[]), Err(ImagingError::EmptySet)));
    }

    #[test]
    fn test_vectorizer_normalize_keeps_count() {
        let vs = vec![FeatureVector::filled(1, 1, 1.0), FeatureVector::filled(1, 1, 2.0)];
        assert_eq!(GrayVectorizer::native().normalize(&vs).unwrap().len(), 2);
    }
}
