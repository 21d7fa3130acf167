//! Scalar distances between feature vectors.
//!
//! [`mean_difference_score`] is the metric recognition matches on. The
//! other two are standalone alternatives and are not wired into matching.

use crate::types::FeatureVector;
use thiserror::Error;

/// Full range of a 16-bit intensity; scores are normalized by it.
pub const INTENSITY_RANGE: f64 = 65535.0;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    #[error("dimension mismatch: {left:?} vs {right:?}")]
    DimensionMismatch {
        left: (usize, usize),
        right: (usize, usize),
    },
    #[error("no vectors to compare against")]
    EmptySet,
}

fn check_dimensions(a: &FeatureVector, b: &FeatureVector) -> Result<(), MetricError> {
    if a.dimensions() != b.dimensions() {
        return Err(MetricError::DimensionMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    Ok(())
}

/// Element-wise `a - b`.
pub fn difference(a: &FeatureVector, b: &FeatureVector) -> Result<FeatureVector, MetricError> {
    check_dimensions(a, b)?;
    let pixels = a
        .pixels()
        .iter()
        .zip(b.pixels())
        .map(|(x, y)| x - y)
        .collect();
    Ok(a.with_pixels(pixels))
}

/// Absolute mean intensity of `v`, as a fraction of [`INTENSITY_RANGE`].
///
/// Returns 0.0 for an empty vector.
pub fn normalized_mean(v: &FeatureVector) -> f64 {
    let count = match v.width().checked_mul(v.height()) {
        Some(count) if count > 0 => count,
        _ => return 0.0,
    };
    let sum: f64 = v.pixels().iter().sum();
    (sum / count as f64 / INTENSITY_RANGE).abs()
}

/// `|mean(a - b)| / 65535`. Symmetric in its arguments.
pub fn mean_difference_score(a: &FeatureVector, b: &FeatureVector) -> Result<f64, MetricError> {
    Ok(normalized_mean(&difference(a, b)?))
}

/// Root-mean-square positional distance of `probe` against a set of vectors.
///
/// For each pixel `i`, the signed differences `faces[j][i] - probe[i]` are
/// summed over the set; the result is `sqrt(sum_i (t_i / n_pixels)^2)`
/// divided by the number of vectors in the set.
pub fn rms_distance(faces: &[FeatureVector], probe: &FeatureVector) -> Result<f64, MetricError> {
    if faces.is_empty() {
        return Err(MetricError::EmptySet);
    }
    for face in faces {
        check_dimensions(face, probe)?;
    }

    let n_pixels = probe.pixels().len();
    if n_pixels == 0 {
        return Ok(0.0);
    }

    let mut distance = 0.0f64;
    for (i, &p) in probe.pixels().iter().enumerate() {
        let t: f64 = faces.iter().map(|f| f.pixels()[i] - p).sum();
        distance += (t / n_pixels as f64).powi(2);
    }

    Ok(distance.sqrt() / faces.len() as f64)
}

/// Levenshtein edit distance treating every pixel as a discrete symbol,
/// compared by exact equality.
///
/// This is not a meaningful metric for continuous intensities: two pixels
/// that differ by a rounding error count as a substitution. Kept as an
/// isolated utility only.
pub fn pixel_edit_distance(a: &[f64], b: &[f64]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, x) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, y) in b.iter().enumerate() {
            let cost = if x == y { 0 } else { 1 };
            curr[j + 1] = (curr[j] + 1).min(prev[j + 1] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec2x2(values: [f64; 4]) -> FeatureVector {
        FeatureVector::new(2, 2, values.to_vec()).unwrap()
    }

    #[test]
    fn test_difference_elementwise() {
        let a = vec2x2([10.0, 20.0, 30.0, 40.0]);
        let b = vec2x2([1.0, 2.0, 3.0, 4.0]);
        let d = difference(&a, &b).unwrap();
        assert_eq!(d.pixels(), &[9.0, 18.0, 27.0, 36.0]);
        assert_eq!(d.dimensions(), (2, 2));
    }

    #[test]
    fn test_difference_dimension_mismatch() {
        let a = vec2x2([0.0; 4]);
        let b = FeatureVector::filled(4, 1, 0.0);
        assert_eq!(
            difference(&a, &b).unwrap_err(),
            MetricError::DimensionMismatch {
                left: (2, 2),
                right: (4, 1)
            }
        );
    }

    #[test]
    fn test_normalized_mean_empty() {
        assert_eq!(normalized_mean(&FeatureVector::empty()), 0.0);
    }

    #[test]
    fn test_normalized_mean_takes_absolute_value() {
        let v = vec2x2([-2.0, -2.0, -2.0, -2.0]);
        assert!((normalized_mean(&v) - 2.0 / INTENSITY_RANGE).abs() < 1e-12);
    }

    #[test]
    fn test_score_is_symmetric() {
        let a = vec2x2([10.0, 250.0, 3.0, 4000.0]);
        let b = vec2x2([7.0, 9.0, 65535.0, 12.0]);
        let ab = mean_difference_score(&a, &b).unwrap();
        let ba = mean_difference_score(&b, &a).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_score_close_vectors() {
        let probe = vec2x2([12.0; 4]);
        let average = vec2x2([10.0; 4]);
        let score = mean_difference_score(&probe, &average).unwrap();
        assert!((score - 2.0 / 65535.0).abs() < 1e-12, "got {score}");
    }

    #[test]
    fn test_rms_distance_single_face() {
        // One face, 2 pixels, each off by 4: t = [4, 4], (4/2)^2 * 2 = 8.
        let faces = vec![FeatureVector::new(2, 1, vec![14.0, 14.0]).unwrap()];
        let probe = FeatureVector::new(2, 1, vec![10.0, 10.0]).unwrap();
        let d = rms_distance(&faces, &probe).unwrap();
        assert!((d - 8.0f64.sqrt()).abs() < 1e-12, "got {d}");
    }

    #[test]
    fn test_rms_distance_divides_by_set_size() {
        let faces = vec![
            FeatureVector::new(1, 1, vec![12.0]).unwrap(),
            FeatureVector::new(1, 1, vec![12.0]).unwrap(),
        ];
        let probe = FeatureVector::new(1, 1, vec![10.0]).unwrap();
        // t = 4, sqrt(16) / 2 = 2
        assert!((rms_distance(&faces, &probe).unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_rms_distance_identical_is_zero() {
        let v = vec2x2([1.0, 2.0, 3.0, 4.0]);
        assert_eq!(rms_distance(&[v.clone()], &v).unwrap(), 0.0);
    }

    #[test]
    fn test_rms_distance_errors() {
        let probe = vec2x2([0.0; 4]);
        assert_eq!(rms_distance(&[], &probe).unwrap_err(), MetricError::EmptySet);
        let other = FeatureVector::filled(1, 1, 0.0);
        assert!(matches!(
            rms_distance(&[other], &probe),
            Err(MetricError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_edit_distance_basics() {
        assert_eq!(pixel_edit_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0);
        assert_eq!(pixel_edit_distance(&[1.0, 2.0, 3.0], &[1.0, 9.0, 3.0]), 1);
        assert_eq!(pixel_edit_distance(&[1.0, 2.0, 3.0], &[2.0, 3.0]), 1);
        assert_eq!(pixel_edit_distance(&[], &[1.0, 2.0]), 2);
        assert_eq!(pixel_edit_distance(&[1.0], &[]), 1);
    }

    #[test]
    fn test_edit_distance_ignores_closeness() {
        // Near-identical intensities are still different symbols.
        assert_eq!(pixel_edit_distance(&[100.0, 100.0], &[100.0001, 99.9999]), 2);
    }
}
