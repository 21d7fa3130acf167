//! Identity records and the training reduction.

use crate::metrics::{self, MetricError};
use crate::pipeline::{CollaboratorError, Renderer, Vectorizer};
use crate::types::{null_as_empty, FeatureVector, Person};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const AVERAGE_RENDER_NAME: &str = "average.png";

#[derive(Error, Debug)]
pub enum TrainError {
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
    #[error("normalization returned {got} vectors for {expected} inputs")]
    NormalizedCount { expected: usize, got: usize },
}

/// Outcome of [`IdentityRecord::train`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Training {
    /// No training images were attached; the record is unchanged.
    Skipped,
    Trained {
        vectors: usize,
        rendered: usize,
        render_failures: usize,
    },
}

/// One person's training images and the vectors derived from them.
///
/// Field names on the wire follow the snapshot format of the library file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    #[serde(rename = "user", default)]
    pub person: Person,
    /// Per-image normalized vectors.
    #[serde(rename = "eigenfaces", default, deserialize_with = "null_as_empty")]
    pub normalized: Vec<FeatureVector>,
    /// Element-wise mean of `detected`. Empty until trained.
    #[serde(rename = "average_face", default)]
    pub average: FeatureVector,
    #[serde(rename = "training_images", default, deserialize_with = "null_as_empty")]
    pub training_images: Vec<PathBuf>,
    /// Raw vectors of the training images, one per path.
    #[serde(rename = "faces_detected", default, deserialize_with = "null_as_empty")]
    pub detected: Vec<FeatureVector>,
}

impl IdentityRecord {
    pub fn new(person: Person) -> Self {
        Self {
            person,
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        self.person.key()
    }

    /// Untrained records carry an empty average and cannot be matched.
    pub fn is_trained(&self) -> bool {
        !self.average.is_empty()
    }

    pub fn attach_training_images<I>(&mut self, paths: I)
    where
        I: IntoIterator<Item = PathBuf>,
    {
        self.training_images.extend(paths);
    }

    /// Reduce the attached training images to normalized vectors and an
    /// average, then render both into `out_dir`.
    ///
    /// With no training images this is a no-op. A collaborator failure
    /// leaves the record untouched. Render failures are logged and
    /// counted but never fail training.
    pub fn train(
        &mut self,
        vectorizer: &dyn Vectorizer,
        renderer: &dyn Renderer,
        out_dir: &Path,
    ) -> Result<Training, TrainError> {
        if self.training_images.is_empty() {
            tracing::debug!(key = %self.key(), "no training images attached, skipping training");
            return Ok(Training::Skipped);
        }

        let detected = self
            .training_images
            .iter()
            .map(|path| vectorizer.vectorize(path))
            .collect::<Result<Vec<_>, _>>()?;

        let normalized = vectorizer.normalize(&detected)?;
        if normalized.len() != detected.len() {
            return Err(TrainError::NormalizedCount {
                expected: detected.len(),
                got: normalized.len(),
            });
        }
        let average = vectorizer.average(&detected)?;

        self.detected = detected;
        self.normalized = normalized;
        self.average = average;

        let (rendered, render_failures) = self.render(renderer, out_dir);

        tracing::info!(
            key = %self.key(),
            vectors = self.detected.len(),
            width = self.average.width(),
            height = self.average.height(),
            rendered,
            render_failures,
            "identity trained"
        );

        Ok(Training::Trained {
            vectors: self.detected.len(),
            rendered,
            render_failures,
        })
    }

    /// Render the average and every normalized vector. Returns
    /// `(rendered, failed)`.
    fn render(&self, renderer: &dyn Renderer, out_dir: &Path) -> (usize, usize) {
        let targets = std::iter::once((&self.average, out_dir.join(AVERAGE_RENDER_NAME))).chain(
            self.normalized
                .iter()
                .enumerate()
                .map(|(i, v)| (v, out_dir.join(format!("{i}_normalized.png")))),
        );

        let mut rendered = 0;
        let mut failed = 0;
        for (vector, path) in targets {
            match renderer.render(vector, &path) {
                Ok(()) => rendered += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "render failed; continuing");
                    failed += 1;
                }
            }
        }
        (rendered, failed)
    }

    /// RMS distance of `probe` against this identity's normalized vectors.
    /// Not used by recognition.
    pub fn rms_distance(&self, probe: &FeatureVector) -> Result<f64, MetricError> {
        metrics::rms_distance(&self.normalized, probe)
    }

    /// Pixel edit distance between `probe` and this identity's average.
    /// Not used by recognition.
    pub fn edit_distance(&self, probe: &FeatureVector) -> usize {
        metrics::pixel_edit_distance(probe.pixels(), self.average.pixels())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Vectorizer backed by a path → vector map.
    struct MapVectorizer(HashMap<PathBuf, FeatureVector>);

    impl Vectorizer for MapVectorizer {
        fn vectorize(&self, path: &Path) -> Result<FeatureVector, CollaboratorError> {
            self.0
                .get(path)
                .cloned()
                .ok_or_else(|| CollaboratorError::Vectorize {
                    path: path.to_path_buf(),
                    reason: "unknown".into(),
                })
        }

        fn normalize(
            &self,
            vectors: &[FeatureVector],
        ) -> Result<Vec<FeatureVector>, CollaboratorError> {
            Ok(vectors.to_vec())
        }

        fn average(&self, vectors: &[FeatureVector]) -> Result<FeatureVector, CollaboratorError> {
            let first = &vectors[0];
            let n = vectors.len() as f64;
            let pixels = (0..first.pixels().len())
                .map(|i| vectors.iter().map(|v| v.pixels()[i]).sum::<f64>() / n)
                .collect();
            FeatureVector::new(first.width(), first.height(), pixels)
                .map_err(|e| CollaboratorError::Reduce(e.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingRenderer {
        paths: RefCell<Vec<PathBuf>>,
        fail: bool,
    }

    impl Renderer for RecordingRenderer {
        fn render(&self, _vector: &FeatureVector, path: &Path) -> Result<(), CollaboratorError> {
            self.paths.borrow_mut().push(path.to_path_buf());
            if self.fail {
                return Err(CollaboratorError::Render {
                    path: path.to_path_buf(),
                    reason: "disk full".into(),
                });
            }
            Ok(())
        }
    }

    fn two_images() -> (MapVectorizer, Vec<PathBuf>) {
        let a = PathBuf::from("a.png");
        let b = PathBuf::from("b.png");
        let mut map = HashMap::new();
        map.insert(a.clone(), FeatureVector::filled(2, 2, 10.0));
        map.insert(b.clone(), FeatureVector::filled(2, 2, 30.0));
        (MapVectorizer(map), vec![a, b])
    }

    #[test]
    fn test_train_without_images_is_noop() {
        let (vectorizer, _) = two_images();
        let renderer = RecordingRenderer::default();
        let mut record = IdentityRecord::new(Person::new("John", "Doe"));

        let outcome = record
            .train(&vectorizer, &renderer, Path::new("Data/John.Doe"))
            .unwrap();

        assert_eq!(outcome, Training::Skipped);
        assert!(record.average.is_empty());
        assert!(!record.is_trained());
        assert!(renderer.paths.borrow().is_empty());
    }

    #[test]
    fn test_train_reduces_and_renders() {
        let (vectorizer, paths) = two_images();
        let renderer = RecordingRenderer::default();
        let mut record = IdentityRecord::new(Person::new("John", "Doe"));
        record.attach_training_images(paths);

        let outcome = record.train(&vectorizer, &renderer, Path::new("out")).unwrap();

        assert_eq!(
            outcome,
            Training::Trained {
                vectors: 2,
                rendered: 3,
                render_failures: 0
            }
        );
        assert!(record.is_trained());
        assert_eq!(record.average.pixels(), &[20.0; 4]);
        assert_eq!(record.normalized.len(), record.detected.len());
        assert_eq!(
            *renderer.paths.borrow(),
            vec![
                PathBuf::from("out/average.png"),
                PathBuf::from("out/0_normalized.png"),
                PathBuf::from("out/1_normalized.png"),
            ]
        );
    }

    #[test]
    fn test_render_failure_does_not_abort_training() {
        let (vectorizer, paths) = two_images();
        let renderer = RecordingRenderer {
            fail: true,
            ..Default::default()
        };
        let mut record = IdentityRecord::new(Person::new("John", "Doe"));
        record.attach_training_images(paths);

        let outcome = record.train(&vectorizer, &renderer, Path::new("out")).unwrap();

        assert_eq!(
            outcome,
            Training::Trained {
                vectors: 2,
                rendered: 0,
                render_failures: 3
            }
        );
        assert!(record.is_trained());
    }

    #[test]
    fn test_vectorize_failure_leaves_record_untouched() {
        let (vectorizer, mut paths) = two_images();
        paths.push(PathBuf::from("missing.png"));
        let renderer = RecordingRenderer::default();
        let mut record = IdentityRecord::new(Person::new("John", "Doe"));
        record.attach_training_images(paths);

        let err = record.train(&vectorizer, &renderer, Path::new("out")).unwrap_err();

        assert!(matches!(
            err,
            TrainError::Collaborator(CollaboratorError::Vectorize { .. })
        ));
        assert!(record.detected.is_empty());
        assert!(!record.is_trained());
    }

    #[test]
    fn test_alternative_distances() {
        let mut record = IdentityRecord::new(Person::new("John", "Doe"));
        record.normalized = vec![FeatureVector::filled(1, 1, 12.0)];
        record.average = FeatureVector::filled(1, 1, 12.0);
        let probe = FeatureVector::filled(1, 1, 10.0);

        assert!((record.rms_distance(&probe).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(record.edit_distance(&probe), 1);
        assert_eq!(record.edit_distance(&record.average.clone()), 0);
    }

    #[test]
    fn test_snapshot_field_names() {
        let mut record = IdentityRecord::new(Person::new("John", "Doe"));
        record.training_images.push(PathBuf::from("Data/John.Doe/face_0.png"));
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["user"]["first_name"], "John");
        assert_eq!(json["user"]["last_name"], "Doe");
        assert_eq!(json["training_images"][0], "Data/John.Doe/face_0.png");
        assert!(json["eigenfaces"].as_array().unwrap().is_empty());
        assert!(json["faces_detected"].as_array().unwrap().is_empty());
        assert_eq!(json["average_face"]["width"], 0);
    }

    #[test]
    fn test_decodes_null_arrays() {
        let json = r#"{
            "user": {"first_name": "Jane", "last_name": "Roe"},
            "eigenfaces": null,
            "average_face": {"width": 0, "height": 0, "pixels": null},
            "training_images": null,
            "faces_detected": null
        }"#;
        let record: IdentityRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.key(), "Jane.Roe");
        assert!(!record.is_trained());
        assert!(record.training_images.is_empty());
    }
}
