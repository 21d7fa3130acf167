//! likeness-core — Identity records, training, and nearest-average matching.
//!
//! Face detection, vectorization, and rendering are collaborators behind
//! the traits in [`pipeline`]; this crate only reduces and compares the
//! vectors they produce.

pub mod matcher;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod types;

pub use matcher::{
    best_match, best_match_with, score_all, BestMatch, Comparison, MeanDifferenceScorer, RmsScorer,
    Scorer, ACCEPTANCE_THRESHOLD,
};
pub use metrics::{MetricError, INTENSITY_RANGE};
pub use pipeline::{CollaboratorError, Detector, Renderer, Vectorizer};
pub use record::{IdentityRecord, TrainError, Training};
pub use types::{FeatureVector, Person, VectorError};

/// Decoded image type accepted by [`Detector::detect_image`].
pub use image::DynamicImage;
