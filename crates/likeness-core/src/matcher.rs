//! Probe-vs-gallery scoring and best-match selection.

use crate::metrics::{self, MetricError};
use crate::record::IdentityRecord;
use crate::types::FeatureVector;

/// Scores strictly below this are accepted as a match.
pub const ACCEPTANCE_THRESHOLD: f64 = 0.05;

/// Strategy for scoring a probe against one identity. Lower is closer.
pub trait Scorer {
    fn score(&self, probe: &FeatureVector, identity: &IdentityRecord) -> Result<f64, MetricError>;
}

/// Normalized mean difference against the identity's average vector.
/// This is the scorer recognition uses.
pub struct MeanDifferenceScorer;

impl Scorer for MeanDifferenceScorer {
    fn score(&self, probe: &FeatureVector, identity: &IdentityRecord) -> Result<f64, MetricError> {
        metrics::mean_difference_score(probe, &identity.average)
    }
}

/// RMS distance against the identity's full set of normalized vectors.
/// Available as an alternative; not used by recognition.
pub struct RmsScorer;

impl Scorer for RmsScorer {
    fn score(&self, probe: &FeatureVector, identity: &IdentityRecord) -> Result<f64, MetricError> {
        identity.rms_distance(probe)
    }
}

/// Winning probe/identity pair of a recognition pass.
#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch {
    pub key: String,
    pub score: f64,
    /// Index of the probe vector that produced the match.
    pub probe_index: usize,
}

/// Score of one probe against one identity.
#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
    pub key: String,
    pub score: f64,
}

/// Select the best match with [`MeanDifferenceScorer`].
pub fn best_match<'a, K, I>(probes: &[FeatureVector], gallery: I) -> Option<BestMatch>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, &'a IdentityRecord)> + Clone,
{
    best_match_with(&MeanDifferenceScorer, probes, gallery)
}

/// Score every probe against every trained identity and keep the lowest
/// score under [`ACCEPTANCE_THRESHOLD`].
///
/// Probes are visited in order, identities in gallery order. Both
/// comparisons are strict, so on an exact tie the pair found first wins.
/// Untrained identities and pairs with mismatched dimensions are skipped.
pub fn best_match_with<'a, S, K, I>(scorer: &S, probes: &[FeatureVector], gallery: I) -> Option<BestMatch>
where
    S: Scorer + ?Sized,
    K: AsRef<str>,
    I: IntoIterator<Item = (K, &'a IdentityRecord)> + Clone,
{
    let mut best: Option<BestMatch> = None;

    for (probe_index, probe) in probes.iter().enumerate() {
        for (key, identity) in gallery.clone() {
            let key = key.as_ref();
            if !identity.is_trained() {
                continue;
            }

            let score = match scorer.score(probe, identity) {
                Ok(score) => score,
                Err(e) => {
                    tracing::debug!(key, probe = probe_index, error = %e, "skipping pair");
                    continue;
                }
            };
            tracing::debug!(key, probe = probe_index, score, "scored");

            let beats_best = best.as_ref().map_or(true, |b| score < b.score);
            if beats_best && score < ACCEPTANCE_THRESHOLD {
                best = Some(BestMatch {
                    key: key.to_string(),
                    score,
                    probe_index,
                });
            }
        }
    }

    best
}

/// Score one probe against every trained identity, in gallery order,
/// without applying the acceptance threshold.
pub fn score_all<'a, K, I>(probe: &FeatureVector, gallery: I) -> Vec<Comparison>
where
    K: AsRef<str>,
    I: IntoIterator<Item = (K, &'a IdentityRecord)>,
{
    gallery
        .into_iter()
        .filter(|(_, identity)| identity.is_trained())
        .filter_map(|(key, identity)| {
            let key = key.as_ref();
            match MeanDifferenceScorer.score(probe, identity) {
                Ok(score) => Some(Comparison {
                    key: key.to_string(),
                    score,
                }),
                Err(e) => {
                    tracing::debug!(key, error = %e, "skipping identity");
                    None
                }
            }
        })
        .collect()
}
