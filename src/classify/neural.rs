//! Stage 6 — compact encoder classifier.
//!
//! Embeds the text with the same hash-projection encoder the duplicate
//! detector uses, then applies a linear head. The default head is a
//! prototype difference: the centroid of seed requester phrases minus the
//! centroid of seed offeror phrases, so texts near requester vocabulary
//! score above 0.5 and offeror vocabulary below.

use std::sync::Arc;

use crate::classify::statistical::sigmoid;
use crate::dedup::embedding::{Embedder, HashEmbedder};

/// How sharply the head's raw margin maps onto probability.
const HEAD_STEEPNESS: f32 = 4.0;

const REQUESTER_SEED: &str =
    "need needed required looking for specialist budget task project deadline help urgent audit";
const OFFEROR_SEED: &str =
    "offering my services portfolio certified experienced resume rates subscribe webinar course";

/// Encoder-based probability classifier.
pub struct EncoderClassifier {
    embedder: Arc<dyn Embedder>,
    head: Vec<f32>,
    bias: f32,
}

impl EncoderClassifier {
    /// Build with the default prototype head over the given embedder.
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        let head = prototype_head(embedder.as_ref());
        Self {
            embedder,
            head,
            bias: 0.0,
        }
    }

    /// Build with an explicit head (e.g. exported from offline training).
    pub fn with_head(embedder: Arc<dyn Embedder>, head: Vec<f32>, bias: f32) -> Self {
        Self {
            embedder,
            head,
            bias,
        }
    }

    /// Probability that the text is a genuine lead, or `None` when the
    /// embedder is unavailable.
    pub fn predict(&self, text_lower: &str) -> Option<f32> {
        let embedding = self.embedder.embed(text_lower)?;
        if embedding.len() != self.head.len() {
            return None;
        }
        let margin: f32 = embedding
            .iter()
            .zip(self.head.iter())
            .map(|(e, h)| e * h)
            .sum();
        Some(sigmoid(margin * HEAD_STEEPNESS + self.bias))
    }
}

impl Default for EncoderClassifier {
    fn default() -> Self {
        Self::new(Arc::new(HashEmbedder::default()))
    }
}

/// Normalized difference between requester and offeror seed centroids.
fn prototype_head(embedder: &dyn Embedder) -> Vec<f32> {
    let requester = embedder.embed(REQUESTER_SEED).unwrap_or_default();
    let offeror = embedder.embed(OFFEROR_SEED).unwrap_or_default();
    if requester.len() != offeror.len() || requester.is_empty() {
        return vec![0.0; embedder.dimension()];
    }
    let mut head: Vec<f32> = requester
        .iter()
        .zip(offeror.iter())
        .map(|(r, o)| r - o)
        .collect();
    let norm: f32 = head.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 1e-9 {
        head.iter_mut().for_each(|v| *v /= norm);
    }
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requester_text_scores_above_offeror_text() {
        let model = EncoderClassifier::default();
        let requester = model
            .predict("need a specialist for this task, budget and deadline inside")
            .unwrap();
        let offeror = model
            .predict("offering my services, certified and experienced, see portfolio and rates")
            .unwrap();
        assert!(
            requester > offeror,
            "requester {requester} must beat offeror {offeror}"
        );
    }

    #[test]
    fn unavailable_embedder_abstains() {
        let model = EncoderClassifier::new(Arc::new(HashEmbedder::new(0)));
        assert!(model.predict("anything").is_none());
    }

    #[test]
    fn prediction_is_deterministic() {
        let model = EncoderClassifier::default();
        let a = model.predict("need an seo audit for my store").unwrap();
        let b = model.predict("need an seo audit for my store").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn probability_is_in_unit_interval() {
        let model = EncoderClassifier::default();
        let p = model.predict("some arbitrary words go here").unwrap();
        assert!((0.0..=1.0).contains(&p));
    }
}
