//! Stage 5 — statistical classifier.
//!
//! A bag-of-terms log-odds model: each known term contributes a weight,
//! the sum goes through a sigmoid. The default term table distills the
//! requester/offeror vocabulary; an untrained (empty) model reports
//! `None` and the cascade moves on without it.

use std::collections::HashMap;

/// Bag-of-terms probability model.
pub struct TermModel {
    weights: HashMap<String, f32>,
    bias: f32,
}

impl TermModel {
    /// An empty model — `predict` returns `None`.
    pub fn untrained() -> Self {
        Self {
            weights: HashMap::new(),
            bias: 0.0,
        }
    }

    /// A model from explicit term weights.
    pub fn from_weights(weights: HashMap<String, f32>, bias: f32) -> Self {
        Self { weights, bias }
    }

    /// The default distilled term table.
    pub fn with_default_terms() -> Self {
        let table: [(&str, f32); 22] = [
            ("need", 0.9),
            ("needed", 0.9),
            ("required", 0.8),
            ("looking", 0.6),
            ("budget", 0.7),
            ("deadline", 0.5),
            ("task", 0.4),
            ("project", 0.3),
            ("help", 0.3),
            ("urgent", 0.4),
            ("audit", 0.4),
            ("offering", -1.2),
            ("services", -0.6),
            ("portfolio", -0.9),
            ("experienced", -0.5),
            ("certified", -0.6),
            ("resume", -0.8),
            ("subscribe", -1.4),
            ("webinar", -1.0),
            ("course", -0.8),
            ("vacancy", -0.7),
            ("hiring", -0.5),
        ];
        Self {
            weights: table
                .into_iter()
                .map(|(term, weight)| (term.to_string(), weight))
                .collect(),
            bias: 0.0,
        }
    }

    pub fn is_trained(&self) -> bool {
        !self.weights.is_empty()
    }

    /// Probability that the text is a genuine lead, or `None` when the
    /// model is untrained.
    pub fn predict(&self, text_lower: &str) -> Option<f32> {
        if !self.is_trained() {
            return None;
        }

        let mut z = self.bias;
        for token in text_lower.split(|c: char| !c.is_alphanumeric()) {
            if let Some(weight) = self.weights.get(token) {
                z += weight;
            }
        }
        Some(sigmoid(z))
    }
}

pub(crate) fn sigmoid(z: f32) -> f32 {
    1.0 / (1.0 + (-z).exp())
}
