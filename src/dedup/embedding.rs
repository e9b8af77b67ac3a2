//! Embedding seam for the duplicate detector.
//!
//! The in-process implementation produces deterministic hash-projection
//! embeddings: each (word, component) pair hashes to a pseudo-random value
//! in [-1, 1); word vectors are accumulated and normalized to a unit
//! vector. Distinct words come out near-orthogonal, so texts sharing
//! vocabulary land close in cosine space — enough for near-duplicate
//! detection without an external encoder. A real encoder service can be
//! injected through the same trait; returning `None` switches the detector
//! to exact-only mode.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Produces embeddings for duplicate comparison.
pub trait Embedder: Send + Sync {
    /// Embed the text, or `None` when embeddings are unavailable.
    fn embed(&self, text: &str) -> Option<Vec<f32>>;

    /// Dimensionality of produced vectors.
    fn dimension(&self) -> usize;
}

/// Deterministic hash-projection embedder.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Option<Vec<f32>> {
        if self.dim == 0 {
            return None;
        }
        let mut acc = vec![0.0f32; self.dim];
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            return Some(acc);
        }
        for word in &words {
            for (i, slot) in acc.iter_mut().enumerate() {
                let mut hasher = DefaultHasher::new();
                word.hash(&mut hasher);
                i.hash(&mut hasher);
                // Map the hash to [-1, 1).
                let unit = (hasher.finish() % 10_000) as f32 / 5_000.0 - 1.0;
                *slot += unit;
            }
        }
        let norm: f32 = acc.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 1e-9 {
            acc.iter_mut().for_each(|v| *v /= norm);
        }
        Some(acc)
    }

    fn dimension(&self) -> usize {
        self.dim
    }
}

/// Cosine similarity between two vectors, clamped to [-1, 1].
/// Mismatched or empty vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if mag_a < 1e-9 || mag_b < 1e-9 {
        return 0.0;
    }
    (dot / (mag_a * mag_b)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_texts_have_identical_embeddings() {
        let embedder = HashEmbedder::default();
        let a = embedder.embed("need an seo specialist").unwrap();
        let b = embedder.embed("need an seo specialist").unwrap();
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn overlapping_texts_are_closer_than_disjoint() {
        let embedder = HashEmbedder::default();
        let base = embedder.embed("need an seo specialist for my store").unwrap();
        let near = embedder
            .embed("need an seo specialist for my shop")
            .unwrap();
        let far = embedder.embed("selling handmade pottery classes").unwrap();
        assert!(
            cosine_similarity(&base, &near) > cosine_similarity(&base, &far),
            "shared vocabulary must score higher"
        );
    }

    #[test]
    fn embeddings_are_unit_vectors() {
        let embedder = HashEmbedder::default();
        let v = embedder.embed("some message text").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_dimension_means_unavailable() {
        let embedder = HashEmbedder::new(0);
        assert!(embedder.embed("anything").is_none());
    }

    #[test]
    fn cosine_of_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
