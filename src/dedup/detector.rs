//! Two-tier duplicate detection over a trailing window.
//!
//! Tier one compares semantic embeddings by cosine similarity. Tier two —
//! used when embeddings are unavailable or the best semantic score falls
//! below the low bound — compares character-shingle ratios. The detector
//! is read-only: callers persist the fingerprint only after the classifier
//! has independently accepted the candidate, so rejected spam never
//! pollutes the window.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::DedupConfig;
use crate::dedup::cache::EmbeddingCache;
use crate::dedup::embedding::{Embedder, cosine_similarity};
use crate::error::StoreError;
use crate::store::{LeadStore, SeenRecord};

static RE_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https?://\S+|[@#]\w+|[^\w\s]").expect("strip regex"));

/// How a duplicate was identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMethod {
    /// Embedding cosine similarity above the semantic threshold.
    Semantic,
    /// Fingerprint hash or character-shingle ratio match.
    Exact,
}

impl MatchMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Exact => "exact",
        }
    }
}

/// Outcome of a duplicate check.
#[derive(Debug, Clone)]
pub struct DedupDecision {
    pub duplicate: bool,
    /// Best similarity observed, whichever tier produced it.
    pub similarity: f32,
    pub method: Option<MatchMethod>,
    /// Fingerprint of the matched record, when duplicate.
    pub matched: Option<String>,
}

impl DedupDecision {
    fn miss(similarity: f32) -> Self {
        Self {
            duplicate: false,
            similarity,
            method: None,
            matched: None,
        }
    }

    fn hit(similarity: f32, method: MatchMethod, matched: &str) -> Self {
        Self {
            duplicate: true,
            similarity,
            method: Some(method),
            matched: Some(matched.to_string()),
        }
    }
}

/// Normalized-text fingerprint: URLs, mentions, hashtags and punctuation
/// stripped, whitespace collapsed, lowercased, then hashed.
pub fn fingerprint(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped = RE_STRIP.replace_all(&lowered, " ");
    let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = DefaultHasher::new();
    normalized.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Character-trigram Dice ratio between two texts, in [0, 1].
fn shingle_ratio(a: &str, b: &str) -> f32 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let a_grams = trigram_counts(&a_lower);
    let b_grams = trigram_counts(&b_lower);

    if a_grams.is_empty() || b_grams.is_empty() {
        return if a_lower == b_lower { 1.0 } else { 0.0 };
    }

    let total: usize = a_grams.values().sum::<usize>() + b_grams.values().sum::<usize>();
    let overlap: usize = a_grams
        .iter()
        .map(|(gram, count)| count.min(b_grams.get(gram).unwrap_or(&0)))
        .sum();

    (2.0 * overlap as f32) / total as f32
}

fn trigram_counts(text: &str) -> HashMap<u64, usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut counts = HashMap::new();
    for window in chars.windows(3) {
        let mut hasher = DefaultHasher::new();
        window.hash(&mut hasher);
        *counts.entry(hasher.finish()).or_insert(0) += 1;
    }
    counts
}

/// Hybrid duplicate detector.
pub struct DuplicateDetector {
    store: Arc<dyn LeadStore>,
    embedder: Arc<dyn Embedder>,
    cache: Mutex<EmbeddingCache>,
    config: DedupConfig,
}

impl DuplicateDetector {
    pub fn new(
        store: Arc<dyn LeadStore>,
        embedder: Arc<dyn Embedder>,
        config: DedupConfig,
    ) -> Self {
        let cache = Mutex::new(EmbeddingCache::new(config.cache_capacity));
        Self {
            store,
            embedder,
            cache,
            config,
        }
    }

    /// Check whether `text` duplicates anything inside the trailing window.
    ///
    /// Read-only: no record is written here regardless of the outcome.
    pub async fn is_duplicate(&self, text: &str) -> Result<DedupDecision, StoreError> {
        let fp = fingerprint(text);
        let recent = self
            .store
            .lookup_recent(self.config.window, self.config.max_records)
            .await?;

        if recent.is_empty() {
            return Ok(DedupDecision::miss(0.0));
        }

        // Exact fingerprint short-circuit.
        if let Some(record) = recent.iter().find(|r| r.fingerprint == fp) {
            debug!(fingerprint = %fp, "exact fingerprint match");
            return Ok(DedupDecision::hit(1.0, MatchMethod::Exact, &record.fingerprint));
        }

        // Semantic tier.
        let mut best_semantic = 0.0f32;
        let mut best_record: Option<&SeenRecord> = None;
        let mut semantic_ran = false;

        if self.config.semantic_enabled
            && let Some(candidate_emb) = self.cached_embedding(&fp, text).await
        {
            semantic_ran = true;
            for record in &recent {
                let similarity = match &record.embedding {
                    Some(emb) => cosine_similarity(&candidate_emb, emb),
                    None => match self.cached_embedding(&record.fingerprint, &record.text).await
                    {
                        Some(emb) => cosine_similarity(&candidate_emb, &emb),
                        None => continue,
                    },
                };
                if similarity > best_semantic {
                    best_semantic = similarity;
                    best_record = Some(record);
                }
            }

            if best_semantic > self.config.semantic_threshold
                && let Some(record) = best_record
            {
                debug!(
                    similarity = best_semantic,
                    matched = %record.fingerprint,
                    "semantic duplicate"
                );
                return Ok(DedupDecision::hit(
                    best_semantic,
                    MatchMethod::Semantic,
                    &record.fingerprint,
                ));
            }
        }

        // Shingle fallback, only when the semantic tier had nothing to say.
        if !semantic_ran || best_semantic < self.config.semantic_low_bound {
            let mut best_ratio = 0.0f32;
            let mut ratio_record: Option<&SeenRecord> = None;
            for record in &recent {
                let ratio = shingle_ratio(text, &record.text);
                if ratio > best_ratio {
                    best_ratio = ratio;
                    ratio_record = Some(record);
                }
            }
            if best_ratio > self.config.exact_threshold
                && let Some(record) = ratio_record
            {
                debug!(
                    ratio = best_ratio,
                    matched = %record.fingerprint,
                    "shingle duplicate"
                );
                return Ok(DedupDecision::hit(
                    best_ratio,
                    MatchMethod::Exact,
                    &record.fingerprint,
                ));
            }
            return Ok(DedupDecision::miss(best_ratio.max(best_semantic)));
        }

        Ok(DedupDecision::miss(best_semantic))
    }

    /// Embedding for `text`, memoized by fingerprint key.
    pub async fn cached_embedding(&self, key: &str, text: &str) -> Option<Vec<f32>> {
        {
            let cache = self.cache.lock().await;
            if let Some(hit) = cache.get(key) {
                return Some(hit.clone());
            }
        }
        let computed = self.embedder.embed(text)?;
        let mut cache = self.cache.lock().await;
        cache.insert(key.to_string(), computed.clone());
        Some(computed)
    }

    /// Current number of memoized embeddings.
    pub async fn cache_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::dedup::embedding::HashEmbedder;
    use crate::store::InMemoryStore;

    fn seen(text: &str) -> SeenRecord {
        SeenRecord {
            fingerprint: fingerprint(text),
            text: text.into(),
            embedding: None,
            source: "chan".into(),
            seen_at: Utc::now(),
        }
    }

    fn detector_with(
        store: Arc<InMemoryStore>,
        config: DedupConfig,
        dim: usize,
    ) -> DuplicateDetector {
        DuplicateDetector::new(store, Arc::new(HashEmbedder::new(dim)), config)
    }

    #[test]
    fn fingerprint_ignores_noise() {
        let a = fingerprint("Need an SEO specialist! @promo #tag https://x.io/a");
        let b = fingerprint("need an seo   specialist @other #different");
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_for_different_text() {
        assert_ne!(fingerprint("need seo help"), fingerprint("selling seo services"));
    }

    #[test]
    fn shingle_ratio_identical_is_one() {
        assert!((shingle_ratio("same text here", "same text here") - 1.0).abs() < 1e-6);
    }

    #[test]
    fn shingle_ratio_disjoint_is_low() {
        assert!(shingle_ratio("abcdefgh", "zyxwvuts") < 0.1);
    }

    #[tokio::test]
    async fn exact_fingerprint_duplicate() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_seen(&seen("Need an SEO specialist, budget 50000, urgent")).await.unwrap();
        let detector = detector_with(store, DedupConfig::default(), 64);

        let decision = detector
            .is_duplicate("Need an SEO specialist, budget 50000, urgent")
            .await
            .unwrap();
        assert!(decision.duplicate);
        assert_eq!(decision.method, Some(MatchMethod::Exact));
        assert!(decision.similarity >= 0.85);
    }

    #[tokio::test]
    async fn duplicate_check_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_seen(&seen("looking for a web developer, budget 20k")).await.unwrap();
        let detector = detector_with(store, DedupConfig::default(), 64);

        for _ in 0..2 {
            let decision = detector
                .is_duplicate("looking for a web developer, budget 20k")
                .await
                .unwrap();
            assert!(decision.duplicate);
            assert!(decision.similarity >= 0.85);
        }
    }

    #[tokio::test]
    async fn semantic_duplicate_with_lowered_threshold() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_seen(&seen("need an seo specialist for my online store"))
            .await
            .unwrap();
        let config = DedupConfig {
            semantic_threshold: 0.5,
            ..DedupConfig::default()
        };
        let detector = detector_with(store, config, 64);

        let decision = detector
            .is_duplicate("need an seo specialist for my online shop")
            .await
            .unwrap();
        assert!(decision.duplicate, "near-identical text should match semantically");
        assert_eq!(decision.method, Some(MatchMethod::Semantic));
    }

    #[tokio::test]
    async fn shingle_fallback_when_embeddings_unavailable() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_seen(&seen("Looking for a search ads expert, campaign setup and audit, budget 30000"))
            .await
            .unwrap();
        // Zero-dim embedder: embeddings unavailable, semantic tier skipped.
        let detector = detector_with(store, DedupConfig::default(), 0);

        let decision = detector
            .is_duplicate("Looking for a search ads expert, campaign setup and audit, budget 30001")
            .await
            .unwrap();
        assert!(decision.duplicate);
        assert_eq!(decision.method, Some(MatchMethod::Exact));
        assert!(decision.similarity > 0.85);
    }

    #[tokio::test]
    async fn unrelated_text_is_not_duplicate() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_seen(&seen("need an seo specialist")).await.unwrap();
        let detector = detector_with(store, DedupConfig::default(), 64);

        let decision = detector
            .is_duplicate("selling vintage cameras and lenses, collection of twelve")
            .await
            .unwrap();
        assert!(!decision.duplicate);
        assert!(decision.method.is_none());
    }

    #[tokio::test]
    async fn empty_window_is_never_duplicate() {
        let store = Arc::new(InMemoryStore::new());
        let detector = detector_with(store, DedupConfig::default(), 64);
        let decision = detector.is_duplicate("anything at all").await.unwrap();
        assert!(!decision.duplicate);
        assert_eq!(decision.similarity, 0.0);
    }

    #[tokio::test]
    async fn embeddings_are_memoized() {
        let store = Arc::new(InMemoryStore::new());
        store.insert_seen(&seen("first seen message about web design")).await.unwrap();
        let detector = detector_with(store, DedupConfig::default(), 64);

        detector.is_duplicate("a fresh unrelated inquiry").await.unwrap();
        let after_first = detector.cache_len().await;
        detector.is_duplicate("a fresh unrelated inquiry").await.unwrap();
        assert_eq!(detector.cache_len().await, after_first);
    }
}
