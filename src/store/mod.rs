//! Unified `LeadStore` trait — the minimal persistence contract the
//! pipeline needs. The pipeline consults the store; it does not own it.
//! Backends: libsql (local file / in-memory database) and a plain
//! in-memory implementation for tests and demos.

pub mod libsql_backend;
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::strategy::StrategyStats;

pub use libsql_backend::LibSqlStore;
pub use memory::InMemoryStore;

/// A previously accepted message, kept for duplicate detection.
#[derive(Debug, Clone)]
pub struct SeenRecord {
    /// Normalized-text hash.
    pub fingerprint: String,
    pub text: String,
    /// Embedding computed at accept time, if the embedder was available.
    pub embedding: Option<Vec<f32>>,
    pub source: String,
    pub seen_at: DateTime<Utc>,
}

/// A dispatched outreach message, with feedback fields appended later.
#[derive(Debug, Clone)]
pub struct OutreachAttempt {
    pub id: Uuid,
    /// Fingerprint of the candidate this attempt responds to.
    pub candidate_fingerprint: String,
    pub variant: String,
    pub recipient: String,
    pub text: String,
    pub sent_at: DateTime<Utc>,
    pub replied: bool,
    pub reply_latency_secs: Option<u64>,
    pub conversation_depth: u32,
    pub converted: bool,
    pub value: Option<f64>,
    pub reward: Option<f64>,
}

impl OutreachAttempt {
    /// A fresh attempt at dispatch time, before any feedback.
    pub fn new(
        candidate_fingerprint: &str,
        variant: &str,
        recipient: &str,
        text: &str,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_fingerprint: candidate_fingerprint.to_string(),
            variant: variant.to_string(),
            recipient: recipient.to_string(),
            text: text.to_string(),
            sent_at: Utc::now(),
            replied: false,
            reply_latency_secs: None,
            conversation_depth: 0,
            converted: false,
            value: None,
            reward: None,
        }
    }
}

/// Backend-agnostic persistence contract for the pipeline.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Records seen within the trailing window, newest first, capped.
    async fn lookup_recent(
        &self,
        window: Duration,
        cap: usize,
    ) -> Result<Vec<SeenRecord>, StoreError>;

    /// Insert (or refresh, keyed by fingerprint) a seen record.
    async fn insert_seen(&self, record: &SeenRecord) -> Result<(), StoreError>;

    /// Record that `fingerprint` duplicates the earlier `of` record.
    async fn mark_duplicate(&self, fingerprint: &str, of: &str) -> Result<(), StoreError>;

    /// Insert a freshly dispatched outreach attempt.
    async fn record_attempt(&self, attempt: &OutreachAttempt) -> Result<(), StoreError>;

    /// Fetch an attempt by id.
    async fn attempt(&self, id: Uuid) -> Result<Option<OutreachAttempt>, StoreError>;

    /// Overwrite an attempt's feedback fields.
    async fn update_attempt(&self, attempt: &OutreachAttempt) -> Result<(), StoreError>;

    /// All persisted per-variant strategy statistics.
    async fn load_strategies(&self) -> Result<Vec<StrategyStats>, StoreError>;

    /// Upsert one variant's strategy statistics.
    async fn save_strategy(&self, stats: &StrategyStats) -> Result<(), StoreError>;
}
