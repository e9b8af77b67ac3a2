//! In-memory `LeadStore` — backs tests and local demos.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{LeadStore, OutreachAttempt, SeenRecord};
use crate::strategy::StrategyStats;

#[derive(Default)]
struct Inner {
    seen: Vec<SeenRecord>,
    duplicates: Vec<(String, String)>,
    attempts: HashMap<Uuid, OutreachAttempt>,
    strategies: HashMap<String, StrategyStats>,
}

/// In-memory store. All state lives behind one `RwLock`; fine for tests,
/// not meant for production-scale write volumes.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded (fingerprint, duplicate-of) pairs, for assertions.
    pub async fn duplicate_marks(&self) -> Vec<(String, String)> {
        self.inner.read().await.duplicates.clone()
    }

    /// Number of seen records, for assertions.
    pub async fn seen_count(&self) -> usize {
        self.inner.read().await.seen.len()
    }
}

#[async_trait]
impl LeadStore for InMemoryStore {
    async fn lookup_recent(
        &self,
        window: Duration,
        cap: usize,
    ) -> Result<Vec<SeenRecord>, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(window)
                .map_err(|e| StoreError::Query(format!("window out of range: {e}")))?;
        let inner = self.inner.read().await;
        let mut records: Vec<SeenRecord> = inner
            .seen
            .iter()
            .filter(|r| r.seen_at > cutoff)
            .cloned()
            .collect();
        records.sort_by(|a, b| b.seen_at.cmp(&a.seen_at));
        records.truncate(cap);
        Ok(records)
    }

    async fn insert_seen(&self, record: &SeenRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .seen
            .iter_mut()
            .find(|r| r.fingerprint == record.fingerprint)
        {
            *existing = record.clone();
        } else {
            inner.seen.push(record.clone());
        }
        Ok(())
    }

    async fn mark_duplicate(&self, fingerprint: &str, of: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner
            .duplicates
            .push((fingerprint.to_string(), of.to_string()));
        Ok(())
    }

    async fn record_attempt(&self, attempt: &OutreachAttempt) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn attempt(&self, id: Uuid) -> Result<Option<OutreachAttempt>, StoreError> {
        Ok(self.inner.read().await.attempts.get(&id).cloned())
    }

    async fn update_attempt(&self, attempt: &OutreachAttempt) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.attempts.contains_key(&attempt.id) {
            return Err(StoreError::NotFound {
                entity: "outreach_attempt".into(),
                id: attempt.id.to_string(),
            });
        }
        inner.attempts.insert(attempt.id, attempt.clone());
        Ok(())
    }

    async fn load_strategies(&self) -> Result<Vec<StrategyStats>, StoreError> {
        Ok(self.inner.read().await.strategies.values().cloned().collect())
    }

    async fn save_strategy(&self, stats: &StrategyStats) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.strategies.insert(stats.variant.clone(), stats.clone());
        Ok(())
    }
}
