//! libSQL backend — async `LeadStore` implementation.
//!
//! Supports local file and in-memory databases. Datetimes are written as
//! RFC 3339 strings (UTC), embeddings as JSON arrays.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, params};
use tracing::info;
use uuid::Uuid;

use crate::error::StoreError;
use crate::store::{LeadStore, OutreachAttempt, SeenRecord};
use crate::strategy::StrategyStats;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS seen_messages (
    fingerprint TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    embedding TEXT,
    source TEXT NOT NULL,
    seen_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_seen_messages_seen_at ON seen_messages(seen_at);

CREATE TABLE IF NOT EXISTS duplicate_marks (
    fingerprint TEXT NOT NULL,
    duplicate_of TEXT NOT NULL,
    marked_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS outreach_attempts (
    id TEXT PRIMARY KEY,
    candidate_fingerprint TEXT NOT NULL,
    variant TEXT NOT NULL,
    recipient TEXT NOT NULL,
    text TEXT NOT NULL,
    sent_at TEXT NOT NULL,
    replied INTEGER NOT NULL DEFAULT 0,
    reply_latency_secs INTEGER,
    conversation_depth INTEGER NOT NULL DEFAULT 0,
    converted INTEGER NOT NULL DEFAULT 0,
    value REAL,
    reward REAL
);

CREATE TABLE IF NOT EXISTS strategy_stats (
    variant TEXT PRIMARY KEY,
    alpha REAL NOT NULL,
    beta REAL NOT NULL,
    attempts INTEGER NOT NULL,
    successes INTEGER NOT NULL,
    avg_reward REAL NOT NULL
);
";

/// libSQL-backed lead store.
///
/// Holds a single connection reused for all operations;
/// `libsql::Connection` is safe for concurrent async use.
pub struct LibSqlStore {
    conn: Connection,
}

impl LibSqlStore {
    /// Open (or create) a local database file and apply the schema.
    pub async fn new_local(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Open(format!("failed to create data directory: {e}")))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to open database: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to connect: {e}")))?;

        let store = Self { conn };
        store.init_schema().await?;
        info!(path = %path.display(), "lead store opened");
        Ok(store)
    }

    /// In-memory database (for tests).
    pub async fn new_memory() -> Result<Self, StoreError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| StoreError::Open(format!("failed to create in-memory db: {e}")))?;
        let conn = db
            .connect()
            .map_err(|e| StoreError::Open(format!("failed to connect: {e}")))?;

        let store = Self { conn };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        self.conn
            .execute_batch(SCHEMA)
            .await
            .map(|_| ())
            .map_err(|e| StoreError::Query(format!("schema init failed: {e}")))
    }
}

// ── Row mapping helpers ─────────────────────────────────────────────

fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn encode_embedding(embedding: &Option<Vec<f32>>) -> Result<Option<String>, StoreError> {
    match embedding {
        Some(vector) => serde_json::to_string(vector)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string())),
        None => Ok(None),
    }
}

fn decode_embedding(raw: Option<String>) -> Option<Vec<f32>> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn row_to_seen(row: &libsql::Row) -> Result<SeenRecord, StoreError> {
    let map = |e: libsql::Error| StoreError::Query(e.to_string());
    let seen_at: String = row.get(4).map_err(map)?;
    // NULL columns read as Err; `.ok()` folds them to None.
    let embedding_raw: Option<String> = row.get(2).ok();
    Ok(SeenRecord {
        fingerprint: row.get(0).map_err(map)?,
        text: row.get(1).map_err(map)?,
        embedding: decode_embedding(embedding_raw),
        source: row.get(3).map_err(map)?,
        seen_at: parse_datetime(&seen_at),
    })
}

fn row_to_attempt(row: &libsql::Row) -> Result<OutreachAttempt, StoreError> {
    let map = |e: libsql::Error| StoreError::Query(e.to_string());
    let id_str: String = row.get(0).map_err(map)?;
    let sent_at: String = row.get(5).map_err(map)?;
    Ok(OutreachAttempt {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| StoreError::Serialization(format!("bad attempt id: {e}")))?,
        candidate_fingerprint: row.get(1).map_err(map)?,
        variant: row.get(2).map_err(map)?,
        recipient: row.get(3).map_err(map)?,
        text: row.get(4).map_err(map)?,
        sent_at: parse_datetime(&sent_at),
        replied: row.get::<i64>(6).map_err(map)? != 0,
        reply_latency_secs: row.get::<i64>(7).ok().map(|v| v.max(0) as u64),
        conversation_depth: row.get::<i64>(8).map_err(map)?.max(0) as u32,
        converted: row.get::<i64>(9).map_err(map)? != 0,
        value: row.get::<f64>(10).ok(),
        reward: row.get::<f64>(11).ok(),
    })
}

fn row_to_strategy(row: &libsql::Row) -> Result<StrategyStats, StoreError> {
    let map = |e: libsql::Error| StoreError::Query(e.to_string());
    Ok(StrategyStats {
        variant: row.get(0).map_err(map)?,
        alpha: row.get(1).map_err(map)?,
        beta: row.get(2).map_err(map)?,
        attempts: row.get::<i64>(3).map_err(map)?.max(0) as u64,
        successes: row.get::<i64>(4).map_err(map)?.max(0) as u64,
        avg_reward: row.get(5).map_err(map)?,
    })
}

#[async_trait]
impl LeadStore for LibSqlStore {
    async fn lookup_recent(
        &self,
        window: Duration,
        cap: usize,
    ) -> Result<Vec<SeenRecord>, StoreError> {
        let cutoff = (Utc::now()
            - chrono::Duration::from_std(window)
                .map_err(|e| StoreError::Query(format!("window out of range: {e}")))?)
        .to_rfc3339();

        let mut rows = self
            .conn
            .query(
                "SELECT fingerprint, text, embedding, source, seen_at
                 FROM seen_messages
                 WHERE seen_at > ?1
                 ORDER BY seen_at DESC
                 LIMIT ?2",
                params![cutoff, cap as i64],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            records.push(row_to_seen(&row)?);
        }
        Ok(records)
    }

    async fn insert_seen(&self, record: &SeenRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO seen_messages (fingerprint, text, embedding, source, seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(fingerprint) DO UPDATE SET
                     text = excluded.text,
                     embedding = excluded.embedding,
                     source = excluded.source,
                     seen_at = excluded.seen_at",
                params![
                    record.fingerprint.clone(),
                    record.text.clone(),
                    encode_embedding(&record.embedding)?,
                    record.source.clone(),
                    record.seen_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn mark_duplicate(&self, fingerprint: &str, of: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO duplicate_marks (fingerprint, duplicate_of, marked_at)
                 VALUES (?1, ?2, ?3)",
                params![fingerprint, of, Utc::now().to_rfc3339()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn record_attempt(&self, attempt: &OutreachAttempt) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO outreach_attempts
                 (id, candidate_fingerprint, variant, recipient, text, sent_at,
                  replied, reply_latency_secs, conversation_depth, converted, value, reward)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    attempt.id.to_string(),
                    attempt.candidate_fingerprint.clone(),
                    attempt.variant.clone(),
                    attempt.recipient.clone(),
                    attempt.text.clone(),
                    attempt.sent_at.to_rfc3339(),
                    attempt.replied as i64,
                    attempt.reply_latency_secs.map(|v| v as i64),
                    attempt.conversation_depth as i64,
                    attempt.converted as i64,
                    attempt.value,
                    attempt.reward,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }

    async fn attempt(&self, id: Uuid) -> Result<Option<OutreachAttempt>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, candidate_fingerprint, variant, recipient, text, sent_at,
                        replied, reply_latency_secs, conversation_depth, converted, value, reward
                 FROM outreach_attempts WHERE id = ?1",
                params![id.to_string()],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        match rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_attempt(&row)?)),
            None => Ok(None),
        }
    }

    async fn update_attempt(&self, attempt: &OutreachAttempt) -> Result<(), StoreError> {
        let affected = self
            .conn
            .execute(
                "UPDATE outreach_attempts SET
                     replied = ?2,
                     reply_latency_secs = ?3,
                     conversation_depth = ?4,
                     converted = ?5,
                     value = ?6,
                     reward = ?7
                 WHERE id = ?1",
                params![
                    attempt.id.to_string(),
                    attempt.replied as i64,
                    attempt.reply_latency_secs.map(|v| v as i64),
                    attempt.conversation_depth as i64,
                    attempt.converted as i64,
                    attempt.value,
                    attempt.reward,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        if affected == 0 {
            return Err(StoreError::NotFound {
                entity: "outreach_attempt".into(),
                id: attempt.id.to_string(),
            });
        }
        Ok(())
    }

    async fn load_strategies(&self) -> Result<Vec<StrategyStats>, StoreError> {
        let mut rows = self
            .conn
            .query(
                "SELECT variant, alpha, beta, attempts, successes, avg_reward FROM strategy_stats",
                params![],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut strategies = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?
        {
            strategies.push(row_to_strategy(&row)?);
        }
        Ok(strategies)
    }

    async fn save_strategy(&self, stats: &StrategyStats) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO strategy_stats (variant, alpha, beta, attempts, successes, avg_reward)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(variant) DO UPDATE SET
                     alpha = excluded.alpha,
                     beta = excluded.beta,
                     attempts = excluded.attempts,
                     successes = excluded.successes,
                     avg_reward = excluded.avg_reward",
                params![
                    stats.variant.clone(),
                    stats.alpha,
                    stats.beta,
                    stats.attempts as i64,
                    stats.successes as i64,
                    stats.avg_reward,
                ],
            )
            .await
            .map_err(|e| StoreError::Query(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(fp: &str, text: &str, embedding: Option<Vec<f32>>) -> SeenRecord {
        SeenRecord {
            fingerprint: fp.into(),
            text: text.into(),
            embedding,
            source: "chan".into(),
            seen_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn seen_roundtrip_with_embedding() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store
            .insert_seen(&record("fp1", "hello world", Some(vec![0.5, -0.25])))
            .await
            .unwrap();

        let recent = store
            .lookup_recent(Duration::from_secs(3600), 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "hello world");
        assert_eq!(recent[0].embedding, Some(vec![0.5, -0.25]));
    }

    #[tokio::test]
    async fn insert_seen_upserts_by_fingerprint() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.insert_seen(&record("fp1", "first", None)).await.unwrap();
        store.insert_seen(&record("fp1", "second", None)).await.unwrap();

        let recent = store
            .lookup_recent(Duration::from_secs(3600), 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].text, "second");
    }

    #[tokio::test]
    async fn lookup_recent_excludes_stale_rows() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut stale = record("old", "stale", None);
        stale.seen_at = Utc::now() - chrono::Duration::hours(100);
        store.insert_seen(&stale).await.unwrap();
        store.insert_seen(&record("new", "fresh", None)).await.unwrap();

        let recent = store
            .lookup_recent(Duration::from_secs(48 * 3600), 10)
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].fingerprint, "new");
    }

    #[tokio::test]
    async fn attempt_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut attempt = OutreachAttempt::new("fp", "direct", "user1", "hello there");
        store.record_attempt(&attempt).await.unwrap();

        attempt.replied = true;
        attempt.reply_latency_secs = Some(90);
        attempt.reward = Some(0.4);
        store.update_attempt(&attempt).await.unwrap();

        let loaded = store.attempt(attempt.id).await.unwrap().unwrap();
        assert!(loaded.replied);
        assert_eq!(loaded.reply_latency_secs, Some(90));
        assert_eq!(loaded.reward, Some(0.4));
        assert_eq!(loaded.variant, "direct");
    }

    #[tokio::test]
    async fn update_missing_attempt_is_not_found() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let attempt = OutreachAttempt::new("fp", "direct", "user1", "hello");
        assert!(matches!(
            store.update_attempt(&attempt).await,
            Err(StoreError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn strategy_upsert_roundtrip() {
        let store = LibSqlStore::new_memory().await.unwrap();
        let mut stats = StrategyStats::seed("direct");
        store.save_strategy(&stats).await.unwrap();

        stats.alpha = 5.0;
        stats.attempts = 4;
        store.save_strategy(&stats).await.unwrap();

        let loaded = store.load_strategies().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].alpha, 5.0);
        assert_eq!(loaded[0].attempts, 4);
    }

    #[tokio::test]
    async fn mark_duplicate_persists() {
        let store = LibSqlStore::new_memory().await.unwrap();
        store.mark_duplicate("dup-fp", "orig-fp").await.unwrap();

        let mut rows = store
            .conn
            .query("SELECT fingerprint, duplicate_of FROM duplicate_marks", params![])
            .await
            .unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<String>(0).unwrap(), "dup-fp");
        assert_eq!(row.get::<String>(1).unwrap(), "orig-fp");
    }
}
