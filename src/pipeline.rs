//! The intake pipeline — wires normalization, duplicate detection, the
//! classifier cascade, strategy selection, rate limiting and dispatch into
//! one flow, and feeds asynchronous feedback back into the selector.
//!
//! Flow per candidate:
//! normalize → duplicate check (short-circuit reject) → cascade → on
//! accept: persist fingerprint, pick a variant, compose, gate on the rate
//! limiter, dispatch, record the attempt.
//!
//! Candidates never escape as errors from classification itself; only
//! store failures abort a single candidate (logged, batch continues).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::classify::verdict::{ReasonCode, Stage, Verdict};
use crate::classify::CascadeClassifier;
use crate::dedup::detector::{fingerprint, DuplicateDetector};
use crate::dispatch::{MessageDispatcher, ResponseComposer};
use crate::error::PipelineError;
use crate::features::FeatureSet;
use crate::gateway::{GatewayHealth, ResilientGateway};
use crate::ratelimit::DispatchLimiter;
use crate::store::{LeadStore, OutreachAttempt, SeenRecord};
use crate::strategy::{FeedbackOutcome, SelectionContext, StrategySelector};

/// Confidence attached to duplicate rejections.
const DUPLICATE_CONFIDENCE: f32 = 0.95;

/// An inbound candidate message, immutable once created.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// Channel-native id or generated UUID.
    pub id: String,
    pub text: String,
    /// Source feed id (channel name).
    pub source: String,
    /// Vertical tag assigned by the feed, when known.
    pub topic: Option<String>,
    /// Where a response would go; `None` disables dispatch.
    pub reply_to: Option<String>,
    pub received_at: DateTime<Utc>,
}

impl Candidate {
    pub fn new(text: &str, source: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            text: text.to_string(),
            source: source.to_string(),
            topic: None,
            reply_to: None,
            received_at: Utc::now(),
        }
    }

    pub fn with_topic(mut self, topic: &str) -> Self {
        self.topic = Some(topic.to_string());
        self
    }

    pub fn with_reply_to(mut self, reply_to: &str) -> Self {
        self.reply_to = Some(reply_to.to_string());
        self
    }
}

/// An external feed of candidates. Acquisition internals live elsewhere;
/// the pipeline only drains.
#[async_trait]
pub trait FeedSource: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch the next batch of candidates from this source.
    async fn poll(&self) -> Result<Vec<Candidate>, PipelineError>;
}

/// Result of running one candidate through the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub candidate_id: String,
    pub fingerprint: String,
    pub verdict: Verdict,
    /// Set when an outreach message was dispatched.
    pub attempt_id: Option<Uuid>,
    pub dispatched: bool,
}

/// The assembled intake pipeline. All services are injected; the pipeline
/// holds no process-wide globals.
pub struct LeadPipeline {
    detector: DuplicateDetector,
    classifier: CascadeClassifier,
    selector: StrategySelector,
    limiter: DispatchLimiter,
    composer: Arc<dyn ResponseComposer>,
    dispatcher: Option<Arc<dyn MessageDispatcher>>,
    store: Arc<dyn LeadStore>,
    gateway: Option<Arc<ResilientGateway>>,
    max_concurrent_sources: usize,
}

impl LeadPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        detector: DuplicateDetector,
        classifier: CascadeClassifier,
        selector: StrategySelector,
        limiter: DispatchLimiter,
        composer: Arc<dyn ResponseComposer>,
        dispatcher: Option<Arc<dyn MessageDispatcher>>,
        store: Arc<dyn LeadStore>,
        gateway: Option<Arc<ResilientGateway>>,
        max_concurrent_sources: usize,
    ) -> Self {
        Self {
            detector,
            classifier,
            selector,
            limiter,
            composer,
            dispatcher,
            store,
            gateway,
            max_concurrent_sources: max_concurrent_sources.max(1),
        }
    }

    /// Run one candidate through the full pipeline.
    pub async fn process(&self, candidate: Candidate) -> Result<PipelineOutcome, PipelineError> {
        if candidate.text.trim().is_empty() {
            return Err(PipelineError::EmptyCandidate);
        }

        let fp = fingerprint(&candidate.text);
        let features = FeatureSet::extract(&candidate.text);

        // Duplicate short-circuit.
        let dedup = self.detector.is_duplicate(&candidate.text).await?;
        if dedup.duplicate {
            if let Some(matched) = &dedup.matched {
                self.store.mark_duplicate(&fp, matched).await?;
            }
            let verdict = Verdict::reject(Stage::Dedup, ReasonCode::Duplicate, DUPLICATE_CONFIDENCE)
                .with_detail(format!(
                    "{:.0}% similar ({})",
                    dedup.similarity * 100.0,
                    dedup.method.map(|m| m.label()).unwrap_or("none"),
                ));
            self.emit_decision(&candidate, &verdict);
            return Ok(PipelineOutcome {
                candidate_id: candidate.id,
                fingerprint: fp,
                verdict,
                attempt_id: None,
                dispatched: false,
            });
        }

        // The cascade itself never fails.
        let verdict = self
            .classifier
            .classify(
                &candidate.text,
                &candidate.source,
                candidate.topic.as_deref(),
                &features,
            )
            .await;
        self.emit_decision(&candidate, &verdict);

        if !verdict.accepted {
            return Ok(PipelineOutcome {
                candidate_id: candidate.id,
                fingerprint: fp,
                verdict,
                attempt_id: None,
                dispatched: false,
            });
        }

        // Seen-persistence is gated strictly behind acceptance, so a crash
        // mid-pipeline cannot leave partial records, and rejected spam
        // never enters the dedup window.
        let embedding = self.detector.cached_embedding(&fp, &candidate.text).await;
        self.store
            .insert_seen(&SeenRecord {
                fingerprint: fp.clone(),
                text: candidate.text.clone(),
                embedding,
                source: candidate.source.clone(),
                seen_at: candidate.received_at,
            })
            .await?;

        let (attempt_id, dispatched) = self.dispatch_response(&candidate, &verdict, &fp).await;

        Ok(PipelineOutcome {
            candidate_id: candidate.id,
            fingerprint: fp,
            verdict,
            attempt_id,
            dispatched,
        })
    }

    /// Select a variant, compose, gate, send, record. Dispatch failures are
    /// logged but do not fail the candidate — the verdict already stands.
    async fn dispatch_response(
        &self,
        candidate: &Candidate,
        verdict: &Verdict,
        fp: &str,
    ) -> (Option<Uuid>, bool) {
        let Some(dispatcher) = &self.dispatcher else {
            return (None, false);
        };
        let Some(recipient) = &candidate.reply_to else {
            debug!(id = %candidate.id, "no reply target, skipping dispatch");
            return (None, false);
        };

        let context = SelectionContext {
            topic: candidate.topic.clone(),
            priority: verdict.priority.unwrap_or(0),
        };
        let Some(variant) = self.selector.select(&context).await else {
            warn!(id = %candidate.id, "no strategy variants available");
            return (None, false);
        };

        let text = self
            .composer
            .compose(&candidate.text, &variant, candidate.topic.as_deref());

        let waited = self.limiter.acquire_direct(recipient).await;
        if !waited.is_zero() {
            info!(
                id = %candidate.id,
                recipient = %recipient,
                waited_ms = waited.as_millis() as u64,
                "dispatch delayed by rate limiter"
            );
        }

        match dispatcher.send(recipient, &text).await {
            Ok(message_id) => {
                let attempt = OutreachAttempt::new(fp, &variant, recipient, &text);
                if let Err(e) = self.store.record_attempt(&attempt).await {
                    error!(id = %candidate.id, error = %e, "failed to record outreach attempt");
                    return (None, true);
                }
                info!(
                    id = %candidate.id,
                    attempt = %attempt.id,
                    variant = %variant,
                    message_id = %message_id,
                    "outreach dispatched"
                );
                (Some(attempt.id), true)
            }
            Err(e) => {
                error!(id = %candidate.id, error = %e, "dispatch failed");
                (None, false)
            }
        }
    }

    /// Process a batch; failures on individual candidates are logged and
    /// do not fail the rest.
    pub async fn process_batch(&self, candidates: Vec<Candidate>) -> Vec<PipelineOutcome> {
        let total = candidates.len();
        let mut outcomes = Vec::with_capacity(total);
        for candidate in candidates {
            match self.process(candidate).await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    error!(error = %e, "candidate failed, continuing batch");
                }
            }
        }
        info!(processed = outcomes.len(), total, "batch complete");
        outcomes
    }

    /// Drain several feed sources with bounded parallelism. Source scans
    /// run concurrently up to the configured ceiling; candidates from one
    /// source run strictly sequentially.
    pub async fn drain_sources(&self, sources: &[Arc<dyn FeedSource>]) -> Vec<PipelineOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_sources));
        let scans = sources.iter().map(|source| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                match source.poll().await {
                    Ok(candidates) => {
                        debug!(source = source.name(), count = candidates.len(), "feed polled");
                        self.process_batch(candidates).await
                    }
                    Err(e) => {
                        error!(source = source.name(), error = %e, "feed poll failed");
                        Vec::new()
                    }
                }
            }
        });

        join_all(scans).await.into_iter().flatten().collect()
    }

    // ── Feedback ingestion ──────────────────────────────────────────

    /// A reply arrived for an attempt. Idempotent: repeat observations for
    /// the same attempt are ignored.
    pub async fn reply_observed(
        &self,
        attempt_id: Uuid,
        latency: Duration,
    ) -> Result<(), PipelineError> {
        let Some(mut attempt) = self.store.attempt(attempt_id).await? else {
            warn!(%attempt_id, "reply for unknown attempt ignored");
            return Ok(());
        };
        if attempt.replied {
            debug!(%attempt_id, "reply already recorded, ignoring");
            return Ok(());
        }

        attempt.replied = true;
        attempt.reply_latency_secs = Some(latency.as_secs());

        let reward = self
            .selector
            .update(
                &attempt.variant,
                &FeedbackOutcome {
                    replied: true,
                    reply_latency: Some(latency),
                    conversation_depth: attempt.conversation_depth,
                    converted: false,
                    value: None,
                },
            )
            .await?;
        attempt.reward = Some(reward);
        self.store.update_attempt(&attempt).await?;
        Ok(())
    }

    /// The conversation grew; remembered for later reward shaping.
    pub async fn conversation_observed(
        &self,
        attempt_id: Uuid,
        depth: u32,
    ) -> Result<(), PipelineError> {
        let Some(mut attempt) = self.store.attempt(attempt_id).await? else {
            warn!(%attempt_id, "depth update for unknown attempt ignored");
            return Ok(());
        };
        if depth > attempt.conversation_depth {
            attempt.conversation_depth = depth;
            self.store.update_attempt(&attempt).await?;
        }
        Ok(())
    }

    /// Final outcome for an attempt. Idempotent on conversions.
    pub async fn outcome_observed(
        &self,
        attempt_id: Uuid,
        converted: bool,
        value: Option<f64>,
    ) -> Result<(), PipelineError> {
        let Some(mut attempt) = self.store.attempt(attempt_id).await? else {
            warn!(%attempt_id, "outcome for unknown attempt ignored");
            return Ok(());
        };
        if attempt.converted {
            debug!(%attempt_id, "conversion already recorded, ignoring");
            return Ok(());
        }

        attempt.converted = converted;
        attempt.value = value;

        let reward = self
            .selector
            .update(
                &attempt.variant,
                &FeedbackOutcome {
                    replied: true,
                    reply_latency: attempt.reply_latency_secs.map(Duration::from_secs),
                    conversation_depth: attempt.conversation_depth,
                    converted,
                    value,
                },
            )
            .await?;
        attempt.reward = Some(reward);
        self.store.update_attempt(&attempt).await?;
        Ok(())
    }

    /// Strategy performance, for reporting.
    pub async fn strategy_report(&self) -> crate::strategy::PerformanceReport {
        self.selector.report().await
    }

    /// Gateway breaker health, when a gateway is configured.
    pub async fn gateway_health(&self) -> Option<GatewayHealth> {
        match &self.gateway {
            Some(gateway) => Some(gateway.health().await),
            None => None,
        }
    }

    /// Rate limiter usage counters.
    pub async fn limiter_stats(&self) -> crate::ratelimit::LimiterStats {
        self.limiter.stats().await
    }

    /// One structured event per classification decision.
    fn emit_decision(&self, candidate: &Candidate, verdict: &Verdict) {
        info!(
            id = %candidate.id,
            source = %candidate.source,
            accepted = verdict.accepted,
            stage = verdict.stage.label(),
            reason = verdict.reason.label(),
            confidence = verdict.confidence,
            tier = verdict.tier.map(|t| t.label()).unwrap_or("-"),
            priority = verdict.priority.unwrap_or(0),
            "lead classified"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::Mutex;

    use crate::classify::{EncoderClassifier, TermModel};
    use crate::config::{PipelineConfig, TrustConfig};
    use crate::dedup::embedding::HashEmbedder;
    use crate::dispatch::TemplateComposer;
    use crate::ratelimit::RateLimitConfig;
    use crate::store::InMemoryStore;
    use crate::strategy::StrategyConfig;

    /// Dispatcher that records sends instead of talking to a network.
    struct MockDispatcher {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MockDispatcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }

        async fn sent_count(&self) -> usize {
            self.sent.lock().await.len()
        }
    }

    #[async_trait]
    impl MessageDispatcher for MockDispatcher {
        fn name(&self) -> &str {
            "mock"
        }

        async fn send(&self, recipient: &str, text: &str) -> Result<String, crate::error::DispatchError> {
            let mut sent = self.sent.lock().await;
            sent.push((recipient.to_string(), text.to_string()));
            Ok(format!("msg-{}", sent.len()))
        }
    }

    struct StaticFeed {
        name: &'static str,
        candidates: Vec<Candidate>,
    }

    #[async_trait]
    impl FeedSource for StaticFeed {
        fn name(&self) -> &str {
            self.name
        }

        async fn poll(&self) -> Result<Vec<Candidate>, PipelineError> {
            Ok(self.candidates.clone())
        }
    }

    async fn build_pipeline(
        dispatcher: Option<Arc<dyn MessageDispatcher>>,
    ) -> (LeadPipeline, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let config = PipelineConfig {
            trust: TrustConfig {
                trusted: vec!["it-freelance".into()],
                low: vec![],
                blacklisted: vec![],
            },
            ..PipelineConfig::default()
        };
        let embedder = Arc::new(HashEmbedder::default());

        let detector = DuplicateDetector::new(
            store.clone() as Arc<dyn LeadStore>,
            embedder.clone(),
            config.dedup.clone(),
        );
        let classifier = CascadeClassifier::new(
            &config,
            TermModel::untrained(),
            EncoderClassifier::new(Arc::new(HashEmbedder::new(0))),
            None,
        )
        .unwrap();
        let selector = StrategySelector::load(
            store.clone() as Arc<dyn LeadStore>,
            StrategyConfig::default(),
        )
        .await
        .unwrap();
        let limiter = DispatchLimiter::new(RateLimitConfig::default());

        let pipeline = LeadPipeline::new(
            detector,
            classifier,
            selector,
            limiter,
            Arc::new(TemplateComposer),
            dispatcher,
            store.clone() as Arc<dyn LeadStore>,
            None,
            5,
        );
        (pipeline, store)
    }

    fn lead_candidate() -> Candidate {
        Candidate::new("Need an SEO specialist, budget 50000, urgent", "it-freelance")
            .with_topic("seo")
            .with_reply_to("chat-42")
    }

    #[tokio::test]
    async fn accepted_lead_is_persisted_and_dispatched() {
        let dispatcher = MockDispatcher::new();
        let (pipeline, store) = build_pipeline(Some(dispatcher.clone())).await;

        let outcome = pipeline.process(lead_candidate()).await.unwrap();
        assert!(outcome.verdict.accepted);
        assert!(outcome.dispatched);
        assert!(outcome.attempt_id.is_some());
        assert_eq!(store.seen_count().await, 1);
        assert_eq!(dispatcher.sent_count().await, 1);
    }

    #[tokio::test]
    async fn rejected_spam_is_not_persisted() {
        let dispatcher = MockDispatcher::new();
        let (pipeline, store) = build_pipeline(Some(dispatcher.clone())).await;

        let spam = Candidate::new(
            "I am a specialist offering my services, see my portfolio today",
            "it-freelance",
        )
        .with_reply_to("chat-42");
        let outcome = pipeline.process(spam).await.unwrap();

        assert!(!outcome.verdict.accepted);
        assert!(!outcome.dispatched);
        assert_eq!(store.seen_count().await, 0);
        assert_eq!(dispatcher.sent_count().await, 0);
    }

    #[tokio::test]
    async fn second_submission_is_flagged_duplicate() {
        let (pipeline, store) = build_pipeline(None).await;

        let first = pipeline.process(lead_candidate()).await.unwrap();
        assert!(first.verdict.accepted);

        let second = pipeline.process(lead_candidate()).await.unwrap();
        assert!(!second.verdict.accepted);
        assert_eq!(second.verdict.stage, Stage::Dedup);
        assert_eq!(second.verdict.reason, ReasonCode::Duplicate);

        // The duplicate was marked but not re-inserted.
        assert_eq!(store.seen_count().await, 1);
        assert_eq!(store.duplicate_marks().await.len(), 1);
    }

    #[tokio::test]
    async fn empty_candidate_is_dropped() {
        let (pipeline, _store) = build_pipeline(None).await;
        let result = pipeline.process(Candidate::new("   ", "cli")).await;
        assert!(matches!(result, Err(PipelineError::EmptyCandidate)));
    }

    #[tokio::test]
    async fn batch_continues_past_bad_candidates() {
        let (pipeline, _store) = build_pipeline(None).await;
        let outcomes = pipeline
            .process_batch(vec![
                Candidate::new("", "cli"),
                lead_candidate(),
            ])
            .await;
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].verdict.accepted);
    }

    #[tokio::test]
    async fn reply_feedback_is_idempotent() {
        let dispatcher = MockDispatcher::new();
        let (pipeline, _store) = build_pipeline(Some(dispatcher)).await;

        let outcome = pipeline.process(lead_candidate()).await.unwrap();
        let attempt_id = outcome.attempt_id.unwrap();

        pipeline
            .reply_observed(attempt_id, Duration::from_secs(120))
            .await
            .unwrap();
        pipeline
            .reply_observed(attempt_id, Duration::from_secs(240))
            .await
            .unwrap();

        let report = pipeline.strategy_report().await;
        // Exactly one bandit update despite two reply events.
        assert_eq!(report.total_attempts, 1);
    }

    #[tokio::test]
    async fn conversion_feedback_updates_attempt() {
        let dispatcher = MockDispatcher::new();
        let (pipeline, store) = build_pipeline(Some(dispatcher)).await;

        let outcome = pipeline.process(lead_candidate()).await.unwrap();
        let attempt_id = outcome.attempt_id.unwrap();

        pipeline
            .reply_observed(attempt_id, Duration::from_secs(60))
            .await
            .unwrap();
        pipeline
            .conversation_observed(attempt_id, 4)
            .await
            .unwrap();
        pipeline
            .outcome_observed(attempt_id, true, Some(60_000.0))
            .await
            .unwrap();

        let attempt = store.attempt(attempt_id).await.unwrap().unwrap();
        assert!(attempt.converted);
        assert_eq!(attempt.value, Some(60_000.0));
        // 0.3 base + 0.1 fast + 0.1 depth≥3 + 1.0 close + 0.5 high value
        assert!((attempt.reward.unwrap() - 2.0).abs() < 1e-9);

        // A second conversion event must not double-update.
        pipeline
            .outcome_observed(attempt_id, true, Some(60_000.0))
            .await
            .unwrap();
        assert_eq!(pipeline.strategy_report().await.total_attempts, 2);
    }

    #[tokio::test]
    async fn feedback_for_unknown_attempt_is_ignored() {
        let (pipeline, _store) = build_pipeline(None).await;
        pipeline
            .reply_observed(Uuid::new_v4(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(pipeline.strategy_report().await.total_attempts, 0);
    }

    #[tokio::test]
    async fn drain_sources_processes_all_feeds() {
        let (pipeline, store) = build_pipeline(None).await;

        let sources: Vec<Arc<dyn FeedSource>> = vec![
            Arc::new(StaticFeed {
                name: "feed-a",
                candidates: vec![lead_candidate()],
            }),
            Arc::new(StaticFeed {
                name: "feed-b",
                candidates: vec![Candidate::new(
                    "Looking for a search ads expert, campaign audit needed, budget 30000",
                    "it-freelance",
                )
                .with_topic("search ads")],
            }),
        ];

        let outcomes = pipeline.drain_sources(&sources).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.verdict.accepted));
        assert_eq!(store.seen_count().await, 2);
    }
}

