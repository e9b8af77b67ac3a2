//! The cascading classifier — stages in fixed order, each either
//! concluding with a verdict or refining the running score.
//!
//! 1. Hard block (denylists, structure) — reject outright
//! 2. Heuristic scoring — integer score
//! 3. Context validation — source trust / topic relevance, may reject
//! 4. Threshold decision — accept ≥ +3, reject ≤ −2, else continue
//! 5. Statistical classifier — bag-of-terms probability
//! 6. Encoder classifier — probability, averaged with stage 5
//! 7. Deep model-backed analysis — only inside the uncertain band
//!
//! Classification never fails: a candidate always terminates in a verdict,
//! possibly a low-confidence conservative one.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::classify::context::{ContextOutcome, ContextStage};
use crate::classify::deep;
use crate::classify::hard_block::HardBlockStage;
use crate::classify::heuristic::HeuristicStage;
use crate::classify::neural::EncoderClassifier;
use crate::classify::priority;
use crate::classify::statistical::TermModel;
use crate::classify::verdict::{ReasonCode, Stage, Verdict};
use crate::config::{PipelineConfig, PriorityConfig, ThresholdConfig};
use crate::entities;
use crate::error::ConfigError;
use crate::features::FeatureSet;
use crate::gateway::{FallbackPolicy, GatewayMethod, ResilientGateway};

/// Confidence attached to hard blocks and blacklist rejects.
const BLOCK_CONFIDENCE: f32 = 0.99;

/// Confidence attached to a gateway-degraded verdict.
const DEGRADED_CONFIDENCE: f32 = 0.4;

/// The full classifier cascade.
pub struct CascadeClassifier {
    hard_block: HardBlockStage,
    heuristic: HeuristicStage,
    context: ContextStage,
    statistical: TermModel,
    neural: EncoderClassifier,
    gateway: Option<Arc<ResilientGateway>>,
    thresholds: ThresholdConfig,
    priority: PriorityConfig,
}

impl CascadeClassifier {
    /// Build the cascade from pipeline configuration.
    pub fn new(
        config: &PipelineConfig,
        statistical: TermModel,
        neural: EncoderClassifier,
        gateway: Option<Arc<ResilientGateway>>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            hard_block: HardBlockStage::new(&config.blocklist)?,
            heuristic: HeuristicStage::new(&config.scoring)?,
            context: ContextStage::new(config.trust.clone(), config.relevance.clone()),
            statistical,
            neural,
            gateway,
            thresholds: config.thresholds.clone(),
            priority: config.priority.clone(),
        })
    }

    /// Classify one candidate. Stages run strictly sequentially; the only
    /// possible await is the stage 7 gateway call.
    pub async fn classify(
        &self,
        text: &str,
        source: &str,
        topic: Option<&str>,
        features: &FeatureSet,
    ) -> Verdict {
        let text_lower = text.to_lowercase();

        // Stage 1: hard blocks.
        if let Some(block) = self.hard_block.check(&text_lower, features) {
            debug!(reason = block.reason.label(), detail = %block.detail, "hard blocked");
            return Verdict::reject(Stage::HardBlock, block.reason, BLOCK_CONFIDENCE)
                .with_detail(block.detail);
        }

        // Stage 2: heuristic scoring.
        let heuristic = self.heuristic.score(&text_lower, features);

        // Stage 3: context validation.
        let final_score = match self.context.apply(heuristic.score, source, topic) {
            ContextOutcome::Blocked { source } => {
                return Verdict::reject(
                    Stage::Context,
                    ReasonCode::BlacklistedSource,
                    BLOCK_CONFIDENCE,
                )
                .with_detail(source);
            }
            ContextOutcome::Adjusted { score, .. } => score,
        };

        // Stage 4: threshold decision.
        if final_score >= self.thresholds.accept_score {
            let verdict = Verdict::accept(
                Stage::Threshold,
                ReasonCode::ScoreAccept,
                self.thresholds.heuristic_confidence,
            )
            .with_score(final_score)
            .with_detail(format!("score={final_score}"));
            return self.finalize_accept(verdict, &text_lower, features, source, topic, final_score);
        }
        if final_score <= self.thresholds.reject_score {
            return Verdict::reject(
                Stage::Threshold,
                ReasonCode::ScoreReject,
                self.thresholds.heuristic_confidence,
            )
            .with_score(final_score)
            .with_detail(format!("score={final_score}"));
        }

        // Stages 5 and 6: probability models, averaged when both ran.
        let statistical_p = self.statistical.predict(&text_lower);
        let neural_p = self.neural.predict(&text_lower);
        let combined = match (statistical_p, neural_p) {
            (Some(a), Some(b)) => Some((a + b) / 2.0),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        let model_stage = if neural_p.is_some() {
            Stage::Neural
        } else {
            Stage::Statistical
        };

        if let Some(p) = combined {
            if p >= self.thresholds.model_accept_probability {
                let verdict = Verdict::accept(model_stage, ReasonCode::ModelAccept, p)
                    .with_score(final_score)
                    .with_detail(format!("p={p:.2}"));
                return self.finalize_accept(
                    verdict,
                    &text_lower,
                    features,
                    source,
                    topic,
                    final_score,
                );
            }
            if p <= self.thresholds.model_reject_probability {
                return Verdict::reject(model_stage, ReasonCode::ModelReject, 1.0 - p)
                    .with_score(final_score)
                    .with_detail(format!("p={p:.2}"));
            }
        }

        // Stage 7: deep analysis, only for the uncertain band.
        self.deep_analysis(text, &text_lower, features, source, topic, final_score)
            .await
    }

    async fn deep_analysis(
        &self,
        text: &str,
        text_lower: &str,
        features: &FeatureSet,
        source: &str,
        topic: Option<&str>,
        final_score: i32,
    ) -> Verdict {
        let Some(gateway) = &self.gateway else {
            return Verdict::reject(
                Stage::Conservative,
                ReasonCode::UncertainReject,
                self.thresholds.conservative_confidence,
            )
            .with_score(final_score)
            .with_detail(format!("score={final_score}, no model configured"));
        };

        let reply = gateway
            .complete(
                &deep::build_system_prompt(),
                &deep::build_user_prompt(text, features, final_score),
            )
            .await;

        let Some(model_text) = reply.text else {
            // Both backends down: apply the configured degradation policy.
            let verdict = match gateway.fallback_policy() {
                FallbackPolicy::RejectLeaning => Verdict::reject(
                    Stage::Deep,
                    ReasonCode::GatewayDegraded,
                    DEGRADED_CONFIDENCE,
                ),
                FallbackPolicy::AcceptLeaning => Verdict::accept(
                    Stage::Deep,
                    ReasonCode::GatewayDegraded,
                    DEGRADED_CONFIDENCE,
                ),
            };
            let verdict = verdict
                .with_score(final_score)
                .with_detail("all model backends unavailable");
            return if verdict.accepted {
                self.finalize_accept(verdict, text_lower, features, source, topic, final_score)
            } else {
                verdict
            };
        };

        match deep::parse_deep_response(&model_text) {
            Ok(deep_verdict) => {
                let detail = format!(
                    "{} ({}): {}",
                    deep_verdict.role.label(),
                    GatewayMethod::label(&reply.method),
                    deep_verdict.reason
                );
                if deep_verdict.is_lead {
                    let verdict =
                        Verdict::accept(Stage::Deep, ReasonCode::DeepAccept, deep_verdict.confidence)
                            .with_score(final_score)
                            .with_detail(detail);
                    self.finalize_accept(verdict, text_lower, features, source, topic, final_score)
                } else {
                    Verdict::reject(Stage::Deep, ReasonCode::DeepReject, deep_verdict.confidence)
                        .with_score(final_score)
                        .with_detail(detail)
                }
            }
            Err(e) => {
                warn!(error = %e, "unparseable deep analysis output, conservative reject");
                Verdict::reject(
                    Stage::Deep,
                    ReasonCode::UncertainReject,
                    self.thresholds.conservative_confidence,
                )
                .with_score(final_score)
                .with_detail(format!("parse failed: {e}"))
            }
        }
    }

    /// Attach entities, priority and tier to an accepted verdict.
    fn finalize_accept(
        &self,
        mut verdict: Verdict,
        text_lower: &str,
        features: &FeatureSet,
        source: &str,
        topic: Option<&str>,
        final_score: i32,
    ) -> Verdict {
        let extracted = entities::extract(text_lower);
        let breakdown = priority::compute(
            text_lower,
            features,
            &extracted,
            self.context.trust_tier(source),
            self.context.relevance_tier(topic),
            final_score,
            &self.priority,
        );
        verdict.tier = Some(breakdown.tier);
        verdict.priority = Some(breakdown.priority);
        verdict.entities = Some(extracted);
        verdict
    }
}
