//! Stage 3 — context validation.
//!
//! Adjusts the running score by source trust and topic relevance.
//! Blacklisted sources conclude the cascade with an immediate reject.

use crate::config::{RelevanceConfig, TrustConfig};

/// Trust tier of a message source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustTier {
    Trusted,
    Neutral,
    Low,
    Blacklisted,
}

/// Relevance tier of a candidate's topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelevanceTier {
    Core,
    Secondary,
    Irrelevant,
    Unknown,
}

/// Outcome of context validation.
#[derive(Debug, Clone)]
pub enum ContextOutcome {
    /// Source is blacklisted — immediate reject.
    Blocked { source: String },
    /// Score adjusted; cascade continues.
    Adjusted { score: i32, hits: Vec<String> },
}

/// Stage 3 evaluator.
pub struct ContextStage {
    trust: TrustConfig,
    relevance: RelevanceConfig,
}

impl ContextStage {
    pub fn new(trust: TrustConfig, relevance: RelevanceConfig) -> Self {
        Self { trust, relevance }
    }

    /// Trust tier for a source id.
    pub fn trust_tier(&self, source: &str) -> TrustTier {
        let matches = |list: &[String]| list.iter().any(|s| s.eq_ignore_ascii_case(source));
        if matches(&self.trust.blacklisted) {
            TrustTier::Blacklisted
        } else if matches(&self.trust.trusted) {
            TrustTier::Trusted
        } else if matches(&self.trust.low) {
            TrustTier::Low
        } else {
            TrustTier::Neutral
        }
    }

    /// Relevance tier for a topic tag.
    pub fn relevance_tier(&self, topic: Option<&str>) -> RelevanceTier {
        let Some(topic) = topic else {
            return RelevanceTier::Unknown;
        };
        let matches = |list: &[String]| list.iter().any(|t| t.eq_ignore_ascii_case(topic));
        if matches(&self.relevance.core) {
            RelevanceTier::Core
        } else if matches(&self.relevance.secondary) {
            RelevanceTier::Secondary
        } else if matches(&self.relevance.irrelevant) {
            RelevanceTier::Irrelevant
        } else {
            RelevanceTier::Unknown
        }
    }

    /// Apply source and topic adjustments to the running score.
    pub fn apply(&self, score: i32, source: &str, topic: Option<&str>) -> ContextOutcome {
        let mut adjusted = score;
        let mut hits = Vec::new();

        match self.trust_tier(source) {
            TrustTier::Blacklisted => {
                return ContextOutcome::Blocked {
                    source: source.to_string(),
                };
            }
            TrustTier::Trusted => {
                adjusted += 1;
                hits.push("+1: trusted source".to_string());
            }
            TrustTier::Low => {
                adjusted -= 1;
                hits.push("-1: low-trust source".to_string());
            }
            TrustTier::Neutral => {}
        }

        match self.relevance_tier(topic) {
            RelevanceTier::Core => {
                adjusted += 2;
                hits.push("+2: core topic".to_string());
            }
            RelevanceTier::Secondary => {
                adjusted += 1;
                hits.push("+1: secondary topic".to_string());
            }
            RelevanceTier::Irrelevant => {
                adjusted -= 2;
                hits.push("-2: irrelevant topic".to_string());
            }
            RelevanceTier::Unknown => {}
        }

        ContextOutcome::Adjusted {
            score: adjusted,
            hits,
        }
    }
}
