//! Classification verdict types.

use serde::{Deserialize, Serialize};

use crate::entities::Entities;

/// Coarse priority bucket for accepted leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
}

impl Tier {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hot => "HOT",
            Self::Warm => "WARM",
            Self::Cold => "COLD",
        }
    }
}

/// The stage that concluded the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Dedup,
    HardBlock,
    Context,
    Threshold,
    Statistical,
    Neural,
    Deep,
    /// No model was available and the score stayed inconclusive.
    Conservative,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Dedup => "dedup",
            Self::HardBlock => "hard_block",
            Self::Context => "context",
            Self::Threshold => "threshold",
            Self::Statistical => "statistical",
            Self::Neural => "neural",
            Self::Deep => "deep",
            Self::Conservative => "conservative",
        }
    }
}

/// Why the deciding stage ruled the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    Duplicate,
    BlockedDomain,
    BlockedHandle,
    ScamPattern,
    ScamKeyword,
    IrrelevantTopic,
    EmojiFlood,
    TooShort,
    BlacklistedSource,
    ScoreAccept,
    ScoreReject,
    ModelAccept,
    ModelReject,
    DeepAccept,
    DeepReject,
    UncertainReject,
    GatewayDegraded,
}

impl ReasonCode {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Duplicate => "duplicate",
            Self::BlockedDomain => "blocked_domain",
            Self::BlockedHandle => "blocked_handle",
            Self::ScamPattern => "scam_pattern",
            Self::ScamKeyword => "scam_keyword",
            Self::IrrelevantTopic => "irrelevant_topic",
            Self::EmojiFlood => "emoji_flood",
            Self::TooShort => "too_short",
            Self::BlacklistedSource => "blacklisted_source",
            Self::ScoreAccept => "score_accept",
            Self::ScoreReject => "score_reject",
            Self::ModelAccept => "model_accept",
            Self::ModelReject => "model_reject",
            Self::DeepAccept => "deep_accept",
            Self::DeepReject => "deep_reject",
            Self::UncertainReject => "uncertain_reject",
            Self::GatewayDegraded => "gateway_degraded",
        }
    }
}

/// Classification outcome — produced exactly once per candidate.
///
/// `tier`, `priority` and `entities` are set only on acceptance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub accepted: bool,
    pub confidence: f32,
    pub stage: Stage,
    pub reason: ReasonCode,
    /// Free-form context for the reason (matched pattern, score, ...).
    pub detail: Option<String>,
    /// Final running score from the heuristic/context stages.
    pub score: i32,
    pub tier: Option<Tier>,
    pub priority: Option<u8>,
    pub entities: Option<Entities>,
}

impl Verdict {
    /// A rejection concluded at `stage`.
    pub fn reject(stage: Stage, reason: ReasonCode, confidence: f32) -> Self {
        Self {
            accepted: false,
            confidence,
            stage,
            reason,
            detail: None,
            score: 0,
            tier: None,
            priority: None,
            entities: None,
        }
    }

    /// An acceptance concluded at `stage`; tier/priority/entities are
    /// attached by the cascade after entity extraction.
    pub fn accept(stage: Stage, reason: ReasonCode, confidence: f32) -> Self {
        Self {
            accepted: true,
            confidence,
            stage,
            reason,
            detail: None,
            score: 0,
            tier: None,
            priority: None,
            entities: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_score(mut self, score: i32) -> Self {
        self.score = score;
        self
    }
}
