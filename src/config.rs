//! Configuration types.
//!
//! Every business tuning value — blocklists, marker weights, thresholds,
//! priority factors — lives here rather than as code constants. The defaults
//! reproduce the production tuning; they are not derived values, so adjust
//! them through config, not by editing stage logic.

use std::time::Duration;

/// A weighted group of regex patterns.
#[derive(Debug, Clone)]
pub struct PatternGroup {
    pub patterns: Vec<String>,
    pub weight: i32,
}

/// A weighted group of plain substring markers.
#[derive(Debug, Clone)]
pub struct KeywordGroup {
    pub keywords: Vec<String>,
    pub weight: i32,
}

/// Stage 1 hard-block configuration: anything matching here is rejected
/// outright, before any scoring.
#[derive(Debug, Clone)]
pub struct BlocklistConfig {
    /// Link domains that mark a message as spam.
    pub domains: Vec<String>,
    /// Bot/channel handles that mark a message as spam.
    pub handles: Vec<String>,
    /// Scam phrasing, as regexes over the lowercased text.
    pub scam_patterns: Vec<String>,
    /// Scam vocabulary, plain substrings.
    pub scam_keywords: Vec<String>,
    /// Verticals that are never serviced, plain substrings.
    pub irrelevant_topics: Vec<String>,
    /// Reject when emoji make up more than this fraction of the words.
    pub max_emoji_density: f64,
    /// Reject messages shorter than this many words.
    pub min_word_count: usize,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            domains: vec!["forms.gle".into(), "docs.google.com/forms".into()],
            handles: vec!["@getclients_bot".into(), "@leadxchange_bot".into()],
            scam_patterns: vec![
                r"\$\d+\s*(?:per|a)\s+day".into(),
                r"guaranteed\s+\d+.*(?:per|a)\s+(?:day|week)".into(),
                r"easy (?:money|income)".into(),
                r"passive income from".into(),
                r"no (?:investment|experience).*earn".into(),
            ],
            scam_keywords: vec![
                "carding".into(),
                "cash out".into(),
                "account farming".into(),
                "anti-detect".into(),
                "antidetect".into(),
            ],
            irrelevant_topics: vec![
                "apartment renovation".into(),
                "cargo transport".into(),
                "legal services".into(),
                "accounting services".into(),
            ],
            max_emoji_density: 0.3,
            min_word_count: 5,
        }
    }
}

/// Stage 2 heuristic scoring configuration.
///
/// Requester markers push the score up, offeror/spam markers push it down.
/// Strong requester/offeror groups are regexes (matched per occurrence);
/// the rest are plain substrings (matched once).
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub requester_strong: PatternGroup,
    pub requester_medium: KeywordGroup,
    pub requester_weak: KeywordGroup,
    pub offeror_strong: PatternGroup,
    pub offeror_medium: KeywordGroup,
    pub offeror_weak: KeywordGroup,
    pub spam_strong: KeywordGroup,
    pub spam_medium: KeywordGroup,
    pub quality: KeywordGroup,
    /// Average mentioned budget above this adds one point.
    pub high_budget_bound: f64,
    /// A nonzero average budget below this subtracts two points.
    pub low_budget_bound: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            requester_strong: PatternGroup {
                patterns: vec![
                    r"\bneed(?:ed)?\b".into(),
                    r"\brequired?\b".into(),
                    r"\blooking for (?:a |an )?(?:specialist|expert|freelancer|someone|help)".into(),
                    r"\bwho can (?:do|build|help|set ?up|fix)".into(),
                    r"\bhave a (?:task|project|job)".into(),
                    r"\bhiring a freelancer\b".into(),
                ],
                weight: 3,
            },
            requester_medium: KeywordGroup {
                keywords: vec![
                    "please advise".into(),
                    "any recommendations".into(),
                    "help me figure".into(),
                    "need help".into(),
                    "consultation".into(),
                    "audit".into(),
                ],
                weight: 2,
            },
            requester_weak: KeywordGroup {
                keywords: vec![
                    "budget".into(),
                    "deadline".into(),
                    "cost of work".into(),
                    "pay on result".into(),
                ],
                weight: 1,
            },
            offeror_strong: PatternGroup {
                patterns: vec![
                    r"\bi(?:'m| am) (?:a |an )?(?:specialist|expert|marketer|developer|designer)".into(),
                    r"\boffering (?:my )?services\b".into(),
                    r"\bmy portfolio\b".into(),
                    r"\bready to (?:work|help|take it on)".into(),
                    r"#available\b".into(),
                ],
                weight: -4,
            },
            offeror_medium: KeywordGroup {
                keywords: vec![
                    "my experience".into(),
                    "my case studies".into(),
                    "certified".into(),
                    "worked with clients".into(),
                    "dm me".into(),
                    "message me".into(),
                    "contact me".into(),
                ],
                weight: -3,
            },
            offeror_weak: KeywordGroup {
                keywords: vec![
                    "resume".into(),
                    "my cv".into(),
                    "our agency".into(),
                    "our services".into(),
                    "price list".into(),
                    "my rates".into(),
                ],
                weight: -2,
            },
            spam_strong: KeywordGroup {
                keywords: vec![
                    "subscribe to the channel".into(),
                    "join the bot".into(),
                    "click the button".into(),
                    "sign up now".into(),
                    "free webinar".into(),
                    "training course".into(),
                ],
                weight: -5,
            },
            spam_medium: KeywordGroup {
                keywords: vec![
                    "we are hiring".into(),
                    "vacancy".into(),
                    "join our team".into(),
                    "full-time remote position".into(),
                ],
                weight: -3,
            },
            quality: KeywordGroup {
                keywords: vec![
                    "technical spec".into(),
                    "brief".into(),
                    "project details".into(),
                    "zoom".into(),
                    "quick call".into(),
                ],
                weight: 2,
            },
            high_budget_bound: 5_000.0,
            low_budget_bound: 1_000.0,
        }
    }
}

/// Source trust tiers for stage 3 context validation.
#[derive(Debug, Clone, Default)]
pub struct TrustConfig {
    /// Trusted sources: +1 to the running score, +10 priority.
    pub trusted: Vec<String>,
    /// Low-trust sources: −1 to the running score, −10 priority.
    pub low: Vec<String>,
    /// Blacklisted sources: immediate reject.
    pub blacklisted: Vec<String>,
}

/// Topic relevance tiers for stage 3 context validation.
#[derive(Debug, Clone)]
pub struct RelevanceConfig {
    /// Core verticals: +2 score, +15 priority.
    pub core: Vec<String>,
    /// Secondary verticals: +1 score.
    pub secondary: Vec<String>,
    /// Irrelevant verticals: −2 score.
    pub irrelevant: Vec<String>,
}

impl Default for RelevanceConfig {
    fn default() -> Self {
        Self {
            core: vec![
                "seo".into(),
                "search ads".into(),
                "marketplace listings".into(),
                "web development".into(),
            ],
            secondary: vec!["digital marketing".into(), "web design".into()],
            irrelevant: vec!["social media ads".into(), "influencer outreach".into()],
        }
    }
}

/// Decision thresholds for the cascade.
#[derive(Debug, Clone)]
pub struct ThresholdConfig {
    /// Stage 4: running score at or above this accepts.
    pub accept_score: i32,
    /// Stage 4: running score at or below this rejects.
    pub reject_score: i32,
    /// Confidence attached to a threshold decision.
    pub heuristic_confidence: f32,
    /// Stages 5–6: combined probability at or above this accepts.
    pub model_accept_probability: f32,
    /// Stages 5–6: combined probability at or below this rejects.
    pub model_reject_probability: f32,
    /// Confidence attached to the no-model conservative reject.
    pub conservative_confidence: f32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            accept_score: 3,
            reject_score: -2,
            heuristic_confidence: 0.85,
            model_accept_probability: 0.6,
            model_reject_probability: 0.4,
            conservative_confidence: 0.6,
        }
    }
}

/// Priority computation weights (applied only to accepted leads).
#[derive(Debug, Clone)]
pub struct PriorityConfig {
    pub base: i32,
    /// Budget tier bounds and bonuses, checked highest first.
    pub budget_tiers: Vec<(f64, i32)>,
    pub urgency_bonus: i32,
    pub quality_signal_bonus: i32,
    pub trusted_source_bonus: i32,
    pub low_trust_penalty: i32,
    pub core_topic_bonus: i32,
    /// Heuristic score at or above this earns the bonus.
    pub high_score_bound: i32,
    pub high_score_bonus: i32,
    /// Extracted budget minimum above this earns the bonus.
    pub extracted_budget_bound: f64,
    pub extracted_budget_bonus: i32,
    pub extracted_urgency_bonus: i32,
    pub contact_bonus: i32,
    /// Tier cut lines over the clamped [0, 100] priority.
    pub hot_bound: u8,
    pub warm_bound: u8,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            base: 50,
            budget_tiers: vec![
                (50_000.0, 20),
                (20_000.0, 15),
                (10_000.0, 10),
                (5_000.0, 5),
            ],
            urgency_bonus: 10,
            quality_signal_bonus: 5,
            trusted_source_bonus: 10,
            low_trust_penalty: -10,
            core_topic_bonus: 15,
            high_score_bound: 5,
            high_score_bonus: 10,
            extracted_budget_bound: 50_000.0,
            extracted_budget_bonus: 15,
            extracted_urgency_bonus: 20,
            contact_bonus: 5,
            hot_bound: 70,
            warm_bound: 50,
        }
    }
}

/// Duplicate detection configuration.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Trailing window consulted for duplicates.
    pub window: Duration,
    /// At most this many recent records are compared.
    pub max_records: usize,
    /// Cosine similarity above this is a semantic duplicate.
    pub semantic_threshold: f32,
    /// Best semantic score below this triggers the shingle fallback.
    pub semantic_low_bound: f32,
    /// Shingle ratio above this is a duplicate.
    pub exact_threshold: f32,
    /// Embedding cache capacity (normalized texts).
    pub cache_capacity: usize,
    /// Disable the semantic tier entirely (exact-only mode).
    pub semantic_enabled: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(48 * 3600),
            max_records: 500,
            semantic_threshold: 0.75,
            semantic_low_bound: 0.60,
            exact_threshold: 0.85,
            cache_capacity: 2_000,
            semantic_enabled: true,
        }
    }
}

/// Pipeline-wide configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrency ceiling for draining feed sources.
    pub max_concurrent_sources: usize,
    pub blocklist: BlocklistConfig,
    pub scoring: ScoringConfig,
    pub trust: TrustConfig,
    pub relevance: RelevanceConfig,
    pub thresholds: ThresholdConfig,
    pub priority: PriorityConfig,
    pub dedup: DedupConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 5,
            blocklist: BlocklistConfig::default(),
            scoring: ScoringConfig::default(),
            trust: TrustConfig::default(),
            relevance: RelevanceConfig::default(),
            thresholds: ThresholdConfig::default(),
            priority: PriorityConfig::default(),
            dedup: DedupConfig::default(),
        }
    }
}
