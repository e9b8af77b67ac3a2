//! Stage 1 — hard blocks.
//!
//! Denylist and structural checks that reject outright: spam domains,
//! blocked handles, scam phrasing, hard-irrelevant verticals, emoji
//! floods, and sub-minimal word counts. Nothing here scores — a match is
//! final.

use regex::Regex;

use crate::classify::verdict::ReasonCode;
use crate::config::BlocklistConfig;
use crate::error::ConfigError;
use crate::features::FeatureSet;

/// A concluded hard block.
#[derive(Debug, Clone)]
pub struct Block {
    pub reason: ReasonCode,
    pub detail: String,
}

/// Compiled stage 1 checks.
pub struct HardBlockStage {
    domains: Vec<String>,
    handles: Vec<String>,
    scam_patterns: Vec<(String, Regex)>,
    scam_keywords: Vec<String>,
    irrelevant_topics: Vec<String>,
    max_emoji_density: f64,
    min_word_count: usize,
}

impl HardBlockStage {
    pub fn new(config: &BlocklistConfig) -> Result<Self, ConfigError> {
        let scam_patterns = config
            .scam_patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map(|re| (p.clone(), re))
                    .map_err(|source| ConfigError::InvalidPattern {
                        section: "blocklist.scam_patterns".into(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            domains: config.domains.iter().map(|d| d.to_lowercase()).collect(),
            handles: config.handles.iter().map(|h| h.to_lowercase()).collect(),
            scam_patterns,
            scam_keywords: config.scam_keywords.iter().map(|k| k.to_lowercase()).collect(),
            irrelevant_topics: config
                .irrelevant_topics
                .iter()
                .map(|t| t.to_lowercase())
                .collect(),
            max_emoji_density: config.max_emoji_density,
            min_word_count: config.min_word_count,
        })
    }

    /// Check a candidate. `Some(block)` concludes the cascade.
    pub fn check(&self, text_lower: &str, features: &FeatureSet) -> Option<Block> {
        for domain in &self.domains {
            if text_lower.contains(domain.as_str()) {
                return Some(Block {
                    reason: ReasonCode::BlockedDomain,
                    detail: domain.clone(),
                });
            }
        }

        for handle in &self.handles {
            if text_lower.contains(handle.as_str()) {
                return Some(Block {
                    reason: ReasonCode::BlockedHandle,
                    detail: handle.clone(),
                });
            }
        }

        for (pattern, regex) in &self.scam_patterns {
            if regex.is_match(text_lower) {
                return Some(Block {
                    reason: ReasonCode::ScamPattern,
                    detail: pattern.clone(),
                });
            }
        }

        for keyword in &self.scam_keywords {
            if text_lower.contains(keyword.as_str()) {
                return Some(Block {
                    reason: ReasonCode::ScamKeyword,
                    detail: keyword.clone(),
                });
            }
        }

        for topic in &self.irrelevant_topics {
            if text_lower.contains(topic.as_str()) {
                return Some(Block {
                    reason: ReasonCode::IrrelevantTopic,
                    detail: topic.clone(),
                });
            }
        }

        if features.emoji_density > self.max_emoji_density {
            return Some(Block {
                reason: ReasonCode::EmojiFlood,
                detail: format!("density={:.2}", features.emoji_density),
            });
        }

        if features.word_count < self.min_word_count {
            return Some(Block {
                reason: ReasonCode::TooShort,
                detail: format!("{} words", features.word_count),
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage() -> HardBlockStage {
        HardBlockStage::new(&BlocklistConfig::default()).unwrap()
    }

    fn check(text: &str) -> Option<Block> {
        let features = FeatureSet::extract(text);
        stage().check(&text.to_lowercase(), &features)
    }

    #[test]
    fn blocks_spam_domain() {
        let block = check("fill in the form docs.google.com/forms/abc to apply now").unwrap();
        assert_eq!(block.reason, ReasonCode::BlockedDomain);
    }

    #[test]
    fn blocks_scam_pattern() {
        let block = check("earn $300 per day from home, start right now").unwrap();
        assert_eq!(block.reason, ReasonCode::ScamPattern);
    }

    #[test]
    fn blocks_scam_keyword() {
        let block = check("we teach account farming at scale, spots limited here").unwrap();
        assert_eq!(block.reason, ReasonCode::ScamKeyword);
    }

    #[test]
    fn blocks_irrelevant_topic() {
        let block = check("apartment renovation crew available for hire next week").unwrap();
        assert_eq!(block.reason, ReasonCode::IrrelevantTopic);
    }

    #[test]
    fn blocks_emoji_flood() {
        let block = check("🔥🔥🔥🔥 amazing offer for you 🔥🔥🔥🔥").unwrap();
        assert_eq!(block.reason, ReasonCode::EmojiFlood);
    }

    #[test]
    fn blocks_too_short() {
        let block = check("need seo help").unwrap();
        assert_eq!(block.reason, ReasonCode::TooShort);
    }

    #[test]
    fn passes_legitimate_request() {
        assert!(
            check("Need an SEO specialist for my online store, budget 50000, urgent").is_none()
        );
    }

    #[test]
    fn invalid_pattern_is_config_error() {
        let config = BlocklistConfig {
            scam_patterns: vec!["([unclosed".into()],
            ..BlocklistConfig::default()
        };
        assert!(HardBlockStage::new(&config).is_err());
    }
}
