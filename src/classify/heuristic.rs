//! Stage 2 — heuristic scoring.
//!
//! Weighted marker matching: requester markers add, offeror and spam
//! markers subtract, budget size modifies. Strong groups are regexes and
//! score per occurrence; keyword groups score once per matched keyword.

use regex::Regex;

use crate::config::{KeywordGroup, PatternGroup, ScoringConfig};
use crate::error::ConfigError;
use crate::features::FeatureSet;

/// Result of the scoring pass.
#[derive(Debug, Clone)]
pub struct HeuristicOutcome {
    pub score: i32,
    /// Human-readable trail of what fired, e.g. `"+3: \bneed\b"`.
    pub hits: Vec<String>,
}

struct CompiledPatterns {
    patterns: Vec<(String, Regex)>,
    weight: i32,
}

impl CompiledPatterns {
    fn compile(group: &PatternGroup, section: &str) -> Result<Self, ConfigError> {
        let patterns = group
            .patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map(|re| (p.clone(), re))
                    .map_err(|source| ConfigError::InvalidPattern {
                        section: section.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            weight: group.weight,
        })
    }

    fn apply(&self, text_lower: &str, score: &mut i32, hits: &mut Vec<String>) {
        for (pattern, regex) in &self.patterns {
            let count = regex.find_iter(text_lower).count() as i32;
            if count > 0 {
                *score += self.weight * count;
                hits.push(format!("{:+}: {pattern}", self.weight * count));
            }
        }
    }
}

fn apply_keywords(group: &KeywordGroup, text_lower: &str, score: &mut i32, hits: &mut Vec<String>) {
    for keyword in &group.keywords {
        if text_lower.contains(keyword.as_str()) {
            *score += group.weight;
            hits.push(format!("{:+}: {keyword}", group.weight));
        }
    }
}

/// Compiled stage 2 scorer.
pub struct HeuristicStage {
    requester_strong: CompiledPatterns,
    requester_medium: KeywordGroup,
    requester_weak: KeywordGroup,
    offeror_strong: CompiledPatterns,
    offeror_medium: KeywordGroup,
    offeror_weak: KeywordGroup,
    spam_strong: KeywordGroup,
    spam_medium: KeywordGroup,
    quality: KeywordGroup,
    high_budget_bound: f64,
    low_budget_bound: f64,
}

impl HeuristicStage {
    pub fn new(config: &ScoringConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            requester_strong: CompiledPatterns::compile(
                &config.requester_strong,
                "scoring.requester_strong",
            )?,
            requester_medium: config.requester_medium.clone(),
            requester_weak: config.requester_weak.clone(),
            offeror_strong: CompiledPatterns::compile(
                &config.offeror_strong,
                "scoring.offeror_strong",
            )?,
            offeror_medium: config.offeror_medium.clone(),
            offeror_weak: config.offeror_weak.clone(),
            spam_strong: config.spam_strong.clone(),
            spam_medium: config.spam_medium.clone(),
            quality: config.quality.clone(),
            high_budget_bound: config.high_budget_bound,
            low_budget_bound: config.low_budget_bound,
        })
    }

    /// Score the candidate. Never concludes the cascade by itself.
    pub fn score(&self, text_lower: &str, features: &FeatureSet) -> HeuristicOutcome {
        let mut score = 0;
        let mut hits = Vec::new();

        self.requester_strong.apply(text_lower, &mut score, &mut hits);
        apply_keywords(&self.requester_medium, text_lower, &mut score, &mut hits);
        apply_keywords(&self.requester_weak, text_lower, &mut score, &mut hits);

        self.offeror_strong.apply(text_lower, &mut score, &mut hits);
        apply_keywords(&self.offeror_medium, text_lower, &mut score, &mut hits);
        apply_keywords(&self.offeror_weak, text_lower, &mut score, &mut hits);

        apply_keywords(&self.spam_strong, text_lower, &mut score, &mut hits);
        apply_keywords(&self.spam_medium, text_lower, &mut score, &mut hits);

        apply_keywords(&self.quality, text_lower, &mut score, &mut hits);

        if features.avg_budget > self.high_budget_bound {
            score += 1;
            hits.push(format!("+1: budget > {}", self.high_budget_bound));
        }
        if features.avg_budget > 0.0 && features.avg_budget < self.low_budget_bound {
            score -= 2;
            hits.push(format!("-2: budget < {}", self.low_budget_bound));
        }

        HeuristicOutcome { score, hits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(text: &str) -> HeuristicOutcome {
        let stage = HeuristicStage::new(&ScoringConfig::default()).unwrap();
        let features = FeatureSet::extract(text);
        stage.score(&text.to_lowercase(), &features)
    }

    #[test]
    fn requester_with_budget_scores_high() {
        let o = outcome("Need an SEO specialist, budget 50000, urgent");
        // "need" +3, "budget" +1, budget > 5000 +1
        assert!(o.score >= 5, "got {} via {:?}", o.score, o.hits);
    }

    #[test]
    fn offeror_scores_negative() {
        let o = outcome("I am a specialist in search ads, offering my services, see my portfolio");
        assert!(o.score <= -8, "got {} via {:?}", o.score, o.hits);
    }

    #[test]
    fn spam_scores_negative() {
        let o = outcome("subscribe to the channel for a free webinar about our training course");
        assert!(o.score <= -10, "got {} via {:?}", o.score, o.hits);
    }

    #[test]
    fn negative_marker_never_raises_score() {
        let base = outcome("Need an SEO specialist, budget 50000, urgent");
        let with_marker = outcome("Need an SEO specialist, budget 50000, urgent. Also offering my services");
        assert!(
            with_marker.score < base.score,
            "adding an offeror marker must lower the score: {} vs {}",
            with_marker.score,
            base.score
        );
    }

    #[test]
    fn tiny_budget_is_penalized() {
        // "budget" keyword adds +1, but the sub-1000 amount costs −2 net.
        let tiny = outcome("need a quick fix, budget 500");
        let plain = outcome("need a quick fix for this");
        assert!(tiny.score < plain.score, "{} vs {}", tiny.score, plain.score);
    }

    #[test]
    fn quality_signals_add() {
        let o = outcome("need a developer, technical spec ready, quick call to discuss");
        // "need" +3, "technical spec" +2, "quick call" +2
        assert!(o.score >= 7, "got {} via {:?}", o.score, o.hits);
    }

    #[test]
    fn repeated_strong_markers_stack() {
        let once = outcome("need a site audit for my project");
        let twice = outcome("need a site audit, also need a logo for my project");
        assert!(twice.score > once.score);
    }

    #[test]
    fn neutral_text_scores_zero() {
        let o = outcome("the weather is nice in the mountains this season");
        assert_eq!(o.score, 0);
        assert!(o.hits.is_empty());
    }
}
