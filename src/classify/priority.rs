//! Priority scoring for accepted leads.
//!
//! Weighted factors — budget tier, urgency, quality signals, source trust,
//! topic match, heuristic score, extracted entities — summed onto a base,
//! clamped to [0, 100], then bucketed into HOT / WARM / COLD.

use crate::classify::context::{RelevanceTier, TrustTier};
use crate::classify::verdict::Tier;
use crate::config::PriorityConfig;
use crate::entities::Entities;
use crate::features::{FeatureSet, Urgency};

/// Quality markers counted toward the priority bonus.
const QUALITY_MARKERS: [&str; 6] = [
    "technical spec",
    "brief",
    "project details",
    "zoom",
    "quick call",
    "meeting",
];

/// Computed priority with its factor trail.
#[derive(Debug, Clone)]
pub struct PriorityBreakdown {
    pub priority: u8,
    pub tier: Tier,
    pub factors: Vec<String>,
}

/// Compute priority and tier for an accepted lead.
pub fn compute(
    text_lower: &str,
    features: &FeatureSet,
    entities: &Entities,
    trust: TrustTier,
    relevance: RelevanceTier,
    heuristic_score: i32,
    config: &PriorityConfig,
) -> PriorityBreakdown {
    let mut priority = config.base;
    let mut factors = Vec::new();

    for (bound, bonus) in &config.budget_tiers {
        if features.avg_budget > *bound {
            priority += bonus;
            factors.push(format!("{bonus:+}: budget > {bound:.0}"));
            break;
        }
    }

    if features.urgency != Urgency::Normal {
        priority += config.urgency_bonus;
        factors.push(format!(
            "{:+}: {}",
            config.urgency_bonus,
            features.urgency.label()
        ));
    }

    let quality_count = QUALITY_MARKERS
        .iter()
        .filter(|m| text_lower.contains(*m))
        .count() as i32;
    if quality_count > 0 {
        let bonus = quality_count * config.quality_signal_bonus;
        priority += bonus;
        factors.push(format!("{bonus:+}: quality signals x{quality_count}"));
    }

    match trust {
        TrustTier::Trusted => {
            priority += config.trusted_source_bonus;
            factors.push(format!("{:+}: trusted source", config.trusted_source_bonus));
        }
        TrustTier::Low => {
            priority += config.low_trust_penalty;
            factors.push(format!("{:+}: low-trust source", config.low_trust_penalty));
        }
        _ => {}
    }

    if relevance == RelevanceTier::Core {
        priority += config.core_topic_bonus;
        factors.push(format!("{:+}: core topic", config.core_topic_bonus));
    }

    if heuristic_score >= config.high_score_bound {
        priority += config.high_score_bonus;
        factors.push(format!(
            "{:+}: heuristic score {heuristic_score}",
            config.high_score_bonus
        ));
    }

    // Entity-driven bonuses.
    if entities.budget.min > config.extracted_budget_bound {
        priority += config.extracted_budget_bonus;
        factors.push(format!(
            "{:+}: extracted budget > {:.0}",
            config.extracted_budget_bonus, config.extracted_budget_bound
        ));
    }
    if entities.urgency == Urgency::Urgent || entities.urgency == Urgency::Today {
        priority += config.extracted_urgency_bonus;
        factors.push(format!(
            "{:+}: extracted urgency",
            config.extracted_urgency_bonus
        ));
    }
    if entities.contact.has_contact {
        priority += config.contact_bonus;
        factors.push(format!("{:+}: contact present", config.contact_bonus));
    }

    let clamped = priority.clamp(0, 100) as u8;
    let tier = if clamped >= config.hot_bound {
        Tier::Hot
    } else if clamped >= config.warm_bound {
        Tier::Warm
    } else {
        Tier::Cold
    };

    PriorityBreakdown {
        priority: clamped,
        tier,
        factors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities;

    fn breakdown(text: &str, trust: TrustTier, relevance: RelevanceTier, score: i32) -> PriorityBreakdown {
        let features = FeatureSet::extract(text);
        let ents = entities::extract(text);
        compute(
            &text.to_lowercase(),
            &features,
            &ents,
            trust,
            relevance,
            score,
            &PriorityConfig::default(),
        )
    }

    #[test]
    fn hot_lead_from_trusted_source() {
        let b = breakdown(
            "Need an SEO specialist, budget 50000, urgent",
            TrustTier::Trusted,
            RelevanceTier::Core,
            8,
        );
        // 50 + 15 (budget > 20k) + 10 (urgent) + 10 (trusted) + 15 (core)
        // + 10 (score ≥ 5) + 20 (extracted urgency) → clamped to 100
        assert_eq!(b.priority, 100);
        assert_eq!(b.tier, Tier::Hot);
    }

    #[test]
    fn modest_lead_is_warm() {
        let b = breakdown(
            "Looking for someone to fix site navigation, no rush at all",
            TrustTier::Neutral,
            RelevanceTier::Unknown,
            3,
        );
        assert_eq!(b.priority, 50);
        assert_eq!(b.tier, Tier::Warm);
    }

    #[test]
    fn low_trust_pulls_into_cold() {
        let b = breakdown(
            "Small landing tweak wanted, budget 500 for the whole job",
            TrustTier::Low,
            RelevanceTier::Unknown,
            0,
        );
        // 50 − 10 = 40
        assert_eq!(b.priority, 40);
        assert_eq!(b.tier, Tier::Cold);
    }

    #[test]
    fn budget_tiers_take_highest_matching() {
        let b = breakdown(
            "Need a storefront rebuilt, budget 60000, details in the brief",
            TrustTier::Neutral,
            RelevanceTier::Unknown,
            0,
        );
        assert!(b.factors.iter().any(|f| f.contains("+20: budget > 50000")));
        // extracted budget 60000 > 50000 adds +15 as well
        assert!(b.factors.iter().any(|f| f.contains("+15: extracted budget")));
    }

    #[test]
    fn priority_never_exceeds_bounds() {
        let b = breakdown(
            "URGENT need SEO audit today, budget 90000, technical spec and brief ready, \
             zoom call possible, contact me at lead@client.com",
            TrustTier::Trusted,
            RelevanceTier::Core,
            12,
        );
        assert!(b.priority <= 100);
        assert_eq!(b.tier, Tier::Hot);
    }
}
