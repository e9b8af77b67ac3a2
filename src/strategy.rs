//! Adaptive response-strategy selection — Thompson Sampling over Beta
//! beliefs, with ε-greedy exploration and static context-affinity
//! multipliers. Feedback events shape a scalar reward which updates the
//! per-variant Beta parameters; statistics persist through the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Beta, Distribution};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::store::LeadStore;

/// Per-variant Beta-belief statistics. `alpha` and `beta` never drop to
/// zero or below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyStats {
    pub variant: String,
    pub alpha: f64,
    pub beta: f64,
    pub attempts: u64,
    pub successes: u64,
    pub avg_reward: f64,
}

impl StrategyStats {
    /// A fresh uniform belief for a variant.
    pub fn seed(variant: &str) -> Self {
        Self {
            variant: variant.to_string(),
            alpha: 1.0,
            beta: 1.0,
            attempts: 0,
            successes: 0,
            avg_reward: 0.0,
        }
    }

    /// Mean of the Beta belief.
    pub fn confidence(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }
}

/// A context-affinity boost applied to a sampled value.
#[derive(Debug, Clone)]
pub struct Affinity {
    pub variant: String,
    pub multiplier: f64,
    pub rule: AffinityRule,
}

/// When an affinity applies.
#[derive(Debug, Clone)]
pub enum AffinityRule {
    TopicIs(String),
    PriorityAbove(u8),
}

/// Selector tuning. The reward schedule mirrors the production values:
/// base for any reply, a fast-reply bonus, depth bonuses, and a tiered
/// conversion bonus scaled by deal value.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    /// Probability of a uniform random pick (also covers cold start).
    pub exploration_rate: f64,
    pub base_reply_reward: f64,
    pub fast_reply_bonus: f64,
    /// A reply within this window counts as fast.
    pub fast_reply_window: Duration,
    /// Bonus at conversation depth ≥ 3.
    pub depth_bonus_small: f64,
    /// Bonus at conversation depth ≥ 5 (replaces the small one).
    pub depth_bonus_large: f64,
    pub conversion_bonus: f64,
    /// Extra bonus when deal value exceeds the mid bound.
    pub value_bonus_mid: f64,
    pub value_bound_mid: f64,
    /// Extra bonus when deal value exceeds the high bound (replaces mid).
    pub value_bonus_high: f64,
    pub value_bound_high: f64,
    pub affinities: Vec<Affinity>,
    /// Variants seeded when the store has no statistics yet.
    pub default_variants: Vec<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            exploration_rate: 0.2,
            base_reply_reward: 0.3,
            fast_reply_bonus: 0.1,
            fast_reply_window: Duration::from_secs(3600),
            depth_bonus_small: 0.1,
            depth_bonus_large: 0.2,
            conversion_bonus: 1.0,
            value_bonus_mid: 0.2,
            value_bound_mid: 20_000.0,
            value_bonus_high: 0.5,
            value_bound_high: 50_000.0,
            affinities: vec![
                Affinity {
                    variant: "technical".into(),
                    multiplier: 1.2,
                    rule: AffinityRule::TopicIs("seo".into()),
                },
                Affinity {
                    variant: "direct".into(),
                    multiplier: 1.1,
                    rule: AffinityRule::PriorityAbove(80),
                },
            ],
            default_variants: vec![
                "direct".into(),
                "technical".into(),
                "consultative".into(),
                "formal".into(),
            ],
        }
    }
}

/// Context for a selection decision.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    pub topic: Option<String>,
    pub priority: u8,
}

/// Feedback observed for one outreach attempt.
#[derive(Debug, Clone, Default)]
pub struct FeedbackOutcome {
    pub replied: bool,
    pub reply_latency: Option<Duration>,
    pub conversation_depth: u32,
    pub converted: bool,
    pub value: Option<f64>,
}

/// Per-variant report line.
#[derive(Debug, Clone, Serialize)]
pub struct StrategyReport {
    pub variant: String,
    pub attempts: u64,
    pub success_rate: f64,
    pub avg_reward: f64,
    pub confidence: f64,
}

/// Aggregate performance report.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub strategies: Vec<StrategyReport>,
    /// Highest average reward among variants with enough attempts.
    pub best_variant: Option<String>,
    pub total_attempts: u64,
}

/// Minimum attempts before a variant can be called best.
const BEST_VARIANT_MIN_ATTEMPTS: u64 = 10;

/// Thompson-sampling strategy selector.
pub struct StrategySelector {
    store: Arc<dyn LeadStore>,
    config: StrategyConfig,
    stats: RwLock<HashMap<String, StrategyStats>>,
}

impl StrategySelector {
    /// Load statistics from the store, seeding defaults when empty.
    pub async fn load(
        store: Arc<dyn LeadStore>,
        config: StrategyConfig,
    ) -> Result<Self, StoreError> {
        let mut stats: HashMap<String, StrategyStats> = store
            .load_strategies()
            .await?
            .into_iter()
            .map(|s| (s.variant.clone(), s))
            .collect();

        if stats.is_empty() {
            for variant in &config.default_variants {
                let seeded = StrategyStats::seed(variant);
                store.save_strategy(&seeded).await?;
                stats.insert(variant.clone(), seeded);
            }
            info!(variants = stats.len(), "seeded default strategy variants");
        }

        Ok(Self {
            store,
            config,
            stats: RwLock::new(stats),
        })
    }

    /// Pick a variant for the given context.
    ///
    /// With probability ε the pick is uniform (exploration, covers cold
    /// start); otherwise one Beta sample per variant, boosted by matching
    /// affinities, argmax wins.
    pub async fn select(&self, context: &SelectionContext) -> Option<String> {
        let stats = self.stats.read().await;
        if stats.is_empty() {
            return None;
        }
        let variants: Vec<&StrategyStats> = stats.values().collect();

        let mut rng = rand::thread_rng();
        if rng.gen_range(0.0..1.0) < self.config.exploration_rate {
            let pick = variants.choose(&mut rng).map(|s| s.variant.clone());
            if let Some(ref variant) = pick {
                debug!(variant = %variant, mode = "explore", "strategy selected");
            }
            return pick;
        }

        let mut best: Option<(&StrategyStats, f64)> = None;
        for entry in &variants {
            let sample = match Beta::new(entry.alpha, entry.beta) {
                Ok(dist) => dist.sample(&mut rng),
                Err(_) => 0.5,
            };
            let boosted = sample * self.affinity_multiplier(&entry.variant, context);
            if best.map(|(_, s)| boosted > s).unwrap_or(true) {
                best = Some((entry, boosted));
            }
        }

        let pick = best.map(|(entry, _)| entry.variant.clone());
        if let Some(ref variant) = pick {
            debug!(variant = %variant, mode = "exploit", "strategy selected");
        }
        pick
    }

    fn affinity_multiplier(&self, variant: &str, context: &SelectionContext) -> f64 {
        let mut multiplier = 1.0;
        for affinity in &self.config.affinities {
            if affinity.variant != variant {
                continue;
            }
            let applies = match &affinity.rule {
                AffinityRule::TopicIs(topic) => context
                    .topic
                    .as_deref()
                    .map(|t| t.eq_ignore_ascii_case(topic))
                    .unwrap_or(false),
                AffinityRule::PriorityAbove(bound) => context.priority > *bound,
            };
            if applies {
                multiplier *= affinity.multiplier;
            }
        }
        multiplier
    }

    /// Fold one feedback outcome into a variant's belief and persist it.
    pub async fn update(
        &self,
        variant: &str,
        outcome: &FeedbackOutcome,
    ) -> Result<f64, StoreError> {
        let reward = self.calculate_reward(outcome);
        let success = if reward > 0.0 { 1.0 } else { 0.0 };

        let updated = {
            let mut stats = self.stats.write().await;
            let Some(entry) = stats.get_mut(variant) else {
                warn!(variant, "feedback for unknown variant ignored");
                return Ok(reward);
            };
            entry.alpha += success;
            entry.beta += 1.0 - success;
            entry.avg_reward = (entry.avg_reward * entry.attempts as f64 + reward)
                / (entry.attempts + 1) as f64;
            entry.attempts += 1;
            entry.successes += success as u64;
            entry.clone()
        };

        self.store.save_strategy(&updated).await?;
        info!(
            variant,
            reward,
            attempts = updated.attempts,
            "strategy feedback applied"
        );
        Ok(reward)
    }

    /// Scalar reward for an outcome. No reply earns zero.
    pub fn calculate_reward(&self, outcome: &FeedbackOutcome) -> f64 {
        if !outcome.replied {
            return 0.0;
        }
        let cfg = &self.config;
        let mut reward = cfg.base_reply_reward;

        if let Some(latency) = outcome.reply_latency
            && latency < cfg.fast_reply_window
        {
            reward += cfg.fast_reply_bonus;
        }

        if outcome.conversation_depth >= 5 {
            reward += cfg.depth_bonus_large;
        } else if outcome.conversation_depth >= 3 {
            reward += cfg.depth_bonus_small;
        }

        if outcome.converted {
            reward += cfg.conversion_bonus;
            if let Some(value) = outcome.value {
                if value > cfg.value_bound_high {
                    reward += cfg.value_bonus_high;
                } else if value > cfg.value_bound_mid {
                    reward += cfg.value_bonus_mid;
                }
            }
        }

        reward
    }

    /// Per-variant performance snapshot.
    pub async fn report(&self) -> PerformanceReport {
        let stats = self.stats.read().await;
        let mut strategies: Vec<StrategyReport> = stats
            .values()
            .map(|s| StrategyReport {
                variant: s.variant.clone(),
                attempts: s.attempts,
                success_rate: s.successes as f64 / s.attempts.max(1) as f64,
                avg_reward: s.avg_reward,
                confidence: s.confidence(),
            })
            .collect();
        strategies.sort_by(|a, b| a.variant.cmp(&b.variant));

        let best_variant = stats
            .values()
            .filter(|s| s.attempts >= BEST_VARIANT_MIN_ATTEMPTS)
            .max_by(|a, b| a.avg_reward.total_cmp(&b.avg_reward))
            .map(|s| s.variant.clone());

        PerformanceReport {
            total_attempts: strategies.iter().map(|s| s.attempts).sum(),
            strategies,
            best_variant,
        }
    }
}
