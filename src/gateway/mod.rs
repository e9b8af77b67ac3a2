//! Resilient model gateway — two upstream backends behind independent
//! circuit breakers, joined into a fallback chain.
//!
//! Call policy: attempt the primary; on any failure (including a fast-fail
//! from an open breaker) attempt the secondary; on secondary failure return
//! a deterministic heuristic-only reply tagged with its provenance. This is
//! a fallback chain, not retry-with-backoff — each attempt gets one bounded
//! timeout, so worst-case latency is the sum of at most two timeouts.
//! Errors never reach the caller.

pub mod backend;
pub mod breaker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

pub use backend::{ModelBackend, OllamaBackend, RigBackend};
pub use breaker::{BreakerConfig, BreakerState, BreakerStats, CircuitBreaker};

use crate::error::GatewayError;

/// Which layer produced a gateway reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMethod {
    Primary,
    Secondary,
    /// Both backends failed; no model text is available.
    Heuristic,
}

impl GatewayMethod {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Heuristic => "heuristic",
        }
    }
}

/// What the deep-analysis stage should lean toward when the gateway is
/// fully degraded and no model verdict exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Treat the candidate as not-a-lead (conservative default).
    RejectLeaning,
    /// Treat the candidate as a lead at low confidence.
    AcceptLeaning,
}

/// Gateway reply. `text` is `None` exactly when `method` is `Heuristic`.
#[derive(Debug, Clone)]
pub struct GatewayReply {
    pub text: Option<String>,
    pub method: GatewayMethod,
    pub latency: Duration,
}

/// Gateway tuning.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub primary_breaker: BreakerConfig,
    pub secondary_breaker: BreakerConfig,
    /// Bound for each single backend attempt.
    pub request_timeout: Duration,
    pub fallback_policy: FallbackPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            primary_breaker: BreakerConfig {
                failure_threshold: 5,
                cooldown: Duration::from_secs(60),
            },
            // The local model is flakier: trip earlier, recover sooner.
            secondary_breaker: BreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(30),
            },
            request_timeout: Duration::from_secs(10),
            fallback_policy: FallbackPolicy::RejectLeaning,
        }
    }
}

/// Health snapshot for reporting.
#[derive(Debug, Clone)]
pub struct GatewayHealth {
    /// At least one breaker is not open.
    pub healthy: bool,
    pub primary: BreakerStats,
    pub secondary: BreakerStats,
}

/// Two model backends behind breakers, with heuristic degradation.
pub struct ResilientGateway {
    primary: Arc<dyn ModelBackend>,
    secondary: Arc<dyn ModelBackend>,
    primary_breaker: CircuitBreaker,
    secondary_breaker: CircuitBreaker,
    config: GatewayConfig,
}

impl ResilientGateway {
    pub fn new(
        primary: Arc<dyn ModelBackend>,
        secondary: Arc<dyn ModelBackend>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            primary_breaker: CircuitBreaker::new(
                primary.name().to_string(),
                config.primary_breaker.clone(),
            ),
            secondary_breaker: CircuitBreaker::new(
                secondary.name().to_string(),
                config.secondary_breaker.clone(),
            ),
            primary,
            secondary,
            config,
        }
    }

    /// The configured degradation policy, for the deep-analysis stage.
    pub fn fallback_policy(&self) -> FallbackPolicy {
        self.config.fallback_policy
    }

    /// Run the fallback chain. Never returns an error.
    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> GatewayReply {
        let started = Instant::now();

        match self
            .attempt(&*self.primary, &self.primary_breaker, system_prompt, user_prompt)
            .await
        {
            Ok(text) => {
                debug!(method = "primary", latency_ms = started.elapsed().as_millis() as u64, "gateway reply");
                return GatewayReply {
                    text: Some(text),
                    method: GatewayMethod::Primary,
                    latency: started.elapsed(),
                };
            }
            Err(e) => {
                warn!(error = %e, "primary backend failed, trying secondary");
            }
        }

        match self
            .attempt(
                &*self.secondary,
                &self.secondary_breaker,
                system_prompt,
                user_prompt,
            )
            .await
        {
            Ok(text) => {
                debug!(method = "secondary", latency_ms = started.elapsed().as_millis() as u64, "gateway reply");
                GatewayReply {
                    text: Some(text),
                    method: GatewayMethod::Secondary,
                    latency: started.elapsed(),
                }
            }
            Err(e) => {
                warn!(error = %e, "all model backends unavailable, degrading to heuristic");
                GatewayReply {
                    text: None,
                    method: GatewayMethod::Heuristic,
                    latency: started.elapsed(),
                }
            }
        }
    }

    /// One guarded attempt: breaker permission, bounded call, result
    /// recording. The timeout is enforced here as well as passed down, so
    /// a misbehaving backend cannot stretch the latency bound. The breaker
    /// lock is never held across the call itself.
    async fn attempt(
        &self,
        backend: &dyn ModelBackend,
        breaker: &CircuitBreaker,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<String, GatewayError> {
        breaker.try_acquire().await?;

        let timeout = self.config.request_timeout;
        let call = backend.invoke(system_prompt, user_prompt, timeout);
        match tokio::time::timeout(timeout, call).await {
            Ok(Ok(text)) => {
                breaker.record_success().await;
                Ok(text)
            }
            Ok(Err(e)) => {
                breaker.record_failure().await;
                Err(e)
            }
            Err(_) => {
                breaker.record_failure().await;
                Err(GatewayError::Timeout {
                    backend: backend.name().to_string(),
                    timeout,
                })
            }
        }
    }

    /// Breaker states and failure counters for health reporting.
    pub async fn health(&self) -> GatewayHealth {
        let primary = self.primary_breaker.stats().await;
        let secondary = self.secondary_breaker.stats().await;
        GatewayHealth {
            healthy: primary.state != BreakerState::Open
                || secondary.state != BreakerState::Open,
            primary,
            secondary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    /// Scriptable backend: fails until `fail_first` calls have happened.
    struct FlakyBackend {
        name: &'static str,
        fail_first: u32,
        calls: AtomicU32,
    }

    impl FlakyBackend {
        fn failing_forever(name: &'static str) -> Self {
            Self {
                name,
                fail_first: u32::MAX,
                calls: AtomicU32::new(0),
            }
        }

        fn always_ok(name: &'static str) -> Self {
            Self {
                name,
                fail_first: 0,
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ModelBackend for FlakyBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn invoke(
            &self,
            _system: &str,
            _user: &str,
            _timeout: Duration,
        ) -> Result<String, GatewayError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(GatewayError::BackendFailed {
                    backend: self.name.into(),
                    reason: "scripted failure".into(),
                })
            } else {
                Ok(format!("reply from {}", self.name))
            }
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig {
            primary_breaker: BreakerConfig {
                failure_threshold: 5,
                cooldown: Duration::from_secs(60),
            },
            secondary_breaker: BreakerConfig {
                failure_threshold: 3,
                cooldown: Duration::from_secs(30),
            },
            request_timeout: Duration::from_millis(200),
            fallback_policy: FallbackPolicy::RejectLeaning,
        }
    }

    #[tokio::test]
    async fn primary_success_is_tagged_primary() {
        let gateway = ResilientGateway::new(
            Arc::new(FlakyBackend::always_ok("primary")),
            Arc::new(FlakyBackend::always_ok("secondary")),
            config(),
        );
        let reply = gateway.complete("sys", "user").await;
        assert_eq!(reply.method, GatewayMethod::Primary);
        assert_eq!(reply.text.as_deref(), Some("reply from primary"));
    }

    #[tokio::test]
    async fn primary_failure_falls_back_to_secondary() {
        let gateway = ResilientGateway::new(
            Arc::new(FlakyBackend::failing_forever("primary")),
            Arc::new(FlakyBackend::always_ok("secondary")),
            config(),
        );
        let reply = gateway.complete("sys", "user").await;
        assert_eq!(reply.method, GatewayMethod::Secondary);
        assert_eq!(reply.text.as_deref(), Some("reply from secondary"));
    }

    #[tokio::test]
    async fn both_failing_degrades_to_heuristic() {
        let gateway = ResilientGateway::new(
            Arc::new(FlakyBackend::failing_forever("primary")),
            Arc::new(FlakyBackend::failing_forever("secondary")),
            config(),
        );
        let reply = gateway.complete("sys", "user").await;
        assert_eq!(reply.method, GatewayMethod::Heuristic);
        assert!(reply.text.is_none());
    }

    #[tokio::test]
    async fn breaker_opens_after_five_primary_failures_and_skips_upstream() {
        let primary = Arc::new(FlakyBackend::failing_forever("primary"));
        let gateway = ResilientGateway::new(
            primary.clone(),
            Arc::new(FlakyBackend::always_ok("secondary")),
            config(),
        );

        for _ in 0..5 {
            let reply = gateway.complete("sys", "user").await;
            assert_eq!(reply.method, GatewayMethod::Secondary);
        }
        assert_eq!(primary.call_count(), 5);

        let health = gateway.health().await;
        assert_eq!(health.primary.state, BreakerState::Open);

        // Sixth call: primary breaker fails fast, upstream not invoked.
        let reply = gateway.complete("sys", "user").await;
        assert_eq!(reply.method, GatewayMethod::Secondary);
        assert_eq!(primary.call_count(), 5, "open breaker must skip the upstream");
    }

    #[tokio::test]
    async fn health_reports_unhealthy_when_both_open() {
        let gateway = ResilientGateway::new(
            Arc::new(FlakyBackend::failing_forever("primary")),
            Arc::new(FlakyBackend::failing_forever("secondary")),
            config(),
        );
        // 5 primary failures open the primary; 3 of those also opened the
        // secondary (threshold 3).
        for _ in 0..5 {
            gateway.complete("sys", "user").await;
        }
        let health = gateway.health().await;
        assert_eq!(health.primary.state, BreakerState::Open);
        assert_eq!(health.secondary.state, BreakerState::Open);
        assert!(!health.healthy);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        struct SlowBackend;

        #[async_trait]
        impl ModelBackend for SlowBackend {
            fn name(&self) -> &str {
                "primary"
            }
            async fn invoke(
                &self,
                _s: &str,
                _u: &str,
                timeout: Duration,
            ) -> Result<String, GatewayError> {
                tokio::time::sleep(timeout * 4).await;
                Ok("too late".into())
            }
        }

        let gateway = ResilientGateway::new(
            Arc::new(SlowBackend),
            Arc::new(FlakyBackend::always_ok("secondary")),
            config(),
        );
        let reply = gateway.complete("sys", "user").await;
        assert_eq!(reply.method, GatewayMethod::Secondary);
    }
}
