//! Circuit breaker — consecutive-failure trip with a single half-open probe.
//!
//! States: CLOSED (pass-through) → OPEN after N consecutive failures
//! (fail fast for the cooldown) → HALF_OPEN once the cooldown elapses
//! (exactly one trial call) → CLOSED on success, back to OPEN on failure.
//! Every transition emits a structured event.

use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

/// Breaker tuning for one upstream.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a half-open probe.
    pub cooldown: Duration,
}

/// Current breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    /// Set while the single half-open probe is in flight.
    probe_in_flight: bool,
    last_transition: Instant,
}

/// Snapshot for health reporting.
#[derive(Debug, Clone)]
pub struct BreakerStats {
    pub name: String,
    pub state: BreakerState,
    pub consecutive_failures: u32,
    pub time_in_state: Duration,
}

/// Per-upstream circuit breaker. The lock is held only for state
/// bookkeeping, never across the guarded call.
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: RwLock<Inner>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: RwLock::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
                last_transition: Instant::now(),
            }),
        }
    }

    /// Ask permission to call the upstream.
    ///
    /// Fails fast with `CircuitOpen` while open (or while the half-open
    /// probe slot is taken); flips OPEN→HALF_OPEN once the cooldown has
    /// elapsed and claims the probe slot.
    pub async fn try_acquire(&self) -> Result<(), GatewayError> {
        let mut inner = self.inner.write().await;
        match inner.state {
            BreakerState::Closed => Ok(()),
            BreakerState::Open => {
                let elapsed = inner.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.cooldown {
                    inner.state = BreakerState::HalfOpen;
                    inner.probe_in_flight = true;
                    inner.last_transition = Instant::now();
                    info!(breaker = %self.name, "circuit half-open, allowing one probe");
                    Ok(())
                } else {
                    debug!(breaker = %self.name, "circuit open, failing fast");
                    Err(GatewayError::CircuitOpen {
                        backend: self.name.clone(),
                    })
                }
            }
            BreakerState::HalfOpen => {
                if inner.probe_in_flight {
                    debug!(breaker = %self.name, "probe already in flight, failing fast");
                    Err(GatewayError::CircuitOpen {
                        backend: self.name.clone(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    /// Record a successful call.
    pub async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures = 0;
        inner.probe_in_flight = false;
        if inner.state != BreakerState::Closed {
            inner.state = BreakerState::Closed;
            inner.opened_at = None;
            inner.last_transition = Instant::now();
            info!(breaker = %self.name, "circuit closed (upstream recovered)");
        }
    }

    /// Record a failed call.
    pub async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.consecutive_failures += 1;
        inner.probe_in_flight = false;
        match inner.state {
            BreakerState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = BreakerState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.last_transition = Instant::now();
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            BreakerState::HalfOpen => {
                inner.state = BreakerState::Open;
                inner.opened_at = Some(Instant::now());
                inner.last_transition = Instant::now();
                warn!(breaker = %self.name, "circuit reopened (probe failed)");
            }
            BreakerState::Open => {}
        }
    }

    pub async fn state(&self) -> BreakerState {
        self.inner.read().await.state
    }

    pub async fn stats(&self) -> BreakerStats {
        let inner = self.inner.read().await;
        BreakerStats {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            time_in_state: inner.last_transition.elapsed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, cooldown_ms: u64) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_millis(cooldown_ms),
            },
        )
    }

    #[tokio::test]
    async fn opens_after_exactly_threshold_failures() {
        let b = breaker(3, 60_000);
        for _ in 0..2 {
            b.try_acquire().await.unwrap();
            b.record_failure().await;
        }
        assert_eq!(b.state().await, BreakerState::Closed);

        b.try_acquire().await.unwrap();
        b.record_failure().await;
        assert_eq!(b.state().await, BreakerState::Open);
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_before_cooldown() {
        let b = breaker(1, 60_000);
        b.try_acquire().await.unwrap();
        b.record_failure().await;

        assert!(matches!(
            b.try_acquire().await,
            Err(GatewayError::CircuitOpen { .. })
        ));
    }

    #[tokio::test]
    async fn half_open_success_closes() {
        let b = breaker(1, 20);
        b.try_acquire().await.unwrap();
        b.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        b.try_acquire().await.unwrap();
        assert_eq!(b.state().await, BreakerState::HalfOpen);
        b.record_success().await;
        assert_eq!(b.state().await, BreakerState::Closed);
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let b = breaker(1, 20);
        b.try_acquire().await.unwrap();
        b.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        b.try_acquire().await.unwrap();
        b.record_failure().await;
        assert_eq!(b.state().await, BreakerState::Open);

        // Cooldown restarts: still failing fast right away.
        assert!(b.try_acquire().await.is_err());
    }

    #[tokio::test]
    async fn half_open_admits_exactly_one_probe() {
        let b = breaker(1, 20);
        b.try_acquire().await.unwrap();
        b.record_failure().await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        b.try_acquire().await.unwrap();
        // Second caller while the probe is in flight is rejected.
        assert!(b.try_acquire().await.is_err());
    }

    #[tokio::test]
    async fn success_resets_failure_streak() {
        let b = breaker(3, 60_000);
        b.try_acquire().await.unwrap();
        b.record_failure().await;
        b.try_acquire().await.unwrap();
        b.record_failure().await;
        b.try_acquire().await.unwrap();
        b.record_success().await;

        // Streak broken: two more failures stay under the threshold.
        b.try_acquire().await.unwrap();
        b.record_failure().await;
        b.try_acquire().await.unwrap();
        b.record_failure().await;
        assert_eq!(b.state().await, BreakerState::Closed);
    }
}
