//! Token-bucket rate limiting for outbound dispatch.
//!
//! Three scopes: a global direct-message bucket, a global broadcast bucket,
//! and lazily-created per-recipient buckets. Buckets refill lazily from
//! monotonic time, so system clock changes cannot corrupt them. Idle
//! per-recipient buckets are swept periodically to bound memory.
//!
//! A refused consume is not an error — it returns the wait until enough
//! tokens accrue, and `acquire_*` awaits that wait. No lock is held while
//! sleeping.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info};

/// Outcome of a consume attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsumeOutcome {
    Granted,
    /// Not enough tokens; retry after this long.
    Wait(Duration),
}

/// Token bucket over monotonic time. Tokens stay in [0, capacity].
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_rate: f64,
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket with `capacity` tokens refilling at `refill_rate`
    /// tokens per second.
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            tokens: capacity,
            last_refill: Instant::now(),
        }
    }

    /// Add tokens proportional to elapsed time, capped at capacity.
    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Try to take `n` tokens. On refusal the bucket is left untouched and
    /// the wait until `n` tokens will be available is returned.
    pub fn try_consume(&mut self, n: f64) -> ConsumeOutcome {
        self.refill();
        if self.tokens >= n {
            self.tokens -= n;
            ConsumeOutcome::Granted
        } else {
            let needed = n - self.tokens;
            ConsumeOutcome::Wait(Duration::from_secs_f64(needed / self.refill_rate))
        }
    }

    /// Current token count after refill, without consuming.
    pub fn peek(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    /// Refill to capacity.
    pub fn reset(&mut self) {
        self.tokens = self.capacity;
        self.last_refill = Instant::now();
    }
}

/// Limiter tuning. Defaults mirror messenger platform limits: 30 direct
/// messages per second globally, 20 broadcast posts per minute, 1 message
/// per second per recipient.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub direct_capacity: f64,
    pub direct_rate: f64,
    pub broadcast_capacity: f64,
    pub broadcast_rate: f64,
    pub recipient_capacity: f64,
    pub recipient_rate: f64,
    /// How often the recipient-bucket sweep may run.
    pub cleanup_interval: Duration,
    /// Recipient buckets idle longer than this are dropped.
    pub idle_threshold: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            direct_capacity: 30.0,
            direct_rate: 30.0,
            broadcast_capacity: 20.0,
            broadcast_rate: 20.0 / 60.0,
            recipient_capacity: 1.0,
            recipient_rate: 1.0,
            cleanup_interval: Duration::from_secs(300),
            idle_threshold: Duration::from_secs(600),
        }
    }
}

/// Usage counters for monitoring.
#[derive(Debug, Clone, Default)]
pub struct LimiterStats {
    pub total_requests: u64,
    pub delayed_requests: u64,
    pub total_wait: Duration,
}

struct RecipientBucket {
    bucket: TokenBucket,
    last_access: Instant,
}

struct Recipients {
    buckets: HashMap<String, RecipientBucket>,
    last_cleanup: Instant,
}

/// Scoped dispatch limiter.
pub struct DispatchLimiter {
    config: RateLimitConfig,
    direct: Mutex<TokenBucket>,
    broadcast: Mutex<TokenBucket>,
    recipients: Mutex<Recipients>,
    stats: Mutex<LimiterStats>,
}

impl DispatchLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            direct: Mutex::new(TokenBucket::new(config.direct_capacity, config.direct_rate)),
            broadcast: Mutex::new(TokenBucket::new(
                config.broadcast_capacity,
                config.broadcast_rate,
            )),
            recipients: Mutex::new(Recipients {
                buckets: HashMap::new(),
                last_cleanup: Instant::now(),
            }),
            stats: Mutex::new(LimiterStats::default()),
            config,
        }
    }

    /// Gate a direct message to `recipient`: the global direct bucket and
    /// the per-recipient bucket must both grant. Waits as needed and
    /// returns the total time waited.
    pub async fn acquire_direct(&self, recipient: &str) -> Duration {
        let mut waited = Duration::ZERO;

        loop {
            let outcome = self.direct.lock().await.try_consume(1.0);
            match outcome {
                ConsumeOutcome::Granted => break,
                ConsumeOutcome::Wait(wait) => {
                    debug!(scope = "direct", wait_ms = wait.as_millis() as u64, "rate limited");
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }

        loop {
            let outcome = {
                let mut recipients = self.recipients.lock().await;
                let entry = recipients
                    .buckets
                    .entry(recipient.to_string())
                    .or_insert_with(|| RecipientBucket {
                        bucket: TokenBucket::new(
                            self.config.recipient_capacity,
                            self.config.recipient_rate,
                        ),
                        last_access: Instant::now(),
                    });
                entry.last_access = Instant::now();
                entry.bucket.try_consume(1.0)
            };
            match outcome {
                ConsumeOutcome::Granted => break,
                ConsumeOutcome::Wait(wait) => {
                    debug!(
                        scope = "recipient",
                        recipient,
                        wait_ms = wait.as_millis() as u64,
                        "rate limited"
                    );
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }

        self.note_wait(waited).await;
        self.maybe_sweep().await;
        waited
    }

    /// Gate a broadcast post. Waits as needed, returns the time waited.
    pub async fn acquire_broadcast(&self) -> Duration {
        let mut waited = Duration::ZERO;
        loop {
            let outcome = self.broadcast.lock().await.try_consume(1.0);
            match outcome {
                ConsumeOutcome::Granted => break,
                ConsumeOutcome::Wait(wait) => {
                    debug!(scope = "broadcast", wait_ms = wait.as_millis() as u64, "rate limited");
                    tokio::time::sleep(wait).await;
                    waited += wait;
                }
            }
        }
        self.note_wait(waited).await;
        waited
    }

    /// Non-blocking check: would a direct message to `recipient` pass both
    /// scopes right now? Returns the longer wait when it would not.
    pub async fn check_direct(&self, recipient: &str) -> Result<(), Duration> {
        let direct_tokens = self.direct.lock().await.peek();
        let recipient_tokens = {
            let mut recipients = self.recipients.lock().await;
            match recipients.buckets.get_mut(recipient) {
                Some(entry) => entry.bucket.peek(),
                None => self.config.recipient_capacity,
            }
        };

        let mut wait = Duration::ZERO;
        if direct_tokens < 1.0 {
            wait = wait.max(Duration::from_secs_f64(
                (1.0 - direct_tokens) / self.config.direct_rate,
            ));
        }
        if recipient_tokens < 1.0 {
            wait = wait.max(Duration::from_secs_f64(
                (1.0 - recipient_tokens) / self.config.recipient_rate,
            ));
        }

        if wait.is_zero() { Ok(()) } else { Err(wait) }
    }

    /// Current counters.
    pub async fn stats(&self) -> LimiterStats {
        self.stats.lock().await.clone()
    }

    /// Number of live per-recipient buckets.
    pub async fn recipient_bucket_count(&self) -> usize {
        self.recipients.lock().await.buckets.len()
    }

    async fn note_wait(&self, waited: Duration) {
        let mut stats = self.stats.lock().await;
        stats.total_requests += 1;
        if !waited.is_zero() {
            stats.delayed_requests += 1;
            stats.total_wait += waited;
        }
    }

    /// Drop recipient buckets idle past the threshold. Runs at most once
    /// per cleanup interval.
    async fn maybe_sweep(&self) {
        let mut recipients = self.recipients.lock().await;
        if recipients.last_cleanup.elapsed() < self.config.cleanup_interval {
            return;
        }
        let threshold = self.config.idle_threshold;
        let before = recipients.buckets.len();
        recipients
            .buckets
            .retain(|_, entry| entry.last_access.elapsed() <= threshold);
        let dropped = before - recipients.buckets.len();
        if dropped > 0 {
            info!(dropped, "swept idle recipient buckets");
        }
        recipients.last_cleanup = Instant::now();
    }
}
