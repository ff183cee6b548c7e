//! Token-bucket rate limiting for external API calls.
//!
//! Every endpoint class gets its own bucket so submission/poll traffic and
//! generic outbound traffic (result downloads) never share a budget.

use crate::error::ApiError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

const MAX_WAIT_SLICE: Duration = Duration::from_secs(1);
const MIN_WAIT_SLICE: Duration = Duration::from_millis(10);

/// Settings for a single token bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum number of tokens the bucket holds
    #[serde(default = "default_capacity")]
    pub capacity: u32,

    /// Tokens added per second
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,

    /// Default wait budget for callers that block on a token
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

fn default_capacity() -> u32 {
    10
}

fn default_refill_per_second() -> f64 {
    1.0
}

fn default_max_wait_ms() -> u64 {
    30_000
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            refill_per_second: default_refill_per_second(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl RateLimitSettings {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.capacity == 0 {
            return Err("capacity must be at least 1".to_string());
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second <= 0.0 {
            return Err("refill_per_second must be a positive number".to_string());
        }
        Ok(())
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Lazily refilled token bucket
pub struct TokenBucket {
    name: String,
    capacity: f64,
    refill_per_second: f64,
    max_wait: Duration,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket
    pub fn new(name: impl Into<String>, settings: &RateLimitSettings) -> Self {
        let capacity = f64::from(settings.capacity);
        Self {
            name: name.into(),
            capacity,
            refill_per_second: settings.refill_per_second.max(0.0),
            max_wait: settings.max_wait(),
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> u32 {
        self.capacity as u32
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Current token count after applying any pending refill
    pub fn available(&self) -> f64 {
        let mut state = self.state.lock();
        self.refill(&mut state);
        state.tokens
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
            state.last_refill = now;
        }
    }

    /// Take `n` tokens if they are available; otherwise leave the bucket untouched.
    pub fn try_consume(&self, n: u32) -> bool {
        let wanted = f64::from(n);
        let mut state = self.state.lock();
        self.refill(&mut state);
        if state.tokens >= wanted {
            state.tokens -= wanted;
            true
        } else {
            false
        }
    }

    fn shortfall_wait(&self, n: u32) -> Duration {
        let state = self.state.lock();
        let missing = (f64::from(n) - state.tokens).max(0.0);
        drop(state);
        if self.refill_per_second <= 0.0 {
            return MAX_WAIT_SLICE;
        }
        Duration::from_secs_f64(missing / self.refill_per_second).clamp(MIN_WAIT_SLICE, MAX_WAIT_SLICE)
    }

    /// Block until `n` tokens are taken or `max_wait` elapses.
    pub async fn wait_and_consume(&self, n: u32, max_wait: Duration) -> Result<(), ApiError> {
        if f64::from(n) > self.capacity {
            return Err(ApiError::RateLimitExceedsCapacity {
                limiter: self.name.clone(),
                requested: n,
                capacity: self.capacity(),
            });
        }

        let started = Instant::now();
        let deadline = started + max_wait;
        loop {
            if self.try_consume(n) {
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    limiter = %self.name,
                    requested = n,
                    waited_ms = now.duration_since(started).as_millis(),
                    "Rate limiter wait budget exhausted"
                );
                return Err(ApiError::RateLimitTimeout {
                    limiter: self.name.clone(),
                    requested: n,
                    waited: now.duration_since(started),
                });
            }

            let wait = self.shortfall_wait(n).min(deadline - now);
            debug!(limiter = %self.name, wait_ms = wait.as_millis(), "Waiting for rate limiter tokens");
            sleep(wait).await;
        }
    }

    /// Take one token using the bucket's configured wait budget
    pub async fn acquire(&self) -> Result<(), ApiError> {
        self.wait_and_consume(1, self.max_wait).await
    }
}

/// Rate limiter settings per endpoint class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Batch submission and status polling
    #[serde(default = "default_batch_limit")]
    pub batch: RateLimitSettings,

    /// Other outbound calls (result downloads)
    #[serde(default)]
    pub outbound: RateLimitSettings,
}

fn default_batch_limit() -> RateLimitSettings {
    RateLimitSettings {
        capacity: 5,
        refill_per_second: 0.5,
        max_wait_ms: default_max_wait_ms(),
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            batch: default_batch_limit(),
            outbound: RateLimitSettings::default(),
        }
    }
}

/// Independent limiter instances shared by the engine components
#[derive(Clone)]
pub struct RateLimiters {
    pub batch: Arc<TokenBucket>,
    pub outbound: Arc<TokenBucket>,
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            batch: Arc::new(TokenBucket::new("batch", &config.batch)),
            outbound: Arc::new(TokenBucket::new("outbound", &config.outbound)),
        }
    }
}
