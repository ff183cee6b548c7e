//! Advisory exponential backoff for failing status polls.
//!
//! The monitoring pass runs on a fixed timer; the delay computed here is
//! logged and reported but never gates the next poll.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Jitter stays within this fraction of the unjittered delay
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_jitter_ratio() -> f64 {
    0.1
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

impl BackoffConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.base_delay_ms == 0 {
            return Err("base_delay_ms must be at least 1".to_string());
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(format!(
                "max_delay_ms ({}) cannot be below base_delay_ms ({})",
                self.max_delay_ms, self.base_delay_ms
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err("jitter_ratio must be within 0.0..=1.0".to_string());
        }
        Ok(())
    }

    /// `min(max, base * 2^retry)` without jitter
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = 1u64.checked_shl(retry).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Jittered delay for `retry`, deterministic in `seed`.
    ///
    /// Jitter only lengthens the delay, by at most `jitter_ratio` of
    /// `base_delay(retry)` and never past `base_delay(retry + 1)`. The jittered
    /// delay is therefore non-decreasing in `retry` and sits exactly at
    /// `max_delay_ms` once capped.
    pub fn delay(&self, retry: u32, seed: &str) -> Duration {
        let base = self.base_delay(retry).as_secs_f64();
        let next = self.base_delay(retry.saturating_add(1)).as_secs_f64();
        let ceiling = (base * (1.0 + self.jitter_ratio)).min(next);
        let spread = (ceiling - base).max(0.0);
        Duration::from_secs_f64((base + spread * unit_jitter(seed, retry)).min(ceiling))
    }
}

/// Uniform value in `[0.0, 1.0]` derived from the seed and retry count
fn unit_jitter(seed: &str, retry: u32) -> f64 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(&retry.to_le_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(bytes) as f64 / u64::MAX as f64
}
