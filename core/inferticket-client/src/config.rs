//! Client configuration.

use crate::error::{ClientError, ClientResult};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff for the idempotent issuance calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay ceiling after the first failure.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 250,
            max_delay_ms: 4_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay ceiling after the `attempt`-th failure (1-based): doubles from
    /// `base_delay_ms` and is capped at `max_delay_ms`.
    #[must_use]
    pub fn ceiling(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(32);
        let millis = self
            .base_delay_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    /// Full-jitter delay: uniform in `0..=ceiling(attempt)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let ceiling = self.ceiling(attempt).as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=ceiling))
    }
}

/// Settings for [`HttpTicketApi`](crate::HttpTicketApi), the issuer and the
/// redeemer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the issuing service, without a trailing slash.
    pub base_url: String,
    /// Issuer name bound into every token challenge.
    pub issuer_name: String,
    /// Origin the tokens are redeemable at.
    pub audience: String,
    /// Name attached to requested API keys.
    pub key_name: String,
    /// Timeout for public-key and registration calls.
    pub request_timeout_ms: u64,
    /// Timeout for the single redemption call.
    pub redeem_timeout_ms: u64,
    /// Reservation attempts before giving up on a contended store.
    pub reservation_attempts: u32,
    /// Backoff for public-key and registration calls.
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8787".to_string(),
            issuer_name: "inference-tickets".to_string(),
            audience: "inference".to_string(),
            key_name: "inferticket".to_string(),
            request_timeout_ms: 30_000,
            redeem_timeout_ms: 30_000,
            reservation_attempts: 3,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Creates a config for `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Checks that the settings are usable.
    pub fn validate(&self) -> ClientResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must be an http(s) URL, got {:?}",
                self.base_url
            )));
        }
        if self.issuer_name.is_empty() {
            return Err(ClientError::Config("issuer_name is empty".to_string()));
        }
        if self.request_timeout_ms == 0 || self.redeem_timeout_ms == 0 {
            return Err(ClientError::Config("timeouts must be non-zero".to_string()));
        }
        if self.reservation_attempts == 0 || self.retry.max_attempts == 0 {
            return Err(ClientError::Config(
                "attempt counts must be at least 1".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ClientError::Config(
                "retry.base_delay_ms exceeds retry.max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Timeout for public-key and registration calls.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Timeout for the redemption call.
    #[must_use]
    pub fn redeem_timeout(&self) -> Duration {
        Duration::from_millis(self.redeem_timeout_ms)
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }
}
