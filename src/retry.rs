//! Retry manager with exponential backoff
//!
//! Every external call (embedding, index, generation) goes through
//! [`RetryManager::execute_with_retry`]:
//! - each attempt runs under a per-call timeout; an elapsed timeout counts as
//!   a transient failure
//! - transient failures back off exponentially (capped, ±25% jitter)
//! - attempts are bounded; exhaustion or a permanent failure is reported as
//!   the dependency's `*Unavailable` error
//! - errors about the caller's data (dimension mismatch, cancellation, ...)
//!   pass through untouched

use std::future::Future;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::errors::{Dependency, RagError, Result};
use crate::telemetry::{TelemetryCollector, TelemetryEvent};

/// Maximum number of attempts, first call included
pub const MAX_ATTEMPTS: u32 = 5;

/// Base delay for exponential backoff (1 second)
const BASE_DELAY_MS: u64 = 1000;

/// Maximum delay cap (16 seconds)
const MAX_DELAY_MS: u64 = 16000;

/// Per-call timeout (30 seconds)
const CALL_TIMEOUT_SECS: u64 = 30;

/// Retry settings as they appear in the configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub call_timeout_secs: u64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: BASE_DELAY_MS,
            max_delay_ms: MAX_DELAY_MS,
            call_timeout_secs: CALL_TIMEOUT_SECS,
            jitter: true,
        }
    }
}

/// Retry manager with exponential backoff
#[derive(Clone)]
pub struct RetryManager {
    /// Maximum attempts, first call included
    max_attempts: u32,

    /// Base delay in milliseconds
    base_delay_ms: u64,

    /// Maximum delay cap in milliseconds
    max_delay_ms: u64,

    /// Upper bound for a single call
    call_timeout: Duration,

    /// Enable jitter
    enable_jitter: bool,

    telemetry: Option<TelemetryCollector>,
}

impl Default for RetryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RetryManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryManager")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay_ms", &self.base_delay_ms)
            .field("max_delay_ms", &self.max_delay_ms)
            .field("call_timeout", &self.call_timeout)
            .field("enable_jitter", &self.enable_jitter)
            .finish()
    }
}

impl RetryManager {
    /// Create new retry manager with default settings
    pub fn new() -> Self {
        Self::from_config(&RetryConfig::default())
    }

    /// Create retry manager with custom attempt count and base delay
    pub fn with_config(max_attempts: u32, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            max_delay_ms: MAX_DELAY_MS,
            call_timeout: Duration::from_secs(CALL_TIMEOUT_SECS),
            enable_jitter: true,
            telemetry: None,
        }
    }

    /// Build from the configuration section
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms.max(config.base_delay_ms),
            call_timeout: Duration::from_secs(config.call_timeout_secs.max(1)),
            enable_jitter: config.jitter,
            telemetry: None,
        }
    }

    /// Override the per-call timeout
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Same policy with a different attempt bound
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Report retry attempts to a telemetry collector
    pub fn with_telemetry(mut self, telemetry: TelemetryCollector) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Execute operation with timeout and retry logic
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        dependency: Dependency,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let outcome = match tokio::time::timeout(self.call_timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(RagError::Timeout {
                    duration_ms: self.call_timeout.as_millis() as u64,
                }),
            };

            let error = match outcome {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            // Caller-side problems are not the dependency's fault
            if !error.is_dependency_failure() {
                return Err(error);
            }

            if !error.is_transient() || attempt >= self.max_attempts {
                tracing::error!(
                    dependency = dependency.as_str(),
                    attempts = attempt,
                    error = %error,
                    "giving up on external call"
                );
                return Err(dependency.unavailable(attempt, error.to_string()));
            }

            let delay = self.calculate_delay(attempt - 1);
            tracing::warn!(
                dependency = dependency.as_str(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transient failure, retrying"
            );
            if let Some(telemetry) = &self.telemetry {
                telemetry.record(TelemetryEvent::RetryAttempt {
                    dependency,
                    attempt,
                    timestamp: Instant::now(),
                });
            }
            sleep(delay).await;
        }
    }

    /// Calculate delay before retry number `retry` (0-based)
    fn calculate_delay(&self, retry: u32) -> Duration {
        // Binary exponential backoff: 2^retry
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(retry));

        // Cap at maximum delay
        let delay_ms = exponential_delay.min(self.max_delay_ms);

        // Add jitter if enabled (±25% random variation)
        let final_delay = if self.enable_jitter {
            let jitter = (delay_ms / 4) as i64;
            let random_jitter = (rand::random::<f64>() * 2.0 - 1.0) * jitter as f64;
            ((delay_ms as i64) + random_jitter as i64).max(0) as u64
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay)
    }

    /// Upper bound of the time spent sleeping between attempts, jitter aside
    pub fn max_total_wait_time(&self) -> Duration {
        let total_ms = (0..self.max_attempts.saturating_sub(1))
            .map(|retry| {
                self.base_delay_ms
                    .saturating_mul(2u64.saturating_pow(retry))
                    .min(self.max_delay_ms)
            })
            .sum();

        Duration::from_millis(total_ms)
    }

    /// Get max attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Get per-call timeout
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}
