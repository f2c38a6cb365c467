//! Per-model circuit breaker.
//!
//! State for each model key lives in the shared [`StateAdapter`] under
//! `<prefix>:<provider>:<model>` with a TTL, so every process pointed at the
//! same store sees the same health. A missing record means CLOSED with no
//! failures.
//!
//! Updates are read-modify-write without compare-and-swap. Two callers racing
//! on the same key can lose an increment or double-open a circuit. Thresholds
//! are coarse, so this is accepted rather than locked.

use std::sync::Arc;

use futures::future::join_all;
use modelgate_state::StateAdapter;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    #[default]
    Closed,
    Open,
}

/// Stored record. `opened_at_ms` is set exactly when `state` is `Open`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time_ms: i64,
    pub opened_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects attempts.
    pub timeout_ms: i64,
    /// TTL of stored records.
    pub state_ttl_secs: u64,
    pub key_prefix: String,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
            timeout_ms: 180_000,
            state_ttl_secs: 86_400,
            key_prefix: "circuit_breaker".to_string(),
        }
    }
}

/// Operator-facing snapshot of one model key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakerStatus {
    pub model_key: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub last_failure_time_ms: i64,
    pub opened_at_ms: Option<i64>,
    /// Whether an attempt would be allowed right now.
    pub available: bool,
    /// Milliseconds until an open circuit closes again.
    pub retry_in_ms: Option<i64>,
}

pub struct CircuitBreaker {
    state: Arc<StateAdapter>,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    pub fn new(state: Arc<StateAdapter>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(state, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        state: Arc<StateAdapter>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            state,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn storage_key(&self, model_key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, model_key)
    }

    async fn load(&self, model_key: &str) -> CircuitBreakerState {
        self.state
            .get_json(&self.storage_key(model_key))
            .await
            .unwrap_or_default()
    }

    async fn store(&self, model_key: &str, record: &CircuitBreakerState) {
        self.state
            .set_json(
                &self.storage_key(model_key),
                record,
                Some(self.config.state_ttl_secs),
            )
            .await;
    }

    /// Whether `model_key` may be attempted now.
    ///
    /// An open circuit whose timeout has elapsed is closed here and written
    /// back, so recovery needs no background timer.
    pub async fn is_available(&self, model_key: &str) -> bool {
        let mut record = self.load(model_key).await;
        if record.state == CircuitState::Closed {
            return true;
        }

        let now = self.clock.now_ms();
        let opened_at = record.opened_at_ms.unwrap_or(record.last_failure_time_ms);
        if now - opened_at >= self.config.timeout_ms {
            record.state = CircuitState::Closed;
            record.opened_at_ms = None;
            self.store(model_key, &record).await;
            info!(
                model_key,
                failure_count = record.failure_count,
                "Circuit recovered after {}ms",
                now - opened_at
            );
            return true;
        }

        false
    }

    /// Reset the record to CLOSED with zero failures.
    pub async fn record_success(&self, model_key: &str) {
        let record = self.load(model_key).await;
        if record == CircuitBreakerState::default() {
            return;
        }
        self.store(model_key, &CircuitBreakerState::default()).await;
        debug!(
            model_key,
            previous_failures = record.failure_count,
            "Model success recorded, circuit closed"
        );
    }

    /// Count a failure; opens the circuit once the threshold is reached.
    pub async fn record_failure(&self, model_key: &str) {
        let mut record = self.load(model_key).await;
        let now = self.clock.now_ms();
        record.failure_count = record.failure_count.saturating_add(1);
        record.last_failure_time_ms = now;

        if record.failure_count >= self.config.failure_threshold {
            if record.state == CircuitState::Closed {
                record.state = CircuitState::Open;
                record.opened_at_ms = Some(now);
                warn!(
                    model_key,
                    failure_count = record.failure_count,
                    "Circuit opened for {}ms",
                    self.config.timeout_ms
                );
            }
        } else {
            debug!(
                model_key,
                "Model failure {}/{} before circuit opens",
                record.failure_count,
                self.config.failure_threshold
            );
        }

        self.store(model_key, &record).await;
    }

    /// Snapshot without side effects; `available` reflects the lazy timeout
    /// check without writing it back.
    pub async fn status(&self, model_key: &str) -> BreakerStatus {
        let record = self.load(model_key).await;
        let now = self.clock.now_ms();
        let retry_in_ms = match (record.state, record.opened_at_ms) {
            (CircuitState::Open, Some(opened_at)) => {
                Some((opened_at + self.config.timeout_ms - now).max(0))
            }
            _ => None,
        };
        BreakerStatus {
            model_key: model_key.to_string(),
            state: record.state,
            failure_count: record.failure_count,
            last_failure_time_ms: record.last_failure_time_ms,
            opened_at_ms: record.opened_at_ms,
            available: retry_in_ms.is_none_or(|ms| ms == 0),
            retry_in_ms: retry_in_ms.filter(|ms| *ms > 0),
        }
    }

    /// Snapshots for several keys, read concurrently.
    pub async fn statuses(&self, model_keys: &[String]) -> Vec<BreakerStatus> {
        join_all(model_keys.iter().map(|key| self.status(key))).await
    }

    pub async fn reset(&self, model_key: &str) {
        self.store(model_key, &CircuitBreakerState::default()).await;
        info!(model_key, "Circuit manually reset");
    }

    /// Model keys that currently have a stored record.
    pub async fn tracked_keys(&self) -> Vec<String> {
        let prefix = format!("{}:", self.config.key_prefix);
        self.state
            .keys(&format!("{prefix}*"))
            .await
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    /// Drop every stored record. Returns how many were removed.
    pub async fn reset_all(&self) -> usize {
        let removed = self
            .state
            .delete_pattern(&format!("{}:*", self.config.key_prefix))
            .await;
        info!(removed, "All circuits reset");
        removed
    }
}
