//! Infallible state facade with silent in-memory degradation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::backend::KvBackend;
use crate::error::{Result, StateError};
use crate::memory::MemoryBackend;
use crate::redis_backend::RedisBackend;

/// Connection settings for the shared state store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Redis URL. `None` keeps all state process-local.
    pub redis_url: Option<String>,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    /// While degraded, the primary is re-probed at most once per interval.
    pub reprobe_interval_ms: u64,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            connect_timeout_ms: 2_000,
            operation_timeout_ms: 2_000,
            reprobe_interval_ms: 5_000,
        }
    }
}

/// Key-value adapter used for cross-process health state.
///
/// Every operation first goes to the primary backend (if any). When the
/// primary fails or times out, the operation is served from a process-local
/// [`MemoryBackend`] instead. Callers never see an error; the switch is
/// logged once when it starts and once when the primary recovers.
///
/// While degraded, operations go straight to memory. A single operation per
/// `reprobe_interval` is let through to the primary to detect recovery.
pub struct StateAdapter {
    primary: Option<Arc<dyn KvBackend>>,
    fallback: MemoryBackend,
    operation_timeout: Duration,
    reprobe_interval: Duration,
    degraded: AtomicBool,
    /// Milliseconds since `epoch` before which the primary is not retried.
    next_probe_ms: AtomicI64,
    epoch: Instant,
}

impl StateAdapter {
    /// Adapter with no shared store.
    pub fn in_memory() -> Self {
        Self {
            primary: None,
            fallback: MemoryBackend::new(),
            operation_timeout: Duration::from_millis(StateConfig::default().operation_timeout_ms),
            reprobe_interval: Duration::from_millis(StateConfig::default().reprobe_interval_ms),
            degraded: AtomicBool::new(false),
            next_probe_ms: AtomicI64::new(0),
            epoch: Instant::now(),
        }
    }

    /// Adapter over an arbitrary primary backend.
    pub fn with_backend(primary: Arc<dyn KvBackend>, operation_timeout: Duration) -> Self {
        Self {
            primary: Some(primary),
            fallback: MemoryBackend::new(),
            operation_timeout,
            reprobe_interval: Duration::from_millis(StateConfig::default().reprobe_interval_ms),
            degraded: AtomicBool::new(false),
            next_probe_ms: AtomicI64::new(0),
            epoch: Instant::now(),
        }
    }

    pub fn with_reprobe_interval(mut self, interval: Duration) -> Self {
        self.reprobe_interval = interval;
        self
    }

    /// Build an adapter from configuration. An unreachable Redis is not an
    /// error: the adapter starts in degraded mode and keeps state in memory.
    pub async fn connect(config: &StateConfig) -> Self {
        let Some(url) = config.redis_url.as_deref() else {
            debug!("No state store configured, using in-memory state");
            return Self::in_memory();
        };

        let connect_timeout = Duration::from_millis(config.connect_timeout_ms);
        let operation_timeout = Duration::from_millis(config.operation_timeout_ms);
        match RedisBackend::connect(url, connect_timeout, operation_timeout).await {
            Ok(backend) => Self::with_backend(Arc::new(backend), operation_timeout)
                .with_reprobe_interval(Duration::from_millis(config.reprobe_interval_ms)),
            Err(e) => {
                warn!(error = %e, "State store unavailable, falling back to in-memory state");
                let adapter = Self::in_memory();
                adapter.degraded.store(true, Ordering::Relaxed);
                adapter
            }
        }
    }

    /// Whether operations are currently served from the in-memory fallback.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Name of the backend serving requests right now.
    pub fn backend_name(&self) -> &str {
        match &self.primary {
            Some(primary) if !self.is_degraded() => primary.name(),
            _ => self.fallback.name(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        if let Some(primary) = self.active_primary() {
            match self.bounded("get", primary.get(key)).await {
                Ok(value) => {
                    self.mark_healthy(primary.name());
                    return value;
                }
                Err(e) => self.mark_degraded(primary.name(), &e),
            }
        }
        self.fallback.get(key).await.ok().flatten()
    }

    pub async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) {
        if let Some(primary) = self.active_primary() {
            match self.bounded("set", primary.set(key, value, ttl_secs)).await {
                Ok(()) => {
                    self.mark_healthy(primary.name());
                    return;
                }
                Err(e) => self.mark_degraded(primary.name(), &e),
            }
        }
        let _ = self.fallback.set(key, value, ttl_secs).await;
    }

    /// Read and decode a JSON value. Undecodable payloads read as absent.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, error = %e, "Discarding undecodable state value");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: Option<u64>) {
        match serde_json::to_string(value) {
            Ok(raw) => self.set(key, &raw, ttl_secs).await,
            Err(e) => warn!(key, error = %StateError::from(e), "Failed to encode state value"),
        }
    }

    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        if let Some(primary) = self.active_primary() {
            match self.bounded("keys", primary.keys(pattern)).await {
                Ok(keys) => {
                    self.mark_healthy(primary.name());
                    return keys;
                }
                Err(e) => self.mark_degraded(primary.name(), &e),
            }
        }
        self.fallback.keys(pattern).await.unwrap_or_default()
    }

    /// Delete every key matching `pattern`, returning how many were removed.
    pub async fn delete_pattern(&self, pattern: &str) -> usize {
        if let Some(primary) = self.active_primary() {
            let result = async {
                let keys = self.bounded("keys", primary.keys(pattern)).await?;
                self.bounded("delete", primary.delete(&keys)).await
            }
            .await;
            match result {
                Ok(removed) => {
                    self.mark_healthy(primary.name());
                    return removed;
                }
                Err(e) => self.mark_degraded(primary.name(), &e),
            }
        }
        let keys = self.fallback.keys(pattern).await.unwrap_or_default();
        self.fallback.delete(&keys).await.unwrap_or(0)
    }

    /// The primary, unless degraded and still inside the re-probe window.
    /// Only one caller wins each probe slot.
    fn active_primary(&self) -> Option<&Arc<dyn KvBackend>> {
        let primary = self.primary.as_ref()?;
        if !self.is_degraded() {
            return Some(primary);
        }
        let now = self.elapsed_ms();
        let due = self.next_probe_ms.load(Ordering::Relaxed);
        if now < due {
            return None;
        }
        let next = now + self.reprobe_interval.as_millis() as i64;
        self.next_probe_ms
            .compare_exchange(due, next, Ordering::Relaxed, Ordering::Relaxed)
            .ok()
            .map(|_| primary)
    }

    fn elapsed_ms(&self) -> i64 {
        self.epoch.elapsed().as_millis() as i64
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StateError::Timeout {
                backend: self.backend_label(),
                operation: operation.to_string(),
                timeout_ms: self.operation_timeout.as_millis() as u64,
            }),
        }
    }

    fn backend_label(&self) -> String {
        self.primary
            .as_ref()
            .map(|p| p.name().to_string())
            .unwrap_or_else(|| self.fallback.name().to_string())
    }

    fn mark_degraded(&self, backend: &str, error: &StateError) {
        self.next_probe_ms.store(
            self.elapsed_ms() + self.reprobe_interval.as_millis() as i64,
            Ordering::Relaxed,
        );
        if !self.degraded.swap(true, Ordering::Relaxed) {
            warn!(
                backend,
                error = %error,
                "State store unavailable, serving from in-memory fallback"
            );
        }
    }

    fn mark_healthy(&self, backend: &str) {
        if self.degraded.swap(false, Ordering::Relaxed) {
            info!(backend, "State store recovered");
        }
    }
}

impl Default for StateAdapter {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Backend whose availability can be toggled at runtime.
    #[derive(Default)]
    struct FlakyBackend {
        inner: MemoryBackend,
        down: AtomicBool,
        hang: AtomicBool,
        calls: AtomicUsize,
    }

    impl FlakyBackend {
        async fn check(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(StateError::Connection {
                    backend: "flaky".to_string(),
                    reason: "connection refused".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl KvBackend for FlakyBackend {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.check().await?;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
            self.check().await?;
            self.inner.set(key, value, ttl_secs).await
        }

        async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
            self.check().await?;
            self.inner.keys(pattern).await
        }

        async fn delete(&self, keys: &[String]) -> Result<usize> {
            self.check().await?;
            self.inner.delete(keys).await
        }
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        count: u32,
    }

    #[tokio::test]
    async fn test_in_memory_roundtrip() {
        let adapter = StateAdapter::in_memory();
        adapter.set_json("k", &Sample { count: 3 }, Some(60)).await;

        assert_eq!(adapter.get_json::<Sample>("k").await, Some(Sample { count: 3 }));
        assert_eq!(adapter.get_json::<Sample>("missing").await, None);
        assert!(!adapter.is_degraded());
        assert_eq!(adapter.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_primary_used_when_healthy() {
        let primary = Arc::new(FlakyBackend::default());
        let adapter = StateAdapter::with_backend(primary.clone(), Duration::from_secs(2));

        adapter.set("k", "v", None).await;
        assert_eq!(primary.inner.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(adapter.fallback.is_empty());
        assert_eq!(adapter.backend_name(), "flaky");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_fallback_when_primary_down() {
        let primary = Arc::new(FlakyBackend::default());
        primary.down.store(true, Ordering::SeqCst);
        let adapter = StateAdapter::with_backend(primary.clone(), Duration::from_secs(2));

        adapter.set("k", "v", Some(60)).await;
        assert_eq!(adapter.get("k").await.as_deref(), Some("v"));
        assert_eq!(adapter.keys("*").await, vec!["k".to_string()]);
        assert!(adapter.is_degraded());
        assert_eq!(adapter.backend_name(), "memory");

        primary.down.store(false, Ordering::SeqCst);
        // Still inside the re-probe window: memory keeps serving.
        assert_eq!(adapter.get("k").await.as_deref(), Some("v"));
        assert!(adapter.is_degraded());

        tokio::time::advance(Duration::from_millis(StateConfig::default().reprobe_interval_ms)).await;
        assert_eq!(adapter.get("k").await, None);
        assert!(!adapter.is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_primary_is_bounded() {
        let primary = Arc::new(FlakyBackend::default());
        primary.hang.store(true, Ordering::SeqCst);
        let adapter = StateAdapter::with_backend(primary.clone(), Duration::from_millis(100));

        adapter.set("k", "v", None).await;
        assert_eq!(adapter.get("k").await.as_deref(), Some("v"));
        assert!(adapter.is_degraded());
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_degraded_operations_skip_hung_primary() {
        let primary = Arc::new(FlakyBackend::default());
        primary.hang.store(true, Ordering::SeqCst);
        let adapter = StateAdapter::with_backend(primary.clone(), Duration::from_secs(2))
            .with_reprobe_interval(Duration::from_secs(10));

        adapter.set("k", "v", None).await;
        assert!(adapter.is_degraded());

        let start = Instant::now();
        for _ in 0..3 {
            assert_eq!(adapter.get("k").await.as_deref(), Some("v"));
        }
        adapter.set("k2", "v2", None).await;
        assert_eq!(adapter.keys("*").await.len(), 2);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);

        // Once the window passes, exactly one operation probes the primary.
        tokio::time::advance(Duration::from_secs(10)).await;
        let start = Instant::now();
        assert_eq!(adapter.get("k").await.as_deref(), Some("v"));
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(adapter.get("k").await.as_deref(), Some("v"));
        assert_eq!(primary.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let adapter = StateAdapter::in_memory();
        adapter.set("circuit_breaker:openai:o3", "{}", None).await;
        adapter.set("circuit_breaker:anthropic:claude", "{}", None).await;
        adapter.set("unrelated", "{}", None).await;

        assert_eq!(adapter.delete_pattern("circuit_breaker:*").await, 2);
        assert_eq!(adapter.keys("*").await, vec!["unrelated".to_string()]);
    }

    #[tokio::test]
    async fn test_undecodable_json_reads_as_absent() {
        let adapter = StateAdapter::in_memory();
        adapter.set("k", "not json", None).await;
        assert_eq!(adapter.get_json::<Sample>("k").await, None);
    }

    #[tokio::test]
    async fn test_connect_without_url_is_in_memory() {
        let adapter = StateAdapter::connect(&StateConfig::default()).await;
        assert_eq!(adapter.backend_name(), "memory");
        assert!(!adapter.is_degraded());
    }

    #[tokio::test]
    async fn test_connect_to_unreachable_redis_degrades() {
        let config = StateConfig {
            redis_url: Some("redis://127.0.0.1:1".to_string()),
            connect_timeout_ms: 300,
            operation_timeout_ms: 300,
            ..StateConfig::default()
        };
        let adapter = StateAdapter::connect(&config).await;
        assert!(adapter.is_degraded());

        adapter.set("k", "v", None).await;
        assert_eq!(adapter.get("k").await.as_deref(), Some("v"));
    }
}
