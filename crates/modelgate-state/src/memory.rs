//! Process-local key-value backend.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::time::{Duration, Instant};

use crate::backend::KvBackend;
use crate::error::Result;

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl MemoryEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

/// In-memory backend with the same TTL and pattern semantics as Redis,
/// but no cross-process visibility. Expired keys are dropped lazily.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: DashMap<String, MemoryEntry>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KvBackend for MemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let expires_at = ttl_secs.map(|secs| Instant::now() + Duration::from_secs(secs));
        self.entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        self.entries.retain(|_, entry| !entry.is_expired(now));

        let mut keys: Vec<String> = self
            .entries
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|key| glob_match::glob_match(pattern, key))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new();
        backend.set("a", "1", None).await.unwrap();

        assert_eq!(backend.get("a").await.unwrap().as_deref(), Some("1"));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let backend = MemoryBackend::new();
        backend.set("short", "x", Some(5)).await.unwrap();
        backend.set("forever", "y", None).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(backend.get("short").await.unwrap().is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(backend.get("short").await.unwrap().is_none());
        assert!(backend.get("forever").await.unwrap().is_some());
        assert_eq!(backend.len(), 1);
    }

    #[tokio::test]
    async fn test_keys_pattern() {
        let backend = MemoryBackend::new();
        backend.set("circuit_breaker:openai:gpt-4.1", "{}", None).await.unwrap();
        backend.set("circuit_breaker:anthropic:claude", "{}", None).await.unwrap();
        backend.set("other:key", "{}", None).await.unwrap();

        let keys = backend.keys("circuit_breaker:*").await.unwrap();
        assert_eq!(
            keys,
            vec![
                "circuit_breaker:anthropic:claude".to_string(),
                "circuit_breaker:openai:gpt-4.1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_delete_counts_existing_keys() {
        let backend = MemoryBackend::new();
        backend.set("a", "1", None).await.unwrap();
        backend.set("b", "2", None).await.unwrap();

        let removed = backend
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(backend.get("a").await.unwrap().is_none());
        assert!(backend.get("b").await.unwrap().is_some());
    }
}
