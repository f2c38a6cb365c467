//! Redis-backed key-value store shared across processes.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::debug;

use crate::backend::KvBackend;
use crate::error::{Result, StateError};

const BACKEND: &str = "Redis";

/// Redis backend. Every command is bounded by `operation_timeout` so a hung
/// server can never block a caller for longer than that.
pub struct RedisBackend {
    connection_manager: redis::aio::ConnectionManager,
    operation_timeout: Duration,
}

impl RedisBackend {
    /// Connect to Redis, giving up after `connect_timeout`.
    pub async fn connect(
        connection_string: &str,
        connect_timeout: Duration,
        operation_timeout: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(connection_string).map_err(|e| StateError::Connection {
            backend: BACKEND.to_string(),
            reason: e.to_string(),
        })?;

        let connection_manager =
            tokio::time::timeout(connect_timeout, client.get_connection_manager())
                .await
                .map_err(|_| StateError::Timeout {
                    backend: BACKEND.to_string(),
                    operation: "connect".to_string(),
                    timeout_ms: connect_timeout.as_millis() as u64,
                })?
                .map_err(|e| StateError::Connection {
                    backend: BACKEND.to_string(),
                    reason: e.to_string(),
                })?;

        debug!(url = %redact_url(connection_string), "Connected to Redis state backend");

        Ok(Self {
            connection_manager,
            operation_timeout,
        })
    }

    async fn bounded<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| StateError::Timeout {
                backend: BACKEND.to_string(),
                operation: operation.to_string(),
                timeout_ms: self.operation_timeout.as_millis() as u64,
            })?
            .map_err(|e| StateError::Operation {
                backend: BACKEND.to_string(),
                operation: operation.to_string(),
                reason: e.to_string(),
            })
    }
}

#[async_trait]
impl KvBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection_manager.clone();
        self.bounded("GET", async move {
            let value: Option<String> = conn.get(key).await?;
            Ok::<_, redis::RedisError>(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        match ttl_secs {
            Some(ttl) => {
                self.bounded("SETEX", async move {
                    let _: () = conn.set_ex(key, value, ttl).await?;
                    Ok::<_, redis::RedisError>(())
                })
                .await
            }
            None => {
                self.bounded("SET", async move {
                    let _: () = conn.set(key, value).await?;
                    Ok::<_, redis::RedisError>(())
                })
                .await
            }
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let mut keys = self
            .bounded("KEYS", async move {
                let keys: Vec<String> = conn.keys(pattern).await?;
                Ok::<_, redis::RedisError>(keys)
            })
            .await?;
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.connection_manager.clone();
        let keys = keys.to_vec();
        self.bounded("DEL", async move {
            let removed: usize = conn.del(keys).await?;
            Ok::<_, redis::RedisError>(removed)
        })
        .await
    }
}

/// Strip credentials from a connection string before logging it.
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
        }
        _ => url.to_string(),
    }
}
