use async_trait::async_trait;

use crate::error::Result;

/// Raw key-value storage backend.
///
/// Backends are allowed to fail; `StateAdapter` turns failures into a silent
/// fallback. Patterns follow Redis glob syntax (`*`, `?`, `[abc]`).
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store a value. `ttl_secs = None` keeps the key until deleted.
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<()>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Delete the given keys, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<usize>;
}
