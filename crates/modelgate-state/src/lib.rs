//! ModelGate State - durable cross-process health state.
//!
//! This crate provides the key-value adapter used for circuit breaker state:
//! - `KvBackend`: fallible storage backend trait
//! - `MemoryBackend`: process-local map with TTL and glob patterns
//! - `RedisBackend`: shared Redis store with bounded timeouts
//! - `StateAdapter`: infallible facade that silently degrades to memory

mod adapter;
mod backend;
mod error;
mod memory;
mod redis_backend;

pub use adapter::{StateAdapter, StateConfig};
pub use backend::KvBackend;
pub use error::{Result, StateError};
pub use memory::MemoryBackend;
pub use redis_backend::RedisBackend;
