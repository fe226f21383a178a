//! Shared-store access for the matchmaking engine
//!
//! The engine keeps all mutable state in a Redis-shaped shared store. This
//! module defines the typed store contract, the in-process and Redis
//! implementations, and the leased fetch lock that serializes index claims
//! across workers.

pub mod adapter;
pub mod lock;
pub mod memory;
pub mod redis;

// Re-export commonly used types
pub use adapter::{StoreAdapter, StoreCmd, StoreError, StoreResult};
pub use lock::{FetchLock, LockGuard, StoreFetchLock};
pub use memory::MemoryStore;
pub use redis::RedisStore;
