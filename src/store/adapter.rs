//! Typed operations over the shared key/value + sorted-set store
//!
//! Every engine component talks to the store through this trait; the
//! concrete driver (in-process or Redis) is chosen at composition time.

use async_trait::async_trait;
use std::time::Duration;

/// Store-level error classification.
///
/// `Missing` is the normal "key not present" sentinel and is recovered
/// locally by callers; the other two abort the calling operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("key not present")]
    Missing,

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("store protocol violation: {0}")]
    Protocol(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// One write command of an issue-batched `do_multi` call
#[derive(Debug, Clone)]
pub enum StoreCmd {
    Set {
        key: String,
        value: Vec<u8>,
        ttl: Option<Duration>,
    },
    Del {
        key: String,
    },
    Expire {
        key: String,
        ttl: Duration,
    },
    SAdd {
        key: String,
        members: Vec<String>,
    },
    SRem {
        key: String,
        members: Vec<String>,
    },
    ZAdd {
        key: String,
        entries: Vec<(f64, String)>,
    },
    ZRem {
        key: String,
        members: Vec<String>,
    },
}

/// Typed store contract shared by all engine components
#[async_trait]
pub trait StoreAdapter: Send + Sync {
    /// GET; `Missing` when the key is absent.
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>>;

    /// MGET fan-out; one slot per key, `None` for absent keys.
    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>>;

    /// SET with optional TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()>;

    /// SET NX with TTL; returns whether the key was set.
    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool>;

    /// DEL a single key.
    async fn del(&self, key: &str) -> StoreResult<()>;

    /// EXPIRE; returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// SADD members to a set.
    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()>;

    /// SREM members from a set.
    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<()>;

    /// SRANDMEMBER: up to `count` distinct members in random order.
    /// An absent set yields an empty list.
    async fn srandmember(&self, key: &str, count: i64) -> StoreResult<Vec<String>>;

    /// ZADD (score, member) entries to a sorted set.
    async fn zadd(&self, key: &str, entries: &[(f64, String)]) -> StoreResult<()>;

    /// ZRANGEBYSCORE members with score in `[min, max]`, ascending.
    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>>;

    /// ZREM members from a sorted set.
    async fn zrem(&self, key: &str, members: &[String]) -> StoreResult<()>;

    /// Issue-batched write commands, one result per command.
    ///
    /// Sub-commands are not atomic relative to each other; callers that
    /// need exclusion hold the fetch lock around the whole batch.
    async fn do_multi(&self, cmds: Vec<StoreCmd>) -> StoreResult<Vec<StoreResult<()>>>;
}
