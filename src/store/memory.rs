//! In-process store implementation
//!
//! Single-node stand-in for the shared store, used by the test suite and by
//! dev mode when no store URL is configured. TTLs are enforced lazily on
//! access, which is enough for the engine's expiry semantics.

use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::store::adapter::{StoreAdapter, StoreCmd, StoreError, StoreResult};

#[derive(Debug, Clone)]
struct StringEntry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct Inner {
    strings: HashMap<String, StringEntry>,
    sets: HashMap<String, HashSet<String>>,
    zsets: HashMap<String, HashMap<String, f64>>,
}

impl Inner {
    fn live_entry(&mut self, key: &str) -> Option<&StringEntry> {
        let now = Instant::now();
        if self.strings.get(key).is_some_and(|e| e.is_expired(now)) {
            self.strings.remove(key);
        }
        self.strings.get(key)
    }

    fn apply(&mut self, cmd: &StoreCmd) -> StoreResult<()> {
        match cmd {
            StoreCmd::Set { key, value, ttl } => {
                self.strings.insert(
                    key.clone(),
                    StringEntry {
                        value: value.clone(),
                        expires_at: ttl.map(|t| Instant::now() + t),
                    },
                );
            }
            StoreCmd::Del { key } => {
                self.strings.remove(key);
            }
            StoreCmd::Expire { key, ttl } => {
                if let Some(entry) = self.strings.get_mut(key) {
                    entry.expires_at = Some(Instant::now() + *ttl);
                }
            }
            StoreCmd::SAdd { key, members } => {
                let set = self.sets.entry(key.clone()).or_default();
                set.extend(members.iter().cloned());
            }
            StoreCmd::SRem { key, members } => {
                if let Some(set) = self.sets.get_mut(key) {
                    for member in members {
                        set.remove(member);
                    }
                }
            }
            StoreCmd::ZAdd { key, entries } => {
                let zset = self.zsets.entry(key.clone()).or_default();
                for (score, member) in entries {
                    zset.insert(member.clone(), *score);
                }
            }
            StoreCmd::ZRem { key, members } => {
                if let Some(zset) = self.zsets.get_mut(key) {
                    for member in members {
                        zset.remove(member);
                    }
                }
            }
        }
        Ok(())
    }
}

/// In-process `StoreAdapter` implementation
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Transient("store mutex poisoned".to_string()))
    }

    /// Whether a set currently contains a member (test observability).
    pub fn set_contains(&self, key: &str, member: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.sets.get(key).is_some_and(|s| s.contains(member)))
            .unwrap_or(false)
    }

    /// Whether a sorted set currently contains a member (test observability).
    pub fn zset_contains(&self, key: &str, member: &str) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.zsets.get(key).is_some_and(|z| z.contains_key(member)))
            .unwrap_or(false)
    }

    /// Overwrite a sorted-set score (test clock control).
    pub fn zset_set_score(&self, key: &str, member: &str, score: f64) {
        if let Ok(mut inner) = self.inner.lock() {
            inner
                .zsets
                .entry(key.to_string())
                .or_default()
                .insert(member.to_string(), score);
        }
    }
}

#[async_trait]
impl StoreAdapter for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Vec<u8>> {
        let mut inner = self.lock()?;
        match inner.live_entry(key) {
            Some(entry) => Ok(entry.value.clone()),
            None => Err(StoreError::Missing),
        }
    }

    async fn mget(&self, keys: &[String]) -> StoreResult<Vec<Option<Vec<u8>>>> {
        let mut inner = self.lock()?;
        Ok(keys
            .iter()
            .map(|key| inner.live_entry(key).map(|e| e.value.clone()))
            .collect())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> StoreResult<()> {
        self.lock()?.apply(&StoreCmd::Set {
            key: key.to_string(),
            value: value.to_vec(),
            ttl,
        })
    }

    async fn set_nx(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if inner.live_entry(key).is_some() {
            return Ok(false);
        }
        inner.strings.insert(
            key.to_string(),
            StringEntry {
                value: value.to_vec(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        self.lock()?.strings.remove(key);
        Ok(())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut inner = self.lock()?;
        if inner.live_entry(key).is_none() {
            return Ok(false);
        }
        inner.apply(&StoreCmd::Expire {
            key: key.to_string(),
            ttl,
        })?;
        Ok(true)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.lock()?.apply(&StoreCmd::SAdd {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn srem(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.lock()?.apply(&StoreCmd::SRem {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn srandmember(&self, key: &str, count: i64) -> StoreResult<Vec<String>> {
        if count <= 0 {
            return Ok(Vec::new());
        }
        let inner = self.lock()?;
        let Some(set) = inner.sets.get(key) else {
            return Ok(Vec::new());
        };

        let mut members: Vec<String> = set.iter().cloned().collect();
        members.shuffle(&mut rand::thread_rng());
        members.truncate(count as usize);
        Ok(members)
    }

    async fn zadd(&self, key: &str, entries: &[(f64, String)]) -> StoreResult<()> {
        self.lock()?.apply(&StoreCmd::ZAdd {
            key: key.to_string(),
            entries: entries.to_vec(),
        })
    }

    async fn zrangebyscore(&self, key: &str, min: f64, max: f64) -> StoreResult<Vec<String>> {
        let inner = self.lock()?;
        let Some(zset) = inner.zsets.get(key) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<(&String, f64)> = zset
            .iter()
            .filter(|(_, score)| min <= **score && **score <= max)
            .map(|(member, score)| (member, *score))
            .collect();
        entries.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        Ok(entries.into_iter().map(|(member, _)| member.clone()).collect())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> StoreResult<()> {
        self.lock()?.apply(&StoreCmd::ZRem {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn do_multi(&self, cmds: Vec<StoreCmd>) -> StoreResult<Vec<StoreResult<()>>> {
        let mut inner = self.lock()?;
        Ok(cmds.iter().map(|cmd| inner.apply(cmd)).collect())
    }
}
