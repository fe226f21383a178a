//! Leased fetch lock
//!
//! A single named lock serializes ticket claims and de-indexing across
//! workers sharing one store. The lease is a `SET NX` key with a short TTL;
//! a background task refreshes it while the guard is alive, and the guard's
//! lease token is cancelled if the lease is ever lost, so holders can bail
//! out before mutating on a stale tenure.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::store::adapter::{StoreAdapter, StoreError};

/// Store key the fetch lock leases
pub const FETCH_TICKETS_LOCK_KEY: &str = "fetchTicketsLock";

const ACQUIRE_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Named, leased mutual-exclusion primitive
#[async_trait]
pub trait FetchLock: Send + Sync {
    /// Block until the lock is held or `cancel` fires. Cancellation before
    /// acquisition fails with `LockAcquireFailed`. The returned guard must
    /// be released on every exit path; dropping it releases as a backstop.
    async fn acquire(&self, cancel: &CancellationToken) -> Result<LockGuard>;
}

/// Fetch lock leased on the shared store
pub struct StoreFetchLock {
    store: Arc<dyn StoreAdapter>,
    ttl: Duration,
}

impl StoreFetchLock {
    pub fn new(store: Arc<dyn StoreAdapter>, ttl: Duration) -> Self {
        Self { store, ttl }
    }
}

#[async_trait]
impl FetchLock for StoreFetchLock {
    async fn acquire(&self, cancel: &CancellationToken) -> Result<LockGuard> {
        let owner = Uuid::new_v4().simple().to_string();

        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::LockAcquireFailed {
                    message: "cancelled before acquisition".to_string(),
                }
                .into());
            }

            match self
                .store
                .set_nx(FETCH_TICKETS_LOCK_KEY, owner.as_bytes(), self.ttl)
                .await
            {
                Ok(true) => break,
                Ok(false) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            return Err(EngineError::LockAcquireFailed {
                                message: "cancelled while waiting for the lock".to_string(),
                            }
                            .into());
                        }
                        _ = tokio::time::sleep(ACQUIRE_RETRY_INTERVAL) => {}
                    }
                }
                Err(e) => {
                    return Err(EngineError::LockAcquireFailed {
                        message: e.to_string(),
                    }
                    .into())
                }
            }
        }

        debug!("fetch lock acquired by owner {}", owner);
        Ok(LockGuard::start(self.store.clone(), owner, self.ttl))
    }
}

/// Held lock tenure; refreshes the lease until released or dropped
pub struct LockGuard {
    store: Arc<dyn StoreAdapter>,
    owner: String,
    lease: CancellationToken,
    refresh: JoinHandle<()>,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("owner", &self.owner)
            .field("released", &self.released)
            .finish()
    }
}

impl LockGuard {
    fn start(store: Arc<dyn StoreAdapter>, owner: String, ttl: Duration) -> Self {
        let lease = CancellationToken::new();
        let refresh = tokio::spawn(refresh_lease(store.clone(), lease.clone(), ttl));

        Self {
            store,
            owner,
            lease,
            refresh,
            released: false,
        }
    }

    /// Token cancelled if the lease is lost mid-tenure. Holders check it
    /// before mutating the indices.
    pub fn lease(&self) -> &CancellationToken {
        &self.lease
    }

    /// Release the lock. Idempotent.
    pub async fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.refresh.abort();
        release_key(self.store.as_ref(), &self.owner).await;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.refresh.abort();

        let store = self.store.clone();
        let owner = std::mem::take(&mut self.owner);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                release_key(store.as_ref(), &owner).await;
            });
        }
    }
}

async fn refresh_lease(store: Arc<dyn StoreAdapter>, lease: CancellationToken, ttl: Duration) {
    let mut interval = tokio::time::interval(ttl / 3);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    interval.tick().await;

    loop {
        interval.tick().await;

        match store.expire(FETCH_TICKETS_LOCK_KEY, ttl).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("fetch lock lease lost before release");
                lease.cancel();
                return;
            }
            Err(e) => {
                warn!("fetch lock lease refresh failed: {}", e);
                lease.cancel();
                return;
            }
        }
    }
}

/// Delete the lease key if this owner still holds it.
async fn release_key(store: &dyn StoreAdapter, owner: &str) {
    match store.get(FETCH_TICKETS_LOCK_KEY).await {
        Ok(value) if value == owner.as_bytes() => {
            if let Err(e) = store.del(FETCH_TICKETS_LOCK_KEY).await {
                warn!("failed to release fetch lock: {}", e);
            }
        }
        Ok(_) | Err(StoreError::Missing) => {}
        Err(e) => warn!("failed to inspect fetch lock on release: {}", e),
    }
}
