//! Ticket indices on the shared store
//!
//! Two indices exist: `alltickets`, an unordered set of every live ticket
//! ID, and `pendingTicketIDs`, a sorted set scored by claim time (unix
//! seconds). Sampling from `alltickets` is random so that workers running
//! against the same pool diverge instead of fighting over the same slice.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::store::adapter::StoreAdapter;
use crate::store::lock::FetchLock;
use crate::types::TicketId;
use crate::utils::unix_now_seconds;

/// Set of every live ticket ID
pub const ALL_TICKETS_KEY: &str = "alltickets";

/// Sorted set of claimed ticket IDs, scored by claim unix-second
pub const PENDING_TICKETS_KEY: &str = "pendingTicketIDs";

// Upper bound of the pending window, guarding against clock skew on writers.
const PENDING_SCORE_FUTURE_WINDOW: Duration = Duration::from_secs(3600);

/// Typed access to the two ticket indices
#[derive(Clone)]
pub struct TicketIndex {
    store: Arc<dyn StoreAdapter>,
    lock: Arc<dyn FetchLock>,
    pending_release_timeout: Duration,
}

impl TicketIndex {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        lock: Arc<dyn FetchLock>,
        pending_release_timeout: Duration,
    ) -> Self {
        Self {
            store,
            lock,
            pending_release_timeout,
        }
    }

    /// Random sample of up to `limit` ticket IDs. An empty index is not an
    /// error, and `limit = 0` yields an empty list.
    pub async fn get_all_ticket_ids(&self, limit: i64) -> Result<Vec<TicketId>> {
        self.store
            .srandmember(ALL_TICKETS_KEY, limit)
            .await
            .map_err(|e| {
                EngineError::IndexGetFailed {
                    message: e.to_string(),
                }
                .into()
            })
    }

    /// Ticket IDs whose claim is still live. Entries older than the pending
    /// release timeout are treated as released even before their removal.
    pub async fn get_pending_ticket_ids(&self) -> Result<Vec<TicketId>> {
        let now = unix_now_seconds();
        let min = (now - self.pending_release_timeout.as_secs() as i64) as f64;
        let max = (now + PENDING_SCORE_FUTURE_WINDOW.as_secs() as i64) as f64;

        self.store
            .zrangebyscore(PENDING_TICKETS_KEY, min, max)
            .await
            .map_err(|e| {
                EngineError::PendingGetFailed {
                    message: e.to_string(),
                }
                .into()
            })
    }

    /// Record the claim time for a batch of ticket IDs.
    pub async fn insert_pending_tickets(&self, ticket_ids: &[TicketId]) -> Result<()> {
        if ticket_ids.is_empty() {
            return Ok(());
        }

        let score = unix_now_seconds() as f64;
        let entries: Vec<(f64, String)> =
            ticket_ids.iter().map(|id| (score, id.clone())).collect();

        self.store
            .zadd(PENDING_TICKETS_KEY, &entries)
            .await
            .map_err(|e| {
                EngineError::PendingSetFailed {
                    message: e.to_string(),
                }
                .into()
            })
    }

    /// Return claimed tickets to the active pool. Takes the fetch lock so a
    /// release cannot interleave with a concurrent claim; `cancel` bounds
    /// the wait for the lock.
    pub async fn release_tickets(
        &self,
        cancel: &CancellationToken,
        ticket_ids: &[TicketId],
    ) -> Result<()> {
        if ticket_ids.is_empty() {
            return Ok(());
        }

        let mut guard = self.lock.acquire(cancel).await?;
        let result = self
            .store
            .zrem(PENDING_TICKETS_KEY, ticket_ids)
            .await
            .map_err(|e| {
                EngineError::PendingReleaseFailed {
                    message: e.to_string(),
                }
                .into()
            });
        guard.release().await;
        result
    }
}
