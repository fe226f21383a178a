//! Ticket service: claim, insert, de-index, delete
//!
//! All transitions between the indexed states run under the fetch lock.
//! The claim window has to cover sampling, the pending read, the set
//! difference and the pending write; without the lock two workers can both
//! observe a ticket as unclaimed and produce overlapping matches.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::store::adapter::{StoreAdapter, StoreCmd};
use crate::store::lock::FetchLock;
use crate::ticket::index::{TicketIndex, ALL_TICKETS_KEY, PENDING_TICKETS_KEY};
use crate::types::{Ticket, TicketId};

/// Payload key of a ticket; the ticket ID itself.
pub fn ticket_data_key(ticket_id: &str) -> String {
    ticket_id.to_string()
}

/// Ticket CRUD and the claim operation over the shared store
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn StoreAdapter>,
    lock: Arc<dyn FetchLock>,
    index: TicketIndex,
}

impl TicketService {
    pub fn new(store: Arc<dyn StoreAdapter>, lock: Arc<dyn FetchLock>, index: TicketIndex) -> Self {
        Self { store, lock, index }
    }

    pub fn index(&self) -> &TicketIndex {
        &self.index
    }

    /// Persist a ticket payload with the given TTL and index it as active.
    /// Issued as one batch; any failed sub-command fails the create.
    pub async fn insert(&self, ticket: &Ticket, ttl: Duration) -> Result<()> {
        let data = serde_json::to_vec(ticket).map_err(|e| EngineError::EncodeFailed {
            message: e.to_string(),
        })?;

        let results = self
            .store
            .do_multi(vec![
                StoreCmd::Set {
                    key: ticket_data_key(&ticket.id),
                    value: data,
                    ttl: Some(ttl),
                },
                StoreCmd::SAdd {
                    key: ALL_TICKETS_KEY.to_string(),
                    members: vec![ticket.id.clone()],
                },
            ])
            .await
            .map_err(|e| EngineError::TicketCreateFailed {
                message: e.to_string(),
            })?;

        for result in results {
            result.map_err(|e| EngineError::TicketCreateFailed {
                message: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Read-through of a single ticket payload.
    pub async fn find(&self, ticket_id: &str) -> Result<Ticket> {
        let data = self
            .store
            .get(&ticket_data_key(ticket_id))
            .await
            .map_err(|e| match e {
                crate::store::adapter::StoreError::Missing => EngineError::TicketNotFound {
                    ticket_id: ticket_id.to_string(),
                },
                other => EngineError::TicketGetFailed {
                    message: other.to_string(),
                },
            })?;

        serde_json::from_slice(&data).map_err(|e| {
            EngineError::DecodeFailed {
                message: e.to_string(),
            }
            .into()
        })
    }

    /// Bulk-fetch ticket payloads. Returns the decoded tickets plus the IDs
    /// whose payloads were gone (expired between claim and fetch).
    pub async fn get_tickets(
        &self,
        ticket_ids: &[TicketId],
    ) -> Result<(Vec<Ticket>, Vec<TicketId>)> {
        if ticket_ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let keys: Vec<String> = ticket_ids.iter().map(|id| ticket_data_key(id)).collect();
        let payloads = self
            .store
            .mget(&keys)
            .await
            .map_err(|e| EngineError::TicketGetFailed {
                message: e.to_string(),
            })?;

        let mut tickets = Vec::with_capacity(ticket_ids.len());
        let mut not_found = Vec::new();
        for (ticket_id, payload) in ticket_ids.iter().zip(payloads) {
            match payload {
                Some(data) => {
                    let ticket: Ticket =
                        serde_json::from_slice(&data).map_err(|e| EngineError::DecodeFailed {
                            message: e.to_string(),
                        })?;
                    tickets.push(ticket);
                }
                None => not_found.push(ticket_id.clone()),
            }
        }

        Ok((tickets, not_found))
    }

    /// Delete a ticket's payload and both index entries. Idempotent; runs
    /// under the fetch lock so it cannot interleave with a claim. `cancel`
    /// bounds the wait for the lock.
    pub async fn delete_ticket(&self, cancel: &CancellationToken, ticket_id: &str) -> Result<()> {
        let mut guard = self.lock.acquire(cancel).await?;

        let result = self
            .batch_all_ok(
                vec![
                    StoreCmd::Del {
                        key: ticket_data_key(ticket_id),
                    },
                    StoreCmd::SRem {
                        key: ALL_TICKETS_KEY.to_string(),
                        members: vec![ticket_id.to_string()],
                    },
                    StoreCmd::ZRem {
                        key: PENDING_TICKETS_KEY.to_string(),
                        members: vec![ticket_id.to_string()],
                    },
                ],
                |message| EngineError::TicketDeleteFailed { message },
            )
            .await;

        guard.release().await;
        result
    }

    /// Remove ticket IDs from both indices.
    ///
    /// Runs under the fetch lock to avoid the claim race: without it a
    /// de-index can land between another worker's sample and pending read,
    /// letting the assigned ticket be fetched again and matched twice.
    pub async fn delete_index_tickets(
        &self,
        cancel: &CancellationToken,
        ticket_ids: &[TicketId],
    ) -> Result<()> {
        if ticket_ids.is_empty() {
            return Ok(());
        }

        let mut guard = self.lock.acquire(cancel).await?;

        let result = self
            .batch_all_ok(
                vec![
                    StoreCmd::ZRem {
                        key: PENDING_TICKETS_KEY.to_string(),
                        members: ticket_ids.to_vec(),
                    },
                    StoreCmd::SRem {
                        key: ALL_TICKETS_KEY.to_string(),
                        members: ticket_ids.to_vec(),
                    },
                ],
                |message| EngineError::IndexDeleteFailed { message },
            )
            .await;

        guard.release().await;
        result
    }

    /// Claim up to `limit` active ticket IDs: sample the live index, drop
    /// everything already pending, and mark the remainder as pending with
    /// the current claim time. The whole sequence holds the fetch lock;
    /// `cancel` bounds the wait for it.
    pub async fn claim_active_ticket_ids(
        &self,
        cancel: &CancellationToken,
        limit: i64,
    ) -> Result<Vec<TicketId>> {
        let mut guard = self.lock.acquire(cancel).await?;

        let result = async {
            let all_ids = self.index.get_all_ticket_ids(limit).await?;
            if all_ids.is_empty() {
                return Ok(Vec::new());
            }

            let pending_ids = self.index.get_pending_ticket_ids().await?;

            let active = difference(all_ids, &pending_ids);
            if active.is_empty() {
                return Ok(Vec::new());
            }

            if guard.lease().is_cancelled() {
                return Err(EngineError::LockAcquireFailed {
                    message: "fetch lock lease lost during claim".to_string(),
                }
                .into());
            }
            self.index.insert_pending_tickets(&active).await?;

            debug!("claimed {} active tickets", active.len());
            Ok(active)
        }
        .await;

        guard.release().await;
        result
    }

    async fn batch_all_ok(
        &self,
        cmds: Vec<StoreCmd>,
        to_error: impl Fn(String) -> EngineError,
    ) -> Result<()> {
        let results = self
            .store
            .do_multi(cmds)
            .await
            .map_err(|e| to_error(e.to_string()))?;

        for result in results {
            result.map_err(|e| to_error(e.to_string()))?;
        }
        Ok(())
    }
}

/// Elements of `a` that are not in `b`, preserving the order of `a`.
fn difference(a: Vec<TicketId>, b: &[TicketId]) -> Vec<TicketId> {
    let exclude: HashSet<&TicketId> = b.iter().collect();
    a.into_iter().filter(|id| !exclude.contains(id)).collect()
}
