//! Assigner service: persisting assignments and retiring their tickets
//!
//! The assignment record is the source of truth polled by watchers, so it
//! must be written before the ticket is de-indexed. After de-indexing, the
//! ticket payload TTL is shortened so clients already watching can still
//! read for a short window, after which the whole lifecycle ends passively
//! via expiry.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{EngineError, Result};
use crate::store::adapter::{StoreAdapter, StoreCmd, StoreError};
use crate::ticket::service::{ticket_data_key, TicketService};
use crate::types::{Assignment, AssignmentGroup, TicketId};

/// Store key of a ticket's assignment record
pub fn assignment_data_key(ticket_id: &str) -> String {
    format!("assign:{ticket_id}")
}

/// Failure of `assign_tickets`, carrying the ticket IDs that never got an
/// assignment record and should be released back to the pool.
#[derive(Debug, thiserror::Error)]
#[error("{source}")]
pub struct AssignTicketsFailure {
    pub not_assigned: Vec<TicketId>,
    #[source]
    pub source: anyhow::Error,
}

/// Persists per-ticket assignments and marks assigned tickets for removal
#[derive(Clone)]
pub struct AssignerService {
    store: Arc<dyn StoreAdapter>,
    ticket_service: TicketService,
    assigned_delete_timeout: Duration,
}

impl AssignerService {
    pub fn new(
        store: Arc<dyn StoreAdapter>,
        ticket_service: TicketService,
        assigned_delete_timeout: Duration,
    ) -> Self {
        Self {
            store,
            ticket_service,
            assigned_delete_timeout,
        }
    }

    /// Read a ticket's assignment record. `AssignmentNotFound` is the normal
    /// not-yet-assigned sentinel driving the watcher retry.
    pub async fn get_assignment(&self, ticket_id: &str) -> Result<Assignment> {
        let data = self
            .store
            .get(&assignment_data_key(ticket_id))
            .await
            .map_err(|e| match e {
                StoreError::Missing => EngineError::AssignmentNotFound,
                other => EngineError::AssignmentGetFailed {
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

    /// Persist each group's assignment for every ticket of the group, then
    /// de-index the assigned tickets and shorten their payload TTL.
    /// `cancel` bounds the wait for the fetch lock taken by the de-index.
    ///
    /// On a store failure mid-batch, every ticket of the failing group and
    /// of all subsequent groups is reported as not assigned so the caller
    /// can release them.
    pub async fn assign_tickets(
        &self,
        cancel: &CancellationToken,
        groups: &[AssignmentGroup],
    ) -> std::result::Result<(), AssignTicketsFailure> {
        let mut assigned: Vec<TicketId> = Vec::new();

        for (i, group) in groups.iter().enumerate() {
            if group.ticket_ids.is_empty() {
                continue;
            }

            if let Err(source) = self
                .set_assignment_to_tickets(&group.ticket_ids, &group.assignment)
                .await
            {
                let not_assigned = groups[i..]
                    .iter()
                    .flat_map(|g| g.ticket_ids.iter().cloned())
                    .collect();
                return Err(AssignTicketsFailure {
                    not_assigned,
                    source,
                });
            }

            assigned.extend(group.ticket_ids.iter().cloned());
        }

        if !assigned.is_empty() {
            self.ticket_service
                .delete_index_tickets(cancel, &assigned)
                .await
                .map_err(|source| AssignTicketsFailure {
                    not_assigned: Vec::new(),
                    source,
                })?;

            self.set_tickets_expiration(&assigned)
                .await
                .map_err(|source| AssignTicketsFailure {
                    not_assigned: Vec::new(),
                    source,
                })?;

            debug!("assigned {} tickets", assigned.len());
        }

        Ok(())
    }

    async fn set_assignment_to_tickets(
        &self,
        ticket_ids: &[TicketId],
        assignment: &Assignment,
    ) -> Result<()> {
        let data = serde_json::to_vec(assignment).map_err(|e| EngineError::EncodeFailed {
            message: e.to_string(),
        })?;

        let cmds: Vec<StoreCmd> = ticket_ids
            .iter()
            .map(|ticket_id| StoreCmd::Set {
                key: assignment_data_key(ticket_id),
                value: data.clone(),
                ttl: Some(self.assigned_delete_timeout),
            })
            .collect();

        let results =
            self.store
                .do_multi(cmds)
                .await
                .map_err(|e| EngineError::AssignmentSetFailed {
                    message: e.to_string(),
                })?;
        for result in results {
            result.map_err(|e| EngineError::AssignmentSetFailed {
                message: e.to_string(),
            })?;
        }

        Ok(())
    }

    async fn set_tickets_expiration(&self, ticket_ids: &[TicketId]) -> Result<()> {
        let cmds: Vec<StoreCmd> = ticket_ids
            .iter()
            .map(|ticket_id| StoreCmd::Expire {
                key: ticket_data_key(ticket_id),
                ttl: self.assigned_delete_timeout,
            })
            .collect();

        let results =
            self.store
                .do_multi(cmds)
                .await
                .map_err(|e| EngineError::TicketExpireFailed {
                    message: e.to_string(),
                })?;
        for result in results {
            result.map_err(|e| EngineError::TicketExpireFailed {
                message: e.to_string(),
            })?;
        }

        Ok(())
    }
}
