//! Per-ticket assignment watcher
//!
//! Polls the assignment record on a constant interval and invokes the
//! caller's callback whenever the assignment changes. The loop runs until
//! the callback fails or the caller drops the watch future (the frontend
//! drops it when the client disconnects).

use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::warn;

use crate::assignment::service::AssignerService;
use crate::error::{EngineError, Result};
use crate::types::Assignment;

/// Polling loop emitting on change-of-assignment
#[derive(Clone)]
pub struct AssignmentWatcher {
    assigner: Arc<AssignerService>,
    poll_interval: Duration,
}

impl AssignmentWatcher {
    pub fn new(assigner: Arc<AssignerService>, poll_interval: Duration) -> Self {
        Self {
            assigner,
            poll_interval,
        }
    }

    /// Watch a ticket's assignment, invoking `on_change` once per distinct
    /// assignment observed (`None` vs `Some` counts as distinct; identical
    /// re-reads are suppressed). A not-yet-present assignment and transient
    /// store failures are both retried on the same constant backoff.
    pub async fn watch<F>(&self, ticket_id: &str, mut on_change: F) -> Result<()>
    where
        F: FnMut(Assignment) -> Result<()> + Send,
    {
        let mut prev: Option<Assignment> = None;
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let assignment = match self.assigner.get_assignment(ticket_id).await {
                Ok(assignment) => assignment,
                Err(e) if EngineError::is_assignment_not_found(&e) => continue,
                Err(e) => {
                    warn!("assignment poll failed for ticket {}: {}", ticket_id, e);
                    continue;
                }
            };

            if prev.as_ref() == Some(&assignment) {
                continue;
            }
            prev = Some(assignment.clone());

            if let Err(e) = on_change(assignment) {
                return Err(EngineError::WatchFailed {
                    message: e.to_string(),
                }
                .into());
            }
        }
    }
}
