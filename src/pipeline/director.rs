//! Tick-driven match pipeline
//!
//! One tick claims active tickets, classifies them into the pools of every
//! registered profile, fans the per-profile pool tickets out to the match
//! functions, optionally evaluates the proposals, releases what stayed
//! unmatched and persists assignments for the rest. The supervisor loop
//! fires once a second; a tick in flight when shutdown is requested runs to
//! completion so the indices are never left half-written.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::assignment::service::AssignerService;
use crate::error::{EngineError, Result};
use crate::metrics::MetricsCollector;
use crate::pipeline::functions::{Assigner, Evaluator, MatchFunction};
use crate::ticket::service::TicketService;
use crate::types::{ticket_ids_of_matches, Match, MatchProfile, Ticket, TicketId};

/// Tick orchestrator over the registered match functions
pub struct MatchPipeline {
    match_functions: RwLock<Vec<(Arc<MatchProfile>, Arc<dyn MatchFunction>)>>,
    assigner: Arc<dyn Assigner>,
    evaluator: Option<Arc<dyn Evaluator>>,
    ticket_service: TicketService,
    assigner_service: AssignerService,
    metrics: Arc<MetricsCollector>,
    fetch_tickets_limit: i64,
    tick_interval: Duration,
}

impl MatchPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        assigner: Arc<dyn Assigner>,
        evaluator: Option<Arc<dyn Evaluator>>,
        ticket_service: TicketService,
        assigner_service: AssignerService,
        metrics: Arc<MetricsCollector>,
        fetch_tickets_limit: i64,
        tick_interval: Duration,
    ) -> Self {
        Self {
            match_functions: RwLock::new(Vec::new()),
            assigner,
            evaluator,
            ticket_service,
            assigner_service,
            metrics,
            fetch_tickets_limit,
            tick_interval,
        }
    }

    /// Register a match function for a profile. Registration can happen
    /// while the pipeline is ticking; the next tick sees the new entry.
    pub fn register(&self, profile: MatchProfile, mmf: Arc<dyn MatchFunction>) {
        if let Ok(mut mmfs) = self.match_functions.write() {
            mmfs.push((Arc::new(profile), mmf));
        }
    }

    /// Run the supervisor loop until `shutdown` is cancelled.
    ///
    /// Cancellation is observed only between ticks: a tick in flight always
    /// completes, the next one is suppressed. Ticks never overlap because
    /// each is awaited before the interval is polled again; delayed ticks
    /// are skipped rather than bursted.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            "match pipeline started (tick interval {:?})",
            self.tick_interval
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("match pipeline stopping; no further ticks will run");
                    return;
                }
                _ = interval.tick() => {
                    let started = Instant::now();
                    let result = self.run_tick().await;
                    self.metrics.record_tick(started.elapsed(), result.is_ok());

                    if let Err(e) = result {
                        error!("match tick failed: {:#}", e);
                    }
                }
            }
        }
    }

    /// Execute a single tick.
    pub async fn run_tick(&self) -> Result<()> {
        // The tick runs on its own detached cancellation scope: shutdown
        // never interrupts a tick that already started.
        let cancel = CancellationToken::new();

        let active = self.fetch_active_tickets(&cancel).await?;
        if active.is_empty() {
            return Ok(());
        }
        debug!("tick fetched {} active tickets", active.len());

        let active = Arc::new(active);
        let matches = self.make_matches(active.clone()).await?;
        self.metrics
            .engine()
            .matches_proposed_total
            .inc_by(matches.len() as u64);

        let matches = self.evaluate_matches(matches).await?;
        self.metrics
            .engine()
            .matches_accepted_total
            .inc_by(matches.len() as u64);

        // A failed release is non-fatal for the tick: the stale pending
        // entries age out on their own, and the assign step still runs.
        // The error is surfaced once the rest of the tick is done.
        let mut release_failure: Option<anyhow::Error> = None;
        let unmatched = unmatched_ticket_ids(&active, &matches);
        if !unmatched.is_empty() {
            match self
                .ticket_service
                .index()
                .release_tickets(&cancel, &unmatched)
                .await
            {
                Ok(()) => {
                    self.metrics
                        .engine()
                        .tickets_released_total
                        .inc_by(unmatched.len() as u64);
                }
                Err(e) => {
                    warn!(
                        "failed to release {} unmatched tickets: {:#}",
                        unmatched.len(),
                        e
                    );
                    release_failure = Some(e);
                }
            }
        }

        if !matches.is_empty() {
            self.assign(&cancel, matches).await?;
        }

        match release_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Claim active ticket IDs and fetch their payloads. IDs whose payload
    /// expired between claim and fetch are de-indexed, and the tick carries
    /// on with the remainder.
    async fn fetch_active_tickets(&self, cancel: &CancellationToken) -> Result<Vec<Ticket>> {
        let active_ids = self
            .ticket_service
            .claim_active_ticket_ids(cancel, self.fetch_tickets_limit)
            .await?;
        if active_ids.is_empty() {
            return Ok(Vec::new());
        }

        let (tickets, not_found) = self.ticket_service.get_tickets(&active_ids).await?;

        if !not_found.is_empty() {
            debug!("de-indexing {} expired tickets", not_found.len());
            self.ticket_service
                .delete_index_tickets(cancel, &not_found)
                .await?;
        }

        Ok(tickets)
    }

    /// Fan out to the registered match functions, one worker per
    /// (profile, match function) pair. The first failure cancels the
    /// sibling workers; the tick proceeds only when all workers finished.
    async fn make_matches(&self, active: Arc<Vec<Ticket>>) -> Result<Vec<Match>> {
        let mmfs = self
            .match_functions
            .read()
            .map_err(|_| EngineError::MatchExecFailed {
                message: "match function registry lock poisoned".to_string(),
            })?
            .clone();

        if mmfs.is_empty() {
            return Ok(Vec::new());
        }

        let (tx, mut rx) = mpsc::channel::<Vec<Match>>(mmfs.len());
        let cancel = CancellationToken::new();
        let mut workers = JoinSet::new();

        for (profile, mmf) in mmfs {
            let tx = tx.clone();
            let cancel = cancel.clone();
            let active = active.clone();

            workers.spawn(async move {
                let pool_tickets = classify_tickets(&profile, &active);

                let matches = tokio::select! {
                    _ = cancel.cancelled() => return Ok(()),
                    result = mmf.make_matches(&profile, pool_tickets) => result?,
                };

                // Buffered to the worker count, so this never blocks.
                let _ = tx.send(matches).await;
                Ok::<(), anyhow::Error>(())
            });
        }
        drop(tx);

        let mut first_error: Option<anyhow::Error> = None;
        while let Some(joined) = workers.join_next().await {
            let worker_result = joined.unwrap_or_else(|e| {
                Err(anyhow::anyhow!("match function worker panicked: {e}"))
            });
            if let Err(e) = worker_result {
                if first_error.is_none() {
                    cancel.cancel();
                    first_error = Some(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(EngineError::MatchExecFailed {
                message: format!("{e:#}"),
            }
            .into());
        }

        let mut total_matches = Vec::new();
        while let Ok(matches) = rx.try_recv() {
            total_matches.extend(matches);
        }
        Ok(total_matches)
    }

    /// Keep only evaluator-approved matches, preserving proposal order.
    async fn evaluate_matches(&self, matches: Vec<Match>) -> Result<Vec<Match>> {
        let Some(evaluator) = &self.evaluator else {
            return Ok(matches);
        };

        let accepted_ids =
            evaluator
                .evaluate(&matches)
                .await
                .map_err(|e| EngineError::MatchEvalFailed {
                    message: format!("{e:#}"),
                })?;
        let accepted: HashSet<String> = accepted_ids.into_iter().collect();

        Ok(matches
            .into_iter()
            .filter(|m| accepted.contains(&m.match_id))
            .collect())
    }

    /// Assign gameserver endpoints to the surviving matches. Any ticket
    /// that did not end up with an assignment record is released on the way
    /// out, success or failure; that cleanup is best-effort.
    async fn assign(&self, cancel: &CancellationToken, matches: Vec<Match>) -> Result<()> {
        let mut to_release: Vec<TicketId> = Vec::new();
        let result = self.assign_inner(cancel, &matches, &mut to_release).await;

        if !to_release.is_empty() {
            if let Err(e) = self
                .ticket_service
                .index()
                .release_tickets(cancel, &to_release)
                .await
            {
                warn!("failed to release {} unassigned tickets: {}", to_release.len(), e);
            }
        }

        result
    }

    async fn assign_inner(
        &self,
        cancel: &CancellationToken,
        matches: &[Match],
        to_release: &mut Vec<TicketId>,
    ) -> Result<()> {
        let groups = match self.assigner.assign(matches).await {
            Ok(groups) => groups,
            Err(e) => {
                to_release.extend(ticket_ids_of_matches(matches));
                return Err(EngineError::MatchAssignFailed {
                    message: format!("{e:#}"),
                }
                .into());
            }
        };

        if groups.is_empty() {
            return Ok(());
        }

        let assigned_count: u64 = groups.iter().map(|g| g.ticket_ids.len() as u64).sum();
        match self.assigner_service.assign_tickets(cancel, &groups).await {
            Ok(()) => {
                self.metrics
                    .engine()
                    .tickets_assigned_total
                    .inc_by(assigned_count);
                Ok(())
            }
            Err(failure) => {
                to_release.extend(failure.not_assigned.iter().cloned());
                Err(EngineError::MatchAssignFailed {
                    message: format!("{:#}", failure.source),
                }
                .into())
            }
        }
    }
}

/// Evaluate every pool of a profile against the claimed tickets. A ticket
/// may land in several pools; pools that match nothing are still present as
/// empty lists so match functions see a stable schema.
pub fn classify_tickets(
    profile: &MatchProfile,
    tickets: &[Ticket],
) -> HashMap<String, Vec<Ticket>> {
    let mut pool_tickets: HashMap<String, Vec<Ticket>> = HashMap::new();

    for pool in &profile.pools {
        let entry = pool_tickets.entry(pool.name.clone()).or_default();
        for ticket in tickets {
            if pool.contains(ticket) {
                entry.push(ticket.clone());
            }
        }
    }

    pool_tickets
}

/// Claimed tickets not referenced by any match.
fn unmatched_ticket_ids(tickets: &[Ticket], matches: &[Match]) -> Vec<TicketId> {
    let matched: HashSet<TicketId> = ticket_ids_of_matches(matches).into_iter().collect();
    tickets
        .iter()
        .filter(|t| !matched.contains(&t.id))
        .map(|t| t.id.clone())
        .collect()
}
