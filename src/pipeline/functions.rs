//! Matchmaking capabilities: match functions, assigners, evaluators
//!
//! Each capability is a single-operation trait. Implementers can provide an
//! object or hand in a closure through the `*Fn` adapters; the engine ships
//! a 1v1 match function and a random-endpoint assigner as built-ins.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use tracing::info;

use crate::error::Result;
use crate::types::{Assignment, AssignmentGroup, Match, MatchProfile, Ticket};
use crate::utils::random_connection_name;

/// Proposes matches from the per-pool ticket lists of one profile
#[async_trait]
pub trait MatchFunction: Send + Sync {
    async fn make_matches(
        &self,
        profile: &MatchProfile,
        pool_tickets: HashMap<String, Vec<Ticket>>,
    ) -> Result<Vec<Match>>;
}

/// Assigns gameserver endpoints to established matches
#[async_trait]
pub trait Assigner: Send + Sync {
    async fn assign(&self, matches: &[Match]) -> Result<Vec<AssignmentGroup>>;
}

/// Approves a subset of proposed matches by match ID
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(&self, matches: &[Match]) -> Result<Vec<String>>;
}

/// Closure adapter for `MatchFunction`
pub struct MatchFunctionFn<F>(pub F);

#[async_trait]
impl<F> MatchFunction for MatchFunctionFn<F>
where
    F: Fn(MatchProfile, HashMap<String, Vec<Ticket>>) -> BoxFuture<'static, Result<Vec<Match>>>
        + Send
        + Sync,
{
    async fn make_matches(
        &self,
        profile: &MatchProfile,
        pool_tickets: HashMap<String, Vec<Ticket>>,
    ) -> Result<Vec<Match>> {
        (self.0)(profile.clone(), pool_tickets).await
    }
}

/// Closure adapter for `Assigner`
pub struct AssignerFn<F>(pub F);

#[async_trait]
impl<F> Assigner for AssignerFn<F>
where
    F: Fn(Vec<Match>) -> BoxFuture<'static, Result<Vec<AssignmentGroup>>> + Send + Sync,
{
    async fn assign(&self, matches: &[Match]) -> Result<Vec<AssignmentGroup>> {
        (self.0)(matches.to_vec()).await
    }
}

/// Closure adapter for `Evaluator`
pub struct EvaluatorFn<F>(pub F);

#[async_trait]
impl<F> Evaluator for EvaluatorFn<F>
where
    F: Fn(Vec<Match>) -> BoxFuture<'static, Result<Vec<String>>> + Send + Sync,
{
    async fn evaluate(&self, matches: &[Match]) -> Result<Vec<String>> {
        (self.0)(matches.to_vec()).await
    }
}

/// Built-in match function pairing tickets two at a time within each pool
#[derive(Debug, Default)]
pub struct Simple1v1MatchFunction;

pub const SIMPLE_1V1_FUNCTION_NAME: &str = "simple-1vs1";

#[async_trait]
impl MatchFunction for Simple1v1MatchFunction {
    async fn make_matches(
        &self,
        profile: &MatchProfile,
        pool_tickets: HashMap<String, Vec<Ticket>>,
    ) -> Result<Vec<Match>> {
        let mut matches = Vec::new();

        // Iterate pools in profile order so match IDs are stable per tick.
        for pool in &profile.pools {
            let Some(tickets) = pool_tickets.get(&pool.name) else {
                continue;
            };

            for pair in tickets.chunks_exact(2) {
                matches.push(new_match(profile, pair.to_vec()));
            }
        }

        Ok(matches)
    }
}

fn new_match(profile: &MatchProfile, tickets: Vec<Ticket>) -> Match {
    let ids: Vec<String> = tickets.iter().map(|t| t.id.clone()).collect();
    Match {
        match_id: format!("{}-{}", profile.name, ids.join("-")),
        match_profile: profile.name.clone(),
        match_function: SIMPLE_1V1_FUNCTION_NAME.to_string(),
        tickets,
        backfill: None,
        extensions: Vec::new(),
        allocate_gameserver: true,
    }
}

/// Built-in assigner handing every match a fresh random connection name
#[derive(Debug, Default)]
pub struct RandomAssigner;

#[async_trait]
impl Assigner for RandomAssigner {
    async fn assign(&self, matches: &[Match]) -> Result<Vec<AssignmentGroup>> {
        let mut groups = Vec::with_capacity(matches.len());

        for m in matches {
            let ticket_ids = m.ticket_ids();
            let connection = random_connection_name();
            info!("assigning '{}' to tickets {:?}", connection, ticket_ids);

            groups.push(AssignmentGroup {
                ticket_ids,
                assignment: Assignment {
                    connection,
                    extensions: Vec::new(),
                },
            });
        }

        Ok(groups)
    }
}
