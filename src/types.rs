//! Common types used throughout the matchmaking engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::pool::Pool;

/// Unique identifier for tickets (server-generated opaque string)
pub type TicketId = String;

/// Searchable attributes of a ticket; the only structure pool filters see
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFields {
    #[serde(default)]
    pub double_args: HashMap<String, f64>,
    #[serde(default)]
    pub string_args: HashMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SearchFields {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// A player's intent to enter matchmaking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    #[serde(default)]
    pub assignment: Option<Assignment>,
    #[serde(default)]
    pub search_fields: SearchFields,
    #[serde(default)]
    pub extensions: Vec<u8>,
    #[serde(default)]
    pub persistent_field: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Gameserver endpoint published for every ticket of a successful match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub connection: String,
    #[serde(default)]
    pub extensions: Vec<u8>,
}

/// One assignment plus the ticket IDs it applies to
#[derive(Debug, Clone)]
pub struct AssignmentGroup {
    pub ticket_ids: Vec<TicketId>,
    pub assignment: Assignment,
}

/// Ordered group of tickets proposed by a match function
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub match_id: String,
    pub match_profile: String,
    pub match_function: String,
    pub tickets: Vec<Ticket>,
    #[serde(default)]
    pub backfill: Option<Backfill>,
    #[serde(default)]
    pub extensions: Vec<u8>,
    #[serde(default)]
    pub allocate_gameserver: bool,
}

impl Match {
    pub fn ticket_ids(&self) -> Vec<TicketId> {
        self.tickets.iter().map(|t| t.id.clone()).collect()
    }
}

/// Collect every ticket ID referenced by a slice of matches, in match order.
pub fn ticket_ids_of_matches(matches: &[Match]) -> Vec<TicketId> {
    matches.iter().flat_map(|m| m.ticket_ids()).collect()
}

/// Placeholder slot a match function may carry to top up an existing session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backfill {
    pub id: String,
    #[serde(default)]
    pub search_fields: SearchFields,
    #[serde(default)]
    pub extensions: Vec<u8>,
    #[serde(default)]
    pub persistent_field: HashMap<String, serde_json::Value>,
    pub create_time: DateTime<Utc>,
    pub generation: i64,
}

/// Named set of pools; the unit of match-function registration
#[derive(Debug, Clone)]
pub struct MatchProfile {
    pub name: String,
    pub pools: Vec<Pool>,
    pub extensions: Vec<u8>,
}

impl MatchProfile {
    pub fn new(name: impl Into<String>, pools: Vec<Pool>) -> Self {
        Self {
            name: name.into(),
            pools,
            extensions: Vec::new(),
        }
    }
}
