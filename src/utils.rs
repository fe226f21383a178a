//! Utility functions for the matchmaking engine

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use uuid::Uuid;

/// Generate a new opaque, collision-resistant ticket ID
pub fn generate_ticket_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Current time as unix seconds (pending-index score resolution)
pub fn unix_now_seconds() -> i64 {
    Utc::now().timestamp()
}

/// Generate a random human-readable gameserver connection name
pub fn random_connection_name() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("gs-{}", suffix.to_lowercase())
}
