//! Scrimmage - Matchmaking engine for multiplayer game sessions
//!
//! Clients submit tickets describing matchmaking intent; a periodic backend
//! pipeline groups compatible tickets into matches using pluggable match
//! functions, assigns a gameserver endpoint to each match, and streams the
//! assignment back to the waiting ticket owners through a shared store.

pub mod assignment;
pub mod config;
pub mod error;
pub mod frontend;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod service;
pub mod store;
pub mod ticket;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{EngineError, Result};
pub use types::*;

// Re-export key components
pub use pipeline::{Assigner, Evaluator, MatchFunction, MatchPipeline};
pub use service::AppState;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
