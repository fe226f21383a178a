//! Configuration management for the matchmaking engine

pub mod app;

// Re-export commonly used types
pub use app::{AppConfig, MatchmakingSettings, ServiceSettings, StoreSettings};
