//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! scrimmage matchmaking engine, including environment variable loading
//! and validation.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub store: StoreSettings,
    pub matchmaking: MatchmakingSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host for the frontend API
    pub frontend_host: String,
    /// Port for the frontend API
    pub frontend_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Shared-store settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Store connection URL; empty selects the in-process store
    pub url: String,
    /// Fetch-lock lease TTL in milliseconds
    pub lock_ttl_ms: u64,
}

/// Matchmaking-specific settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingSettings {
    /// Match pipeline tick interval in milliseconds
    pub tick_interval_ms: u64,
    /// Maximum number of tickets claimed per tick
    pub fetch_tickets_limit: i64,
    /// Ticket payload TTL on insert, in seconds
    pub ticket_ttl_seconds: u64,
    /// Age after which a pending entry is treated as released, in seconds
    pub pending_release_timeout_seconds: u64,
    /// Assigned-ticket payload/assignment TTL, in seconds
    pub assigned_delete_timeout_seconds: u64,
    /// Assignment watcher poll interval in milliseconds
    pub watch_poll_interval_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "scrimmage".to_string(),
            log_level: "info".to_string(),
            frontend_host: "127.0.0.1".to_string(),
            frontend_port: 31080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            lock_ttl_ms: 1000,
        }
    }
}

impl Default for MatchmakingSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            fetch_tickets_limit: 10_000,
            ticket_ttl_seconds: 600,
            pending_release_timeout_seconds: 60,
            assigned_delete_timeout_seconds: 60,
            watch_poll_interval_ms: 100,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(host) = env::var("FRONTEND_HOST") {
            config.service.frontend_host = host;
        }
        if let Ok(port) = env::var("FRONTEND_PORT") {
            config.service.frontend_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid FRONTEND_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Store settings
        if let Ok(url) = env::var("STORE_URL") {
            config.store.url = url;
        }
        if let Ok(ttl) = env::var("LOCK_TTL_MS") {
            config.store.lock_ttl_ms = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid LOCK_TTL_MS value: {}", ttl))?;
        }

        // Matchmaking settings
        if let Ok(interval) = env::var("TICK_INTERVAL_MS") {
            config.matchmaking.tick_interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("Invalid TICK_INTERVAL_MS value: {}", interval))?;
        }
        if let Ok(limit) = env::var("FETCH_TICKETS_LIMIT") {
            config.matchmaking.fetch_tickets_limit = limit
                .parse()
                .map_err(|_| anyhow!("Invalid FETCH_TICKETS_LIMIT value: {}", limit))?;
        }
        if let Ok(ttl) = env::var("TICKET_TTL_SECONDS") {
            config.matchmaking.ticket_ttl_seconds = ttl
                .parse()
                .map_err(|_| anyhow!("Invalid TICKET_TTL_SECONDS value: {}", ttl))?;
        }
        if let Ok(timeout) = env::var("PENDING_RELEASE_TIMEOUT_SECONDS") {
            config.matchmaking.pending_release_timeout_seconds = timeout.parse().map_err(|_| {
                anyhow!("Invalid PENDING_RELEASE_TIMEOUT_SECONDS value: {}", timeout)
            })?;
        }
        if let Ok(timeout) = env::var("ASSIGNED_DELETE_TIMEOUT_SECONDS") {
            config.matchmaking.assigned_delete_timeout_seconds = timeout.parse().map_err(|_| {
                anyhow!("Invalid ASSIGNED_DELETE_TIMEOUT_SECONDS value: {}", timeout)
            })?;
        }
        if let Ok(interval) = env::var("WATCH_POLL_INTERVAL_MS") {
            config.matchmaking.watch_poll_interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("Invalid WATCH_POLL_INTERVAL_MS value: {}", interval))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }

    /// Get the fetch-lock lease TTL as Duration
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.store.lock_ttl_ms)
    }

    /// Get the tick interval as Duration
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking.tick_interval_ms)
    }

    /// Get the ticket payload TTL as Duration
    pub fn ticket_ttl(&self) -> Duration {
        Duration::from_secs(self.matchmaking.ticket_ttl_seconds)
    }

    /// Get the pending release timeout as Duration
    pub fn pending_release_timeout(&self) -> Duration {
        Duration::from_secs(self.matchmaking.pending_release_timeout_seconds)
    }

    /// Get the assigned-delete timeout as Duration
    pub fn assigned_delete_timeout(&self) -> Duration {
        Duration::from_secs(self.matchmaking.assigned_delete_timeout_seconds)
    }

    /// Get the watcher poll interval as Duration
    pub fn watch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.matchmaking.watch_poll_interval_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.frontend_port == 0 {
        return Err(anyhow!("Frontend port cannot be 0"));
    }
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    if config.store.lock_ttl_ms == 0 {
        return Err(anyhow!("Lock TTL must be greater than 0"));
    }

    if config.matchmaking.tick_interval_ms == 0 {
        return Err(anyhow!("Tick interval must be greater than 0"));
    }
    if config.matchmaking.fetch_tickets_limit < 0 {
        return Err(anyhow!("Fetch tickets limit cannot be negative"));
    }
    if config.matchmaking.ticket_ttl_seconds == 0 {
        return Err(anyhow!("Ticket TTL must be greater than 0"));
    }
    if config.matchmaking.pending_release_timeout_seconds == 0 {
        return Err(anyhow!("Pending release timeout must be greater than 0"));
    }
    if config.matchmaking.assigned_delete_timeout_seconds == 0 {
        return Err(anyhow!("Assigned delete timeout must be greater than 0"));
    }
    if config.matchmaking.watch_poll_interval_ms == 0 {
        return Err(anyhow!("Watch poll interval must be greater than 0"));
    }

    Ok(())
}
