//! Metrics collection using Prometheus
//!
//! Counters and histograms for the match pipeline and the frontend,
//! gathered from one registry and served on the frontend's `/metrics`
//! endpoint.

use anyhow::Result;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use std::time::Duration;

/// Main metrics collector for the matchmaking engine
#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    engine: EngineMetrics,
}

/// Pipeline and ticket lifecycle metrics
#[derive(Clone)]
pub struct EngineMetrics {
    /// Match ticks by outcome ("ok" / "error")
    pub ticks_total: IntCounterVec,

    /// Wall time of one match tick
    pub tick_duration_seconds: Histogram,

    /// Tickets created through the frontend
    pub tickets_created_total: IntCounter,

    /// Tickets deleted through the frontend
    pub tickets_deleted_total: IntCounter,

    /// Matches proposed by match functions
    pub matches_proposed_total: IntCounter,

    /// Matches surviving evaluation
    pub matches_accepted_total: IntCounter,

    /// Tickets that received an assignment
    pub tickets_assigned_total: IntCounter,

    /// Tickets released back to the active pool
    pub tickets_released_total: IntCounter,

    /// Live assignment watch streams
    pub active_watchers: IntGauge,
}

impl MetricsCollector {
    /// Create a collector with a fresh registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new_custom(Some("scrimmage".to_string()), None)?;

        let engine = EngineMetrics {
            ticks_total: IntCounterVec::new(
                Opts::new("ticks_total", "Match ticks by outcome"),
                &["outcome"],
            )?,
            tick_duration_seconds: Histogram::with_opts(HistogramOpts::new(
                "tick_duration_seconds",
                "Wall time of one match tick",
            ))?,
            tickets_created_total: IntCounter::new(
                "tickets_created_total",
                "Tickets created through the frontend",
            )?,
            tickets_deleted_total: IntCounter::new(
                "tickets_deleted_total",
                "Tickets deleted through the frontend",
            )?,
            matches_proposed_total: IntCounter::new(
                "matches_proposed_total",
                "Matches proposed by match functions",
            )?,
            matches_accepted_total: IntCounter::new(
                "matches_accepted_total",
                "Matches surviving evaluation",
            )?,
            tickets_assigned_total: IntCounter::new(
                "tickets_assigned_total",
                "Tickets that received an assignment",
            )?,
            tickets_released_total: IntCounter::new(
                "tickets_released_total",
                "Tickets released back to the active pool",
            )?,
            active_watchers: IntGauge::new("active_watchers", "Live assignment watch streams")?,
        };

        registry.register(Box::new(engine.ticks_total.clone()))?;
        registry.register(Box::new(engine.tick_duration_seconds.clone()))?;
        registry.register(Box::new(engine.tickets_created_total.clone()))?;
        registry.register(Box::new(engine.tickets_deleted_total.clone()))?;
        registry.register(Box::new(engine.matches_proposed_total.clone()))?;
        registry.register(Box::new(engine.matches_accepted_total.clone()))?;
        registry.register(Box::new(engine.tickets_assigned_total.clone()))?;
        registry.register(Box::new(engine.tickets_released_total.clone()))?;
        registry.register(Box::new(engine.active_watchers.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            engine,
        })
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn engine(&self) -> &EngineMetrics {
        &self.engine
    }

    /// Record one finished tick
    pub fn record_tick(&self, duration: Duration, ok: bool) {
        let outcome = if ok { "ok" } else { "error" };
        self.engine.ticks_total.with_label_values(&[outcome]).inc();
        self.engine
            .tick_duration_seconds
            .observe(duration.as_secs_f64());
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("metrics registration on a fresh registry cannot collide")
    }
}
