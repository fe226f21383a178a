//! Application state and service coordination
//!
//! Composition root wiring the store, fetch lock, ticket and assigner
//! services, match pipeline, and frontend together with explicit
//! constructor parameters, plus start/shutdown of the background tasks.
//! Shutdown cancels the pipeline's supervisor token and then waits for the
//! task, so a tick in flight completes before the process exits.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assignment::service::AssignerService;
use crate::assignment::watcher::AssignmentWatcher;
use crate::config::AppConfig;
use crate::error::Result;
use crate::frontend::{FrontendConfig, FrontendServer};
use crate::metrics::MetricsCollector;
use crate::pipeline::director::MatchPipeline;
use crate::pipeline::functions::{Assigner, Evaluator, MatchFunction};
use crate::store::adapter::StoreAdapter;
use crate::store::lock::{FetchLock, StoreFetchLock};
use crate::store::memory::MemoryStore;
use crate::store::redis::RedisStore;
use crate::ticket::index::TicketIndex;
use crate::ticket::service::TicketService;
use crate::types::MatchProfile;

/// Main application state containing all engine components
pub struct AppState {
    config: AppConfig,
    ticket_service: TicketService,
    assigner_service: AssignerService,
    watcher: AssignmentWatcher,
    pipeline: Arc<MatchPipeline>,
    frontend: Arc<FrontendServer>,
    metrics: Arc<MetricsCollector>,
    shutdown: CancellationToken,
    pipeline_task: Option<JoinHandle<()>>,
    frontend_task: Option<JoinHandle<()>>,
}

impl AppState {
    /// Initialize the engine with all dependencies.
    pub async fn new(
        config: AppConfig,
        assigner: Arc<dyn Assigner>,
        evaluator: Option<Arc<dyn Evaluator>>,
    ) -> Result<Self> {
        info!("initializing scrimmage matchmaking engine");

        let store: Arc<dyn StoreAdapter> = if config.store.url.is_empty() {
            info!("no store URL configured; using the in-process store");
            Arc::new(MemoryStore::new())
        } else {
            info!("connecting to store at {}", config.store.url);
            Arc::new(RedisStore::connect(&config.store.url).await?)
        };

        Self::with_store(config, store, assigner, evaluator)
    }

    /// Initialize against an already-constructed store (used by tests).
    pub fn with_store(
        config: AppConfig,
        store: Arc<dyn StoreAdapter>,
        assigner: Arc<dyn Assigner>,
        evaluator: Option<Arc<dyn Evaluator>>,
    ) -> Result<Self> {
        let metrics = Arc::new(MetricsCollector::new()?);

        let lock: Arc<dyn FetchLock> =
            Arc::new(StoreFetchLock::new(store.clone(), config.lock_ttl()));
        let index = TicketIndex::new(store.clone(), lock.clone(), config.pending_release_timeout());
        let ticket_service = TicketService::new(store.clone(), lock, index);
        let assigner_service = AssignerService::new(
            store,
            ticket_service.clone(),
            config.assigned_delete_timeout(),
        );
        let watcher = AssignmentWatcher::new(
            Arc::new(assigner_service.clone()),
            config.watch_poll_interval(),
        );

        let pipeline = Arc::new(MatchPipeline::new(
            assigner,
            evaluator,
            ticket_service.clone(),
            assigner_service.clone(),
            metrics.clone(),
            config.matchmaking.fetch_tickets_limit,
            config.tick_interval(),
        ));

        let frontend = Arc::new(FrontendServer::new(
            FrontendConfig {
                host: config.service.frontend_host.clone(),
                port: config.service.frontend_port,
                ticket_ttl: config.ticket_ttl(),
            },
            ticket_service.clone(),
            watcher.clone(),
            metrics.clone(),
        ));

        Ok(Self {
            config,
            ticket_service,
            assigner_service,
            watcher,
            pipeline,
            frontend,
            metrics,
            shutdown: CancellationToken::new(),
            pipeline_task: None,
            frontend_task: None,
        })
    }

    /// Register a match function for a profile.
    pub fn register_match_function(&self, profile: MatchProfile, mmf: Arc<dyn MatchFunction>) {
        self.pipeline.register(profile, mmf);
    }

    /// Start the match loop and the frontend.
    pub fn start(&mut self) -> Result<()> {
        info!("starting scrimmage matchmaking engine");

        let pipeline = self.pipeline.clone();
        let shutdown = self.shutdown.clone();
        self.pipeline_task = Some(tokio::spawn(async move {
            pipeline.run(shutdown).await;
        }));

        let frontend = self.frontend.clone();
        self.frontend_task = Some(tokio::spawn(async move {
            if let Err(e) = frontend.start().await {
                warn!("frontend server exited with error: {:#}", e);
            }
        }));

        info!("scrimmage matchmaking engine started");
        Ok(())
    }

    /// Perform graceful shutdown. The pipeline task is awaited, not
    /// aborted, so an in-flight tick finishes before we return.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("starting graceful shutdown");

        self.shutdown.cancel();
        self.frontend.stop();

        let timeout = self.config.shutdown_timeout();
        if let Some(task) = self.pipeline_task.take() {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("match pipeline did not stop within {:?}", timeout);
            }
        }
        if let Some(task) = self.frontend_task.take() {
            if tokio::time::timeout(timeout, task).await.is_err() {
                warn!("frontend did not stop within {:?}", timeout);
            }
        }

        info!("scrimmage shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ticket_service(&self) -> &TicketService {
        &self.ticket_service
    }

    pub fn assigner_service(&self) -> &AssignerService {
        &self.assigner_service
    }

    pub fn watcher(&self) -> &AssignmentWatcher {
        &self.watcher
    }

    pub fn pipeline(&self) -> Arc<MatchPipeline> {
        self.pipeline.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }
}
