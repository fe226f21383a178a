//! Frontend API
//!
//! Thin HTTP adapter translating the external surface (create/get/delete
//! ticket, watch assignments) to ticket and assignment usecase calls. The
//! watch endpoint is a server-sent-event stream that emits only when the
//! assignment changes and ends when the client disconnects. Health and
//! metrics endpoints ride on the same router.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use futures::stream::Stream;
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::assignment::watcher::AssignmentWatcher;
use crate::error::{EngineError, Result};
use crate::metrics::MetricsCollector;
use crate::ticket::service::TicketService;
use crate::types::{Assignment, SearchFields, Ticket};
use crate::utils::{current_timestamp, generate_ticket_id};

/// Frontend server configuration
#[derive(Debug, Clone)]
pub struct FrontendConfig {
    pub host: String,
    pub port: u16,
    pub ticket_ttl: Duration,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 31080,
            ticket_ttl: Duration::from_secs(600),
        }
    }
}

/// Shared state for the frontend router
#[derive(Clone)]
pub struct FrontendState {
    ticket_service: TicketService,
    watcher: AssignmentWatcher,
    metrics: Arc<MetricsCollector>,
    ticket_ttl: Duration,
}

/// HTTP server exposing the frontend API
pub struct FrontendServer {
    config: FrontendConfig,
    state: FrontendState,
    shutdown_tx: broadcast::Sender<()>,
}

impl FrontendServer {
    pub fn new(
        config: FrontendConfig,
        ticket_service: TicketService,
        watcher: AssignmentWatcher,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let ticket_ttl = config.ticket_ttl;

        Self {
            config,
            state: FrontendState {
                ticket_service,
                watcher,
                metrics,
                ticket_ttl,
            },
            shutdown_tx,
        }
    }

    /// Start serving; returns when the server shuts down.
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port).parse()?;
        let app = self.create_router();
        let listener = TcpListener::bind(addr).await?;

        info!("frontend listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("frontend shutdown signal received");
            })
            .await?;

        info!("frontend stopped");
        Ok(())
    }

    /// Signal the server to stop.
    pub fn stop(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("frontend was not running on stop");
        }
    }

    /// Build the router with all endpoints.
    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/healthz", get(healthz_handler))
            .route("/metrics", get(metrics_handler))
            .route(
                "/v1/tickets",
                axum::routing::post(create_ticket_handler),
            )
            .route(
                "/v1/tickets/:ticket_id",
                get(get_ticket_handler).delete(delete_ticket_handler),
            )
            .route(
                "/v1/tickets/:ticket_id/assignments/watch",
                get(watch_assignments_handler),
            )
            .with_state(self.state.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTicketRequest {
    #[serde(default)]
    pub search_fields: SearchFields,
    #[serde(default)]
    pub extensions: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTicketResponse {
    pub id: String,
    pub create_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchAssignmentsResponse {
    pub assignment: Assignment,
}

/// Collapse a usecase error to an internal-error response, keeping the
/// original error kind in the message.
fn internal_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": format!("{err:#}") })),
    )
        .into_response()
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": "scrimmage",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            "/healthz",
            "/metrics",
            "/v1/tickets",
        ]
    }))
}

async fn healthz_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "scrimmage",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn metrics_handler(State(state): State<FrontendState>) -> Response {
    let families = state.metrics.registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&families) {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header("content-type", encoder.format_type())
            .body(body.into())
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => {
            warn!("failed to encode metrics: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn create_ticket_handler(
    State(state): State<FrontendState>,
    Json(request): Json<CreateTicketRequest>,
) -> Response {
    let ticket = Ticket {
        id: generate_ticket_id(),
        assignment: None,
        search_fields: request.search_fields,
        extensions: request.extensions,
        persistent_field: Default::default(),
        created_at: current_timestamp(),
    };

    match state.ticket_service.insert(&ticket, state.ticket_ttl).await {
        Ok(()) => {
            state.metrics.engine().tickets_created_total.inc();
            debug!("created ticket {}", ticket.id);
            Json(CreateTicketResponse {
                id: ticket.id,
                create_time: ticket.created_at,
            })
            .into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn get_ticket_handler(
    State(state): State<FrontendState>,
    Path(ticket_id): Path<String>,
) -> Response {
    match state.ticket_service.find(&ticket_id).await {
        Ok(ticket) => Json(ticket).into_response(),
        Err(e) if matches!(
            e.downcast_ref::<EngineError>(),
            Some(EngineError::TicketNotFound { .. })
        ) =>
        {
            (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{e:#}") })),
            )
                .into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn delete_ticket_handler(
    State(state): State<FrontendState>,
    Path(ticket_id): Path<String>,
) -> Response {
    // Request cancellation drops this future; the token only bounds the
    // lock wait inside the delete.
    let cancel = CancellationToken::new();
    match state.ticket_service.delete_ticket(&cancel, &ticket_id).await {
        Ok(()) => {
            state.metrics.engine().tickets_deleted_total.inc();
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => internal_error(e),
    }
}

async fn watch_assignments_handler(
    State(state): State<FrontendState>,
    Path(ticket_id): Path<String>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel::<Assignment>();

    let watcher = state.watcher.clone();
    let metrics = state.metrics.clone();
    tokio::spawn(async move {
        metrics.engine().active_watchers.inc();

        let sender = tx.clone();
        tokio::select! {
            // The stream was dropped: the client went away, normal close.
            _ = tx.closed() => {}
            result = watcher.watch(&ticket_id, move |assignment| {
                sender
                    .send(assignment)
                    .map_err(|_| anyhow::anyhow!("watch stream closed"))
            }) => {
                if let Err(e) = result {
                    debug!("assignment watch for {} ended: {:#}", ticket_id, e);
                }
            }
        }

        metrics.engine().active_watchers.dec();
    });

    let stream = UnboundedReceiverStream::new(rx).map(|assignment| {
        let event = Event::default()
            .json_data(WatchAssignmentsResponse { assignment })
            .unwrap_or_else(|_| Event::default().data("{}"));
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
