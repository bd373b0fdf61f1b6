//! `HubServer`: Axum HTTP + WebSocket front end for the hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use sitehub_core::{PresenceEntry, ProjectId, UserId};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::services::ServiceRegistry;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::Connection;
use crate::websocket::hub::{Hub, HubHandle};
use crate::websocket::router::{MessageHandler, MessageRouter};
use crate::websocket::session::run_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Client of the hub loop.
    pub hub: HubHandle,
    /// Inbound message handler shared by all sessions.
    pub router: Arc<MessageRouter>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle backing `/metrics`, when installed.
    pub metrics: Option<PrometheusHandle>,
    /// Admitted WebSocket connections.
    pub active: Arc<AtomicUsize>,
}

/// The sitehub server.
pub struct HubServer {
    config: Arc<ServerConfig>,
    hub: HubHandle,
    router: Arc<MessageRouter>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: Option<PrometheusHandle>,
    active: Arc<AtomicUsize>,
}

impl HubServer {
    /// Create a server and start its hub loop.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ServerConfig, services: ServiceRegistry) -> Self {
        let shutdown = Arc::new(ShutdownCoordinator::new());
        let (hub_loop, hub) = Hub::new(config.command_buffer);
        shutdown.spawn(hub_loop.run(shutdown.token()));

        let router = Arc::new(MessageRouter::new(
            hub.clone(),
            Arc::new(services),
            config.service_timeout,
        ));
        Self {
            config: Arc::new(config),
            hub,
            router,
            shutdown,
            start_time: Instant::now(),
            metrics: None,
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serve `/metrics` from an installed Prometheus recorder.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: self.hub.clone(),
            router: self.router.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
            active: self.active.clone(),
        };

        Router::new()
            .route("/ws/projects/{project_id}", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Bind `addr` and serve until the shutdown token is cancelled.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(
        &self,
        addr: impl ToSocketAddrs,
    ) -> std::io::Result<(SocketAddr, JoinHandle<()>)> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let app = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await;
            if let Err(e) = served {
                error!(error = %e, "server error");
            }
        });
        info!(addr = %local, "sitehub listening");
        Ok((local, handle))
    }

    /// `host:port` from the configuration.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Get the hub handle.
    pub fn hub(&self) -> &HubHandle {
        &self.hub
    }

    /// Get the shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Get the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Admitted WebSocket connections.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }
}

/// Identity of the joining user. Admission happens upstream, so these
/// fields are trusted.
#[derive(Debug, Default, Deserialize)]
struct JoinParams {
    user_id: Option<String>,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
}

/// One admitted connection; released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>, max: usize) -> Option<Self> {
        active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
            .ok()
            .map(|_| Self(active.clone()))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        let _ = self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// GET /ws/projects/{project_id}
async fn ws_handler(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<JoinParams>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if state.shutdown.is_shutting_down() {
        return (StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    }
    let Some(user_id) = params.user_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "user_id is required").into_response();
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };
    let Some(slot) = ConnectionSlot::acquire(&state.active, state.config.max_connections) else {
        warn!(
            max_connections = state.config.max_connections,
            "connection limit reached, refusing upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "too many connections").into_response();
    };

    let entry = PresenceEntry {
        user_id: UserId::from(user_id),
        first_name: params.first_name,
        last_name: params.last_name,
        email: params.email,
    };
    let config = state.config.connection.clone();
    let (connection, outbound) =
        Connection::channel(ProjectId::from(project_id), entry, config.send_queue_capacity);
    let hub = state.hub.clone();
    let handler: Arc<dyn MessageHandler> = state.router.clone();

    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| async move {
            let _slot = slot;
            run_session(socket, connection, outbound, hub, handler, config).await;
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Response {
    match state.hub.stats().await {
        Ok(stats) => {
            Json(health::health_check(state.start_time, stats.connections, stats.rooms))
                .into_response()
        }
        Err(e) => {
            let body = HealthResponse {
                status: "unavailable".into(),
                uptime_secs: state.start_time.elapsed().as_secs(),
                connections: 0,
                rooms: 0,
            };
            warn!(error = %e, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
