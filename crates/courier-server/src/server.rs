//! `CourierServer`: Axum HTTP + WebSocket listener wired to the relay dispatcher.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use courier_core::ConnectionId;
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::presence::PresenceRegistry;
use crate::relay::{Dispatcher, Outbound, RelayEvent};
use crate::shutdown::{ShutdownCoordinator, ShutdownOutcome};
use crate::websocket::manager::ConnectionManager;
use crate::websocket::session::{SessionContext, run_ws_session};

/// Depth of the session → dispatcher event channel.
const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Handed to every session.
    pub session: SessionContext,
    /// Presence registry, read by `/health`.
    pub presence: Arc<PresenceRegistry>,
    /// Exact `Origin` value accepted on upgrade.
    pub allowed_origin: HeaderValue,
    /// Upgrade cap.
    pub max_connections: usize,
    /// Inbound message size cap.
    pub max_message_size: usize,
    /// Prometheus handle rendered by `/metrics`.
    pub metrics: PrometheusHandle,
    /// When the server was created.
    pub start_time: Instant,
}

/// The relay server.
pub struct CourierServer {
    config: ServerConfig,
    allowed_origin: HeaderValue,
    presence: Arc<PresenceRegistry>,
    connections: Arc<ConnectionManager>,
    shutdown: Arc<ShutdownCoordinator>,
    events_tx: mpsc::Sender<RelayEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<RelayEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    metrics: PrometheusHandle,
    start_time: Instant,
}

impl CourierServer {
    /// Create a server. Nothing is bound until [`listen`](Self::listen).
    pub fn new(config: ServerConfig, metrics: PrometheusHandle) -> Result<Self, ServerError> {
        config.validate()?;
        let allowed_origin = HeaderValue::from_str(&config.allowed_origin)
            .map_err(|_| ServerError::InvalidOrigin(config.allowed_origin.clone()))?;
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config,
            allowed_origin,
            presence: Arc::new(PresenceRegistry::new()),
            connections: Arc::new(ConnectionManager::new()),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            tasks: Mutex::new(Vec::new()),
            metrics,
            start_time: Instant::now(),
        })
    }

    /// Build the router: `/ws`, `/health`, `/metrics`.
    pub fn router(&self) -> Router {
        let state = AppState {
            session: SessionContext {
                connections: self.connections.clone(),
                events: self.events_tx.clone(),
                shutdown: self.shutdown.clone(),
                send_queue_capacity: self.config.send_queue_capacity,
                heartbeat_interval: self.config.heartbeat_interval(),
                heartbeat_timeout: self.config.heartbeat_timeout(),
            },
            presence: self.presence.clone(),
            allowed_origin: self.allowed_origin.clone(),
            max_connections: self.config.max_connections,
            max_message_size: self.config.max_message_size,
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        };

        let cors = CorsLayer::new()
            .allow_origin(self.allowed_origin.clone())
            .allow_methods([Method::GET]);

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Bind, start the dispatcher, and serve in the background.
    ///
    /// Returns the bound address and the HTTP server task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let events_rx = self
            .events_rx
            .lock()
            .take()
            .ok_or(ServerError::AlreadyListening)?;

        let addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        let outbound: Arc<dyn Outbound> = self.connections.clone();
        let dispatcher = Dispatcher::new(self.presence.clone(), outbound);
        let dispatcher_handle = tokio::spawn(dispatcher.run(events_rx, self.shutdown.token()));
        self.tasks.lock().push(dispatcher_handle);

        let router = self.router();
        let token = self.shutdown.token();
        let server_handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(token.cancelled_owned());
            if let Err(e) = serve.await {
                error!(error = %e, "http server failed");
            }
        });

        info!(
            addr = %local_addr,
            allowed_origin = %self.config.allowed_origin,
            "courier relay listening"
        );
        Ok((local_addr, server_handle))
    }

    /// Stop accepting, close every session, and wait for the dispatcher.
    pub async fn stop(&self, server: JoinHandle<()>, timeout: Option<Duration>) -> ShutdownOutcome {
        let mut handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        handles.push(server);
        self.shutdown.graceful_shutdown(handles, timeout).await
    }

    /// Presence registry.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// Live connection table.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }
}

/// GET /ws
///
/// Origin and capacity are checked before the upgrade is accepted.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        if origin.as_bytes() != state.allowed_origin.as_bytes() {
            warn!(origin = ?origin, "rejecting handshake from disallowed origin");
            counter!(crate::metrics::WS_REJECTED_TOTAL, "reason" => "origin").increment(1);
            return StatusCode::FORBIDDEN.into_response();
        }
    }

    if state.session.shutdown.is_shutting_down() {
        counter!(crate::metrics::WS_REJECTED_TOTAL, "reason" => "shutdown").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    // Counted at session start, so a burst of upgrades can overshoot slightly.
    let open = state.session.connections.connection_count();
    if open >= state.max_connections {
        warn!(open, max = state.max_connections, "connection limit reached");
        counter!(crate::metrics::WS_REJECTED_TOTAL, "reason" => "capacity").increment(1);
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }

    let ws = match upgrade {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let connection_id = ConnectionId::generate();
    let ctx = state.session.clone();
    ws.max_message_size(state.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, connection_id, ctx))
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.session.connections.connection_count(),
        state.presence.len(),
        state.session.shutdown.is_shutting_down(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::render(&state.metrics),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn make_server(config: ServerConfig) -> CourierServer {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        CourierServer::new(config, handle).unwrap()
    }

    fn ws_request(origin: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri("/ws");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn invalid_origin_is_rejected_at_construction() {
        let config = ServerConfig {
            allowed_origin: "bad\norigin".into(),
            ..ServerConfig::default()
        };
        let handle = PrometheusBuilder::new().build_recorder().handle();
        assert!(matches!(
            CourierServer::new(config, handle),
            Err(ServerError::InvalidOrigin(_))
        ));
    }

    #[test]
    fn zero_values_are_rejected_at_construction() {
        let cases = [
            ServerConfig {
                send_queue_capacity: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                heartbeat_interval_secs: 0,
                heartbeat_timeout_secs: 0,
                ..ServerConfig::default()
            },
            ServerConfig {
                max_message_size: 0,
                ..ServerConfig::default()
            },
        ];
        for config in cases {
            let handle = PrometheusBuilder::new().build_recorder().handle();
            assert!(matches!(
                CourierServer::new(config, handle),
                Err(ServerError::InvalidConfig(_))
            ));
        }
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let server = make_server(ServerConfig::default());
        let _ = server.presence().register("A".into(), "c1".into());

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["online_users"], 1);
    }

    #[tokio::test]
    async fn health_reports_shutdown() {
        let server = make_server(ServerConfig::default());
        server.shutdown().shutdown();
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let parsed = body_json(server.router().oneshot(req).await.unwrap()).await;
        assert_eq!(parsed["status"], "shutting_down");
    }

    #[tokio::test]
    async fn metrics_endpoint_serves_text() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get(header::CONTENT_TYPE).unwrap();
        assert!(content_type.to_str().unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn foreign_origin_is_forbidden() {
        let server = make_server(ServerConfig::default());
        let resp = server
            .router()
            .oneshot(ws_request(Some("http://evil.example")))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn allowed_origin_passes_origin_check() {
        let server = make_server(ServerConfig::default());
        let resp = server
            .router()
            .oneshot(ws_request(Some("http://localhost:5173")))
            .await
            .unwrap();
        // Not an upgrade request, so the upgrade extractor rejects it instead.
        assert_ne!(resp.status(), StatusCode::FORBIDDEN);
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn full_server_refuses_upgrades() {
        let server = make_server(ServerConfig {
            max_connections: 0,
            ..ServerConfig::default()
        });
        let resp = server.router().oneshot(ws_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn shutting_down_server_refuses_upgrades() {
        let server = make_server(ServerConfig::default());
        server.shutdown().shutdown();
        let resp = server.router().oneshot(ws_request(None)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn cors_allows_configured_origin() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://localhost:5173")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(
            resp.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:5173"
        );
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server(ServerConfig::default());
        let req = Request::builder().uri("/nope").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_once() {
        let server = make_server(ServerConfig::default());
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert!(matches!(
            server.listen().await,
            Err(ServerError::AlreadyListening)
        ));
        let outcome = server.stop(handle, Some(Duration::from_secs(2))).await;
        assert_eq!(outcome, ShutdownOutcome::Completed);
    }

    #[tokio::test]
    async fn bind_conflict_is_reported() {
        let first = make_server(ServerConfig::default());
        let (addr, handle) = first.listen().await.unwrap();
        let second = make_server(ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        });
        assert!(matches!(
            second.listen().await,
            Err(ServerError::Bind { .. })
        ));
        let _ = first.stop(handle, Some(Duration::from_secs(2))).await;
    }
}
