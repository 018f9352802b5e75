use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use courier_core::ids::{ConnectionId, UserId};
use courier_store::Database;

use crate::handlers::{self, HandlerState};
use crate::registry::{self, ConnectionRegistry};
use crate::rpc::{RpcRequest, RpcResponse};

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
    pub cleanup_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            max_send_queue: 256,
            cleanup_interval_secs: 60,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub handler_state: Arc<HandlerState>,
    pub registry: Arc<ConnectionRegistry>,
    pub message_tx: mpsc::Sender<(ConnectionId, String)>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
}

/// Create and start the server. Returns a handle that keeps the background
/// tasks alive.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let registry = Arc::new(ConnectionRegistry::new(config.max_send_queue));

    let _cleanup = registry::start_cleanup_task(
        Arc::clone(&registry),
        Duration::from_secs(config.cleanup_interval_secs),
    );

    let (msg_tx, msg_rx) = mpsc::channel::<(ConnectionId, String)>(1024);

    let handler_state = Arc::new(HandlerState::new(db, Arc::clone(&registry)));

    let app_state = AppState {
        handler_state: Arc::clone(&handler_state),
        registry: Arc::clone(&registry),
        message_tx: msg_tx,
    };

    let rpc_registry = Arc::clone(&registry);
    let rpc_handle = tokio::spawn(process_rpc_messages(msg_rx, handler_state, rpc_registry));

    let router = build_router(app_state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "courier server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
        _rpc: rpc_handle,
        _cleanup,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
    _rpc: tokio::task::JoinHandle<()>,
    _cleanup: tokio::task::JoinHandle<()>,
}

#[derive(Deserialize)]
struct WsParams {
    /// Opaque identity established by the upstream authentication layer.
    identity: Option<String>,
}

/// WebSocket upgrade handler. The identity, when present, was validated
/// upstream; an absent identity yields an unauthenticated connection that
/// may hold the socket but not chat.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let identity = params
        .identity
        .filter(|s| !s.trim().is_empty())
        .map(UserId::from_raw);
    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

/// Handle a new WebSocket connection.
async fn handle_socket(socket: WebSocket, identity: Option<UserId>, state: AppState) {
    let (connection_id, rx) = state.registry.register(identity.clone());
    match &identity {
        Some(user) => {
            tracing::info!(connection = %connection_id, identity = %user, "connection active")
        }
        None => tracing::info!(connection = %connection_id, "unauthenticated connection"),
    }

    registry::handle_ws_connection(socket, connection_id, rx, state.registry, state.message_tx)
        .await;
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let resp = handlers::health(&state.handler_state, None);

    let status = resp
        .result
        .as_ref()
        .and_then(|r| r.get("status"))
        .and_then(|s| s.as_str())
        .unwrap_or("unknown");

    let http_status = if status == "healthy" {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::SERVICE_UNAVAILABLE
    };

    (http_status, axum::Json(resp.result.unwrap_or_default()))
}

/// Process incoming RPC frames from WebSocket connections.
async fn process_rpc_messages(
    mut rx: mpsc::Receiver<(ConnectionId, String)>,
    state: Arc<HandlerState>,
    registry: Arc<ConnectionRegistry>,
) {
    while let Some((connection_id, raw_frame)) = rx.recv().await {
        let request: RpcRequest = match serde_json::from_str(&raw_frame) {
            Ok(req) => req,
            Err(_) => {
                let resp = RpcResponse::parse_error();
                if let Ok(json) = serde_json::to_string(&resp) {
                    registry.send_to(&connection_id, json);
                }
                continue;
            }
        };

        let params = request.params.unwrap_or(serde_json::json!({}));
        let response =
            handlers::dispatch(&state, &connection_id, &request.method, &params, request.id);

        if let Ok(json) = serde_json::to_string(&response) {
            registry.send_to(&connection_id, json);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let db = Database::in_memory().unwrap();

        let config = ServerConfig {
            port: 0, // random port
            ..Default::default()
        };

        let handle = start(config, db).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 0);
    }

    #[test]
    fn build_router_creates_routes() {
        let db = Database::in_memory().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(32));
        let handler_state = Arc::new(HandlerState::new(db, Arc::clone(&registry)));
        let (msg_tx, _) = mpsc::channel(32);

        let state = AppState {
            handler_state,
            registry,
            message_tx: msg_tx,
        };

        let _router = build_router(state);
        // If this doesn't panic, the router was built successfully
    }

    #[tokio::test]
    async fn rpc_loop_answers_over_the_registry() {
        let db = Database::in_memory().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(32));
        let state = Arc::new(HandlerState::new(db, Arc::clone(&registry)));

        let (msg_tx, msg_rx) = mpsc::channel(32);
        let _loop = tokio::spawn(process_rpc_messages(
            msg_rx,
            Arc::clone(&state),
            Arc::clone(&registry),
        ));

        let (conn_id, mut rx) = registry.register(Some(UserId::from_raw("1")));
        msg_tx
            .send((conn_id.clone(), r#"{"method":"health","id":1}"#.to_string()))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["result"]["status"], "healthy");
    }

    #[tokio::test]
    async fn rpc_loop_reports_parse_errors() {
        let db = Database::in_memory().unwrap();
        let registry = Arc::new(ConnectionRegistry::new(32));
        let state = Arc::new(HandlerState::new(db, Arc::clone(&registry)));

        let (msg_tx, msg_rx) = mpsc::channel(32);
        let _loop = tokio::spawn(process_rpc_messages(
            msg_rx,
            Arc::clone(&state),
            Arc::clone(&registry),
        ));

        let (conn_id, mut rx) = registry.register(Some(UserId::from_raw("1")));
        msg_tx
            .send((conn_id.clone(), "not json".to_string()))
            .await
            .unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "PARSE_ERROR");
    }
}
