//! RPC method handlers.

use std::sync::Arc;

use courier_core::ids::{ConnectionId, UserId};
use courier_core::message::MessageKind;
use courier_store::{Database, StoreError};

use crate::history::HistoryService;
use crate::registry::ConnectionRegistry;
use crate::router::DeliveryRouter;
use crate::rpc::{self, RpcResponse};

/// Shared state available to all RPC handlers.
pub struct HandlerState {
    pub db: Database,
    pub registry: Arc<ConnectionRegistry>,
    pub router: DeliveryRouter,
    pub history: HistoryService,
}

impl HandlerState {
    pub fn new(db: Database, registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            router: DeliveryRouter::new(db.clone(), Arc::clone(&registry)),
            history: HistoryService::new(db.clone()),
            db,
            registry,
        }
    }
}

/// Dispatch an RPC method arriving on `origin` to the appropriate handler.
pub fn dispatch(
    state: &Arc<HandlerState>,
    origin: &ConnectionId,
    method: &str,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    match method {
        "chat.send" => chat_send(state, origin, params, id),
        "history.get" => history_get(state, origin, params, id),
        "system.ping" | "health" => health(state, id),
        _ => RpcResponse::method_not_found(id, method),
    }
}

fn chat_send(
    state: &Arc<HandlerState>,
    origin: &ConnectionId,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let target_id = match rpc::require_str(params, "target_id") {
        Ok(t) => t,
        Err(e) => return RpcResponse::validation_error(id, e),
    };
    let content = match rpc::require_str(params, "content") {
        Ok(c) => c,
        Err(e) => return RpcResponse::validation_error(id, e),
    };
    let kind = match rpc::optional_str(params, "kind") {
        Some(raw) => match raw.parse::<MessageKind>() {
            Ok(k) => k,
            Err(e) => return RpcResponse::validation_error(id, e),
        },
        None => MessageKind::default(),
    };

    match state.router.route(origin, target_id, content, kind) {
        Ok(receipt) => RpcResponse::success(
            id,
            serde_json::json!({
                "message_id": receipt.message_id,
                "delivered": receipt.delivered,
            }),
        ),
        Err(e) => RpcResponse::from_chat_error(id, &e),
    }
}

fn history_get(
    state: &Arc<HandlerState>,
    origin: &ConnectionId,
    params: &serde_json::Value,
    id: Option<serde_json::Value>,
) -> RpcResponse {
    let other_id = match rpc::require_str(params, "other_id") {
        Ok(o) => o,
        Err(e) => return RpcResponse::validation_error(id, e),
    };

    let caller = state.registry.identity_of(origin);
    match state
        .history
        .fetch(caller.as_ref(), &UserId::from_raw(other_id))
    {
        Ok(entries) => RpcResponse::success(id, serde_json::json!({ "messages": entries })),
        Err(e) => RpcResponse::from_chat_error(id, &e),
    }
}

/// Liveness probe: store reachability + live connection count.
pub fn health(state: &Arc<HandlerState>, id: Option<serde_json::Value>) -> RpcResponse {
    let store_ok = state
        .db
        .with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(StoreError::from)
        })
        .is_ok();

    RpcResponse::success(
        id,
        serde_json::json!({
            "status": if store_ok { "healthy" } else { "degraded" },
            "connections": state.registry.count(),
        }),
    )
}
