//! HTTP control surface of the agent.
//!
//! Every route sits behind the node key header. Responses use the
//! [`ApiResponse`] envelope, except `/metrics` which serves Prometheus text.

use crate::models::{ApiResponse, CreateTunnelRequest, NodeStatus};
use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use portrelay_common::{RelayError, NODE_KEY_HEADER};
use portrelay_core::{auth, Manager, RuleControl};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state of every handler.
#[derive(Clone)]
pub struct AgentState {
    pub manager: Arc<Manager>,
    pub node_key: Arc<str>,
    pub node_name: Arc<str>,
}

impl AgentState {
    pub fn new(manager: Arc<Manager>, node_key: &str, node_name: &str) -> Self {
        Self {
            manager,
            node_key: Arc::from(node_key),
            node_name: Arc::from(node_name),
        }
    }
}

/// Creates the agent router.
///
/// - `GET /status` - node and tunnel status
/// - `POST /tunnels` - create a tunnel
/// - `DELETE /tunnels/{id}` - stop and remove a tunnel
/// - `POST /tunnels/{id}/start` - start a tunnel
/// - `POST /tunnels/{id}/stop` - stop a tunnel
/// - `GET /metrics` - Prometheus metrics
pub fn create_router(state: AgentState) -> Router {
    Router::new()
        .route("/status", get(status_handler))
        .route("/tunnels", post(create_tunnel_handler))
        .route("/tunnels/{id}", delete(delete_tunnel_handler))
        .route("/tunnels/{id}/start", post(start_tunnel_handler))
        .route("/tunnels/{id}/stop", post(stop_tunnel_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_node_key,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn require_node_key(State(state): State<AgentState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(NODE_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    if !auth::verify_node_key(presented, &state.node_key) {
        warn!(path = %request.uri().path(), "Rejected request with invalid node key");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::error("Invalid node key")),
        )
            .into_response();
    }
    next.run(request).await
}

/// Maps an engine error to a JSON error response.
fn error_response(err: &RelayError) -> Response {
    let status = match err {
        RelayError::RuleNotFound(_) => StatusCode::NOT_FOUND,
        RelayError::RuleExists(_) | RelayError::InvalidRule(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ApiResponse::error(err.to_string()))).into_response()
}

fn message_response(result: Result<(), RelayError>, message: &str) -> Response {
    match result {
        Ok(()) => Json(ApiResponse::message(message)).into_response(),
        Err(e) => error_response(&e),
    }
}

/// GET /status
pub async fn status_handler(State(state): State<AgentState>) -> Json<ApiResponse<NodeStatus>> {
    Json(ApiResponse::ok(NodeStatus::collect(
        &state.node_name,
        &state.manager,
    )))
}

/// POST /tunnels
pub async fn create_tunnel_handler(
    State(state): State<AgentState>,
    body: Result<Json<CreateTunnelRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::error(rejection.body_text())),
            )
                .into_response();
        }
    };

    let (rule, auto_start) = request.into_rule();
    let id = rule.id.clone();
    let result = state.manager.create(rule, auto_start).await;
    if result.is_ok() {
        info!(rule_id = %id, auto_start, "Tunnel created");
    }
    message_response(result, "Tunnel created")
}

/// DELETE /tunnels/{id}
pub async fn delete_tunnel_handler(
    State(state): State<AgentState>,
    Path(id): Path<String>,
) -> Response {
    message_response(state.manager.delete(&id).await, "Tunnel deleted")
}

/// POST /tunnels/{id}/start
pub async fn start_tunnel_handler(
    State(state): State<AgentState>,
    Path(id): Path<String>,
) -> Response {
    message_response(state.manager.start(&id).await, "Tunnel started")
}

/// POST /tunnels/{id}/stop
pub async fn stop_tunnel_handler(
    State(state): State<AgentState>,
    Path(id): Path<String>,
) -> Response {
    message_response(RuleControl::stop(&*state.manager, &id).await, "Tunnel stopped")
}

/// GET /metrics
pub async fn metrics_handler() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        portrelay_observability::gather_metrics(),
    )
}
