//! HTTP transport for the task RPC.
//!
//! A thin adapter over `TaskLifecycleManager`: one JSON-RPC endpoint
//! (`tasks/send`, `tasks/sendSubscribe`, `tasks/get`, `tasks/cancel`), SSE
//! for the streaming variant, and the capability card at
//! `/.well-known/agent.json`. No lifecycle logic lives here.

mod rpc;

pub use rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::lifecycle::{LifecycleError, TaskLifecycleManager};
use crate::protocol::{AgentCard, SignedEnvelope};
use crate::task::TaskId;

/// Shared handler state.
pub struct AppState {
    pub lifecycle: Arc<TaskLifecycleManager>,
    pub card: AgentCard,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", post(handle_rpc))
        .route("/.well-known/agent.json", get(agent_card))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until shutdown.
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    info!("listening on {host}:{port}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn agent_card(State(state): State<Arc<AppState>>) -> Json<AgentCard> {
    Json(state.card.clone())
}

#[derive(Debug, Deserialize)]
struct TaskRefParams {
    id: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn handle_rpc(State(state): State<Arc<AppState>>, body: String) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(request) => request,
        Err(e) => {
            return Json(JsonRpcResponse::failure(
                None,
                rpc::PARSE_ERROR,
                format!("invalid JSON-RPC request: {e}"),
            ))
            .into_response()
        }
    };

    match request.method.as_str() {
        "tasks/sendSubscribe" => handle_send_subscribe(state, request).await,
        _ => {
            let id = request.id.clone();
            Json(dispatch_plain(&state, request).await.unwrap_or_else(|e| {
                JsonRpcResponse::failure(id, rpc::INTERNAL_ERROR, e.to_string())
            }))
            .into_response()
        }
    }
}

/// Non-streaming method dispatch.
async fn dispatch_plain(
    state: &AppState,
    request: JsonRpcRequest,
) -> Result<JsonRpcResponse, serde_json::Error> {
    let id = request.id;
    let response = match request.method.as_str() {
        "tasks/send" => match serde_json::from_value::<SignedEnvelope>(request.params) {
            Ok(envelope) => match state.lifecycle.handle(envelope).await {
                Ok(task) => JsonRpcResponse::success(id, serde_json::to_value(task)?),
                Err(e) => lifecycle_error_response(id, e),
            },
            Err(e) => {
                JsonRpcResponse::failure(id, rpc::INVALID_PARAMS, format!("bad envelope: {e}"))
            }
        },
        "tasks/get" => match serde_json::from_value::<TaskRefParams>(request.params) {
            Ok(params) => {
                let task_id = TaskId::new(params.id);
                match state.lifecycle.store().get(&task_id).await {
                    Some(task) => JsonRpcResponse::success(id, serde_json::to_value(task)?),
                    None => JsonRpcResponse::failure(
                        id,
                        rpc::TASK_NOT_FOUND,
                        format!("task {task_id} not found"),
                    ),
                }
            }
            Err(e) => JsonRpcResponse::failure(id, rpc::INVALID_PARAMS, e.to_string()),
        },
        "tasks/cancel" => match serde_json::from_value::<TaskRefParams>(request.params) {
            Ok(params) => {
                let task_id = TaskId::new(params.id);
                let reason = params.reason.as_deref().unwrap_or("canceled by caller");
                match state.lifecycle.cancel(&task_id, reason).await {
                    Ok(task) => JsonRpcResponse::success(id, serde_json::to_value(task)?),
                    Err(e) => lifecycle_error_response(id, e),
                }
            }
            Err(e) => JsonRpcResponse::failure(id, rpc::INVALID_PARAMS, e.to_string()),
        },
        other => JsonRpcResponse::failure(
            id,
            rpc::METHOD_NOT_FOUND,
            format!("unknown method: {other}"),
        ),
    };
    Ok(response)
}

/// Streaming dispatch: each task snapshot becomes one SSE event.
async fn handle_send_subscribe(state: Arc<AppState>, request: JsonRpcRequest) -> Response {
    let id = request.id.clone();
    let envelope = match serde_json::from_value::<SignedEnvelope>(request.params) {
        Ok(envelope) => envelope,
        Err(e) => {
            return Json(JsonRpcResponse::failure(
                id,
                rpc::INVALID_PARAMS,
                format!("bad envelope: {e}"),
            ))
            .into_response()
        }
    };

    let snapshots = state.lifecycle.clone().handle_streaming(envelope);
    let stream = snapshots.map(move |task| {
        let response = match serde_json::to_value(&task) {
            Ok(value) => JsonRpcResponse::success(id.clone(), value),
            Err(e) => JsonRpcResponse::failure(id.clone(), rpc::INTERNAL_ERROR, e.to_string()),
        };
        Ok::<Event, Infallible>(
            Event::default()
                .event("task-update")
                .json_data(&response)
                .unwrap_or_else(|_| Event::default().event("error")),
        )
    });

    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keepalive"),
        )
        .into_response()
}

fn lifecycle_error_response(id: Option<Value>, error: LifecycleError) -> JsonRpcResponse {
    match error {
        LifecycleError::TaskNotFound(task_id) => JsonRpcResponse::failure(
            id,
            rpc::TASK_NOT_FOUND,
            format!("task {task_id} not found"),
        ),
        LifecycleError::TaskAlreadyExists(task_id) => JsonRpcResponse::failure(
            id,
            rpc::INVALID_REQUEST,
            format!("task {task_id} already exists"),
        ),
        other => JsonRpcResponse::failure(id, rpc::INTERNAL_ERROR, other.to_string()),
    }
}
