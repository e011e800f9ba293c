//! Todo Agent Web 接口
//!
//! 启动: cargo run --bin todo-agent-web --features web
//! - POST /api/chat           单轮对话（终止性失败与无法解析的请求体返回 500）
//! - GET  /api/tools/stream   工具执行事件（SSE）
//! - GET  /api/todos          当前任务
//! - GET  /api/metrics        指标快照
//! - GET  /api/health

#![cfg(feature = "web")]

use std::convert::Infallible;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use todo_agent::config::{load_config_or_default, AppConfig};
use todo_agent::store::{Todo, TodoFilter};
use todo_agent::{create_agent_components, observability, AgentComponents, TurnRequest, TurnResponse};

struct AppState {
    components: AgentComponents,
    config: AppConfig,
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/tools/stream", get(api_tools_stream))
        .route("/api/todos", get(api_todos))
        .route("/api/metrics", get(api_metrics))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(state)
}

fn failure(status: StatusCode, error: impl Into<String>) -> (StatusCode, Json<TurnResponse>) {
    (
        status,
        Json(TurnResponse::Failure {
            success: false,
            error: error.into(),
        }),
    )
}

async fn api_chat(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TurnRequest>, JsonRejection>,
) -> (StatusCode, Json<TurnResponse>) {
    let req = match body {
        Ok(Json(req)) => req,
        Err(rejection) => {
            tracing::error!("Error in chat request: {}", rejection.body_text());
            return failure(StatusCode::INTERNAL_SERVER_ERROR, rejection.body_text());
        }
    };
    if req.message.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "message is required");
    }
    let response = state.components.orchestrator.handle(req).await;
    let status = if response.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(response))
}

async fn api_tools_stream(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.components.events.subscribe();
    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(exec) => {
                    let data = serde_json::to_string(&exec).unwrap_or_default();
                    return Some((Ok(Event::default().data(data)), rx));
                }
                Err(RecvError::Lagged(n)) => {
                    tracing::warn!("Tool event stream lagged, skipped {} events", n);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TodosQuery {
    agent_type: Option<String>,
    completed: Option<bool>,
}

async fn api_todos(
    State(state): State<Arc<AppState>>,
    Query(q): Query<TodosQuery>,
) -> Result<Json<Vec<Todo>>, (StatusCode, String)> {
    let filter = TodoFilter {
        agent_type: Some(q.agent_type.unwrap_or_else(|| state.config.app.default_agent.clone())),
        completed: q.completed,
        ..Default::default()
    };
    state
        .components
        .store
        .list(filter)
        .await
        .map(Json)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
}

async fn api_metrics(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let snapshot = state.components.metrics.snapshot().await;
    Json(serde_json::json!({ "agents": snapshot }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config = load_config_or_default(None);
    let components = create_agent_components(&config)
        .await
        .context("Failed to create agent")?;
    let bind = config.server.bind.clone();
    let state = Arc::new(AppState { components, config });

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {bind}"))?;
    tracing::info!("Todo agent listening on http://{}", bind);
    axum::serve(listener, router(state))
        .await
        .context("Server error")?;
    Ok(())
}
