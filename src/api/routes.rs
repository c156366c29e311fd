//! API route definitions.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use super::state::AppState;
use super::ApiError;
use crate::execution::ExecutionView;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/execute", post(execute))
        .route("/status/{id}", get(status))
        .route("/executions", get(list_executions))
        .route("/executions/{id}", delete(delete_execution))
        .route("/executions/{id}/stop", post(stop_execution))
        .route("/containers/{container_id}/stop", post(stop_container))
}

/// Body of `POST /execute`.
#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    #[serde(default, alias = "launchCommand", alias = "docker_command")]
    pub launch_command: String,
    #[serde(default, alias = "testCommand")]
    pub test_command: String,
    #[serde(default)]
    pub backend: Option<String>,
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION"),
            "backend": state.driver.backend_name(),
            "executions": state.registry().len().await,
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "version": env!("CARGO_PKG_VERSION")
        }
    }))
}

async fn execute(
    State(state): State<AppState>,
    body: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let id = state
        .driver
        .submit(&req.launch_command, &req.test_command, req.backend.as_deref())
        .await?;
    Ok(Json(json!({ "execution_id": id })))
}

async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ExecutionView>, ApiError> {
    let record = state.registry().get(&id).await.ok_or(ApiError::NotFound)?;
    Ok(Json(ExecutionView::from(&record)))
}

async fn list_executions(State(state): State<AppState>) -> Json<Vec<ExecutionView>> {
    let records = state.registry().list().await;
    Json(records.iter().map(ExecutionView::from).collect())
}

async fn delete_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.driver.delete_execution(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

async fn stop_execution(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.driver.stop_execution(&id).await?;
    Ok(Json(json!({ "message": "Container stopped successfully" })))
}

async fn stop_container(
    State(state): State<AppState>,
    Path(container_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stopped = state.driver.stop_container(&container_id).await?;
    Ok(Json(json!({
        "message": "Container stopped successfully",
        "stopped_executions": stopped,
    })))
}
