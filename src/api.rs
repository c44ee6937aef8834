use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{error, warn};

use crate::errors::TaskError;
use crate::orchestrator::TaskOrchestrator;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: TaskOrchestrator,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct CreateTaskRequest {
    pub commands: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    Task(TaskError),
    BadRequest(String),
}

impl From<TaskError> for ApiError {
    fn from(err: TaskError) -> Self {
        Self::Task(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// HTTP status for each error kind.
pub fn status_for(err: &TaskError) -> StatusCode {
    match err {
        TaskError::Validation(_) | TaskError::Boundary(_) => StatusCode::BAD_REQUEST,
        TaskError::RobotNotFound { .. } | TaskError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
        TaskError::TaskAlreadyTerminal { .. } => StatusCode::CONFLICT,
        TaskError::TaskQueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
        TaskError::CancelFailed { .. } => StatusCode::BAD_GATEWAY,
        TaskError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Task(err) => {
                let status = status_for(&err);
                if status.is_server_error() {
                    error!(code = err.code(), error = %err, "request failed");
                } else {
                    warn!(code = err.code(), error = %err, "request rejected");
                }
                (status, err.code(), err.to_string())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg),
        };
        (
            status,
            Json(serde_json::json!({"code": code, "message": message})),
        )
            .into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/robots", get(list_robots))
        .route(
            "/api/robots/{robot_id}/tasks",
            post(create_task).get(list_robot_tasks),
        )
        .route("/api/tasks/{task_id}", get(get_task).delete(cancel_task))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn create_task(
    State(state): State<SharedState>,
    Path(robot_id): Path<String>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let task = state
        .orchestrator
        .create_task(&robot_id, &req.commands)
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn get_task(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let task = state.orchestrator.retrieve_task(&task_id)?;
    Ok(Json(task))
}

async fn cancel_task(
    State(state): State<SharedState>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.orchestrator.cancel_task(&task_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_robots(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let robots = state.orchestrator.robots().await?;
    Ok(Json(robots))
}

async fn list_robot_tasks(
    State(state): State<SharedState>,
    Path(robot_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let tasks = state.orchestrator.list_robot_tasks(&robot_id)?;
    Ok(Json(tasks))
}

// ── Tests ─────────────────────────────────────────────────────────────
