//! Subtask handlers.  Every route first checks that the caller owns the
//! parent task.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};

use super::authorize_task;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::model::{NewSubtask, Subtask, SubtaskPatch, TaskStatus};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateSubtaskRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default, alias = "estimated_time")]
    estimated_time: Option<String>,
    #[serde(default, alias = "depends_on")]
    depends_on: Vec<String>,
}

#[derive(Deserialize)]
pub(super) struct UpdateSubtaskRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
    #[serde(default)]
    completed: Option<bool>,
}

fn subtask_not_found() -> ApiError {
    ApiError::NotFound("Subtask not found".into())
}

/// POST /api/tasks/{id}/subtasks
pub(super) async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<String>,
    payload: Result<Json<CreateSubtaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Subtask>), ApiError> {
    let Json(req) = payload?;
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Subtask title is required".into()));
    }
    authorize_task(&state, &user, &task_id, "add subtasks to this task").await?;

    let new = NewSubtask {
        title: req.title,
        description: req.description,
        link: req.link.filter(|l| !l.trim().is_empty()),
        estimated_time: req.estimated_time,
        depends_on: req.depends_on,
    };
    let subtask = state.store.run(move |s| s.create_subtask(&task_id, new)).await?;
    Ok((StatusCode::CREATED, Json(subtask)))
}

/// GET /api/tasks/{id}/subtasks
pub(super) async fn list(
    State(state): State<AppState>,
    user: AuthUser,
    Path(task_id): Path<String>,
) -> Result<Json<Vec<Subtask>>, ApiError> {
    authorize_task(&state, &user, &task_id, "view subtasks of this task").await?;
    let subtasks = state.store.run(move |s| s.list_subtasks(&task_id)).await?;
    Ok(Json(subtasks))
}

/// PUT /api/tasks/{task_id}/subtasks/{subtask_id}
pub(super) async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path((task_id, subtask_id)): Path<(String, String)>,
    payload: Result<Json<UpdateSubtaskRequest>, JsonRejection>,
) -> Result<Json<Subtask>, ApiError> {
    let Json(req) = payload?;
    authorize_task(&state, &user, &task_id, "update subtasks of this task").await?;

    let patch = SubtaskPatch {
        title: req.title,
        link: req.link,
        status: req.status.or(req.completed.map(TaskStatus::from_completed)),
    };
    let updated = state
        .store
        .run(move |s| match s.subtask_in_task(&task_id, &subtask_id)? {
            Some(_) => s.update_subtask(&subtask_id, patch),
            None => Ok(None),
        })
        .await?
        .ok_or_else(subtask_not_found)?;
    Ok(Json(updated))
}

/// DELETE /api/tasks/{task_id}/subtasks/{subtask_id}
pub(super) async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path((task_id, subtask_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    authorize_task(&state, &user, &task_id, "delete subtasks of this task").await?;

    let deleted = state
        .store
        .run(move |s| match s.subtask_in_task(&task_id, &subtask_id)? {
            Some(_) => s.delete_subtask(&subtask_id),
            None => Ok(false),
        })
        .await?;
    if !deleted {
        return Err(subtask_not_found());
    }
    Ok(Json(json!({ "message": "Subtask deleted successfully" })))
}
