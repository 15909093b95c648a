//! Task CRUD handlers.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::authorize_task;
use crate::auth::AuthUser;
use crate::dates::extract_due_date;
use crate::error::ApiError;
use crate::model::{NewTask, Priority, Task, TaskPatch, TaskStatus};
use crate::state::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CreateTaskRequest {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default, alias = "due_date")]
    due_date: Option<NaiveDate>,
    #[serde(default, alias = "total_estimated_time")]
    total_estimated_time: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UpdateTaskRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    priority: Option<Priority>,
    #[serde(default)]
    status: Option<TaskStatus>,
    /// Shorthand for `status`, ignored when `status` is present.
    #[serde(default)]
    completed: Option<bool>,
    #[serde(default, alias = "due_date")]
    due_date: Option<NaiveDate>,
}

impl From<UpdateTaskRequest> for TaskPatch {
    fn from(req: UpdateTaskRequest) -> Self {
        TaskPatch {
            title: req.title,
            description: req.description,
            priority: req.priority,
            status: req.status.or(req.completed.map(TaskStatus::from_completed)),
            due_date: req.due_date,
        }
    }
}

fn not_found() -> ApiError {
    ApiError::NotFound("Task not found".into())
}

/// POST /api/tasks
///
/// Without an explicit due date, one mentioned in the title is used.
pub(super) async fn create(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let Json(req) = payload?;
    let due_date = req
        .due_date
        .or_else(|| extract_due_date(&req.title, Local::now().date_naive()));
    let new = NewTask {
        title: req.title,
        description: req.description.filter(|d| !d.trim().is_empty()),
        priority: req.priority.unwrap_or_default(),
        due_date,
        total_estimated_time: req.total_estimated_time.filter(|t| !t.is_empty()),
    };

    let user_id = user.id().to_string();
    let task = state.store.run(move |s| s.create_task(&user_id, new)).await?;
    info!(task_id = %task.id, user_id = %task.user_id, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /api/tasks
pub(super) async fn list(State(state): State<AppState>, user: AuthUser) -> Result<Json<Vec<Task>>, ApiError> {
    let user_id = user.id().to_string();
    let tasks = state.store.run(move |s| s.list_tasks(&user_id)).await?;
    Ok(Json(tasks))
}

/// GET /api/tasks/{id}
pub(super) async fn get_one(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    authorize_task(&state, &user, &id, "access this task").await?;
    let task = state.store.run(move |s| s.task_by_id(&id)).await?.ok_or_else(not_found)?;
    Ok(Json(task))
}

/// PUT /api/tasks/{id}
pub(super) async fn update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    payload: Result<Json<UpdateTaskRequest>, JsonRejection>,
) -> Result<Json<Task>, ApiError> {
    let Json(req) = payload?;
    authorize_task(&state, &user, &id, "update this task").await?;
    let patch = TaskPatch::from(req);
    let task = state
        .store
        .run(move |s| s.update_task(&id, patch))
        .await?
        .ok_or_else(not_found)?;
    Ok(Json(task))
}

/// DELETE /api/tasks/{id}
pub(super) async fn remove(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize_task(&state, &user, &id, "delete this task").await?;
    let task_id = id.clone();
    if !state.store.run(move |s| s.delete_task(&task_id)).await? {
        return Err(not_found());
    }
    info!(task_id = %id, "task deleted");
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

/// POST /api/tasks/{id}/toggle
pub(super) async fn toggle(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Task>, ApiError> {
    authorize_task(&state, &user, &id, "update this task").await?;
    let task = state.store.run(move |s| s.toggle_task(&id)).await?.ok_or_else(not_found)?;
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_flag_maps_to_status() {
        let req: UpdateTaskRequest = serde_json::from_str(r#"{"completed": true}"#).unwrap();
        assert_eq!(TaskPatch::from(req).status, Some(TaskStatus::Completed));

        let req: UpdateTaskRequest =
            serde_json::from_str(r#"{"completed": true, "status": "in-progress"}"#).unwrap();
        assert_eq!(TaskPatch::from(req).status, Some(TaskStatus::InProgress));
    }

    #[test]
    fn create_accepts_both_casings() {
        let req: CreateTaskRequest =
            serde_json::from_str(r#"{"title":"x","due_date":"2026-01-02","totalEstimatedTime":"~1 hr"}"#).unwrap();
        assert_eq!(req.due_date, NaiveDate::from_ymd_opt(2026, 1, 2));
        assert_eq!(req.total_estimated_time.as_deref(), Some("~1 hr"));
    }
}
