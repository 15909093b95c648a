//! AI handlers: task breakdown, progress suggestion and the stateless
//! breakdown used by signed-out clients.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{info, warn};

use super::authorize_task;
use crate::auth::AuthUser;
use crate::breakdown::{self, BreakdownError, PromptStyle};
use crate::dates::extract_due_date;
use crate::error::ApiError;
use crate::model::{Subtask, Task};
use crate::state::AppState;
use crate::sync::LocalSubtask;

#[derive(Deserialize, Default)]
pub(super) struct BreakdownOptions {
    #[serde(default, alias = "prompt")]
    style: Option<PromptStyle>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatelessBreakdownRequest {
    #[serde(default, alias = "taskTitle")]
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, alias = "prompt")]
    style: Option<PromptStyle>,
}

#[derive(Serialize)]
pub(super) struct TaskBreakdownResponse {
    task: Task,
    subtasks: Vec<Subtask>,
    tip: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatelessBreakdownResponse {
    sub_tasks: Vec<LocalSubtask>,
    total_estimated_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<NaiveDate>,
}

fn task_not_found() -> ApiError {
    ApiError::NotFound("Task not found".into())
}

/// POST /api/tasks/{id}/breakdown
///
/// Appends generated subtasks to the task.  An unparseable model reply falls
/// back to generic first steps; an unreachable model is a 502.
pub(super) async fn task_breakdown(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<TaskBreakdownResponse>, ApiError> {
    let opts: BreakdownOptions = serde_json::from_slice(&body).unwrap_or_default();
    authorize_task(&state, &user, &id, "generate breakdown for this task").await?;

    let task_id = id.clone();
    let task = state.store.run(move |s| s.task_by_id(&task_id)).await?.ok_or_else(task_not_found)?;

    let style = opts.style.unwrap_or(state.config.breakdown.default_style);
    let generated = match breakdown::generate(
        &state.llm,
        &state.prompts,
        style,
        &task.title,
        task.description.as_deref(),
    )
    .await
    {
        Ok(subtasks) => subtasks,
        Err(BreakdownError::Parse(reason)) => {
            warn!(task_id = %id, %reason, "using fallback breakdown");
            breakdown::fallback_subtasks()
        }
        Err(e) => return Err(e.into()),
    };

    let buffer = state.config.breakdown.time_buffer_percent;
    let task_id = id.clone();
    let (task, inserted) = state
        .store
        .run(move |s| {
            let inserted = s.insert_subtasks(&task_id, &generated)?;
            // The total covers every subtask on the task, not just this batch.
            let Some(task) = s.task_by_id(&task_id)? else {
                return Ok((None, inserted));
            };
            let estimate = breakdown::total_estimate(
                task.subtasks.iter().map(|st| st.estimated_time.as_deref()),
                buffer,
            );
            if estimate.is_none() {
                return Ok((Some(task), inserted));
            }
            s.set_estimated_time(&task_id, estimate.as_deref())?;
            Ok((s.task_by_id(&task_id)?, inserted))
        })
        .await?;
    let task = task.ok_or_else(task_not_found)?;

    let tip = breakdown::tip(&state.llm, &task.title).await;
    info!(task_id = %id, subtasks = inserted.len(), "task breakdown stored");
    Ok(Json(TaskBreakdownResponse { task, subtasks: inserted, tip }))
}

/// POST /api/tasks/{id}/suggestion
pub(super) async fn task_suggestion(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    authorize_task(&state, &user, &id, "access this task").await?;
    let task = state.store.run(move |s| s.task_by_id(&id)).await?.ok_or_else(task_not_found)?;
    let suggestion = breakdown::suggestion(&state.llm, &task).await;
    Ok(Json(json!({ "suggestion": suggestion })))
}

/// POST /api/breakdown
///
/// Nothing is stored; the client keeps the result.
pub(super) async fn stateless_breakdown(
    State(state): State<AppState>,
    payload: Result<Json<StatelessBreakdownRequest>, JsonRejection>,
) -> Result<Json<StatelessBreakdownResponse>, ApiError> {
    let Json(req) = payload?;
    let title = req.title.trim();
    if title.is_empty() {
        return Err(ApiError::BadRequest("Task title is required".into()));
    }

    let style = req.style.unwrap_or(state.config.breakdown.default_style);
    let generated =
        breakdown::generate(&state.llm, &state.prompts, style, title, req.description.as_deref()).await?;

    let total = breakdown::total_estimate(
        generated.iter().map(|s| s.estimated_time.as_deref()),
        state.config.breakdown.time_buffer_percent,
    );
    let sub_tasks = generated
        .into_iter()
        .enumerate()
        .map(|(i, s)| LocalSubtask {
            id: (i + 1).to_string(),
            title: s.title,
            completed: false,
            depends_on: s.depends_on,
            estimated_time: s.estimated_time,
            link: s.link,
        })
        .collect();

    Ok(Json(StatelessBreakdownResponse {
        sub_tasks,
        total_estimated_time: total.unwrap_or_default(),
        due_date: extract_due_date(title, Local::now().date_naive()),
    }))
}
