use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::model::Task;
use crate::state::AppState;
use crate::sync::{LocalTask, merge};

#[derive(Deserialize)]
pub(super) struct SyncRequest {
    #[serde(default)]
    tasks: Vec<LocalTask>,
}

#[derive(Serialize)]
pub(super) struct SyncResponse {
    tasks: Vec<Task>,
    merged: usize,
}

/// POST /api/sync
///
/// Adds the uploaded signed-out tasks the account does not have yet and
/// returns the account's full task list.
pub(super) async fn sync(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<SyncRequest>, JsonRejection>,
) -> Result<Json<SyncResponse>, ApiError> {
    let Json(req) = payload?;
    let user_id = user.id().to_string();

    let (tasks, merged) = state
        .store
        .run(move |s| {
            let cloud = s.list_tasks(&user_id)?;
            let known = cloud.len();
            let (merged, added) = merge(cloud, req.tasks, &user_id);
            if added == 0 {
                return Ok((merged, 0));
            }
            let written = s.upsert_tasks(&user_id, &merged[known..])?;
            Ok((s.list_tasks(&user_id)?, written))
        })
        .await?;

    if merged > 0 {
        info!(user_id = %user.id(), merged, "local tasks merged");
    }
    Ok(Json(SyncResponse { tasks, merged }))
}
