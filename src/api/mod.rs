//! REST API: router, shared handler helpers and the server loop.
//!
//! ## URL layout
//!
//! ```text
//! GET    /health
//! POST   /api/auth/register | login | logout | refresh-token
//! GET    /api/auth/me            PUT /api/auth/me
//! POST   /api/tasks              GET /api/tasks
//! GET    /api/tasks/{id}         PUT | DELETE /api/tasks/{id}
//! POST   /api/tasks/{id}/toggle
//! POST   /api/tasks/{id}/subtasks              GET /api/tasks/{id}/subtasks
//! PUT    /api/tasks/{task_id}/subtasks/{subtask_id}   DELETE (same)
//! POST   /api/tasks/{id}/breakdown
//! POST   /api/tasks/{id}/suggestion
//! POST   /api/breakdown          (no auth)
//! POST   /api/sync
//! ```

mod ai;
mod auth;
mod health;
mod subtasks;
mod sync;
mod tasks;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{get, post, put},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::error::{ApiError, AppError};
use crate::state::AppState;

// ── Router ────────────────────────────────────────────────────────────────────

pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_origin);

    Router::new()
        .route("/health",                                      get(health::health))
        // auth
        .route("/api/auth/register",                           post(auth::register))
        .route("/api/auth/login",                              post(auth::login))
        .route("/api/auth/logout",                             post(auth::logout))
        .route("/api/auth/me",                                 get(auth::me).put(auth::update_me))
        .route("/api/auth/refresh-token",                      post(auth::refresh_token))
        // tasks
        .route("/api/tasks",                                   post(tasks::create).get(tasks::list))
        .route("/api/tasks/{id}",                              get(tasks::get_one).put(tasks::update).delete(tasks::remove))
        .route("/api/tasks/{id}/toggle",                       post(tasks::toggle))
        // subtasks
        .route("/api/tasks/{id}/subtasks",                     post(subtasks::create).get(subtasks::list))
        .route("/api/tasks/{task_id}/subtasks/{subtask_id}",   put(subtasks::update).delete(subtasks::remove))
        // ai
        .route("/api/tasks/{id}/breakdown",                    post(ai::task_breakdown))
        .route("/api/tasks/{id}/suggestion",                   post(ai::task_suggestion))
        .route("/api/breakdown",                               post(ai::stateless_breakdown))
        // sync
        .route("/api/sync",                                    post(sync::sync))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `*` allows any origin; otherwise a comma-separated list of origins.
fn cors_layer(origin: &str) -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    if origin.trim() == "*" {
        return base.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = origin
        .split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    base.allow_origin(AllowOrigin::list(origins))
}

// ── Server loop ───────────────────────────────────────────────────────────────

/// Bind `bind_addr` and serve until `shutdown` is cancelled.
pub async fn serve(state: AppState, bind_addr: &str, shutdown: CancellationToken) -> Result<(), AppError> {
    let router = router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .map_err(|e| AppError::Server(format!("bind failed on {bind_addr}: {e}")))?;

    info!(%bind_addr, "API server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| AppError::Server(format!("server error: {e}")))?;

    info!("API server shut down");
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Resolve the owner of `task_id` and make sure it is the caller.
///
/// `action` completes the 403 message: "Not authorized to {action}".
pub(crate) async fn authorize_task(
    state: &AppState,
    user: &AuthUser,
    task_id: &str,
    action: &str,
) -> Result<(), ApiError> {
    let id = task_id.to_string();
    let owner = state.store.run(move |s| s.task_owner(&id)).await?;
    match owner {
        None => Err(ApiError::NotFound("Task not found".into())),
        Some(owner) if owner != user.id() => Err(ApiError::Forbidden(format!("Not authorized to {action}"))),
        Some(_) => Ok(()),
    }
}
