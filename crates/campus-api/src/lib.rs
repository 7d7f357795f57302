pub mod auth;
pub mod comments;
pub mod error;
pub mod likes;
pub mod middleware;
pub mod policy;
pub mod posts;
pub mod storage;
pub mod trustbox;
pub mod views;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use tower_http::services::ServeDir;
use tracing::error;

use campus_types::api::HealthResponse;
use campus_types::models::{MAX_POST_IMAGES, MAX_UPLOAD_BYTES};

use crate::auth::{AppState, AppStateInner};
use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::storage::UPLOADS_PREFIX;

/// Room for a full post: every image, one file, and the text fields.
///
/// Counted against the raw body, so images past the tenth still use up this
/// budget before they are dropped. A request that overshoots it fails as a
/// malformed body (400) rather than being truncated.
const MAX_REQUEST_BYTES: usize = (MAX_POST_IMAGES + 1) * MAX_UPLOAD_BYTES + 1024 * 1024;

/// Build the HTTP surface: REST endpoints under `/api`, stored assets under
/// `/uploads`, and `/health`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/posts", get(posts::list_posts).post(posts::create_post))
        .route("/posts/user/{user_id}", get(posts::list_user_posts))
        .route("/posts/{id}", delete(posts::delete_post))
        .route("/posts/poll/{option_id}/vote", post(posts::vote))
        .route("/comments", post(comments::create_comment))
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/likes", post(likes::toggle_like))
        .route("/trustbox", post(trustbox::create_message))
        .route("/trustbox/my", get(trustbox::list_mine))
        .route("/trustbox/all", get(trustbox::list_all))
        .route("/trustbox/{id}/reply", patch(trustbox::reply))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let api = public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES));

    Router::new()
        .nest("/api", api)
        .nest_service(UPLOADS_PREFIX, ServeDir::new(state.storage.dir()))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

/// Run database work off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&AppStateInner) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(anyhow::anyhow!("blocking task failed"))
        })?
}
