use axum::{
    Extension, Json,
    extract::{State, rejection::JsonRejection},
};

use campus_types::api::{Claims, ToggleLikeRequest, ToggleLikeResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::policy;

/// POST /likes: flips the caller's like on a post.
pub async fn toggle_like(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<ToggleLikeRequest>, JsonRejection>,
) -> Result<Json<ToggleLikeResponse>, ApiError> {
    let Json(req) = payload?;
    policy::ensure_can_author(&claims, "likes")?;

    let user_id = claims.sub;
    let liked = crate::blocking(&state, move |state| {
        state
            .db
            .toggle_like(req.post_id, user_id)?
            .ok_or(ApiError::NotFound("Post"))
    })
    .await?;

    Ok(Json(ToggleLikeResponse { liked }))
}
