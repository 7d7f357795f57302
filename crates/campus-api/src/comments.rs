use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use tracing::info;

use campus_types::api::{Claims, CommentResponse, CreateCommentRequest, MessageResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::policy;
use crate::views::comment_view;

/// POST /comments
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<Json<CommentResponse>, ApiError> {
    let Json(req) = payload?;

    let text = req.text.trim().to_string();
    if text.is_empty() {
        return Err(ApiError::validation("Comment text is required"));
    }
    policy::ensure_can_author(&claims, "comments")?;

    let user_id = claims.sub;
    let row = crate::blocking(&state, move |state| {
        state
            .db
            .insert_comment(req.post_id, user_id, &text)?
            .ok_or(ApiError::NotFound("Post"))
    })
    .await?;

    info!("User {} commented on post {}", row.user_id, row.post_id);
    Ok(Json(comment_view(row)))
}

/// DELETE /comments/{id}
pub async fn delete_comment(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(comment_id) = path?;
    crate::blocking(&state, move |state| {
        let comment = state.db.get_comment(comment_id)?.ok_or(ApiError::NotFound("Comment"))?;
        policy::ensure_self_or_admin(&state.db, &claims, comment.user_id)?;
        state.db.delete_comment(comment_id)?;
        Ok(())
    })
    .await?;

    info!("Comment {} deleted", comment_id);
    Ok(Json(MessageResponse {
        message: "Comment deleted".into(),
    }))
}
