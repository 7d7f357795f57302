//! The trust box: anonymous suggestions from users to the admins.
//!
//! A message moves `Pending -> Answered` exactly through [`reply`]. Every
//! admin-facing response is built from `AnonymousTrustMessage`, which has no
//! author field; only `list_mine` returns owner ids, and only to the owner.

use axum::{
    Extension, Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use tracing::info;

use campus_types::api::{
    AnonymousTrustMessage, Claims, CreateTrustMessageRequest, ReplyTrustMessageRequest,
    TrustMessageResponse,
};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::policy;
use crate::views::{anonymous_trust_view, owned_trust_view};

/// POST /trustbox
pub async fn create_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateTrustMessageRequest>, JsonRejection>,
) -> Result<Json<TrustMessageResponse>, ApiError> {
    let Json(req) = payload?;

    policy::ensure_can_author(&claims, "trust messages")?;
    let content = req.content.trim().to_string();
    if content.is_empty() {
        return Err(ApiError::validation("Content is required"));
    }

    let user_id = claims.sub;
    let row = crate::blocking(&state, move |state| {
        Ok(state.db.insert_trust_message(user_id, &content)?)
    })
    .await?;

    info!("Trust message {} created", row.id);
    Ok(Json(owned_trust_view(row)))
}

/// GET /trustbox/my
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<TrustMessageResponse>>, ApiError> {
    // The sentinel owns nothing.
    if claims.is_sentinel() {
        return Ok(Json(Vec::new()));
    }

    let user_id = claims.sub;
    let rows = crate::blocking(&state, move |state| {
        Ok(state.db.list_trust_messages_for_owner(user_id)?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(owned_trust_view).collect()))
}

/// GET /trustbox/all: admins only, authors stripped at the query.
pub async fn list_all(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<AnonymousTrustMessage>>, ApiError> {
    let rows = crate::blocking(&state, move |state| {
        policy::ensure_admin(&state.db, &claims)?;
        Ok(state.db.list_trust_messages_anonymous()?)
    })
    .await?;

    Ok(Json(rows.into_iter().map(anonymous_trust_view).collect()))
}

/// PATCH /trustbox/{id}/reply: admins only. Replying again overwrites.
pub async fn reply(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<ReplyTrustMessageRequest>, JsonRejection>,
) -> Result<Json<AnonymousTrustMessage>, ApiError> {
    let Path(message_id) = path?;
    let Json(req) = payload?;

    let reply = req.reply.trim().to_string();
    if reply.is_empty() {
        return Err(ApiError::validation("Reply is required"));
    }

    let row = crate::blocking(&state, move |state| {
        policy::ensure_admin(&state.db, &claims)?;
        state
            .db
            .reply_trust_message(message_id, &reply)?
            .ok_or(ApiError::NotFound("Message"))
    })
    .await?;

    info!("Trust message {} answered", row.id);
    Ok(Json(anonymous_trust_view(row)))
}
