use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Category, Role, SENTINEL_USER_ID};

// -- JWT Claims --

/// Signed identity claim carried as `Authorization: Bearer <jwt>`.
///
/// Shared by the REST middleware in campus-api and the typed client. There is
/// no `exp`: sessions do not expire server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub role: Role,
    pub iat: i64,
}

impl Claims {
    pub fn is_sentinel(&self) -> bool {
        self.sub == SENTINEL_USER_ID
    }
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// `email` doubles as the identifier field: it may also hold a sentinel alias
/// such as `admin`.
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

// -- Posts --

/// Public view of a user: never carries email or password material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub user: UserSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollOptionResponse {
    pub id: i64,
    pub text: String,
    pub votes: i64,
    pub percentage: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResponse {
    pub id: i64,
    pub question: String,
    pub total_votes: i64,
    pub options: Vec<PollOptionResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostResponse {
    pub id: i64,
    pub user: UserSummary,
    pub category: Category,
    pub text: String,
    pub image_urls: Vec<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub youtube_url: Option<String>,
    pub link_preview: Option<String>,
    pub created_at: DateTime<Utc>,
    pub likes: Vec<LikeResponse>,
    pub likes_count: usize,
    /// Whether the requesting caller has liked this post.
    pub liked: bool,
    pub comments: Vec<CommentResponse>,
    pub poll: Option<PollResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub id: i64,
    pub text: String,
    pub votes: i64,
}

// -- Comments & likes --

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub post_id: i64,
    pub text: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ToggleLikeRequest {
    pub post_id: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ToggleLikeResponse {
    pub liked: bool,
}

// -- Trust box --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTrustMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReplyTrustMessageRequest {
    pub reply: String,
}

/// A trust message as its author sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustMessageResponse {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub reply: Option<String>,
    pub is_answered: bool,
    pub created_at: DateTime<Utc>,
    pub replied_at: Option<DateTime<Utc>>,
}

/// A trust message as admins see it. Carries no owner field, so nothing on
/// the admin path can serialize the author.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonymousTrustMessage {
    pub id: i64,
    pub content: String,
    pub reply: Option<String>,
    pub is_answered: bool,
    pub created_at: DateTime<Utc>,
    pub replied_at: Option<DateTime<Utc>>,
}

// -- Misc --

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
