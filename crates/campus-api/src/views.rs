//! Row → response projections.

use chrono::{DateTime, Utc};
use tracing::warn;

use campus_db::models::{AnonymousTrustMessageRow, CommentRow, TrustMessageRow};
use campus_types::api::{AnonymousTrustMessage, CommentResponse, TrustMessageResponse, UserSummary};

pub fn parse_timestamp(value: &str, context: &str) -> DateTime<Utc> {
    value
        .parse::<DateTime<Utc>>()
        .or_else(|_| {
            // Rows written by hand may use SQLite's "YYYY-MM-DD HH:MM:SS" form.
            chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on {}: {}", value, context, e);
            DateTime::default()
        })
}

pub fn comment_view(row: CommentRow) -> CommentResponse {
    CommentResponse {
        created_at: parse_timestamp(&row.created_at, "comment"),
        id: row.id,
        post_id: row.post_id,
        user_id: row.user_id,
        text: row.text,
        user: UserSummary {
            id: row.user_id,
            username: row.username,
        },
    }
}

/// The author's own view of a message.
pub fn owned_trust_view(row: TrustMessageRow) -> TrustMessageResponse {
    TrustMessageResponse {
        created_at: parse_timestamp(&row.created_at, "trust message"),
        replied_at: row
            .replied_at
            .as_deref()
            .map(|t| parse_timestamp(t, "trust message reply")),
        id: row.id,
        user_id: row.user_id,
        content: row.content,
        reply: row.reply,
        is_answered: row.is_answered,
    }
}

/// The admin view of a message: there is no author to copy.
pub fn anonymous_trust_view(row: AnonymousTrustMessageRow) -> AnonymousTrustMessage {
    AnonymousTrustMessage {
        created_at: parse_timestamp(&row.created_at, "trust message"),
        replied_at: row
            .replied_at
            .as_deref()
            .map(|t| parse_timestamp(t, "trust message reply")),
        id: row.id,
        content: row.content,
        reply: row.reply,
        is_answered: row.is_answered,
    }
}
