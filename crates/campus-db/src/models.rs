/// Database row types. These map directly to SQLite rows.
/// Distinct from campus-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub password: String,
    pub role: String,
    pub created_at: String,
}

/// A post joined with its author's username.
pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub category: String,
    pub text: String,
    pub image_urls: Vec<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub youtube_url: Option<String>,
    pub link_preview: Option<String>,
    pub created_at: String,
}

/// A comment joined with its author's username.
pub struct CommentRow {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub username: String,
    pub text: String,
    pub created_at: String,
}

pub struct LikeRow {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
}

pub struct PollRow {
    pub id: i64,
    pub post_id: i64,
    pub question: String,
}

pub struct PollOptionRow {
    pub id: i64,
    pub poll_id: i64,
    pub text: String,
    pub votes: i64,
}

/// Everything hanging off a batch of posts, fetched under one lock.
#[derive(Default)]
pub struct PostDetailRows {
    pub likes: Vec<LikeRow>,
    pub comments: Vec<CommentRow>,
    pub polls: Vec<PollRow>,
    pub options: Vec<PollOptionRow>,
}

pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
}

pub struct NewPost {
    pub user_id: i64,
    pub category: String,
    pub text: String,
    pub image_urls: Vec<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub youtube_url: Option<String>,
    pub link_preview: Option<String>,
    pub poll: Option<NewPoll>,
}

pub struct TrustMessageRow {
    pub id: i64,
    pub user_id: i64,
    pub content: String,
    pub reply: Option<String>,
    pub is_answered: bool,
    pub created_at: String,
    pub replied_at: Option<String>,
}

/// Admin-facing trust message. The queries producing it never select
/// `user_id`, so the author cannot leak past this layer.
pub struct AnonymousTrustMessageRow {
    pub id: i64,
    pub content: String,
    pub reply: Option<String>,
    pub is_answered: bool,
    pub created_at: String,
    pub replied_at: Option<String>,
}
