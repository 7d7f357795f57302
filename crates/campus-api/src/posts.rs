use std::collections::HashMap;

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{
        Multipart, Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use serde::Deserialize;
use tracing::{error, info, warn};

use campus_db::models::{NewPoll, NewPost, PollOptionRow, PollRow, PostDetailRows, PostRow};
use campus_types::api::{
    Claims, LikeResponse, MessageResponse, PollOptionResponse, PollResponse, PostResponse,
    UserSummary, VoteResponse,
};
use campus_types::models::{Category, MAX_POST_IMAGES, MAX_UPLOAD_BYTES};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::policy;
use crate::storage::AssetKind;
use crate::views::{comment_view, parse_timestamp};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedSort {
    #[default]
    Recent,
    Popular,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeedQuery {
    pub category: Option<String>,
    /// Case-insensitive substring matched against post text and author name.
    pub q: Option<String>,
    #[serde(default)]
    pub sort: FeedSort,
}

/// An uploaded part held in memory until the whole form has been validated.
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

/// Raw multipart fields of a create-post request.
#[derive(Default)]
pub struct PostForm {
    pub category: Option<String>,
    pub text: Option<String>,
    pub images: Vec<Upload>,
    pub file: Option<Upload>,
    pub youtube_url: Option<String>,
    pub link_preview: Option<String>,
    pub poll_question: Option<String>,
    pub poll_options: Option<String>,
}

/// A form that passed validation; nothing has been written yet.
pub struct ValidatedPost {
    pub category: Category,
    pub text: String,
    pub images: Vec<Upload>,
    pub file: Option<Upload>,
    pub youtube_url: Option<String>,
    pub link_preview: Option<String>,
    pub poll: Option<NewPoll>,
}

// -- Handlers --

/// GET /posts
pub async fn list_posts(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let Query(query) = query?;
    let category = match query.category.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(label) => Some(
            Category::from_label(label).ok_or_else(|| ApiError::validation("Unknown category"))?,
        ),
    };

    let posts = load_posts(&state, None, claims.sub).await?;
    Ok(Json(apply_feed_query(posts, category, query.q.as_deref(), query.sort)))
}

/// GET /posts/user/{user_id}
pub async fn list_user_posts(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let Path(user_id) = path?;
    let posts = load_posts(&state, Some(user_id), claims.sub).await?;
    Ok(Json(posts))
}

/// POST /posts (multipart)
pub async fn create_post(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Multipart,
) -> Result<Json<PostResponse>, ApiError> {
    policy::ensure_can_author(&claims, "posts")?;

    let form = read_post_form(multipart).await?;
    let post = validate_post_form(form)?;

    // Assets are only written once the whole request is known to be valid.
    let mut stored = Vec::new();
    let mut image_urls = Vec::with_capacity(post.images.len());
    let mut file_url = None;
    let mut file_name = None;

    let write_result = async {
        for image in &post.images {
            let url = state.storage.store(AssetKind::Image, &image.file_name, &image.data).await?;
            stored.push(url.clone());
            image_urls.push(url);
        }
        if let Some(file) = &post.file {
            let url = state.storage.store(AssetKind::File, &file.file_name, &file.data).await?;
            stored.push(url.clone());
            file_url = Some(url);
            file_name = Some(file.file_name.clone());
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;

    if let Err(e) = write_result {
        state.storage.delete_all(&stored).await;
        return Err(e.into());
    }

    let new_post = NewPost {
        user_id: claims.sub,
        category: post.category.label().to_string(),
        text: post.text,
        image_urls,
        file_url,
        file_name,
        youtube_url: post.youtube_url,
        link_preview: post.link_preview,
        poll: post.poll,
    };

    let viewer = claims.sub;
    let created = crate::blocking(&state, move |state| {
        let post_id = state.db.insert_post(&new_post)?;
        let row = state
            .db
            .get_post(post_id)?
            .ok_or_else(|| anyhow::anyhow!("Post {} vanished after insert", post_id))?;
        let details = state.db.get_post_details(&[post_id])?;
        Ok(assemble_posts(vec![row], details, viewer))
    })
    .await;

    let mut created = match created {
        Ok(posts) => posts,
        Err(e) => {
            error!("Failed to create post for user {}: {}", claims.sub, e);
            state.storage.delete_all(&stored).await;
            return Err(e);
        }
    };

    let post = created.pop().ok_or_else(|| anyhow::anyhow!("Created post missing"))?;
    info!("User {} created post {}", claims.sub, post.id);
    Ok(Json(post))
}

/// DELETE /posts/{id}
pub async fn delete_post(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(post_id) = path?;
    let assets = crate::blocking(&state, move |state| {
        let post = state.db.get_post(post_id)?.ok_or(ApiError::NotFound("Post"))?;
        policy::ensure_self_or_admin(&state.db, &claims, post.user_id)?;
        state.db.delete_post(post_id)?;

        let mut assets = post.image_urls;
        assets.extend(post.file_url);
        Ok(assets)
    })
    .await?;

    state.storage.delete_all(&assets).await;

    info!("Post {} deleted", post_id);
    Ok(Json(MessageResponse {
        message: "Post deleted".into(),
    }))
}

/// POST /posts/poll/{option_id}/vote
pub async fn vote(
    State(state): State<AppState>,
    path: Result<Path<i64>, PathRejection>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<VoteResponse>, ApiError> {
    let Path(option_id) = path?;
    let option = crate::blocking(&state, move |state| {
        state
            .db
            .vote_option(option_id)?
            .ok_or(ApiError::NotFound("Poll option"))
    })
    .await?;

    Ok(Json(VoteResponse {
        id: option.id,
        text: option.text,
        votes: option.votes,
    }))
}

// -- Form handling --

async fn read_post_form(mut multipart: Multipart) -> Result<PostForm, ApiError> {
    let mut form = PostForm::default();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        warn!("Malformed multipart body: {}", e);
        ApiError::validation("Malformed multipart body")
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "images" | "file" => {
                if name == "images" && form.images.len() >= MAX_POST_IMAGES {
                    // Extra images are dropped.
                    continue;
                }
                if name == "file" && form.file.is_some() {
                    return Err(ApiError::validation("Only one file may be attached"));
                }
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|_| ApiError::validation("Failed to read upload"))?;
                if data.len() > MAX_UPLOAD_BYTES {
                    return Err(ApiError::validation("Uploads are limited to 10 MB each"));
                }
                if data.is_empty() {
                    continue;
                }
                let upload = Upload { file_name, data };
                if name == "images" {
                    form.images.push(upload);
                } else {
                    form.file = Some(upload);
                }
            }
            _ => {
                let value = field
                    .text()
                    .await
                    .map_err(|_| ApiError::validation(format!("Failed to read field '{name}'")))?;
                match name.as_str() {
                    "category" => form.category = Some(value),
                    "text" => form.text = Some(value),
                    "youtubeUrl" => form.youtube_url = Some(value),
                    "linkPreview" => form.link_preview = Some(value),
                    "pollQuestion" => form.poll_question = Some(value),
                    "pollOptions" => form.poll_options = Some(value),
                    other => warn!("Ignoring unknown post field '{}'", other),
                }
            }
        }
    }

    Ok(form)
}

pub fn validate_post_form(form: PostForm) -> Result<ValidatedPost, ApiError> {
    let category = form
        .category
        .as_deref()
        .map(str::trim)
        .and_then(Category::from_label)
        .ok_or_else(|| ApiError::validation("A valid category is required"))?;

    let poll = parse_poll(form.poll_question.as_deref(), form.poll_options.as_deref())?;
    let youtube_url = non_empty(form.youtube_url);
    let link_preview = non_empty(form.link_preview);

    let text = form.text.unwrap_or_default();
    let has_other_content = !form.images.is_empty()
        || form.file.is_some()
        || youtube_url.is_some()
        || link_preview.is_some()
        || poll.is_some();
    if text.trim().is_empty() && !has_other_content {
        return Err(ApiError::validation("Post text is required"));
    }

    let mut images = form.images;
    images.truncate(MAX_POST_IMAGES);

    Ok(ValidatedPost {
        category,
        text,
        images,
        file: form.file,
        youtube_url,
        link_preview,
        poll,
    })
}

/// A poll needs a question and at least two non-empty options, given as a
/// JSON array of strings. Half a poll fails the whole post.
fn parse_poll(question: Option<&str>, options: Option<&str>) -> Result<Option<NewPoll>, ApiError> {
    let question = question.map(str::trim).filter(|q| !q.is_empty());
    let options = options.map(str::trim).filter(|o| !o.is_empty());

    let (question, options) = match (question, options) {
        (None, None) => return Ok(None),
        (Some(q), Some(o)) => (q, o),
        _ => return Err(ApiError::validation("A poll needs both a question and options")),
    };

    let parsed: Vec<String> = serde_json::from_str(options)
        .map_err(|_| ApiError::validation("Poll options must be a JSON array of strings"))?;
    let options: Vec<String> = parsed
        .into_iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();

    if options.len() < 2 {
        return Err(ApiError::validation("A poll needs at least two options"));
    }

    Ok(Some(NewPoll {
        question: question.to_string(),
        options,
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// -- Projection --

async fn load_posts(
    state: &AppState,
    author_id: Option<i64>,
    viewer_id: i64,
) -> Result<Vec<PostResponse>, ApiError> {
    crate::blocking(state, move |state| {
        let rows = state.db.list_posts(author_id)?;
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let details = state.db.get_post_details(&ids)?;
        Ok(assemble_posts(rows, details, viewer_id))
    })
    .await
}

/// Join post rows with their likes, comments and polls, preserving the order
/// of `rows`.
pub fn assemble_posts(rows: Vec<PostRow>, details: PostDetailRows, viewer_id: i64) -> Vec<PostResponse> {
    let mut likes: HashMap<i64, Vec<LikeResponse>> = HashMap::new();
    for like in details.likes {
        likes.entry(like.post_id).or_default().push(LikeResponse {
            id: like.id,
            user_id: like.user_id,
        });
    }

    let mut comments: HashMap<i64, Vec<_>> = HashMap::new();
    for comment in details.comments {
        comments.entry(comment.post_id).or_default().push(comment_view(comment));
    }

    let mut options: HashMap<i64, Vec<PollOptionRow>> = HashMap::new();
    for option in details.options {
        options.entry(option.poll_id).or_default().push(option);
    }

    let mut polls: HashMap<i64, PollResponse> = HashMap::new();
    for poll in details.polls {
        let poll_options = options.remove(&poll.id).unwrap_or_default();
        polls.insert(poll.post_id, poll_view(poll, poll_options));
    }

    rows.into_iter()
        .map(|row| {
            let category = Category::from_label(&row.category).unwrap_or_else(|| {
                warn!("Unknown category '{}' on post {}", row.category, row.id);
                Category::Announcement
            });
            let post_likes = likes.remove(&row.id).unwrap_or_default();

            PostResponse {
                created_at: parse_timestamp(&row.created_at, "post"),
                likes_count: post_likes.len(),
                liked: post_likes.iter().any(|l| l.user_id == viewer_id),
                likes: post_likes,
                comments: comments.remove(&row.id).unwrap_or_default(),
                poll: polls.remove(&row.id),
                id: row.id,
                user: UserSummary {
                    id: row.user_id,
                    username: row.username,
                },
                category,
                text: row.text,
                image_urls: row.image_urls,
                file_url: row.file_url,
                file_name: row.file_name,
                youtube_url: row.youtube_url,
                link_preview: row.link_preview,
            }
        })
        .collect()
}

fn poll_view(poll: PollRow, options: Vec<PollOptionRow>) -> PollResponse {
    let total_votes: i64 = options.iter().map(|o| o.votes).sum();
    PollResponse {
        id: poll.id,
        question: poll.question,
        total_votes,
        options: options
            .into_iter()
            .map(|o| PollOptionResponse {
                percentage: percentage(o.votes, total_votes),
                id: o.id,
                text: o.text,
                votes: o.votes,
            })
            .collect(),
    }
}

/// Share of `total` as a whole percent, rounded half up; 0 when nobody voted.
pub fn percentage(votes: i64, total: i64) -> u32 {
    if total <= 0 {
        return 0;
    }
    (votes as f64 * 100.0 / total as f64).round() as u32
}

pub fn apply_feed_query(
    mut posts: Vec<PostResponse>,
    category: Option<Category>,
    search: Option<&str>,
    sort: FeedSort,
) -> Vec<PostResponse> {
    if let Some(category) = category {
        posts.retain(|p| p.category == category);
    }

    if let Some(needle) = search.map(str::trim).filter(|s| !s.is_empty()) {
        let needle = needle.to_lowercase();
        posts.retain(|p| {
            p.text.to_lowercase().contains(&needle) || p.user.username.to_lowercase().contains(&needle)
        });
    }

    if sort == FeedSort::Popular {
        // Stable sort keeps newest-first among equal like counts.
        posts.sort_by(|a, b| b.likes_count.cmp(&a.likes_count));
    }

    posts
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_db::models::{CommentRow, LikeRow};

    fn form() -> PostForm {
        PostForm {
            category: Some("Питання".into()),
            text: Some("Who has the chemistry notes?".into()),
            ..Default::default()
        }
    }

    fn upload(name: &str) -> Upload {
        Upload {
            file_name: name.into(),
            data: Bytes::from_static(b"img"),
        }
    }

    fn post_row(id: i64, user_id: i64, username: &str, category: &str, text: &str) -> PostRow {
        PostRow {
            id,
            user_id,
            username: username.into(),
            category: category.into(),
            text: text.into(),
            image_urls: vec![],
            file_url: None,
            file_name: None,
            youtube_url: None,
            link_preview: None,
            created_at: format!("2026-05-0{id}T10:00:00.000Z"),
        }
    }

    #[test]
    fn percentages_match_two_to_one_split() {
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 2), 50);
    }

    #[test]
    fn valid_form_with_poll() {
        let mut f = form();
        f.poll_question = Some("Tea or coffee?".into());
        f.poll_options = Some(r#"["tea", " coffee ", ""]"#.into());
        let post = validate_post_form(f).unwrap();
        let poll = post.poll.unwrap();
        assert_eq!(poll.question, "Tea or coffee?");
        assert_eq!(poll.options, vec!["tea", "coffee"]);
        assert_eq!(post.category, Category::Question);
    }

    #[test]
    fn partial_or_malformed_poll_fails_whole_form() {
        let mut only_question = form();
        only_question.poll_question = Some("Tea?".into());
        assert!(validate_post_form(only_question).is_err());

        let mut only_options = form();
        only_options.poll_options = Some(r#"["a","b"]"#.into());
        assert!(validate_post_form(only_options).is_err());

        let mut not_json = form();
        not_json.poll_question = Some("Tea?".into());
        not_json.poll_options = Some("tea, coffee".into());
        assert!(validate_post_form(not_json).is_err());

        let mut one_option = form();
        one_option.poll_question = Some("Tea?".into());
        one_option.poll_options = Some(r#"["tea"]"#.into());
        assert!(validate_post_form(one_option).is_err());
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut f = form();
        f.category = Some("Sport".into());
        assert!(matches!(validate_post_form(f), Err(ApiError::Validation(_))));
    }

    #[test]
    fn empty_text_needs_other_content() {
        let mut f = form();
        f.text = Some("   ".into());
        assert!(validate_post_form(f).is_err());

        let mut with_image = form();
        with_image.text = None;
        with_image.images.push(upload("cat.png"));
        assert!(validate_post_form(with_image).is_ok());
    }

    #[test]
    fn images_are_capped_at_ten() {
        let mut f = form();
        for i in 0..12 {
            f.images.push(upload(&format!("{i}.png")));
        }
        let post = validate_post_form(f).unwrap();
        assert_eq!(post.images.len(), MAX_POST_IMAGES);
        assert_eq!(post.images[9].file_name, "9.png");
    }

    #[test]
    fn blank_links_become_none() {
        let mut f = form();
        f.youtube_url = Some("  ".into());
        f.link_preview = Some(" https://school.ua ".into());
        let post = validate_post_form(f).unwrap();
        assert_eq!(post.youtube_url, None);
        assert_eq!(post.link_preview.as_deref(), Some("https://school.ua"));
    }

    #[test]
    fn assemble_derives_liked_and_keeps_order() {
        let rows = vec![
            post_row(2, 7, "bob", "Мем", "meme"),
            post_row(1, 5, "alice", "Новина", "news"),
        ];
        let details = PostDetailRows {
            likes: vec![
                LikeRow { id: 1, post_id: 1, user_id: 7 },
                LikeRow { id: 2, post_id: 1, user_id: 5 },
            ],
            comments: vec![CommentRow {
                id: 3,
                post_id: 2,
                user_id: 5,
                username: "alice".into(),
                text: "lol".into(),
                created_at: "2026-05-03T10:00:00.000Z".into(),
            }],
            polls: vec![],
            options: vec![],
        };

        let posts = assemble_posts(rows, details, 7);
        assert_eq!(posts[0].id, 2);
        assert!(!posts[0].liked);
        assert_eq!(posts[0].comments[0].user.username, "alice");
        assert_eq!(posts[1].likes_count, 2);
        assert!(posts[1].liked);
        assert_eq!(posts[1].category, Category::News);
    }

    #[test]
    fn feed_query_filters_and_sorts() {
        let rows = vec![
            post_row(3, 5, "alice", "Мем", "Monday memes"),
            post_row(2, 7, "bob", "Новина", "Exam schedule"),
            post_row(1, 7, "bob", "Мем", "old meme"),
        ];
        let details = PostDetailRows {
            likes: vec![
                LikeRow { id: 1, post_id: 1, user_id: 5 },
                LikeRow { id: 2, post_id: 1, user_id: 7 },
                LikeRow { id: 3, post_id: 2, user_id: 5 },
            ],
            ..Default::default()
        };
        let posts = assemble_posts(rows, details, 5);

        let memes = apply_feed_query(posts.clone(), Some(Category::Meme), None, FeedSort::Recent);
        assert_eq!(memes.iter().map(|p| p.id).collect::<Vec<_>>(), vec![3, 1]);

        let bob = apply_feed_query(posts.clone(), None, Some("BOB"), FeedSort::Recent);
        assert_eq!(bob.len(), 2);

        let popular = apply_feed_query(posts, None, None, FeedSort::Popular);
        assert_eq!(popular.iter().map(|p| p.id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
