use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};

use campus_types::api::{
    AnonymousTrustMessage, AuthResponse, CommentResponse, CreateCommentRequest,
    CreateTrustMessageRequest, ErrorResponse, HealthResponse, LoginRequest, MessageResponse,
    PostResponse, RegisterRequest, ReplyTrustMessageRequest, ToggleLikeRequest,
    ToggleLikeResponse, TrustMessageResponse, VoteResponse,
};
use campus_types::models::Category;

use crate::error::ClientError;
use crate::session::Session;

/// Default server URL for local development.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

/// Feed filters, applied server-side.
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    pub category: Option<Category>,
    pub search: Option<String>,
    /// Order by like count instead of recency.
    pub popular: bool,
}

#[derive(Debug, Clone)]
pub struct PostAttachment {
    pub file_name: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub category: Category,
    pub text: String,
    pub youtube_url: Option<String>,
    pub link_preview: Option<String>,
    pub images: Vec<PostAttachment>,
    pub file: Option<PostAttachment>,
    /// Question and option texts.
    pub poll: Option<(String, Vec<String>)>,
}

impl NewPost {
    pub fn text(category: Category, text: impl Into<String>) -> Self {
        Self {
            category,
            text: text.into(),
            youtube_url: None,
            link_preview: None,
            images: Vec::new(),
            file: None,
            poll: None,
        }
    }

    fn into_form(self) -> Result<Form, ClientError> {
        let mut form = Form::new()
            .text("category", self.category.label())
            .text("text", self.text);
        if let Some(url) = self.youtube_url {
            form = form.text("youtubeUrl", url);
        }
        if let Some(link) = self.link_preview {
            form = form.text("linkPreview", link);
        }
        if let Some((question, options)) = self.poll {
            form = form
                .text("pollQuestion", question)
                .text("pollOptions", serde_json::to_string(&options)?);
        }
        for image in self.images {
            form = form.part("images", Part::bytes(image.data).file_name(image.file_name));
        }
        if let Some(file) = self.file {
            form = form.part("file", Part::bytes(file.data).file_name(file.file_name));
        }
        Ok(form)
    }
}

/// One method per API endpoint. Authenticated calls take the caller's session.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for a stored asset reference such as `/uploads/x.png`.
    pub fn asset_url(&self, reference: &str) -> String {
        format!("{}{}", self.base_url, reference)
    }

    // -- Auth --

    #[instrument(skip(self, password))]
    pub async fn register(&self, email: &str, username: &str, password: &str) -> Result<Session, ClientError> {
        let body = RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self.send(self.request(Method::POST, "/api/auth/register", None).json(&body)).await?;
        Ok(resp.into())
    }

    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let resp: AuthResponse = self.send(self.request(Method::POST, "/api/auth/login", None).json(&body)).await?;
        Ok(resp.into())
    }

    // -- Posts --

    pub async fn list_posts(&self, session: &Session, filter: &FeedFilter) -> Result<Vec<PostResponse>, ClientError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(category) = filter.category {
            query.push(("category", category.label().to_string()));
        }
        if let Some(q) = filter.search.as_deref().filter(|q| !q.trim().is_empty()) {
            query.push(("q", q.to_string()));
        }
        if filter.popular {
            query.push(("sort", "popular".to_string()));
        }
        self.send(self.request(Method::GET, "/api/posts", Some(session)).query(&query)).await
    }

    pub async fn list_user_posts(&self, session: &Session, user_id: i64) -> Result<Vec<PostResponse>, ClientError> {
        self.send(self.request(Method::GET, &format!("/api/posts/user/{user_id}"), Some(session)))
            .await
    }

    #[instrument(skip(self, session, post), fields(user = session.user.id))]
    pub async fn create_post(&self, session: &Session, post: NewPost) -> Result<PostResponse, ClientError> {
        let form = post.into_form()?;
        self.send(self.request(Method::POST, "/api/posts", Some(session)).multipart(form))
            .await
    }

    pub async fn delete_post(&self, session: &Session, post_id: i64) -> Result<MessageResponse, ClientError> {
        self.send(self.request(Method::DELETE, &format!("/api/posts/{post_id}"), Some(session)))
            .await
    }

    pub async fn vote(&self, session: &Session, option_id: i64) -> Result<VoteResponse, ClientError> {
        self.send(self.request(Method::POST, &format!("/api/posts/poll/{option_id}/vote"), Some(session)))
            .await
    }

    // -- Comments & likes --

    pub async fn create_comment(&self, session: &Session, post_id: i64, text: &str) -> Result<CommentResponse, ClientError> {
        let body = CreateCommentRequest {
            post_id,
            text: text.to_string(),
        };
        self.send(self.request(Method::POST, "/api/comments", Some(session)).json(&body))
            .await
    }

    pub async fn delete_comment(&self, session: &Session, comment_id: i64) -> Result<MessageResponse, ClientError> {
        self.send(self.request(Method::DELETE, &format!("/api/comments/{comment_id}"), Some(session)))
            .await
    }

    pub async fn toggle_like(&self, session: &Session, post_id: i64) -> Result<bool, ClientError> {
        let resp: ToggleLikeResponse = self
            .send(self.request(Method::POST, "/api/likes", Some(session)).json(&ToggleLikeRequest { post_id }))
            .await?;
        Ok(resp.liked)
    }

    // -- Trust box --

    pub async fn send_trust_message(&self, session: &Session, content: &str) -> Result<TrustMessageResponse, ClientError> {
        let body = CreateTrustMessageRequest {
            content: content.to_string(),
        };
        self.send(self.request(Method::POST, "/api/trustbox", Some(session)).json(&body))
            .await
    }

    pub async fn my_trust_messages(&self, session: &Session) -> Result<Vec<TrustMessageResponse>, ClientError> {
        self.send(self.request(Method::GET, "/api/trustbox/my", Some(session)))
            .await
    }

    pub async fn all_trust_messages(&self, session: &Session) -> Result<Vec<AnonymousTrustMessage>, ClientError> {
        self.send(self.request(Method::GET, "/api/trustbox/all", Some(session)))
            .await
    }

    pub async fn reply_trust_message(
        &self,
        session: &Session,
        message_id: i64,
        reply: &str,
    ) -> Result<AnonymousTrustMessage, ClientError> {
        let body = ReplyTrustMessageRequest {
            reply: reply.to_string(),
        };
        self.send(
            self.request(Method::PATCH, &format!("/api/trustbox/{message_id}/reply"), Some(session))
                .json(&body),
        )
        .await
    }

    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.send(self.request(Method::GET, "/health", None)).await
    }

    // -- Plumbing --

    fn request(&self, method: Method, path: &str, session: Option<&Session>) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}{}", self.base_url, path));
        match session {
            Some(session) => builder.bearer_auth(&session.token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let resp = builder.send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }
}

/// Turn a non-2xx response into [`ClientError::Api`], keeping the server's message.
async fn check_status(resp: Response) -> Result<Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!("Request failed with {}: {}", status, body);
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error)
        .unwrap_or_else(|_| status.canonical_reason().unwrap_or("Request failed").to_string());
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = ApiClient::new("http://localhost:3000/");
        assert_eq!(client.base_url(), "http://localhost:3000");
        assert_eq!(
            client.asset_url("/uploads/1-ab-cat.png"),
            "http://localhost:3000/uploads/1-ab-cat.png"
        );
    }
}
