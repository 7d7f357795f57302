//! Typed HTTP client for the campus API, plus the on-disk session a front end
//! keeps between runs.

pub mod client;
pub mod error;
pub mod session;

pub use client::{ApiClient, FeedFilter, NewPost, PostAttachment};
pub use error::ClientError;
pub use session::Session;
