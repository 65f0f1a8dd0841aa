pub mod rest;
pub mod store;
pub mod types;

use async_trait::async_trait;
use std::fmt;

use crate::engine::model::{
    Attachment, DashboardStats, FeedQuery, MediaId, NewPost, Page, PostId, UserId, UserProfile,
    UserRef, ViewerIdentity,
};
use crate::error::Result;

/// Opaque bearer key, sent as the `api-key` header.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Trimmed key, or `None` when nothing is left.
    pub fn new(raw: &str) -> Option<Self> {
        let key = raw.trim();
        if key.is_empty() {
            None
        } else {
            Some(Self(key.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(3).collect();
        write!(f, "ApiKey({}…)", prefix)
    }
}

/// Everything the engines need from the backend. Implementations return
/// normalized domain types and map every failure onto `FeedError`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch_posts(&self, key: Option<&ApiKey>, query: &FeedQuery) -> Result<Page>;
    async fn create_post(&self, key: &ApiKey, post: &NewPost) -> Result<PostId>;
    async fn delete_post(&self, key: &ApiKey, post_id: PostId) -> Result<()>;
    async fn like_post(&self, key: &ApiKey, post_id: PostId) -> Result<()>;
    async fn unlike_post(&self, key: &ApiKey, post_id: PostId) -> Result<()>;
    async fn upload_media(&self, key: &ApiKey, attachment: &Attachment) -> Result<MediaId>;

    async fn fetch_viewer(&self, key: &ApiKey) -> Result<ViewerIdentity>;
    async fn fetch_dashboard(&self, key: &ApiKey) -> Result<DashboardStats>;

    async fn fetch_user(&self, key: Option<&ApiKey>, user_id: UserId) -> Result<UserProfile>;
    async fn fetch_followers(&self, key: Option<&ApiKey>, user_id: UserId) -> Result<Vec<UserRef>>;
    async fn fetch_following(&self, key: Option<&ApiKey>, user_id: UserId) -> Result<Vec<UserRef>>;
    async fn follow(&self, key: &ApiKey, user_id: UserId) -> Result<()>;
    async fn unfollow(&self, key: &ApiKey, user_id: UserId) -> Result<()>;
}
