use super::types::*;
use super::{ApiKey, Transport};
use crate::config::ApiConfig;
use crate::engine::model::{
    Attachment, DashboardStats, FeedQuery, MediaId, NewPost, Page, PostId, UserId, UserProfile,
    UserRef, ViewerIdentity,
};
use crate::error::{FeedError, Result};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

const API_KEY_HEADER: &str = "api-key";
const GENERIC_FAILURE: &str = "Request failed";

pub struct RestTransport {
    client: Client,
    base_url: String,
}

impl RestTransport {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the key (when present), send, and decode the envelope.
    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        key: Option<&ApiKey>,
        label: &str,
    ) -> Result<T> {
        let req = match key {
            Some(key) => req.header(API_KEY_HEADER, key.as_str()),
            None => req,
        };
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        tracing::debug!(request = label, status = status.as_u16(), "api response");
        decode_body(status.as_u16(), status.canonical_reason(), &body)
    }
}

/// Turn a raw response into `T`, applying the error-body conventions of the
/// backend: `error_message`, then `detail` (string or list of `{msg}`), then
/// a plain-text body, then the reason phrase.
pub fn decode_body<T: DeserializeOwned>(status: u16, reason: Option<&str>, body: &str) -> Result<T> {
    let payload: Option<Value> = if body.trim().is_empty() {
        None
    } else {
        serde_json::from_str(body).ok()
    };

    if !(200..300).contains(&status) {
        let message = error_message(payload.as_ref(), body)
            .or_else(|| reason.map(str::to_string))
            .unwrap_or_else(|| GENERIC_FAILURE.to_string());
        return Err(FeedError::transport(Some(status), message));
    }

    let payload = payload.unwrap_or_else(|| Value::Object(Default::default()));
    if payload.get("result") == Some(&Value::Bool(false)) {
        let message = payload
            .get("error_message")
            .and_then(Value::as_str)
            .unwrap_or(GENERIC_FAILURE);
        return Err(FeedError::Application(message.to_string()));
    }

    serde_json::from_value(payload)
        .map_err(|e| FeedError::transport(Some(status), format!("Malformed response: {}", e)))
}

fn error_message(payload: Option<&Value>, raw_body: &str) -> Option<String> {
    match payload {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(obj)) => {
            if let Some(msg) = obj.get("error_message").and_then(Value::as_str) {
                return Some(msg.to_string());
            }
            match obj.get("detail") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Array(items)) => Some(
                    items
                        .iter()
                        .map(|item| match item.get("msg").and_then(Value::as_str) {
                            Some(msg) => msg.to_string(),
                            None => item.to_string(),
                        })
                        .collect::<Vec<_>>()
                        .join(", "),
                ),
                _ => None,
            }
        }
        Some(_) => None,
        None => {
            let text = raw_body.trim();
            (!text.is_empty()).then(|| text.to_string())
        }
    }
}

#[async_trait]
impl Transport for RestTransport {
    async fn fetch_posts(&self, key: Option<&ApiKey>, query: &FeedQuery) -> Result<Page> {
        let req = self.client.get(self.url("/api/tweets")).query(&[
            ("sort", query.sort.as_str().to_string()),
            ("page", query.page.to_string()),
            ("limit", query.limit.to_string()),
        ]);
        let resp: TweetsResponse = self.send(req, key, "GET tweets").await?;
        Ok(resp.into_page(query.page, query.limit))
    }

    async fn create_post(&self, key: &ApiKey, post: &NewPost) -> Result<PostId> {
        let body = CreateTweetRequest {
            tweet_data: post.text.clone(),
            tweet_media_ids: (!post.media_ids.is_empty()).then(|| post.media_ids.clone()),
        };
        let req = self.client.post(self.url("/api/tweets")).json(&body);
        let resp: CreateTweetResponse = self.send(req, Some(key), "POST tweets").await?;
        Ok(resp.tweet_id)
    }

    async fn delete_post(&self, key: &ApiKey, post_id: PostId) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/api/tweets/{}", post_id)));
        let _: Ack = self.send(req, Some(key), "DELETE tweet").await?;
        Ok(())
    }

    async fn like_post(&self, key: &ApiKey, post_id: PostId) -> Result<()> {
        let req = self.client.post(self.url(&format!("/api/tweets/{}/likes", post_id)));
        let _: Ack = self.send(req, Some(key), "POST like").await?;
        Ok(())
    }

    async fn unlike_post(&self, key: &ApiKey, post_id: PostId) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/api/tweets/{}/likes", post_id)));
        let _: Ack = self.send(req, Some(key), "DELETE like").await?;
        Ok(())
    }

    async fn upload_media(&self, key: &ApiKey, attachment: &Attachment) -> Result<MediaId> {
        let file_name = if attachment.file_name.is_empty() {
            "upload".to_string()
        } else {
            attachment.file_name.clone()
        };
        let part = Part::bytes(attachment.bytes.clone()).file_name(file_name);
        let form = Form::new().part("file", part);
        let req = self.client.post(self.url("/api/medias")).multipart(form);
        let resp: MediaUploadResponse = self.send(req, Some(key), "POST medias").await?;
        Ok(resp.media_id)
    }

    async fn fetch_viewer(&self, key: &ApiKey) -> Result<ViewerIdentity> {
        let req = self.client.get(self.url("/api/users/me"));
        let resp: UserResponse = self.send(req, Some(key), "GET users/me").await?;
        Ok(resp.user.into())
    }

    async fn fetch_dashboard(&self, key: &ApiKey) -> Result<DashboardStats> {
        let req = self.client.get(self.url("/api/dashboard"));
        let resp: DashboardResponse = self.send(req, Some(key), "GET dashboard").await?;
        Ok(resp.stats.into())
    }

    async fn fetch_user(&self, key: Option<&ApiKey>, user_id: UserId) -> Result<UserProfile> {
        let req = self.client.get(self.url(&format!("/api/users/{}", user_id)));
        let resp: UserResponse = self.send(req, key, "GET user").await?;
        Ok(resp.user.into())
    }

    async fn fetch_followers(&self, key: Option<&ApiKey>, user_id: UserId) -> Result<Vec<UserRef>> {
        let req = self.client.get(self.url(&format!("/api/users/{}/followers", user_id)));
        let resp: FollowersResponse = self.send(req, key, "GET followers").await?;
        Ok(resp.followers.into_iter().map(UserRef::from).collect())
    }

    async fn fetch_following(&self, key: Option<&ApiKey>, user_id: UserId) -> Result<Vec<UserRef>> {
        let req = self.client.get(self.url(&format!("/api/users/{}/following", user_id)));
        let resp: FollowingResponse = self.send(req, key, "GET following").await?;
        Ok(resp.following.into_iter().map(UserRef::from).collect())
    }

    async fn follow(&self, key: &ApiKey, user_id: UserId) -> Result<()> {
        let req = self.client.post(self.url(&format!("/api/users/{}/follow", user_id)));
        let _: Ack = self.send(req, Some(key), "POST follow").await?;
        Ok(())
    }

    async fn unfollow(&self, key: &ApiKey, user_id: UserId) -> Result<()> {
        let req = self.client.delete(self.url(&format!("/api/users/{}/follow", user_id)));
        let _: Ack = self.send(req, Some(key), "DELETE follow").await?;
        Ok(())
    }
}
