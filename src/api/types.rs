use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::engine::model::{
    DashboardStats, Liker, MediaId, Page, PageInfo, PopularAuthor, Post, PostId, TrendingPost,
    UserId, UserProfile, UserRef, ViewerIdentity,
};

#[derive(Debug, Clone, Serialize)]
pub struct CreateTweetRequest {
    pub tweet_data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tweet_media_ids: Option<Vec<MediaId>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTweetResponse {
    pub tweet_id: PostId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaUploadResponse {
    pub media_id: MediaId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetsResponse {
    #[serde(default)]
    pub tweets: Vec<TweetOut>,
    pub pagination: Option<Pagination>,
}

#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct Pagination {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub has_previous: bool,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TweetOut {
    pub id: PostId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub author: UserBrief,
    #[serde(default)]
    pub likes: Vec<LikeInfo>,
    #[serde(deserialize_with = "deserialize_stamp")]
    pub stamp: DateTime<Utc>,
    // Older servers omit the count; fall back to the likes list
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub liked_by_me: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserBrief {
    pub id: UserId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LikeInfo {
    pub user_id: UserId,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfileOut {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub followers: Vec<UserBrief>,
    #[serde(default)]
    pub following: Vec<UserBrief>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserResponse {
    pub user: UserProfileOut,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowersResponse {
    #[serde(default)]
    pub followers: Vec<UserBrief>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FollowingResponse {
    #[serde(default)]
    pub following: Vec<UserBrief>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardResponse {
    pub stats: DashboardStatsOut,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DashboardStatsOut {
    #[serde(default)]
    pub total_users: u64,
    #[serde(default)]
    pub total_tweets: u64,
    #[serde(default)]
    pub total_likes: u64,
    #[serde(default)]
    pub popular_authors: Vec<PopularAuthorOut>,
    #[serde(default)]
    pub trending_tweets: Vec<TrendingTweetOut>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PopularAuthorOut {
    pub user_id: UserId,
    pub name: String,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub tweet_count: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrendingTweetOut {
    pub tweet_id: PostId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub likes_count: u64,
}

/// Generic `{ "result": true }` acknowledgement. Extra fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[allow(dead_code)]
pub struct Ack {
    #[serde(default)]
    pub result: Option<bool>,
}

/// Timestamps arrive either as RFC 3339 or as naive ISO datetimes in UTC.
fn deserialize_stamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_stamp(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

pub fn parse_stamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl From<UserBrief> for UserRef {
    fn from(u: UserBrief) -> Self {
        UserRef {
            id: u.id,
            name: u.name,
        }
    }
}

impl From<TweetOut> for Post {
    fn from(t: TweetOut) -> Self {
        let like_count = t.likes_count.unwrap_or(t.likes.len() as u64);
        Post {
            id: t.id,
            author: t.author.into(),
            content: t.content,
            attachments: t.attachments,
            created_at: t.stamp,
            like_count,
            liked_by_viewer: t.liked_by_me,
            likers: t
                .likes
                .into_iter()
                .map(|l| Liker {
                    user_id: l.user_id,
                    name: l.name,
                })
                .collect(),
        }
    }
}

impl TweetsResponse {
    /// Normalize into a `Page`. Pagination fields the server leaves out fall
    /// back to what was requested.
    pub fn into_page(self, requested_page: u32, requested_limit: u32) -> Page {
        let info = match self.pagination {
            Some(p) => PageInfo {
                page: p.page.filter(|&n| n > 0).unwrap_or(requested_page),
                limit: p.limit.filter(|&n| n > 0).unwrap_or(requested_limit),
                has_next: p.has_next,
                has_previous: p.has_previous,
            },
            None => PageInfo {
                page: requested_page,
                limit: requested_limit,
                has_next: false,
                has_previous: false,
            },
        };
        Page {
            posts: self.tweets.into_iter().map(Post::from).collect(),
            info,
        }
    }
}

impl From<UserProfileOut> for UserProfile {
    fn from(u: UserProfileOut) -> Self {
        UserProfile {
            id: u.id,
            name: u.name,
            followers: u.followers.into_iter().map(UserRef::from).collect(),
            following: u.following.into_iter().map(UserRef::from).collect(),
        }
    }
}

impl From<UserProfileOut> for ViewerIdentity {
    fn from(u: UserProfileOut) -> Self {
        ViewerIdentity {
            id: u.id,
            name: u.name,
            followers: u.followers.into_iter().map(UserRef::from).collect(),
            following: u.following.into_iter().map(UserRef::from).collect(),
        }
    }
}

impl From<DashboardStatsOut> for DashboardStats {
    fn from(s: DashboardStatsOut) -> Self {
        DashboardStats {
            total_users: s.total_users,
            total_posts: s.total_tweets,
            total_likes: s.total_likes,
            popular_authors: s
                .popular_authors
                .into_iter()
                .map(|a| PopularAuthor {
                    user_id: a.user_id,
                    name: a.name,
                    followers_count: a.followers_count,
                    post_count: a.tweet_count,
                })
                .collect(),
            trending_posts: s
                .trending_tweets
                .into_iter()
                .map(|t| TrendingPost {
                    post_id: t.tweet_id,
                    content: t.content,
                    author: t.author,
                    like_count: t.likes_count,
                })
                .collect(),
        }
    }
}
