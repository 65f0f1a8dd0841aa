//! Normalized domain types consumed by the engines and the renderer
//! (wire-format agnostic).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub type PostId = u64;
pub type UserId = u64;
pub type MediaId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sort {
    #[default]
    Popular,
    Recent,
}

impl Sort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sort::Popular => "popular",
            Sort::Recent => "recent",
        }
    }

    pub fn next(&self) -> Sort {
        match self {
            Sort::Popular => Sort::Recent,
            Sort::Recent => Sort::Popular,
        }
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "popular" => Ok(Sort::Popular),
            "recent" => Ok(Sort::Recent),
            other => Err(format!("unknown sort '{}'", other)),
        }
    }
}

/// Which page of the feed to fetch. Changing `sort` or `limit` sends the
/// query back to page 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedQuery {
    pub sort: Sort,
    pub page: u32,
    pub limit: u32,
}

impl FeedQuery {
    pub fn new(sort: Sort, limit: u32) -> Self {
        Self {
            sort,
            page: 1,
            limit,
        }
    }

    /// Apply a partial update. A changed sort or limit resets the page to 1
    /// before an explicit page (if any) is applied.
    pub fn with_changes(self, sort: Option<Sort>, limit: Option<u32>, page: Option<u32>) -> Self {
        let mut next = self;
        if let Some(sort) = sort {
            if sort != next.sort {
                next.sort = sort;
                next.page = 1;
            }
        }
        if let Some(limit) = limit {
            if limit != next.limit {
                next.limit = limit;
                next.page = 1;
            }
        }
        if let Some(page) = page {
            next.page = page;
        }
        next
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Liker {
    pub user_id: UserId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: PostId,
    pub author: UserRef,
    pub content: String,
    /// Media URLs, in display order.
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub like_count: u64,
    pub liked_by_viewer: bool,
    /// Most recent first. May be shorter than `like_count`.
    pub likers: Vec<Liker>,
}

/// Server-reported pagination. The engine never computes these flags itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page: u32,
    pub limit: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub posts: Vec<Post>,
    pub info: PageInfo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewerIdentity {
    pub id: UserId,
    pub name: String,
    pub followers: Vec<UserRef>,
    pub following: Vec<UserRef>,
}

impl ViewerIdentity {
    pub fn follows(&self, user_id: UserId) -> bool {
        self.following.iter().any(|u| u.id == user_id)
    }
}

/// Public profile of any user, as shown on the profile page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub followers: Vec<UserRef>,
    pub following: Vec<UserRef>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopularAuthor {
    pub user_id: UserId,
    pub name: String,
    pub followers_count: u64,
    pub post_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendingPost {
    pub post_id: PostId,
    pub content: String,
    pub author: String,
    pub like_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DashboardStats {
    pub total_users: u64,
    pub total_posts: u64,
    pub total_likes: u64,
    pub popular_authors: Vec<PopularAuthor>,
    pub trending_posts: Vec<TrendingPost>,
}

/// A file to upload before the post referencing it is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub text: String,
    pub media_ids: Vec<MediaId>,
}

/// Read-only view handed to renderers. Posts are shared, never mutated in
/// place: an optimistic edit swaps in a new `Arc<Post>`, so a snapshot taken
/// earlier keeps seeing the record it was built from.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub version: u64,
    pub query: FeedQuery,
    pub posts: Vec<Arc<Post>>,
    pub page: Option<PageInfo>,
    pub viewer: Option<Arc<ViewerIdentity>>,
    pub stats: Option<Arc<DashboardStats>>,
    pub signed_in: bool,
}

impl FeedSnapshot {
    pub fn empty(query: FeedQuery, signed_in: bool) -> Self {
        Self {
            version: 0,
            query,
            posts: Vec::new(),
            page: None,
            viewer: None,
            stats: None,
            signed_in,
        }
    }

    pub fn post(&self, id: PostId) -> Option<&Arc<Post>> {
        self.posts.iter().find(|p| p.id == id)
    }

    /// Only the author may delete a post.
    pub fn can_delete(&self, post: &Post) -> bool {
        self.viewer
            .as_ref()
            .is_some_and(|viewer| viewer.id == post.author.id)
    }

    pub fn has_next(&self) -> bool {
        self.page.is_some_and(|p| p.has_next)
    }

    pub fn has_previous(&self) -> bool {
        self.page.is_some_and(|p| p.has_previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_parses_case_insensitively() {
        assert_eq!("Popular".parse::<Sort>(), Ok(Sort::Popular));
        assert_eq!(" recent ".parse::<Sort>(), Ok(Sort::Recent));
        assert!("oldest".parse::<Sort>().is_err());
        assert_eq!(Sort::Popular.next(), Sort::Recent);
    }

    #[test]
    fn test_sort_change_resets_page() {
        let query = FeedQuery::new(Sort::Popular, 10).with_changes(None, None, Some(3));
        assert_eq!(query.page, 3);

        let query = query.with_changes(Some(Sort::Recent), None, None);
        assert_eq!(query.page, 1);
        assert_eq!(query.sort, Sort::Recent);
    }

    #[test]
    fn test_limit_change_resets_page() {
        let query = FeedQuery {
            sort: Sort::Recent,
            page: 4,
            limit: 10,
        };
        let query = query.with_changes(None, Some(20), None);
        assert_eq!(query.page, 1);
        assert_eq!(query.limit, 20);
    }

    #[test]
    fn test_unchanged_sort_keeps_page() {
        let query = FeedQuery {
            sort: Sort::Popular,
            page: 2,
            limit: 10,
        };
        let query = query.with_changes(Some(Sort::Popular), Some(10), None);
        assert_eq!(query.page, 2);
    }

    #[test]
    fn test_explicit_page_does_not_touch_sort_or_limit() {
        let query = FeedQuery::new(Sort::Recent, 50).with_changes(None, None, Some(7));
        assert_eq!(query.sort, Sort::Recent);
        assert_eq!(query.limit, 50);
        assert_eq!(query.page, 7);
    }
}
