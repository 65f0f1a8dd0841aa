// Shared fixtures for the integration tests: an in-memory backend that
// sorts and paginates like the real one, records every call, and can hold
// or fail individual requests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use microblog_feed::api::store::MemoryKeyStore;
use microblog_feed::api::{ApiKey, Transport};
use microblog_feed::engine::model::{
    Attachment, DashboardStats, FeedQuery, Liker, MediaId, NewPost, Page, PageInfo, PopularAuthor,
    Post, PostId, Sort, TrendingPost, UserId, UserProfile, UserRef, ViewerIdentity,
};
use microblog_feed::engine::{FeedSettings, FeedStateEngine};
use microblog_feed::{FeedError, Result};

/// Keys the fake backend accepts, and the users they belong to.
pub const USERS: &[(UserId, &str, &str)] = &[(1, "alice", "Alice"), (2, "bob", "Bob"), (3, "carol", "Carol")];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    FetchPosts(FeedQuery),
    CreatePost(NewPost),
    DeletePost(PostId),
    Like(PostId),
    Unlike(PostId),
    Upload(String),
    FetchViewer,
    FetchDashboard,
    FetchUser(UserId),
    FetchFollowers(UserId),
    FetchFollowing(UserId),
    Follow(UserId),
    Unfollow(UserId),
}

#[derive(Debug, Clone)]
struct StoredPost {
    id: PostId,
    author: UserId,
    content: String,
    attachments: Vec<String>,
    created_at: DateTime<Utc>,
    /// Most recent first.
    likers: Vec<UserId>,
}

#[derive(Default)]
struct Server {
    posts: Vec<StoredPost>,
    /// (follower, followee)
    follows: Vec<(UserId, UserId)>,
    next_post_id: PostId,
    next_media_id: MediaId,
}

fn user_name(id: UserId) -> String {
    USERS
        .iter()
        .find(|(uid, _, _)| *uid == id)
        .map(|(_, _, name)| name.to_string())
        .unwrap_or_else(|| format!("user{}", id))
}

fn user_ref(id: UserId) -> UserRef {
    UserRef { id, name: user_name(id) }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

impl Server {
    fn render(&self, post: &StoredPost, viewer: Option<UserId>) -> Post {
        Post {
            id: post.id,
            author: user_ref(post.author),
            content: post.content.clone(),
            attachments: post.attachments.clone(),
            created_at: post.created_at,
            like_count: post.likers.len() as u64,
            liked_by_viewer: viewer.is_some_and(|v| post.likers.contains(&v)),
            likers: post
                .likers
                .iter()
                .map(|&id| Liker { user_id: id, name: user_name(id) })
                .collect(),
        }
    }

    fn page(&self, query: &FeedQuery, viewer: Option<UserId>) -> Page {
        let mut posts: Vec<&StoredPost> = self.posts.iter().collect();
        match query.sort {
            Sort::Recent => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            Sort::Popular => posts.sort_by(|a, b| {
                b.likers
                    .len()
                    .cmp(&a.likers.len())
                    .then(b.created_at.cmp(&a.created_at))
            }),
        }
        let limit = query.limit.max(1) as usize;
        let offset = (query.page.max(1) as usize - 1) * limit;
        let total = posts.len();
        Page {
            posts: posts
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|p| self.render(p, viewer))
                .collect(),
            info: PageInfo {
                page: query.page.max(1),
                limit: limit as u32,
                has_next: offset + limit < total,
                has_previous: query.page > 1,
            },
        }
    }

    fn profile(&self, id: UserId) -> UserProfile {
        UserProfile {
            id,
            name: user_name(id),
            followers: self.follows.iter().filter(|(_, to)| *to == id).map(|(from, _)| user_ref(*from)).collect(),
            following: self.follows.iter().filter(|(from, _)| *from == id).map(|(_, to)| user_ref(*to)).collect(),
        }
    }
}

/// In-memory stand-in for the REST backend.
#[derive(Default)]
pub struct FakeTransport {
    server: Mutex<Server>,
    calls: Mutex<Vec<Call>>,
    fetch_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    like_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    viewer_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    dashboard_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    /// When set, a fetch pins `PageInfo::limit` to this value.
    server_limit: Mutex<Option<u32>>,
    pub fail_like: AtomicBool,
    pub fail_upload: AtomicBool,
    pub fail_fetch: AtomicBool,
    pub fail_viewer: AtomicBool,
    pub fail_dashboard: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a post `minutes_ago` old with the given likers. Returns its id.
    pub fn seed_post(&self, author: UserId, content: &str, minutes_ago: i64, likers: &[UserId]) -> PostId {
        let mut server = self.server.lock().unwrap();
        server.next_post_id += 1;
        let id = server.next_post_id;
        server.posts.push(StoredPost {
            id,
            author,
            content: content.to_string(),
            attachments: vec![],
            created_at: base_time() - Duration::minutes(minutes_ago),
            likers: likers.to_vec(),
        });
        id
    }

    pub fn seed_follow(&self, follower: UserId, followee: UserId) {
        self.server.lock().unwrap().follows.push((follower, followee));
    }

    pub fn pin_server_limit(&self, limit: u32) {
        *self.server_limit.lock().unwrap() = Some(limit);
    }

    pub fn stored_post(&self, id: PostId) -> Option<Post> {
        let server = self.server.lock().unwrap();
        server.posts.iter().find(|p| p.id == id).map(|p| server.render(p, None))
    }

    pub fn post_count(&self) -> usize {
        self.server.lock().unwrap().posts.len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn fetch_queries(&self) -> Vec<FeedQuery> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::FetchPosts(q) => Some(q),
                _ => None,
            })
            .collect()
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_queries().len()
    }

    /// The next `fetch_posts` waits until the returned sender fires (or is dropped).
    pub fn hold_next_fetch(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.fetch_gates.lock().unwrap().push_back(rx);
        tx
    }

    /// The next like or unlike waits until the returned sender fires.
    pub fn hold_next_like(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.like_gates.lock().unwrap().push_back(rx);
        tx
    }

    /// The next `fetch_viewer` waits until the returned sender fires.
    pub fn hold_next_viewer(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.viewer_gates.lock().unwrap().push_back(rx);
        tx
    }

    /// The next `fetch_dashboard` waits until the returned sender fires.
    pub fn hold_next_dashboard(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.dashboard_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn has_call(&self, call: &Call) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn viewer_id(&self, key: Option<&ApiKey>) -> Result<Option<UserId>> {
        match key {
            None => Ok(None),
            Some(key) => USERS
                .iter()
                .find(|(_, k, _)| *k == key.as_str())
                .map(|(id, _, _)| Some(*id))
                .ok_or_else(|| FeedError::transport(Some(401), "Invalid API key")),
        }
    }

    fn require_viewer(&self, key: &ApiKey) -> Result<UserId> {
        self.viewer_id(Some(key))?
            .ok_or_else(|| FeedError::transport(Some(401), "Invalid API key"))
    }

    async fn pass_gate(gates: &Mutex<VecDeque<oneshot::Receiver<()>>>) {
        let gate = gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
    }

    fn set_like(&self, key: &ApiKey, post_id: PostId, liked: bool) -> Result<()> {
        if self.fail_like.load(Ordering::SeqCst) {
            return Err(FeedError::transport(Some(500), "Internal Server Error"));
        }
        let viewer = self.require_viewer(key)?;
        let mut server = self.server.lock().unwrap();
        let post = server
            .posts
            .iter_mut()
            .find(|p| p.id == post_id)
            .ok_or_else(|| FeedError::transport(Some(404), "Tweet not found"))?;
        let present = post.likers.contains(&viewer);
        match (liked, present) {
            (true, true) => return Err(FeedError::transport(Some(400), "Tweet already liked")),
            (false, false) => return Err(FeedError::transport(Some(400), "Like not found")),
            (true, false) => post.likers.insert(0, viewer),
            (false, true) => post.likers.retain(|&id| id != viewer),
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_posts(&self, key: Option<&ApiKey>, query: &FeedQuery) -> Result<Page> {
        self.record(Call::FetchPosts(*query));
        Self::pass_gate(&self.fetch_gates).await;
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(FeedError::transport(Some(503), "Service Unavailable"));
        }
        let viewer = self.viewer_id(key)?;
        let mut query = *query;
        if let Some(limit) = *self.server_limit.lock().unwrap() {
            query.limit = limit;
        }
        Ok(self.server.lock().unwrap().page(&query, viewer))
    }

    async fn create_post(&self, key: &ApiKey, post: &NewPost) -> Result<PostId> {
        self.record(Call::CreatePost(post.clone()));
        let author = self.require_viewer(key)?;
        let mut server = self.server.lock().unwrap();
        server.next_post_id += 1;
        let id = server.next_post_id;
        server.posts.push(StoredPost {
            id,
            author,
            content: post.text.clone(),
            attachments: post.media_ids.iter().map(|m| format!("/media/{}", m)).collect(),
            created_at: base_time() + Duration::minutes(id as i64),
            likers: vec![],
        });
        Ok(id)
    }

    async fn delete_post(&self, key: &ApiKey, post_id: PostId) -> Result<()> {
        self.record(Call::DeletePost(post_id));
        let viewer = self.require_viewer(key)?;
        let mut server = self.server.lock().unwrap();
        let idx = server
            .posts
            .iter()
            .position(|p| p.id == post_id)
            .ok_or_else(|| FeedError::transport(Some(404), "Tweet not found"))?;
        if server.posts[idx].author != viewer {
            return Err(FeedError::transport(Some(403), "You can only delete your own tweets"));
        }
        server.posts.remove(idx);
        Ok(())
    }

    async fn like_post(&self, key: &ApiKey, post_id: PostId) -> Result<()> {
        self.record(Call::Like(post_id));
        Self::pass_gate(&self.like_gates).await;
        self.set_like(key, post_id, true)
    }

    async fn unlike_post(&self, key: &ApiKey, post_id: PostId) -> Result<()> {
        self.record(Call::Unlike(post_id));
        Self::pass_gate(&self.like_gates).await;
        self.set_like(key, post_id, false)
    }

    async fn upload_media(&self, key: &ApiKey, attachment: &Attachment) -> Result<MediaId> {
        self.record(Call::Upload(attachment.file_name.clone()));
        self.require_viewer(key)?;
        if self.fail_upload.load(Ordering::SeqCst) {
            return Err(FeedError::transport(Some(413), "File too large"));
        }
        let mut server = self.server.lock().unwrap();
        server.next_media_id += 1;
        Ok(server.next_media_id)
    }

    async fn fetch_viewer(&self, key: &ApiKey) -> Result<ViewerIdentity> {
        self.record(Call::FetchViewer);
        Self::pass_gate(&self.viewer_gates).await;
        if self.fail_viewer.load(Ordering::SeqCst) {
            return Err(FeedError::transport(Some(500), "Internal Server Error"));
        }
        let id = self.require_viewer(key)?;
        let profile = self.server.lock().unwrap().profile(id);
        Ok(ViewerIdentity {
            id: profile.id,
            name: profile.name,
            followers: profile.followers,
            following: profile.following,
        })
    }

    async fn fetch_dashboard(&self, key: &ApiKey) -> Result<DashboardStats> {
        self.record(Call::FetchDashboard);
        Self::pass_gate(&self.dashboard_gates).await;
        if self.fail_dashboard.load(Ordering::SeqCst) {
            return Err(FeedError::transport(Some(500), "Internal Server Error"));
        }
        self.require_viewer(key)?;
        let server = self.server.lock().unwrap();
        let total_likes = server.posts.iter().map(|p| p.likers.len() as u64).sum();
        let mut trending: Vec<&StoredPost> = server.posts.iter().filter(|p| !p.likers.is_empty()).collect();
        trending.sort_by(|a, b| b.likers.len().cmp(&a.likers.len()));
        Ok(DashboardStats {
            total_users: USERS.len() as u64,
            total_posts: server.posts.len() as u64,
            total_likes,
            popular_authors: USERS
                .iter()
                .map(|(id, _, name)| PopularAuthor {
                    user_id: *id,
                    name: name.to_string(),
                    followers_count: server.follows.iter().filter(|(_, to)| to == id).count() as u64,
                    post_count: server.posts.iter().filter(|p| p.author == *id).count() as u64,
                })
                .collect(),
            trending_posts: trending
                .into_iter()
                .take(5)
                .map(|p| TrendingPost {
                    post_id: p.id,
                    content: p.content.clone(),
                    author: user_name(p.author),
                    like_count: p.likers.len() as u64,
                })
                .collect(),
        })
    }

    async fn fetch_user(&self, _key: Option<&ApiKey>, user_id: UserId) -> Result<UserProfile> {
        self.record(Call::FetchUser(user_id));
        if !USERS.iter().any(|(id, _, _)| *id == user_id) {
            return Err(FeedError::transport(Some(404), "User not found"));
        }
        Ok(self.server.lock().unwrap().profile(user_id))
    }

    async fn fetch_followers(&self, _key: Option<&ApiKey>, user_id: UserId) -> Result<Vec<UserRef>> {
        self.record(Call::FetchFollowers(user_id));
        Ok(self.server.lock().unwrap().profile(user_id).followers)
    }

    async fn fetch_following(&self, _key: Option<&ApiKey>, user_id: UserId) -> Result<Vec<UserRef>> {
        self.record(Call::FetchFollowing(user_id));
        Ok(self.server.lock().unwrap().profile(user_id).following)
    }

    async fn follow(&self, key: &ApiKey, user_id: UserId) -> Result<()> {
        self.record(Call::Follow(user_id));
        let viewer = self.require_viewer(key)?;
        if viewer == user_id {
            return Err(FeedError::transport(Some(400), "You cannot follow yourself"));
        }
        let mut server = self.server.lock().unwrap();
        if server.follows.contains(&(viewer, user_id)) {
            return Err(FeedError::transport(Some(400), "Already following this user"));
        }
        server.follows.push((viewer, user_id));
        Ok(())
    }

    async fn unfollow(&self, key: &ApiKey, user_id: UserId) -> Result<()> {
        self.record(Call::Unfollow(user_id));
        let viewer = self.require_viewer(key)?;
        let mut server = self.server.lock().unwrap();
        let before = server.follows.len();
        server.follows.retain(|f| *f != (viewer, user_id));
        if server.follows.len() == before {
            return Err(FeedError::transport(Some(400), "Not following this user"));
        }
        Ok(())
    }
}

/// Engine over `fake`, signed in with `key` (if any).
pub fn engine_with(fake: &Arc<FakeTransport>, key: Option<&str>, limit: u32) -> (FeedStateEngine, Arc<MemoryKeyStore>) {
    let store = Arc::new(MemoryKeyStore::new(key.and_then(ApiKey::new)));
    let engine = FeedStateEngine::new(
        fake.clone(),
        store.clone(),
        FeedSettings {
            sort: Sort::Popular,
            limit,
        },
    );
    (engine, store)
}
