//! Feed state and optimistic-update engine.
//!
//! Holds the current page of posts, the query that produced it, the viewer
//! identity and dashboard stats. Every intent is an async method taking
//! `&self`, so several can be in flight at once (a like toggle alongside a
//! refresh, say). The state mutex is only held between awaits, never across
//! one. Each change is published as a `FeedSnapshot` on a watch channel.

use futures_util::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use super::likes::apply_like;
use super::model::{
    Attachment, DashboardStats, FeedQuery, FeedSnapshot, NewPost, Page, PageInfo, Post, PostId,
    Sort, ViewerIdentity,
};
use super::pending::PendingLikeRegistry;
use crate::api::store::KeyStore;
use crate::api::{ApiKey, Transport};
use crate::error::{FeedError, Result};

/// Longest post body the backend accepts.
pub const MAX_POST_CHARS: usize = 1000;

#[derive(Debug, Clone, Copy)]
pub struct FeedSettings {
    pub sort: Sort,
    pub limit: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            sort: Sort::Popular,
            limit: 10,
        }
    }
}

struct FeedState {
    key: Option<ApiKey>,
    /// Bumped on every key change; identity-scoped responses from an older
    /// epoch are dropped.
    identity_epoch: u64,
    /// Query behind the posts on display.
    query: FeedQuery,
    /// Most recently issued query. Equal to `query` once that fetch lands.
    requested: FeedQuery,
    /// Version of the most recently issued page fetch.
    issued_version: u64,
    posts: Vec<Arc<Post>>,
    page: Option<PageInfo>,
    viewer: Option<Arc<ViewerIdentity>>,
    stats: Option<Arc<DashboardStats>>,
    pending: PendingLikeRegistry,
    revision: u64,
}

impl FeedState {
    fn snapshot(&self) -> FeedSnapshot {
        FeedSnapshot {
            version: self.revision,
            query: self.query,
            posts: self.posts.clone(),
            page: self.page,
            viewer: self.viewer.clone(),
            stats: self.stats.clone(),
            signed_in: self.key.is_some(),
        }
    }

    fn position(&self, post_id: PostId) -> Option<usize> {
        self.posts.iter().position(|p| p.id == post_id)
    }

    fn require_key(&self) -> Result<ApiKey> {
        self.key.clone().ok_or(FeedError::SignedOut)
    }

    /// Install a freshly fetched page, keeping any in-flight like visible on
    /// top of the server's data.
    fn install_page(&mut self, query: FeedQuery, page: &Page) {
        let viewer = self.viewer.clone();
        let mut posts = Vec::with_capacity(page.posts.len());
        for fetched in &page.posts {
            let fetched = Arc::new(fetched.clone());
            let shown = match self.pending.get(fetched.id).map(|p| p.liked) {
                Some(liked) => {
                    let optimistic = apply_like(&fetched, viewer.as_deref(), liked)
                        .map(Arc::new)
                        .unwrap_or_else(|| fetched.clone());
                    self.pending.rebase(fetched.id, fetched.clone(), optimistic.clone());
                    optimistic
                }
                None => fetched,
            };
            posts.push(shown);
        }
        self.posts = posts;
        self.page = Some(page.info);
        // Server-reported values are authoritative
        self.query = FeedQuery {
            page: page.info.page,
            limit: page.info.limit,
            ..query
        };
        self.requested = self.query;
    }

    /// Drop everything scoped to the previous key and invalidate fetches
    /// issued under it.
    fn reset_identity(&mut self, key: Option<ApiKey>) -> usize {
        self.key = key;
        self.identity_epoch += 1;
        self.issued_version += 1;
        self.viewer = None;
        self.stats = None;
        self.posts.clear();
        self.page = None;
        self.query.page = 1;
        self.requested = self.query;
        self.pending.clear()
    }
}

pub struct FeedStateEngine {
    transport: Arc<dyn Transport>,
    store: Arc<dyn KeyStore>,
    state: Mutex<FeedState>,
    updates: watch::Sender<FeedSnapshot>,
}

impl FeedStateEngine {
    /// Build an engine, reading the stored key once.
    pub fn new(transport: Arc<dyn Transport>, store: Arc<dyn KeyStore>, settings: FeedSettings) -> Self {
        let key = match store.load() {
            Ok(key) => key,
            Err(e) => {
                tracing::warn!("failed to read stored API key: {:#}", e);
                None
            }
        };
        let query = FeedQuery::new(settings.sort, settings.limit.max(1));
        let (updates, _) = watch::channel(FeedSnapshot::empty(query, key.is_some()));
        Self {
            transport,
            store,
            state: Mutex::new(FeedState {
                key,
                identity_epoch: 0,
                query,
                requested: query,
                issued_version: 0,
                posts: Vec::new(),
                page: None,
                viewer: None,
                stats: None,
                pending: PendingLikeRegistry::new(),
                revision: 0,
            }),
            updates,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FeedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &mut FeedState) {
        state.revision += 1;
        self.updates.send_replace(state.snapshot());
    }

    /// Receive every snapshot the engine publishes.
    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.updates.subscribe()
    }

    pub fn snapshot(&self) -> FeedSnapshot {
        self.lock().snapshot()
    }

    pub fn query(&self) -> FeedQuery {
        self.lock().query
    }

    pub fn is_signed_in(&self) -> bool {
        self.lock().key.is_some()
    }

    pub fn pending_likes(&self) -> Vec<PostId> {
        self.lock().pending.post_ids()
    }

    // ── Identity ──────────────────────────────────────────────────────

    /// Replace the bearer key. An empty key signs out. The new key is
    /// persisted; a persistence failure is logged and otherwise ignored.
    ///
    /// Posts, pending likes and in-flight fetches belong to the previous
    /// identity and are discarded. The feed is then reloaded: fully when
    /// signed in, the public page alone when signed out.
    pub async fn set_api_key(&self, raw: &str) -> Result<()> {
        let key = ApiKey::new(raw);
        if let Err(e) = self.store.save(key.as_ref()) {
            tracing::warn!("unable to persist API key: {:#}", e);
        }
        let dropped = {
            let mut state = self.lock();
            let dropped = state.reset_identity(key.clone());
            self.publish(&mut state);
            dropped
        };
        tracing::info!(signed_in = key.is_some(), dropped_likes = dropped, "API key changed");
        match key {
            Some(_) => self.refresh_all().await,
            None => match self.load_page().await {
                Err(e) if !e.is_recoverable() => Err(e),
                _ => Ok(()),
            },
        }
    }

    pub async fn load_viewer(&self) -> Result<Arc<ViewerIdentity>> {
        let (key, epoch) = {
            let state = self.lock();
            (state.require_key()?, state.identity_epoch)
        };
        let viewer = Arc::new(self.transport.fetch_viewer(&key).await?);
        let mut state = self.lock();
        if state.identity_epoch != epoch {
            return Err(FeedError::Superseded);
        }
        state.viewer = Some(viewer.clone());
        self.publish(&mut state);
        Ok(viewer)
    }

    pub async fn load_dashboard(&self) -> Result<Arc<DashboardStats>> {
        let (key, epoch) = {
            let state = self.lock();
            (state.require_key()?, state.identity_epoch)
        };
        let stats = Arc::new(self.transport.fetch_dashboard(&key).await?);
        let mut state = self.lock();
        if state.identity_epoch != epoch {
            return Err(FeedError::Superseded);
        }
        state.stats = Some(stats.clone());
        self.publish(&mut state);
        Ok(stats)
    }

    // ── Pagination ────────────────────────────────────────────────────

    /// Update the query and fetch. A changed sort or limit goes back to
    /// page 1. On failure the previous query and posts stay in place.
    pub async fn set_query(&self, sort: Option<Sort>, limit: Option<u32>, page: Option<u32>) -> Result<Page> {
        if limit == Some(0) {
            return Err(FeedError::validation("Page size must be greater than 0"));
        }
        if page == Some(0) {
            return Err(FeedError::validation("Page numbers start at 1"));
        }

        // Nothing is published until the page lands, so subscribers never
        // see a query that does not match the posts
        let (query, version) = {
            let mut state = self.lock();
            let query = state.requested.with_changes(sort, limit, page);
            Self::begin_fetch(&mut state, query)
        };

        let result = self.fetch_and_apply(query, version).await;
        if let Err(e) = &result {
            if !e.is_recoverable() {
                let mut state = self.lock();
                if state.issued_version == version {
                    state.requested = state.query;
                }
            }
        }
        result
    }

    /// Fetch the page for the current query.
    pub async fn load_page(&self) -> Result<Page> {
        let (query, version) = {
            let mut state = self.lock();
            let query = state.requested;
            Self::begin_fetch(&mut state, query)
        };
        self.fetch_and_apply(query, version).await
    }

    /// Move forward one page, if the server said there is one.
    pub async fn next_page(&self) -> Result<Page> {
        let (has_next, page) = {
            let state = self.lock();
            (state.page.is_some_and(|p| p.has_next), state.query.page)
        };
        if !has_next {
            return Err(FeedError::validation("Already on the last page"));
        }
        self.set_query(None, None, Some(page + 1)).await
    }

    pub async fn previous_page(&self) -> Result<Page> {
        let (has_previous, page) = {
            let state = self.lock();
            (state.page.is_some_and(|p| p.has_previous), state.query.page)
        };
        if !has_previous || page <= 1 {
            return Err(FeedError::validation("Already on the first page"));
        }
        self.set_query(None, None, Some(page - 1)).await
    }

    fn begin_fetch(state: &mut FeedState, query: FeedQuery) -> (FeedQuery, u64) {
        state.issued_version += 1;
        state.requested = query;
        (query, state.issued_version)
    }

    async fn fetch_and_apply(&self, query: FeedQuery, version: u64) -> Result<Page> {
        let key = self.lock().key.clone();
        tracing::debug!(
            version,
            sort = %query.sort,
            page = query.page,
            limit = query.limit,
            "fetching feed page"
        );

        let page = match self.transport.fetch_posts(key.as_ref(), &query).await {
            Ok(page) => page,
            Err(e) => {
                tracing::warn!(version, error = %e, "feed fetch failed");
                return Err(e);
            }
        };

        let mut state = self.lock();
        if state.issued_version != version {
            tracing::debug!(version, latest = state.issued_version, "discarding stale feed page");
            return Err(FeedError::Superseded);
        }
        state.install_page(query, &page);
        self.publish(&mut state);
        Ok(page)
    }

    // ── Mutations ─────────────────────────────────────────────────────

    /// Publish a post, uploading the attachment first. No optimistic
    /// insertion: the post shows up through the reload that follows, since
    /// only the server knows where it sorts.
    pub async fn compose_post(&self, text: &str, attachment: Option<Attachment>) -> Result<PostId> {
        let text = text.trim();
        if text.is_empty() {
            return Err(FeedError::validation("Message cannot be empty"));
        }
        if text.chars().count() > MAX_POST_CHARS {
            return Err(FeedError::validation(format!(
                "Message is longer than {} characters",
                MAX_POST_CHARS
            )));
        }
        let key = self.lock().require_key()?;

        let mut media_ids = Vec::new();
        if let Some(attachment) = attachment {
            let media_id = self.transport.upload_media(&key, &attachment).await.map_err(|e| {
                tracing::warn!(file = %attachment.file_name, error = %e, "media upload failed");
                e
            })?;
            media_ids.push(media_id);
        }

        let post_id = self
            .transport
            .create_post(
                &key,
                &NewPost {
                    text: text.to_string(),
                    media_ids,
                },
            )
            .await?;
        tracing::info!(post_id, "post published");

        self.reload_after_change(None).await;
        Ok(post_id)
    }

    /// Optimistically like (`currently_liked == false`) or unlike a post.
    ///
    /// The snapshot changes before the request is sent. If the server
    /// rejects it, the post goes back to exactly what it was before, unless
    /// a fetch has replaced it in the meantime, in which case the fetched
    /// record stays. While a toggle is pending, further toggles of the same
    /// post are refused with `LikeInFlight`.
    pub async fn toggle_like(&self, post_id: PostId, currently_liked: bool) -> Result<()> {
        let liked = !currently_liked;
        let (key, epoch) = {
            let mut state = self.lock();
            let key = state.require_key()?;
            if state.pending.is_pending(post_id) {
                return Err(FeedError::LikeInFlight(post_id));
            }
            let idx = state.position(post_id).ok_or_else(|| {
                FeedError::validation(format!("Post {} is not on this page", post_id))
            })?;

            let pre_image = state.posts[idx].clone();
            let optimistic = apply_like(&pre_image, state.viewer.as_deref(), liked)
                .map(Arc::new)
                .unwrap_or_else(|| pre_image.clone());
            state.pending.try_register(post_id, liked, pre_image, optimistic.clone());
            state.posts[idx] = optimistic;
            self.publish(&mut state);
            (key, state.identity_epoch)
        };

        let result = if liked {
            self.transport.like_post(&key, post_id).await
        } else {
            self.transport.unlike_post(&key, post_id).await
        };

        {
            let mut state = self.lock();
            // After a key change the toggle no longer owns any state
            if state.identity_epoch != epoch {
                tracing::debug!(post_id, "like settled after key change, ignored");
                return result;
            }
            let settled = state.pending.complete(post_id);
            if result.is_err() {
                if let (Some(settled), Some(idx)) = (settled, state.position(post_id)) {
                    if Arc::ptr_eq(&state.posts[idx], &settled.optimistic) {
                        state.posts[idx] = settled.pre_image;
                    }
                }
                self.publish(&mut state);
            }
        }

        match result {
            Ok(()) => {
                tracing::info!(post_id, liked, "like updated");
                if let Err(e) = self.load_dashboard().await {
                    if !e.is_recoverable() {
                        tracing::warn!(error = %e, "failed to refresh dashboard after like");
                    }
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(post_id, liked, error = %e, "like rejected, reverted");
                Err(e)
            }
        }
    }

    /// Delete a post. `confirmed` must be true: the engine never prompts,
    /// the caller does. If it was the last post on the page, the reload goes
    /// to page 1.
    pub async fn delete_post(&self, post_id: PostId, confirmed: bool) -> Result<()> {
        if !confirmed {
            return Err(FeedError::validation("Deletion was not confirmed"));
        }
        let key = self.lock().require_key()?;

        self.transport.delete_post(&key, post_id).await?;
        tracing::info!(post_id, "post deleted");

        let page = {
            let state = self.lock();
            let remaining = state.posts.iter().filter(|p| p.id != post_id).count();
            (remaining == 0 && state.query.page != 1).then_some(1)
        };

        self.reload_after_change(page).await;
        Ok(())
    }

    /// Re-fetch identity, stats and the current page concurrently. One
    /// failing does not undo the others; the first real error is returned.
    pub async fn refresh_all(&self) -> Result<()> {
        self.lock().require_key()?;

        let (viewer, stats, page) =
            future::join3(self.load_viewer(), self.load_dashboard(), self.load_page()).await;

        let errors: Vec<FeedError> = [viewer.err(), stats.err(), page.err()]
            .into_iter()
            .flatten()
            .filter(|e| !e.is_recoverable())
            .collect();
        match errors.into_iter().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Follow-up reload after a successful mutation, optionally moving to
    /// another page. Failures here do not undo the mutation, so they are
    /// only logged.
    async fn reload_after_change(&self, page: Option<u32>) {
        let (query, version) = {
            let mut state = self.lock();
            let mut query = state.requested;
            if let Some(page) = page {
                query.page = page;
            }
            Self::begin_fetch(&mut state, query)
        };
        let (page, stats) =
            future::join(self.fetch_and_apply(query, version), self.load_dashboard()).await;
        if let Err(e) = page {
            if !e.is_recoverable() {
                tracing::warn!(error = %e, "feed reload failed");
            }
        }
        if let Err(e) = stats {
            if !e.is_recoverable() {
                tracing::warn!(error = %e, "dashboard reload failed");
            }
        }
    }
}
