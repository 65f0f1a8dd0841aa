use std::collections::HashMap;
use std::sync::Arc;

use super::model::{Post, PostId};

/// An optimistic like toggle waiting for the server.
#[derive(Debug, Clone)]
pub struct PendingLike {
    pub post_id: PostId,
    /// State the viewer asked for.
    pub liked: bool,
    /// Record as it was before the toggle, restored on failure.
    pub pre_image: Arc<Post>,
    /// Record installed by the toggle. Used to tell whether a fetch has
    /// replaced it in the meantime.
    pub optimistic: Arc<Post>,
}

/// One in-flight like per post. A second toggle for the same post is refused
/// until the first one settles.
pub struct PendingLikeRegistry {
    likes: HashMap<PostId, PendingLike>,
}

impl Default for PendingLikeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PendingLikeRegistry {
    pub fn new() -> Self {
        Self {
            likes: HashMap::new(),
        }
    }

    /// Try to register a toggle. Returns false if one is already pending.
    pub fn try_register(
        &mut self,
        post_id: PostId,
        liked: bool,
        pre_image: Arc<Post>,
        optimistic: Arc<Post>,
    ) -> bool {
        if self.likes.contains_key(&post_id) {
            return false;
        }
        self.likes.insert(
            post_id,
            PendingLike {
                post_id,
                liked,
                pre_image,
                optimistic,
            },
        );
        true
    }

    pub fn get(&self, post_id: PostId) -> Option<&PendingLike> {
        self.likes.get(&post_id)
    }

    /// Re-point a pending toggle at records from a fresh fetch. Returns false
    /// if nothing is pending for the post.
    pub fn rebase(&mut self, post_id: PostId, pre_image: Arc<Post>, optimistic: Arc<Post>) -> bool {
        match self.likes.get_mut(&post_id) {
            Some(like) => {
                like.pre_image = pre_image;
                like.optimistic = optimistic;
                true
            }
            None => false,
        }
    }

    /// Mark the toggle settled (acked or rejected).
    pub fn complete(&mut self, post_id: PostId) -> Option<PendingLike> {
        self.likes.remove(&post_id)
    }

    pub fn is_pending(&self, post_id: PostId) -> bool {
        self.likes.contains_key(&post_id)
    }

    pub fn post_ids(&self) -> Vec<PostId> {
        let mut ids: Vec<PostId> = self.likes.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Forget every pending toggle, returning how many there were. Their
    /// requests still settle, but nothing is reverted or rebased for them.
    pub fn clear(&mut self) -> usize {
        let count = self.likes.len();
        self.likes.clear();
        count
    }
}
