use super::model::{Liker, Post, ViewerIdentity};

/// Build the optimistic copy of `post` after the viewer likes (`liked = true`)
/// or unlikes it. Returns `None` when the post already shows that state.
///
/// The count moves by one and never drops below zero. The viewer is put at the
/// front of `likers` when liking and removed by id when unliking; without a
/// known viewer the preview is left alone.
pub fn apply_like(post: &Post, viewer: Option<&ViewerIdentity>, liked: bool) -> Option<Post> {
    if post.liked_by_viewer == liked {
        return None;
    }

    let mut next = post.clone();
    next.liked_by_viewer = liked;
    next.like_count = if liked {
        post.like_count.saturating_add(1)
    } else {
        post.like_count.saturating_sub(1)
    };

    if let Some(viewer) = viewer {
        let existing = next.likers.iter().position(|l| l.user_id == viewer.id);
        match (liked, existing) {
            (true, None) => next.likers.insert(
                0,
                Liker {
                    user_id: viewer.id,
                    name: viewer.name.clone(),
                },
            ),
            (false, Some(idx)) => {
                next.likers.remove(idx);
            }
            _ => {}
        }
    }

    Some(next)
}
