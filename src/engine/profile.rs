//! Profile page state: one user's profile, followers and following, plus
//! the follow toggle. Unlike likes, follows are not optimistic; the toggle
//! waits for the server and then reloads.

use futures_util::future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::model::{UserId, UserProfile, UserRef, ViewerIdentity};
use crate::api::{ApiKey, Transport};
use crate::error::{FeedError, Result};

#[derive(Debug, Clone, Default)]
pub struct ProfileSnapshot {
    pub user_id: Option<UserId>,
    pub viewer: Option<ViewerIdentity>,
    pub profile: Option<UserProfile>,
    pub followers: Vec<UserRef>,
    pub following: Vec<UserRef>,
}

impl ProfileSnapshot {
    /// Whether the viewer is among the profile's followers.
    pub fn is_following(&self) -> bool {
        match (&self.viewer, &self.profile) {
            (Some(viewer), Some(profile)) => profile.followers.iter().any(|f| f.id == viewer.id),
            _ => false,
        }
    }

    /// The viewer is looking at their own profile.
    pub fn is_self(&self) -> bool {
        match (&self.viewer, self.user_id) {
            (Some(viewer), Some(id)) => viewer.id == id,
            _ => false,
        }
    }
}

pub struct ProfileEngine {
    transport: Arc<dyn Transport>,
    key: Option<ApiKey>,
    state: Mutex<ProfileSnapshot>,
}

impl ProfileEngine {
    pub fn new(transport: Arc<dyn Transport>, key: Option<ApiKey>, user_id: Option<UserId>) -> Self {
        Self {
            transport,
            key,
            state: Mutex::new(ProfileSnapshot {
                user_id,
                ..Default::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ProfileSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ProfileSnapshot {
        self.lock().clone()
    }

    fn user_id(&self) -> Result<UserId> {
        self.lock()
            .user_id
            .ok_or_else(|| FeedError::validation("No user ID provided"))
    }

    fn require_key(&self) -> Result<&ApiKey> {
        self.key.as_ref().ok_or(FeedError::SignedOut)
    }

    /// Load the viewer. Used only to decide follow state, so failure is
    /// logged rather than returned.
    pub async fn load_viewer(&self) -> Option<ViewerIdentity> {
        let key = self.key.as_ref()?;
        match self.transport.fetch_viewer(key).await {
            Ok(viewer) => {
                self.lock().viewer = Some(viewer.clone());
                Some(viewer)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load current user");
                None
            }
        }
    }

    pub async fn load_profile(&self) -> Result<UserProfile> {
        let user_id = self.user_id()?;
        let profile = self.transport.fetch_user(self.key.as_ref(), user_id).await?;
        self.lock().profile = Some(profile.clone());
        Ok(profile)
    }

    pub async fn load_followers(&self) -> Result<Vec<UserRef>> {
        let user_id = self.user_id()?;
        let followers = self.transport.fetch_followers(self.key.as_ref(), user_id).await?;
        self.lock().followers = followers.clone();
        Ok(followers)
    }

    pub async fn load_following(&self) -> Result<Vec<UserRef>> {
        let user_id = self.user_id()?;
        let following = self.transport.fetch_following(self.key.as_ref(), user_id).await?;
        self.lock().following = following.clone();
        Ok(following)
    }

    /// Everything the profile page shows, fetched concurrently.
    pub async fn load_all(&self) -> Result<ProfileSnapshot> {
        self.require_key()?;
        let user_id = self.user_id()?;
        tracing::debug!(user_id, "loading profile");

        let (_, profile, followers, following) = future::join4(
            self.load_viewer(),
            self.load_profile(),
            self.load_followers(),
            self.load_following(),
        )
        .await;
        profile?;
        followers?;
        following?;
        Ok(self.snapshot())
    }

    /// Follow (`currently_following == false`) or unfollow the profile's
    /// user, then reload the profile and its followers.
    pub async fn toggle_follow(&self, currently_following: bool) -> Result<()> {
        let key = self.require_key()?;
        let user_id = self.user_id()?;

        if currently_following {
            self.transport.unfollow(key, user_id).await?;
            tracing::info!(user_id, "unfollowed");
        } else {
            self.transport.follow(key, user_id).await?;
            tracing::info!(user_id, "followed");
        }

        let (profile, followers) = future::join(self.load_profile(), self.load_followers()).await;
        if let Err(e) = profile {
            tracing::warn!(user_id, error = %e, "profile reload failed");
        }
        if let Err(e) = followers {
            tracing::warn!(user_id, error = %e, "followers reload failed");
        }
        Ok(())
    }
}
