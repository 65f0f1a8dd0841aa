//! Error taxonomy shared by the transport and the engines.
//!
//! Every variant renders as a single human-readable message; that string is
//! what a renderer shows to the user.

use thiserror::Error;

use crate::engine::model::PostId;

pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Rejected locally before any request was issued.
    #[error("{0}")]
    Validation(String),

    /// Non-success HTTP status, unreachable server, or an undecodable body.
    #[error("{message}")]
    Transport { status: Option<u16>, message: String },

    /// Success-shaped envelope carrying `result: false`.
    #[error("{0}")]
    Application(String),

    /// No API key is set.
    #[error("Set an API key to continue")]
    SignedOut,

    /// A like toggle for this post has not settled yet.
    #[error("Still updating the like on post {0}")]
    LikeInFlight(PostId),

    /// The response belonged to a query that has since been replaced.
    #[error("Response superseded by a newer request")]
    Superseded,
}

impl FeedError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }

    /// Outcomes that need no user-facing error: a stale fetch being dropped,
    /// or a repeated like click while the first one is still pending.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Superseded | Self::LikeInFlight(_))
    }

    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        let status = err.status().map(|s| s.as_u16());
        let message = if err.is_timeout() {
            "Request timed out".to_string()
        } else if err.is_connect() {
            "Could not reach the server".to_string()
        } else {
            format!("Request failed: {}", err)
        };
        Self::Transport { status, message }
    }
}
