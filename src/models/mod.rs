use serde::{Deserialize, Serialize};
use std::fmt::Display;

pub mod comment;
pub mod movie;
pub mod notification;
pub mod payload;
pub mod stats;
pub mod user;

pub use comment::{Comment, CommentAuthor};
pub use movie::{Genre, LikeReceipt, LikeRequest, Movie, WatchlistEntryRequest, WatchlistReceipt};
pub use notification::{Notification, NotificationData, NotificationId, UnreadCount};
pub use payload::{LikeRecord, ListPayload};
pub use stats::{ActivityKind, RecentActivity, UserStats};
pub use user::{resolve_avatar_url, Profile, SessionPhase, UserIdentity};

/// Backend identifier of a movie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovieId(pub i64);

impl Display for MovieId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for MovieId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Backend identifier of a user account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one authenticated session.
///
/// A fresh id is minted every time the reconciler authenticates, so work
/// started under an older session can be recognised and discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Class of remote resource that shares one backoff record and one
/// single-flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceClass {
    Session,
    Watchlist,
    Likes,
    Stats,
    Recommendations,
    Comments,
    Notifications,
}

impl Display for ResourceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceClass::Session => "session",
            ResourceClass::Watchlist => "watchlist",
            ResourceClass::Likes => "likes",
            ResourceClass::Stats => "stats",
            ResourceClass::Recommendations => "recommendations",
            ResourceClass::Comments => "comments",
            ResourceClass::Notifications => "notifications",
        };
        write!(f, "{}", name)
    }
}
