use serde::{Deserialize, Serialize};
use std::fmt::Display;

use super::{MovieId, UserId};

/// Backend identifier of a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub i64);

impl Display for NotificationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a notification points at
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NotificationData {
    #[serde(default)]
    pub comment_id: Option<i64>,
    #[serde(default)]
    pub parent_comment_id: Option<i64>,
    #[serde(default)]
    pub movie_id: Option<MovieId>,
    #[serde(default)]
    pub movie_title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default)]
    pub sender_id: Option<UserId>,
    #[serde(default)]
    pub sender_name: String,
    #[serde(default)]
    pub sender_avatar: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: NotificationData,
    #[serde(default)]
    pub read_status: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub time_ago: String,
}

impl Notification {
    /// Creates an unread notification with only an id and title
    pub fn new(id: NotificationId, title: impl Into<String>) -> Self {
        Self {
            id,
            sender_id: None,
            sender_name: String::new(),
            sender_avatar: None,
            kind: String::new(),
            title: title.into(),
            message: String::new(),
            data: NotificationData::default(),
            read_status: false,
            created_at: String::new(),
            time_ago: String::new(),
        }
    }
}

/// Body of `GET /notifications/user/{id}/unread-count`
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
pub struct UnreadCount {
    #[serde(default)]
    pub unread_count: u32,
}
