use serde::{Deserialize, Serialize};

use super::{MovieId, UserId};

/// Public profile of a comment's author
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommentAuthor {
    pub id: UserId,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// One comment of a movie's discussion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Comment {
    pub id: i64,
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub content: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub user: Option<CommentAuthor>,
    #[serde(default)]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub is_liked_by_user: Option<bool>,
    #[serde(default)]
    pub replies: Vec<Comment>,
}
