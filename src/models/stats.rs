use serde::{Deserialize, Serialize};

use super::MovieId;

/// Aggregate usage statistics for the signed-in user.
///
/// Always replaced wholesale by the statistics fetcher; never edited in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    #[serde(default)]
    pub liked_movies: u32,
    #[serde(default)]
    pub watchlist_count: u32,
    #[serde(default)]
    pub comments_count: u32,
    #[serde(default)]
    pub member_since: String,
    #[serde(default)]
    pub recent_activities: Vec<RecentActivity>,
    #[serde(default)]
    pub favorite_genres: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub movie_id: MovieId,
    #[serde(default)]
    pub movie_title: Option<String>,
    pub date: String,
    #[serde(default)]
    pub time_ago: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Like,
    Watchlist,
    Comment,
}
