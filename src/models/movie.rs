use serde::{Deserialize, Serialize};

use super::{MovieId, UserId};

/// Genre attached to a movie summary
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Genre {
    pub id: i64,
    pub name: String,
}

/// Movie summary as held in the watchlist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default, alias = "posterPath")]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    #[serde(default, alias = "releaseDate")]
    pub release_date: Option<String>,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl Movie {
    /// Creates a bare summary with only an id and title
    pub fn new(id: MovieId, title: impl Into<String>) -> Self {
        Self {
            id,
            title: title.into(),
            overview: String::new(),
            poster_path: None,
            popularity: 0.0,
            release_date: None,
            genres: Vec::new(),
        }
    }
}

// ============================================================================
// Mutation request bodies
// ============================================================================

/// Body of `POST /users/{id}/watchlist/`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WatchlistEntryRequest {
    pub movie_id: MovieId,
    pub title: String,
    pub overview: String,
    pub poster_path: String,
    pub popularity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,
    pub genres: Vec<Genre>,
}

impl From<&Movie> for WatchlistEntryRequest {
    fn from(movie: &Movie) -> Self {
        Self {
            movie_id: movie.id,
            title: movie.title.clone(),
            overview: movie.overview.clone(),
            poster_path: movie.poster_path.clone().unwrap_or_default(),
            popularity: movie.popularity,
            release_date: movie.release_date.clone(),
            genres: movie.genres.clone(),
        }
    }
}

/// Body of `POST /movies/{id}/likes`
///
/// The movie details are optional; the backend uses them to create its own
/// movie record when it has not seen the id before.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LikeRequest {
    pub user_id: UserId,
    #[serde(flatten)]
    pub movie: Option<WatchlistEntryRequest>,
}

// ============================================================================
// Mutation receipts
// ============================================================================

/// Authoritative values returned by a like / unlike call
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct LikeReceipt {
    #[serde(default, alias = "likesCount", alias = "like_count")]
    pub likes_count: Option<u64>,
    #[serde(default)]
    pub liked: Option<bool>,
}

/// Authoritative values returned by a watchlist add / remove call
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct WatchlistReceipt {
    #[serde(default)]
    pub movie: Option<Movie>,
}
