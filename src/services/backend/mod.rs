/// Remote backend abstraction
///
/// Every call resolves to exactly one of: success with a payload, or one of
/// the `SyncError` outcome classes (`RateLimited`, `Unauthenticated`,
/// `NetworkTimeout`, `Conflict`, `Unknown`). The engine branches on that
/// classification only, never on raw status text.
use crate::{
    error::SyncResult,
    models::{
        Comment, LikeReceipt, LikeRequest, Movie, MovieId, Notification, NotificationId, Profile,
        UserId, UserStats, WatchlistEntryRequest, WatchlistReceipt,
    },
};

pub mod http;

pub use http::HttpBackend;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Exchanges an identity-provider token for a backend profile
    async fn verify_session(&self, id_token: &str) -> SyncResult<Profile>;

    /// Reads the profile attached to an existing backend session cookie
    async fn current_session(&self) -> SyncResult<Profile>;

    /// Password login against the backend
    async fn login(&self, email: &str, password: &str) -> SyncResult<Profile>;

    async fn sign_out(&self) -> SyncResult<()>;

    async fn get_profile(&self, user_id: UserId) -> SyncResult<Profile>;

    async fn update_profile(&self, user_id: UserId, fullname: &str) -> SyncResult<Profile>;

    async fn get_watchlist(&self, user_id: UserId) -> SyncResult<Vec<Movie>>;

    async fn add_to_watchlist(
        &self,
        user_id: UserId,
        entry: &WatchlistEntryRequest,
    ) -> SyncResult<WatchlistReceipt>;

    async fn remove_from_watchlist(
        &self,
        user_id: UserId,
        movie_id: MovieId,
    ) -> SyncResult<WatchlistReceipt>;

    async fn get_likes(&self, user_id: UserId) -> SyncResult<Vec<MovieId>>;

    async fn like(&self, movie_id: MovieId, request: &LikeRequest) -> SyncResult<LikeReceipt>;

    async fn unlike(&self, movie_id: MovieId, user_id: UserId) -> SyncResult<LikeReceipt>;

    async fn get_stats(&self, user_id: UserId) -> SyncResult<UserStats>;

    async fn get_recommendations(&self, user_id: UserId, limit: usize) -> SyncResult<Vec<Movie>>;

    /// Asks the backend to retrain its recommendation models
    async fn train_recommendations(&self) -> SyncResult<()>;

    async fn add_comment(&self, movie_id: MovieId, user_id: UserId, content: &str)
        -> SyncResult<()>;

    /// Comment thread of a movie, as seen by `user_id`
    async fn get_comments(&self, movie_id: MovieId, user_id: UserId) -> SyncResult<Vec<Comment>>;

    /// Most recent notifications of `user_id`, newest first
    async fn get_notifications(&self, user_id: UserId) -> SyncResult<Vec<Notification>>;

    async fn get_unread_count(&self, user_id: UserId) -> SyncResult<u32>;

    async fn mark_notification_read(&self, notification_id: NotificationId) -> SyncResult<()>;

    async fn mark_all_notifications_read(&self, user_id: UserId) -> SyncResult<()>;

    async fn delete_notification(&self, notification_id: NotificationId) -> SyncResult<()>;
}
