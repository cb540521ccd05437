/// reqwest implementation of the backend
///
/// Endpoint layout:
/// - Session: `/users/verify`, `/users/me`, `/auth/login`, `/users/signout`
/// - Profile: `/users/{id}`
/// - Watchlist: `/users/{id}/watchlist/`, `/users/{id}/watchlist/{movie}`
/// - Likes: `/users/{id}/likes`, `/movies/{movie}/likes`
/// - Stats: `/users/{id}/stats`
/// - Recommendations: `/recommendations/user/{id}`, `/recommendations/train`
/// - Comments: `/movies/{movie}/comments/`
/// - Notifications: `/notifications/user/{id}`, `/notifications/user/{id}/unread-count`,
///   `/notifications/user/{id}/mark-all-read`, `/notifications/{n}`, `/notifications/{n}/mark-read`
use reqwest::{Client as HttpClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::{
    error::{SyncError, SyncResult},
    models::{
        Comment, LikeReceipt, LikeRecord, LikeRequest, ListPayload, Movie, MovieId, Notification,
        NotificationId, Profile, UnreadCount, UserId, UserStats, WatchlistEntryRequest,
        WatchlistReceipt,
    },
    services::backend::Backend,
};

/// `{ "user": { ... } }` wrapper used by the session endpoints
#[derive(Deserialize)]
struct SessionEnvelope {
    user: Profile,
}

#[derive(Clone)]
pub struct HttpBackend {
    http_client: HttpClient,
    api_url: String,
    training_timeout: Duration,
}

impl HttpBackend {
    /// Creates a backend client with a cookie store, so a session
    /// established by verify/login is carried on later calls
    pub fn new(
        api_url: String,
        request_timeout: Duration,
        training_timeout: Duration,
    ) -> SyncResult<Self> {
        let http_client = HttpClient::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            api_url: api_url.trim_end_matches('/').to_string(),
            training_timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    /// Sends the request and classifies non-success statuses
    async fn send(&self, request: RequestBuilder) -> SyncResult<reqwest::Response> {
        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::debug!(status = %status, body = %body, "Backend call failed");
            return Err(SyncError::from_status(status, body));
        }

        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<T> {
        let response = self.send(request).await?;
        let text = response.text().await?;

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(error = %e, response = %text, "Failed to deserialize backend response");
            SyncError::Decode(e.to_string())
        })
    }

    /// Reads an optional body; empty or unparseable bodies yield the default
    async fn read_receipt<T: DeserializeOwned + Default>(
        &self,
        request: RequestBuilder,
    ) -> SyncResult<T> {
        let response = self.send(request).await?;
        let text = response.text().await.unwrap_or_default();

        if text.trim().is_empty() {
            return Ok(T::default());
        }

        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    async fn read_list<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<Vec<T>> {
        let payload: ListPayload = self.read_json(request).await?;
        Ok(payload.into_items())
    }
}

#[async_trait::async_trait]
impl Backend for HttpBackend {
    async fn verify_session(&self, id_token: &str) -> SyncResult<Profile> {
        self.read_json(
            self.http_client
                .post(self.url("/users/verify"))
                .json(&json!({ "idToken": id_token })),
        )
        .await
    }

    async fn current_session(&self) -> SyncResult<Profile> {
        let envelope: SessionEnvelope = self
            .read_json(self.http_client.get(self.url("/users/me")))
            .await?;
        Ok(envelope.user)
    }

    async fn login(&self, email: &str, password: &str) -> SyncResult<Profile> {
        let envelope: SessionEnvelope = self
            .read_json(
                self.http_client
                    .post(self.url("/auth/login"))
                    .json(&json!({ "email": email, "password": password })),
            )
            .await?;
        Ok(envelope.user)
    }

    async fn sign_out(&self) -> SyncResult<()> {
        self.send(self.http_client.post(self.url("/users/signout")).json(&json!({})))
            .await?;
        Ok(())
    }

    async fn get_profile(&self, user_id: UserId) -> SyncResult<Profile> {
        self.read_json(self.http_client.get(self.url(&format!("/users/{}", user_id))))
            .await
    }

    async fn update_profile(&self, user_id: UserId, fullname: &str) -> SyncResult<Profile> {
        self.read_json(
            self.http_client
                .put(self.url(&format!("/users/{}", user_id)))
                .json(&json!({ "fullname": fullname })),
        )
        .await
    }

    async fn get_watchlist(&self, user_id: UserId) -> SyncResult<Vec<Movie>> {
        self.read_list(
            self.http_client
                .get(self.url(&format!("/users/{}/watchlist/", user_id)))
                .header("Accept", "application/json"),
        )
        .await
    }

    async fn add_to_watchlist(
        &self,
        user_id: UserId,
        entry: &WatchlistEntryRequest,
    ) -> SyncResult<WatchlistReceipt> {
        self.read_receipt(
            self.http_client
                .post(self.url(&format!("/users/{}/watchlist/", user_id)))
                .json(entry),
        )
        .await
    }

    async fn remove_from_watchlist(
        &self,
        user_id: UserId,
        movie_id: MovieId,
    ) -> SyncResult<WatchlistReceipt> {
        self.read_receipt(
            self.http_client
                .delete(self.url(&format!("/users/{}/watchlist/{}", user_id, movie_id))),
        )
        .await
    }

    async fn get_likes(&self, user_id: UserId) -> SyncResult<Vec<MovieId>> {
        let records: Vec<LikeRecord> = self
            .read_list(self.http_client.get(self.url(&format!("/users/{}/likes", user_id))))
            .await?;
        Ok(records.into_iter().map(|record| record.movie_id).collect())
    }

    async fn like(&self, movie_id: MovieId, request: &LikeRequest) -> SyncResult<LikeReceipt> {
        self.read_receipt(
            self.http_client
                .post(self.url(&format!("/movies/{}/likes", movie_id)))
                .json(request),
        )
        .await
    }

    async fn unlike(&self, movie_id: MovieId, user_id: UserId) -> SyncResult<LikeReceipt> {
        self.read_receipt(
            self.http_client
                .delete(self.url(&format!("/movies/{}/likes", movie_id)))
                .json(&json!({ "user_id": user_id })),
        )
        .await
    }

    async fn get_stats(&self, user_id: UserId) -> SyncResult<UserStats> {
        self.read_json(self.http_client.get(self.url(&format!("/users/{}/stats", user_id))))
            .await
    }

    async fn get_recommendations(&self, user_id: UserId, limit: usize) -> SyncResult<Vec<Movie>> {
        self.read_list(
            self.http_client
                .get(self.url(&format!("/recommendations/user/{}", user_id)))
                .query(&[("limit", limit)]),
        )
        .await
    }

    async fn train_recommendations(&self) -> SyncResult<()> {
        self.send(
            self.http_client
                .post(self.url("/recommendations/train"))
                .timeout(self.training_timeout)
                .json(&json!({})),
        )
        .await?;
        Ok(())
    }

    async fn add_comment(
        &self,
        movie_id: MovieId,
        user_id: UserId,
        content: &str,
    ) -> SyncResult<()> {
        self.send(
            self.http_client
                .post(self.url(&format!("/movies/{}/comments/", movie_id)))
                .json(&json!({ "user_id": user_id, "content": content })),
        )
        .await?;
        Ok(())
    }

    async fn get_comments(&self, movie_id: MovieId, user_id: UserId) -> SyncResult<Vec<Comment>> {
        self.read_list(
            self.http_client
                .get(self.url(&format!("/movies/{}/comments/", movie_id)))
                .query(&[("user_id", user_id.0)]),
        )
        .await
    }

    async fn get_notifications(&self, user_id: UserId) -> SyncResult<Vec<Notification>> {
        self.read_list(
            self.http_client
                .get(self.url(&format!("/notifications/user/{}", user_id)))
                .query(&[("per_page", 50)]),
        )
        .await
    }

    async fn get_unread_count(&self, user_id: UserId) -> SyncResult<u32> {
        let count: UnreadCount = self
            .read_receipt(
                self.http_client
                    .get(self.url(&format!("/notifications/user/{}/unread-count", user_id))),
            )
            .await?;
        Ok(count.unread_count)
    }

    async fn mark_notification_read(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.send(
            self.http_client
                .put(self.url(&format!("/notifications/{}/mark-read", notification_id)))
                .json(&json!({})),
        )
        .await?;
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user_id: UserId) -> SyncResult<()> {
        self.send(
            self.http_client
                .put(self.url(&format!("/notifications/user/{}/mark-all-read", user_id)))
                .json(&json!({})),
        )
        .await?;
        Ok(())
    }

    async fn delete_notification(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.send(
            self.http_client
                .delete(self.url(&format!("/notifications/{}", notification_id))),
        )
        .await?;
        Ok(())
    }
}
