use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use cinesync::api::{create_router, AppState};
use cinesync::config::Config;
use cinesync::error::{SyncError, SyncResult};
use cinesync::models::{
    Comment, LikeReceipt, LikeRequest, Movie, MovieId, Notification, NotificationId, Profile,
    UserId, UserStats, WatchlistEntryRequest, WatchlistReceipt,
};
use cinesync::services::Backend;

/// In-memory backend with switchable failures
#[derive(Default)]
struct FakeBackend {
    state: Mutex<FakeState>,
}

#[derive(Default)]
struct FakeState {
    watchlist: Vec<Movie>,
    liked: BTreeSet<MovieId>,
    like_counts: std::collections::HashMap<MovieId, u64>,
    recommendation_calls: usize,
    notifications: Vec<Notification>,
    comments: Vec<Comment>,
    fail_writes: Option<SyncError>,
}

impl FakeBackend {
    fn failing_writes(error: SyncError) -> Self {
        let backend = Self::default();
        backend.lock().fail_writes = Some(error);
        backend
    }

    fn with_inbox() -> Self {
        let backend = Self::default();
        backend.lock().notifications = vec![
            Notification::new(NotificationId(1), "New reply"),
            Notification::new(NotificationId(2), "New like"),
        ];
        backend
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn check_write(&self) -> SyncResult<()> {
        match &self.lock().fail_writes {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

fn ada() -> Profile {
    Profile {
        id: UserId(1),
        fullname: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        image: Some("static/uploads/ada.png".to_string()),
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn verify_session(&self, id_token: &str) -> SyncResult<Profile> {
        if id_token == "good-token" {
            Ok(ada())
        } else {
            Err(SyncError::Unauthenticated)
        }
    }

    async fn current_session(&self) -> SyncResult<Profile> {
        Err(SyncError::Unauthenticated)
    }

    async fn login(&self, email: &str, password: &str) -> SyncResult<Profile> {
        if email == "ada@example.com" && password == "secret" {
            Ok(ada())
        } else {
            Err(SyncError::Unauthenticated)
        }
    }

    async fn sign_out(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn get_profile(&self, _user_id: UserId) -> SyncResult<Profile> {
        Ok(ada())
    }

    async fn update_profile(&self, _user_id: UserId, fullname: &str) -> SyncResult<Profile> {
        Ok(Profile {
            fullname: fullname.to_string(),
            ..ada()
        })
    }

    async fn get_watchlist(&self, _user_id: UserId) -> SyncResult<Vec<Movie>> {
        Ok(self.lock().watchlist.clone())
    }

    async fn add_to_watchlist(
        &self,
        _user_id: UserId,
        entry: &WatchlistEntryRequest,
    ) -> SyncResult<WatchlistReceipt> {
        self.check_write()?;
        let movie = Movie::new(entry.movie_id, entry.title.clone());
        self.lock().watchlist.push(movie.clone());
        Ok(WatchlistReceipt { movie: Some(movie) })
    }

    async fn remove_from_watchlist(
        &self,
        _user_id: UserId,
        movie_id: MovieId,
    ) -> SyncResult<WatchlistReceipt> {
        self.check_write()?;
        self.lock().watchlist.retain(|m| m.id != movie_id);
        Ok(WatchlistReceipt::default())
    }

    async fn get_likes(&self, _user_id: UserId) -> SyncResult<Vec<MovieId>> {
        Ok(self.lock().liked.iter().copied().collect())
    }

    async fn like(&self, movie_id: MovieId, _request: &LikeRequest) -> SyncResult<LikeReceipt> {
        self.check_write()?;
        let mut state = self.lock();
        state.liked.insert(movie_id);
        let count = state.like_counts.entry(movie_id).or_insert(10);
        *count += 1;
        Ok(LikeReceipt {
            likes_count: Some(*count),
            liked: Some(true),
        })
    }

    async fn unlike(&self, movie_id: MovieId, _user_id: UserId) -> SyncResult<LikeReceipt> {
        self.check_write()?;
        let mut state = self.lock();
        state.liked.remove(&movie_id);
        let count = state.like_counts.entry(movie_id).or_insert(1);
        *count -= 1;
        Ok(LikeReceipt {
            likes_count: Some(*count),
            liked: Some(false),
        })
    }

    async fn get_stats(&self, _user_id: UserId) -> SyncResult<UserStats> {
        let state = self.lock();
        Ok(UserStats {
            liked_movies: state.liked.len() as u32,
            watchlist_count: state.watchlist.len() as u32,
            member_since: "2024-01-01".to_string(),
            ..UserStats::default()
        })
    }

    async fn get_recommendations(&self, _user_id: UserId, limit: usize) -> SyncResult<Vec<Movie>> {
        self.lock().recommendation_calls += 1;
        Ok((1..=limit as i64)
            .map(|id| Movie::new(MovieId(100 + id), format!("Pick {}", id)))
            .collect())
    }

    async fn train_recommendations(&self) -> SyncResult<()> {
        Ok(())
    }

    async fn add_comment(&self, movie_id: MovieId, user_id: UserId, content: &str) -> SyncResult<()> {
        self.check_write()?;
        let mut state = self.lock();
        let id = state.comments.len() as i64 + 1;
        let comment = serde_json::from_value(json!({
            "id": id,
            "user_id": user_id,
            "movie_id": movie_id,
            "content": content
        }))
        .unwrap();
        state.comments.push(comment);
        Ok(())
    }

    async fn get_comments(&self, movie_id: MovieId, _user_id: UserId) -> SyncResult<Vec<Comment>> {
        Ok(self
            .lock()
            .comments
            .iter()
            .filter(|c| c.movie_id == movie_id)
            .cloned()
            .collect())
    }

    async fn get_notifications(&self, _user_id: UserId) -> SyncResult<Vec<Notification>> {
        Ok(self.lock().notifications.clone())
    }

    async fn get_unread_count(&self, _user_id: UserId) -> SyncResult<u32> {
        Ok(self.lock().notifications.iter().filter(|n| !n.read_status).count() as u32)
    }

    async fn mark_notification_read(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.check_write()?;
        for notification in self.lock().notifications.iter_mut() {
            if notification.id == notification_id {
                notification.read_status = true;
            }
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, _user_id: UserId) -> SyncResult<()> {
        self.check_write()?;
        for notification in self.lock().notifications.iter_mut() {
            notification.read_status = true;
        }
        Ok(())
    }

    async fn delete_notification(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.check_write()?;
        self.lock().notifications.retain(|n| n.id != notification_id);
        Ok(())
    }
}

/// Timing with no backoff waits; staged bootstrap left at its defaults so
/// it never fires during a test
fn fast_config() -> Config {
    serde_json::from_value(json!({
        "watchlist_min_interval_ms": 0,
        "likes_min_interval_ms": 0,
        "stats_min_interval_ms": 0,
        "recommendations_min_interval_ms": 0,
        "comments_min_interval_ms": 0,
        "notifications_min_interval_ms": 0,
        "verify_delay_ms": 0,
        "session_check_delay_ms": 0,
    }))
    .unwrap()
}

fn create_test_server_with(backend: Arc<FakeBackend>) -> TestServer {
    let state = AppState::new(backend, fast_config().sync_settings());
    let app = create_router(state);
    TestServer::new(app).unwrap()
}

fn create_test_server() -> TestServer {
    create_test_server_with(Arc::new(FakeBackend::default()))
}

async fn login(server: &TestServer) {
    server
        .post("/session/login")
        .json(&json!({ "email": "ada@example.com", "password": "secret" }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server();
    let response = server.get("/health").await;
    response.assert_status_ok();
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let server = create_test_server();
    let response = server.get("/health").await;
    assert!(response.headers().get("x-request-id").is_some());
}

#[tokio::test]
async fn test_session_phase_header_follows_handler() {
    let server = create_test_server();

    let response = server.get("/health").await;
    assert_eq!(response.headers().get("x-session-phase").unwrap(), "unknown");

    let response = server
        .post("/session/login")
        .json(&json!({ "email": "ada@example.com", "password": "secret" }))
        .await;
    response.assert_status_ok();
    assert_eq!(response.headers().get("x-session-phase").unwrap(), "authenticated");
}

#[tokio::test]
async fn test_session_starts_unknown() {
    let server = create_test_server();

    let response = server.get("/session").await;
    response.assert_status_ok();
    let session: serde_json::Value = response.json();
    assert_eq!(session["phase"], "unknown");
    assert!(session["user"].is_null());
}

#[tokio::test]
async fn test_mutation_without_session_is_unauthorized() {
    let server = create_test_server();

    let response = server
        .post("/watchlist")
        .json(&json!({ "id": 42, "title": "Movie 42" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_resolves_avatar() {
    let server = create_test_server();

    let response = server
        .post("/session/login")
        .json(&json!({ "email": "ada@example.com", "password": "secret" }))
        .await;

    response.assert_status_ok();
    let user: serde_json::Value = response.json();
    assert_eq!(user["display_name"], "Ada Lovelace");
    assert_eq!(user["avatar_url"], "http://localhost:5000/static/uploads/ada.png");

    let session: serde_json::Value = server.get("/session").await.json();
    assert_eq!(session["phase"], "authenticated");
}

#[tokio::test]
async fn test_wrong_password_is_unauthorized() {
    let server = create_test_server();

    let response = server
        .post("/session/login")
        .json(&json!({ "email": "ada@example.com", "password": "nope" }))
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_watchlist_add_and_remove() {
    let server = create_test_server();
    login(&server).await;

    let response = server
        .post("/watchlist")
        .json(&json!({ "id": 42, "title": "Movie 42" }))
        .await;
    response.assert_status_ok();
    let added: serde_json::Value = response.json();
    assert_eq!(added["outcome"], "committed");
    assert_eq!(added["in_watchlist"], true);

    let watchlist: Vec<serde_json::Value> = server.get("/watchlist").await.json();
    assert_eq!(watchlist.len(), 1);
    assert_eq!(watchlist[0]["id"], 42);

    let response = server.delete("/watchlist/42").await;
    response.assert_status_ok();
    let removed: serde_json::Value = response.json();
    assert_eq!(removed["in_watchlist"], false);

    let watchlist: Vec<serde_json::Value> = server.get("/watchlist?refresh=true").await.json();
    assert!(watchlist.is_empty());
}

#[tokio::test]
async fn test_failed_add_rolls_back() {
    let backend = Arc::new(FakeBackend::failing_writes(SyncError::Unknown(
        "storage offline".to_string(),
    )));
    let server = create_test_server_with(backend);
    login(&server).await;

    let response = server
        .post("/watchlist")
        .json(&json!({ "id": 42, "title": "Movie 42" }))
        .await;
    response.assert_status(StatusCode::BAD_GATEWAY);

    let watchlist: Vec<serde_json::Value> = server.get("/watchlist").await.json();
    assert!(watchlist.is_empty());

    let loading: serde_json::Value = server.get("/loading").await.json();
    assert_eq!(loading["watchlist"], json!([]));
}

#[tokio::test]
async fn test_rate_limited_write_reports_busy() {
    let backend = Arc::new(FakeBackend::failing_writes(SyncError::RateLimited));
    let server = create_test_server_with(backend);
    login(&server).await;

    let response = server.post("/likes/7/toggle").await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json();
    assert!(body["message"].as_str().unwrap().contains("Server busy"));

    let likes: Vec<i64> = server.get("/likes").await.json();
    assert!(likes.is_empty());
}

#[tokio::test]
async fn test_toggle_like_uses_backend_count() {
    let server = create_test_server();
    login(&server).await;

    let liked: serde_json::Value = server
        .post("/likes/7/toggle")
        .json(&json!({ "id": 7, "title": "Seven" }))
        .await
        .json();
    assert_eq!(liked["liked"], true);
    assert_eq!(liked["likes_count"], 11);

    let unliked: serde_json::Value = server.post("/likes/7/toggle").await.json();
    assert_eq!(unliked["liked"], false);
    assert_eq!(unliked["likes_count"], 10);
}

#[tokio::test]
async fn test_token_verification_and_sign_out() {
    let server = create_test_server();

    let response = server
        .post("/session/token")
        .json(&json!({ "id_token": "good-token" }))
        .await;
    response.assert_status_ok();
    let session: serde_json::Value = response.json();
    assert_eq!(session["phase"], "authenticated");
    assert_eq!(session["user"]["email"], "ada@example.com");

    let response = server.delete("/session/token").await;
    response.assert_status_ok();
    let session: serde_json::Value = response.json();
    assert_eq!(session["phase"], "anonymous");
    assert!(session["user"].is_null());
}

#[tokio::test]
async fn test_rejected_token_goes_anonymous() {
    let server = create_test_server();

    let response = server
        .post("/session/token")
        .json(&json!({ "id_token": "forged" }))
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let session: serde_json::Value = server.get("/session").await.json();
    assert_eq!(session["phase"], "anonymous");
}

#[tokio::test]
async fn test_stats_are_served_in_backend_shape() {
    let server = create_test_server();
    login(&server).await;

    let response = server.get("/stats?force=true").await;
    response.assert_status_ok();
    let stats: serde_json::Value = response.json();
    assert_eq!(stats["likedMovies"], 0);
    assert_eq!(stats["memberSince"], "2024-01-01");
}

#[tokio::test]
async fn test_recommendations_are_cached() {
    let backend = Arc::new(FakeBackend::default());
    let server = create_test_server_with(Arc::clone(&backend));
    login(&server).await;

    let first: Vec<serde_json::Value> = server.get("/recommendations?limit=2").await.json();
    let second: Vec<serde_json::Value> = server.get("/recommendations?limit=2").await.json();

    assert_eq!(first.len(), 2);
    assert_eq!(first, second);
    assert_eq!(backend.lock().recommendation_calls, 1);
}

#[tokio::test]
async fn test_empty_comment_is_bad_request() {
    let server = create_test_server();
    login(&server).await;

    let response = server
        .post("/movies/3/comments")
        .json(&json!({ "text": "  " }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/movies/3/comments")
        .json(&json!({ "text": "Loved it" }))
        .await;
    response.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn test_logout_clears_state() {
    let server = create_test_server();
    login(&server).await;
    server
        .post("/watchlist")
        .json(&json!({ "id": 1, "title": "One" }))
        .await
        .assert_status_ok();

    server
        .post("/session/logout")
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let watchlist: Vec<serde_json::Value> = server.get("/watchlist").await.json();
    assert!(watchlist.is_empty());
    let session: serde_json::Value = server.get("/session").await.json();
    assert_eq!(session["phase"], "anonymous");
}

#[tokio::test]
async fn test_profile_update() {
    let server = create_test_server();
    login(&server).await;

    let response = server
        .put("/session/profile")
        .json(&json!({ "fullname": "Countess Ada" }))
        .await;

    response.assert_status_ok();
    let user: serde_json::Value = response.json();
    assert_eq!(user["display_name"], "Countess Ada");
}

#[tokio::test]
async fn test_notification_inbox_edits() {
    let server = create_test_server_with(Arc::new(FakeBackend::with_inbox()));
    login(&server).await;

    let inbox: serde_json::Value = server.get("/notifications?force=true").await.json();
    assert_eq!(inbox["notifications"].as_array().unwrap().len(), 2);

    let unread: serde_json::Value = server.get("/notifications/unread-count").await.json();
    assert_eq!(unread["unread_count"], 2);

    server
        .put("/notifications/1/read")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    // Inside the debounce window: served from the engine
    let inbox: serde_json::Value = server.get("/notifications").await.json();
    assert_eq!(inbox["notifications"][0]["read_status"], true);
    assert_eq!(inbox["unread_count"], 1);

    server
        .delete("/notifications/2")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let inbox: serde_json::Value = server.get("/notifications").await.json();
    assert_eq!(inbox["notifications"].as_array().unwrap().len(), 1);
    assert_eq!(inbox["unread_count"], 0);

    server
        .post("/notifications/read-all")
        .await
        .assert_status(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_notifications_require_session() {
    let server = create_test_server();

    server
        .get("/notifications")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
    server
        .post("/notifications/read-all")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_failed_notification_edit_keeps_inbox() {
    let backend = Arc::new(FakeBackend::with_inbox());
    backend.lock().fail_writes = Some(SyncError::Unknown("offline".to_string()));
    let server = create_test_server_with(backend);
    login(&server).await;
    server.get("/notifications?force=true").await.assert_status_ok();

    server
        .delete("/notifications/1")
        .await
        .assert_status(StatusCode::BAD_GATEWAY);

    let inbox: serde_json::Value = server.get("/notifications").await.json();
    assert_eq!(inbox["notifications"][0]["id"], 1);
    assert_eq!(inbox["notifications"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_comment_thread_is_listed() {
    let backend = Arc::new(FakeBackend::default());
    backend.add_comment(MovieId(5), UserId(2), "First!").await.unwrap();
    let server = create_test_server_with(backend);
    login(&server).await;

    let response = server.get("/movies/5/comments").await;
    response.assert_status_ok();
    let comments: Vec<serde_json::Value> = response.json();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["content"], "First!");

    let other: Vec<serde_json::Value> = server.get("/movies/6/comments").await.json();
    assert!(other.is_empty());
}
