use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::SyncResult;
use crate::models::{
    Comment, Movie, MovieId, Notification, NotificationId, SessionPhase, UserIdentity, UserStats,
};
use crate::services::{store::LoadingFlags, IdentityEvent, MutationOutcome};

use super::AppState;

// Request/Response types

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub phase: SessionPhase,
    pub user: Option<UserIdentity>,
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    pub fullname: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// `?force=true` bypasses the debounce window of a read
#[derive(Debug, Default, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default = "default_recommendation_limit")]
    pub limit: usize,
}

fn default_recommendation_limit() -> usize {
    10
}

#[derive(Debug, Serialize)]
pub struct WatchlistMutationResponse {
    pub outcome: MutationOutcome,
    pub in_watchlist: bool,
}

#[derive(Debug, Serialize)]
pub struct LikeResponse {
    pub outcome: MutationOutcome,
    pub liked: bool,
    pub likes_count: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct NotificationsResponse {
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub unread_count: u32,
}

async fn session_response(state: &AppState) -> SessionResponse {
    SessionResponse {
        phase: state.client.phase().await,
        user: state.client.identity().await,
    }
}

// Handlers

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn get_session(State(state): State<AppState>) -> Json<SessionResponse> {
    Json(session_response(&state).await)
}

/// Receives a fresh identity-provider token and verifies it
pub async fn set_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> SyncResult<Json<SessionResponse>> {
    state.tokens.set_token(request.id_token).await;
    state
        .client
        .on_identity_event(IdentityEvent::TokenAvailable)
        .await?;
    Ok(Json(session_response(&state).await))
}

/// The identity provider signed the user out
pub async fn clear_token(State(state): State<AppState>) -> SyncResult<Json<SessionResponse>> {
    state.tokens.clear().await;
    state
        .client
        .on_identity_event(IdentityEvent::TokenAbsent)
        .await?;
    Ok(Json(session_response(&state).await))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> SyncResult<Json<UserIdentity>> {
    let identity = state.client.login(&request.email, &request.password).await?;
    Ok(Json(identity))
}

pub async fn logout(State(state): State<AppState>) -> SyncResult<StatusCode> {
    state.client.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Looks for an existing backend session
pub async fn check_session(State(state): State<AppState>) -> SyncResult<Json<SessionResponse>> {
    state.client.check_backend_session().await?;
    Ok(Json(session_response(&state).await))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Json(request): Json<ProfileUpdateRequest>,
) -> SyncResult<Json<UserIdentity>> {
    let identity = state.client.update_profile(&request.fullname).await?;
    Ok(Json(identity))
}

/// Re-reads the profile and re-runs the staged bootstrap
pub async fn refresh_user_data(State(state): State<AppState>) -> SyncResult<StatusCode> {
    state.client.refresh_user_data().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_watchlist(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> SyncResult<Json<Vec<Movie>>> {
    if query.refresh {
        return Ok(Json(state.client.refresh_watchlist(true).await?));
    }
    Ok(Json(state.client.watchlist().await))
}

pub async fn add_to_watchlist(
    State(state): State<AppState>,
    Json(movie): Json<Movie>,
) -> SyncResult<Json<WatchlistMutationResponse>> {
    let movie_id = movie.id;
    let outcome = state.client.add_to_watchlist(movie).await?;
    Ok(Json(WatchlistMutationResponse {
        outcome,
        in_watchlist: state.client.is_in_watchlist(movie_id).await,
    }))
}

pub async fn remove_from_watchlist(
    State(state): State<AppState>,
    Path(movie_id): Path<MovieId>,
) -> SyncResult<Json<WatchlistMutationResponse>> {
    let outcome = state.client.remove_from_watchlist(movie_id).await?;
    Ok(Json(WatchlistMutationResponse {
        outcome,
        in_watchlist: state.client.is_in_watchlist(movie_id).await,
    }))
}

pub async fn get_likes(
    State(state): State<AppState>,
    Query(query): Query<RefreshQuery>,
) -> SyncResult<Json<Vec<MovieId>>> {
    if query.refresh {
        return Ok(Json(state.client.refresh_likes(true).await?));
    }
    Ok(Json(state.client.liked().await))
}

/// Flips the like; an optional movie body is forwarded to the backend
pub async fn toggle_like(
    State(state): State<AppState>,
    Path(movie_id): Path<MovieId>,
    details: Option<Json<Movie>>,
) -> SyncResult<Json<LikeResponse>> {
    let outcome = state
        .client
        .toggle_like(movie_id, details.map(|Json(movie)| movie))
        .await?;
    let snapshot = state.client.snapshot().await;
    Ok(Json(LikeResponse {
        outcome,
        liked: snapshot.liked.contains(&movie_id),
        likes_count: snapshot.like_counts.get(&movie_id).copied(),
    }))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<ForceQuery>,
) -> SyncResult<Json<Option<UserStats>>> {
    Ok(Json(state.client.user_stats(query.force).await?))
}

pub async fn get_recommendations(
    State(state): State<AppState>,
    Query(query): Query<RecommendationQuery>,
) -> SyncResult<Json<Vec<Movie>>> {
    let movies = state.client.recommended_movies(query.limit).await?;
    Ok(Json(movies.as_ref().clone()))
}

pub async fn train_recommendations(State(state): State<AppState>) -> SyncResult<StatusCode> {
    state.client.train_recommendations().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_comment(
    State(state): State<AppState>,
    Path(movie_id): Path<MovieId>,
    Json(request): Json<CommentRequest>,
) -> SyncResult<StatusCode> {
    state.client.add_comment(movie_id, &request.text).await?;
    Ok(StatusCode::CREATED)
}

pub async fn get_comments(
    State(state): State<AppState>,
    Path(movie_id): Path<MovieId>,
    Query(query): Query<ForceQuery>,
) -> SyncResult<Json<Vec<Comment>>> {
    Ok(Json(state.client.comments(movie_id, query.force).await?))
}

pub async fn get_notifications(
    State(state): State<AppState>,
    Query(query): Query<ForceQuery>,
) -> SyncResult<Json<NotificationsResponse>> {
    let notifications = state.client.refresh_notifications(query.force).await?;
    Ok(Json(NotificationsResponse {
        notifications,
        unread_count: state.client.unread_notifications().await,
    }))
}

/// Reads the unread counter from the backend
pub async fn get_unread_count(
    State(state): State<AppState>,
) -> SyncResult<Json<UnreadCountResponse>> {
    let unread_count = state.client.refresh_unread_count().await?;
    Ok(Json(UnreadCountResponse { unread_count }))
}

pub async fn mark_notification_read(
    State(state): State<AppState>,
    Path(notification_id): Path<NotificationId>,
) -> SyncResult<StatusCode> {
    state.client.mark_notification_read(notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_notifications_read(State(state): State<AppState>) -> SyncResult<StatusCode> {
    state.client.mark_all_notifications_read().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete_notification(
    State(state): State<AppState>,
    Path(notification_id): Path<NotificationId>,
) -> SyncResult<StatusCode> {
    state.client.delete_notification(notification_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Per-entity and per-resource loading flags
pub async fn get_loading(State(state): State<AppState>) -> Json<LoadingFlags> {
    Json(state.client.loading().await)
}
