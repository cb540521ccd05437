use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use super::handlers;
use super::AppState;
use crate::middleware::request_context::{make_span_with_context, request_context_middleware};

/// Creates the main API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        // Session
        .route("/session", get(handlers::get_session))
        .route(
            "/session/token",
            post(handlers::set_token).delete(handlers::clear_token),
        )
        .route("/session/login", post(handlers::login))
        .route("/session/logout", post(handlers::logout))
        .route("/session/check", post(handlers::check_session))
        .route("/session/profile", put(handlers::update_profile))
        .route("/refresh", post(handlers::refresh_user_data))
        // Watchlist
        .route(
            "/watchlist",
            get(handlers::get_watchlist).post(handlers::add_to_watchlist),
        )
        .route("/watchlist/:movie_id", delete(handlers::remove_from_watchlist))
        // Likes
        .route("/likes", get(handlers::get_likes))
        .route("/likes/:movie_id/toggle", post(handlers::toggle_like))
        // Statistics and recommendations
        .route("/stats", get(handlers::get_stats))
        .route("/recommendations", get(handlers::get_recommendations))
        .route(
            "/recommendations/train",
            post(handlers::train_recommendations),
        )
        // Comments
        .route(
            "/movies/:movie_id/comments",
            get(handlers::get_comments).post(handlers::add_comment),
        )
        // Notifications
        .route("/notifications", get(handlers::get_notifications))
        .route("/notifications/unread-count", get(handlers::get_unread_count))
        .route(
            "/notifications/read-all",
            post(handlers::mark_all_notifications_read),
        )
        .route(
            "/notifications/:notification_id",
            delete(handlers::delete_notification),
        )
        .route(
            "/notifications/:notification_id/read",
            put(handlers::mark_notification_read),
        )
        .route("/loading", get(handlers::get_loading))
        .layer(TraceLayer::new_for_http().make_span_with(make_span_with_context))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_context_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
