use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::models::{MovieId, NotificationId};

/// Sync engine errors.
///
/// The first five variants are the outcome classes every backend call is
/// interpreted into; the rest are raised locally before any call is made.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SyncError {
    #[error("Rate limited by backend")]
    RateLimited,

    #[error("Not authenticated with backend")]
    Unauthenticated,

    #[error("Request timed out")]
    NetworkTimeout,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Backend error: {0}")]
    Unknown(String),

    #[error("No user is signed in")]
    NotSignedIn,

    #[error("A mutation for movie {0} is already in flight")]
    MutationInFlight(MovieId),

    #[error("An update of notification {0} is already in flight")]
    NotificationInFlight(NotificationId),

    #[error("Marking all notifications read is already in flight")]
    NotificationsInFlight,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to decode backend response: {0}")]
    Decode(String),
}

impl SyncError {
    /// Classifies a non-success HTTP status
    pub fn from_status(status: reqwest::StatusCode, body: String) -> Self {
        match status.as_u16() {
            429 => SyncError::RateLimited,
            401 | 403 => SyncError::Unauthenticated,
            409 => SyncError::Conflict(body),
            408 | 504 => SyncError::NetworkTimeout,
            _ => SyncError::Unknown(format!("status {}: {}", status, body)),
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SyncError::RateLimited => "Server busy, please retry in a few seconds".to_string(),
            SyncError::Unauthenticated | SyncError::NotSignedIn => {
                "Please sign in again".to_string()
            }
            SyncError::NetworkTimeout => "The server took too long to respond".to_string(),
            SyncError::MutationInFlight(_)
            | SyncError::NotificationInFlight(_)
            | SyncError::NotificationsInFlight => "Still saving your previous change".to_string(),
            SyncError::InvalidInput(msg) => msg.clone(),
            SyncError::Conflict(_) | SyncError::Unknown(_) | SyncError::Decode(_) => {
                "Something went wrong, your data may be out of date".to_string()
            }
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::NetworkTimeout
        } else if let Some(status) = e.status() {
            SyncError::from_status(status, e.to_string())
        } else if e.is_decode() {
            SyncError::Decode(e.to_string())
        } else {
            SyncError::Unknown(e.to_string())
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match &self {
            SyncError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            SyncError::Unauthenticated | SyncError::NotSignedIn => StatusCode::UNAUTHORIZED,
            SyncError::Conflict(_)
            | SyncError::MutationInFlight(_)
            | SyncError::NotificationInFlight(_)
            | SyncError::NotificationsInFlight => StatusCode::CONFLICT,
            SyncError::NetworkTimeout => StatusCode::GATEWAY_TIMEOUT,
            SyncError::Unknown(_) | SyncError::Decode(_) => StatusCode::BAD_GATEWAY,
            SyncError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "message": self.user_message(),
        }));

        (status, body).into_response()
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
