//! Per-request sync context.
//!
//! Every request gets an id (the caller's `x-request-id` when it is a valid
//! UUID), the resource class its path touches, and the session phase and
//! user seen on entry. The trace span carries all of them, and the response
//! reports the request id plus the session phase left behind by the handler,
//! so a client can tell that a call signed it out.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::models::{ResourceClass, SessionPhase, UserId};

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const SESSION_PHASE_HEADER: &str = "x-session-phase";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub resource: Option<ResourceClass>,
    pub phase: SessionPhase,
    pub user_id: Option<UserId>,
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(REQUEST_ID_HEADER)?
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
}

/// Resource class served under `path`, if any
pub fn resource_for_path(path: &str) -> Option<ResourceClass> {
    let mut segments = path.trim_matches('/').split('/');
    match segments.next()? {
        "session" | "refresh" => Some(ResourceClass::Session),
        "watchlist" => Some(ResourceClass::Watchlist),
        "likes" => Some(ResourceClass::Likes),
        "stats" => Some(ResourceClass::Stats),
        "recommendations" => Some(ResourceClass::Recommendations),
        "notifications" => Some(ResourceClass::Notifications),
        "movies" if segments.nth(1) == Some("comments") => Some(ResourceClass::Comments),
        _ => None,
    }
}

pub async fn request_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = RequestContext {
        request_id: request_id_from_headers(request.headers()).unwrap_or_else(Uuid::new_v4),
        resource: resource_for_path(request.uri().path()),
        phase: state.client.phase().await,
        user_id: state.client.identity().await.map(|identity| identity.id),
    };
    request.extensions_mut().insert(context);

    let mut response = next.run(request).await;

    let phase = state.client.phase().await;
    if phase != context.phase {
        tracing::info!(from = context.phase.as_str(), to = phase.as_str(), "Session phase changed");
    }

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&context.request_id.to_string()) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    headers.insert(SESSION_PHASE_HEADER, HeaderValue::from_static(phase.as_str()));
    response
}

/// Span for `TraceLayer`, tagged with the request context
pub fn make_span_with_context(request: &Request<Body>) -> tracing::Span {
    let context = request.extensions().get::<RequestContext>();
    let request_id = context
        .map(|c| c.request_id.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let resource = context
        .and_then(|c| c.resource)
        .map(|class| class.to_string())
        .unwrap_or_default();

    tracing::info_span!(
        "sync_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
        resource = %resource,
        phase = context.map(|c| c.phase.as_str()).unwrap_or("unknown"),
        user_id = context.and_then(|c| c.user_id).map(|id| id.0),
    )
}
