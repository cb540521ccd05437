use serde::{Deserialize, Serialize};

use super::UserId;

/// Profile as returned by the backend's verify / me / profile endpoints
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Profile {
    pub id: UserId,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// The signed-in user as seen by the presentation layer
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UserIdentity {
    pub id: UserId,
    pub display_name: String,
    pub email: String,
    pub avatar_url: Option<String>,
}

impl UserIdentity {
    /// Builds an identity from a backend profile, resolving the avatar
    /// against the backend's server origin
    pub fn from_profile(profile: Profile, server_origin: &str) -> Self {
        Self {
            id: profile.id,
            display_name: profile.fullname,
            email: profile.email,
            avatar_url: resolve_avatar_url(profile.image.as_deref(), server_origin),
        }
    }
}

/// Turns a relative upload path into an absolute URL.
///
/// Absolute URLs pass through; `/static/...` and `static/...` are joined to
/// the server origin; anything else is returned unchanged.
pub fn resolve_avatar_url(image: Option<&str>, server_origin: &str) -> Option<String> {
    let image = image.filter(|s| !s.is_empty())?;
    let origin = server_origin.trim_end_matches('/');

    if image.starts_with("http://") || image.starts_with("https://") {
        Some(image.to_string())
    } else if image.starts_with("/static") {
        Some(format!("{}{}", origin, image))
    } else if image.starts_with("static/") {
        Some(format!("{}/{}", origin, image))
    } else {
        Some(image.to_string())
    }
}

/// Authentication state of the session reconciler
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    #[default]
    Unknown,
    Verifying,
    Authenticated,
    Anonymous,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Unknown => "unknown",
            SessionPhase::Verifying => "verifying",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Anonymous => "anonymous",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN: &str = "https://backend.example.com";

    #[test]
    fn test_avatar_absolute_url_passes_through() {
        assert_eq!(
            resolve_avatar_url(Some("https://cdn.example.com/a.png"), ORIGIN),
            Some("https://cdn.example.com/a.png".to_string())
        );
    }

    #[test]
    fn test_avatar_static_paths_are_joined() {
        assert_eq!(
            resolve_avatar_url(Some("/static/uploads/a.png"), ORIGIN),
            Some("https://backend.example.com/static/uploads/a.png".to_string())
        );
        assert_eq!(
            resolve_avatar_url(Some("static/uploads/a.png"), "https://backend.example.com/"),
            Some("https://backend.example.com/static/uploads/a.png".to_string())
        );
    }

    #[test]
    fn test_avatar_empty_is_none() {
        assert_eq!(resolve_avatar_url(Some(""), ORIGIN), None);
        assert_eq!(resolve_avatar_url(None, ORIGIN), None);
    }

    #[test]
    fn test_identity_from_profile() {
        let identity = UserIdentity::from_profile(
            Profile {
                id: UserId(8),
                fullname: "Ada Lovelace".to_string(),
                email: "ada@example.com".to_string(),
                image: Some("/static/ada.png".to_string()),
            },
            ORIGIN,
        );

        assert_eq!(identity.id, UserId(8));
        assert_eq!(identity.display_name, "Ada Lovelace");
        assert_eq!(
            identity.avatar_url.as_deref(),
            Some("https://backend.example.com/static/ada.png")
        );
    }
}
