/// Identity provider seam
///
/// The engine never authenticates a user itself. It only reacts to
/// token-available / token-absent events and asks the provider for the
/// current short-lived token when it needs to verify a session.
use tokio::sync::RwLock;

use crate::error::SyncResult;

#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Current credential token, if a user is signed in with the provider
    async fn id_token(&self) -> SyncResult<Option<String>>;

    /// Ends the provider-side session
    async fn sign_out(&self) -> SyncResult<()>;
}

/// Event emitted by the identity provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityEvent {
    TokenAvailable,
    TokenAbsent,
}

/// Provider whose token is pushed in from outside (e.g. by the
/// presentation layer after a provider sign-in)
#[derive(Default)]
pub struct SharedTokenProvider {
    token: RwLock<Option<String>>,
}

impl SharedTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_token(&self, token: String) {
        *self.token.write().await = Some(token);
    }

    pub async fn clear(&self) {
        *self.token.write().await = None;
    }
}

#[async_trait::async_trait]
impl IdentityProvider for SharedTokenProvider {
    async fn id_token(&self) -> SyncResult<Option<String>> {
        Ok(self.token.read().await.clone())
    }

    async fn sign_out(&self) -> SyncResult<()> {
        self.clear().await;
        Ok(())
    }
}
