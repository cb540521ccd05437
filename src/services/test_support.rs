use std::sync::Arc;

use crate::{
    config::SyncSettings,
    models::{SessionId, UserId, UserIdentity},
    services::{
        backend::MockBackend,
        context::SyncContext,
        identity::{IdentityProvider, SharedTokenProvider},
    },
};

pub const USER: UserId = UserId(1);

pub fn identity() -> UserIdentity {
    UserIdentity {
        id: USER,
        display_name: "Test User".to_string(),
        email: "test@example.com".to_string(),
        avatar_url: None,
    }
}

pub fn context(backend: MockBackend) -> Arc<SyncContext> {
    context_with_identity(backend, Arc::new(SharedTokenProvider::new()))
}

pub fn context_with_identity(
    backend: MockBackend,
    identity: Arc<dyn IdentityProvider>,
) -> Arc<SyncContext> {
    SyncContext::new(Arc::new(backend), identity, SyncSettings::default())
}

pub async fn sign_in(ctx: &SyncContext) -> SessionId {
    ctx.start_session(identity()).await
}
