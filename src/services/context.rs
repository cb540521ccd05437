//! Composition root for the sync engine.
//!
//! `SyncContext` owns every piece of shared per-user state. It is built once
//! at start-up and handed to each component behind an `Arc`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    config::SyncSettings,
    error::{SyncError, SyncResult},
    models::{ResourceClass, SessionId, SessionPhase, UserId, UserIdentity},
    services::{
        backend::Backend, backoff::BackoffTracker, identity::IdentityProvider,
        recommendations::RecommendationCache, scheduler::Scheduler, single_flight::SingleFlight,
        store::EntityStore,
    },
};

pub struct SyncContext {
    pub backend: Arc<dyn Backend>,
    pub identity: Arc<dyn IdentityProvider>,
    pub store: EntityStore,
    pub backoff: BackoffTracker,
    pub flights: SingleFlight,
    pub scheduler: Scheduler,
    pub recommendations: RecommendationCache,
    pub settings: SyncSettings,
}

impl SyncContext {
    pub fn new(
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        settings: SyncSettings,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            identity,
            store: EntityStore::new(),
            backoff: BackoffTracker::new(),
            flights: SingleFlight::new(),
            scheduler: Scheduler::new(),
            recommendations: RecommendationCache::new(settings.recommendation_ttl),
            settings,
        })
    }

    /// Session and user id of the signed-in user
    pub async fn active_user(&self) -> SyncResult<(SessionId, UserId)> {
        let session = self.store.current_session().await;
        let identity = self.store.identity().await;
        match (session, identity) {
            (Some(session), Some(identity)) => Ok((session, identity.id)),
            _ => Err(SyncError::NotSignedIn),
        }
    }

    /// Runs a backend call with a deadline; an expired deadline is a
    /// `NetworkTimeout` and is not retried
    pub async fn call<T, F>(&self, timeout: Duration, call: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Backend call timed out");
                Err(SyncError::NetworkTimeout)
            }
        }
    }

    /// Claims the next backoff slot for `class` and waits until it arrives
    pub async fn throttle(&self, class: ResourceClass) {
        self.backoff
            .acquire(class, self.settings.min_interval(class))
            .await;
    }

    /// Applies the engine-wide reaction to a failed call.
    ///
    /// Rate limiting extends the backoff for `class`; an unauthenticated
    /// reply ends `session` if it is still the current one.
    pub async fn handle_failure(&self, session: SessionId, class: ResourceClass, err: &SyncError) {
        match err {
            SyncError::RateLimited => {
                self.backoff.penalize(class, self.settings.rate_limit_penalty);
            }
            SyncError::Unauthenticated => {
                if self.store.is_current(session).await {
                    tracing::warn!(resource = %class, "Backend rejected session, signing out");
                    self.reset_session(SessionPhase::Anonymous).await;
                }
            }
            _ => {}
        }
    }

    /// Replaces whatever session is current with a fresh one for `identity`
    pub async fn start_session(&self, identity: UserIdentity) -> SessionId {
        if let Some(previous) = self.store.current_session().await {
            self.scheduler.cancel_session(previous);
        }
        self.backoff.reset();
        self.flights.reset();
        self.recommendations.invalidate();

        let user_id = identity.id;
        let session = self.store.begin_session(identity).await;
        tracing::info!(session = %session, user_id = %user_id, "Session started");
        session
    }

    /// Clears identity and all per-user state, cancelling every task
    /// scheduled for the ended session
    pub async fn reset_session(&self, phase: SessionPhase) -> Option<SessionId> {
        let previous = self.store.clear_all(phase).await;
        if let Some(session) = previous {
            self.scheduler.cancel_session(session);
            tracing::info!(session = %session, phase = ?phase, "Session cleared");
        }
        self.backoff.reset();
        self.flights.reset();
        self.recommendations.invalidate();
        previous
    }
}
