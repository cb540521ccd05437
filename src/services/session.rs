//! Session reconciler.
//!
//! Moves the session through `Unknown -> Verifying -> {Authenticated |
//! Anonymous}`. Verification, login and the backend-session check share the
//! `Session` single-flight slot, so only one of them runs at a time.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{SyncError, SyncResult},
    models::{Profile, ResourceClass, SessionId, SessionPhase, UserIdentity},
    services::{bootstrap::StagedBootstrap, context::SyncContext, identity::IdentityEvent},
};

#[derive(Clone)]
pub struct SessionReconciler {
    ctx: Arc<SyncContext>,
    bootstrap: StagedBootstrap,
}

impl SessionReconciler {
    pub fn new(ctx: Arc<SyncContext>, bootstrap: StagedBootstrap) -> Self {
        Self { ctx, bootstrap }
    }

    /// Reacts to a change reported by the identity provider
    pub async fn on_identity_event(&self, event: IdentityEvent) -> SyncResult<SessionPhase> {
        tracing::info!(event = ?event, "Identity event");
        match event {
            IdentityEvent::TokenAvailable => self.verify().await,
            IdentityEvent::TokenAbsent => {
                if self.ctx.flights.is_in_flight(ResourceClass::Session) {
                    tracing::debug!("Verification running, ignoring token-absent event");
                    return Ok(self.ctx.store.phase().await);
                }
                self.ctx.reset_session(SessionPhase::Anonymous).await;
                Ok(SessionPhase::Anonymous)
            }
        }
    }

    /// Verifies the provider's current token with the backend.
    ///
    /// A trigger arriving while another verification runs, or inside the
    /// debounce window of the previous one, is dropped and the current phase
    /// is returned. A rate-limited reply restores the phase held before
    /// verification began; any other failure ends the session.
    pub async fn verify(&self) -> SyncResult<SessionPhase> {
        let window = self.ctx.settings.debounce_window(ResourceClass::Session);
        let _guard = match self
            .ctx
            .flights
            .try_enter_debounced(ResourceClass::Session, window, false)
        {
            Ok(guard) => guard,
            Err(skip) => {
                tracing::debug!(reason = ?skip, "Skipping session verification");
                return Ok(self.ctx.store.phase().await);
            }
        };

        let previous = self.ctx.store.phase().await;
        self.ctx.store.set_phase(SessionPhase::Verifying).await;

        let token = match self.ctx.identity.id_token().await {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::info!("No identity token available");
                self.ctx.reset_session(SessionPhase::Anonymous).await;
                return Ok(SessionPhase::Anonymous);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read identity token");
                self.ctx
                    .store
                    .transition_phase(SessionPhase::Verifying, previous)
                    .await;
                return Err(e);
            }
        };

        tokio::time::sleep(self.ctx.settings.verify_delay).await;
        self.ctx.throttle(ResourceClass::Session).await;

        if self.ctx.store.phase().await != SessionPhase::Verifying {
            tracing::debug!("Session changed while verification was pending");
            return Ok(self.ctx.store.phase().await);
        }

        tracing::info!("Verifying session with backend");
        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                self.ctx.backend.verify_session(&token),
            )
            .await;

        if self.ctx.store.phase().await != SessionPhase::Verifying {
            tracing::debug!("Session changed while verification was in flight");
            return Ok(self.ctx.store.phase().await);
        }

        match result {
            Ok(profile) => {
                self.authenticate(profile, self.ctx.settings.settle_delay)
                    .await;
                Ok(SessionPhase::Authenticated)
            }
            Err(SyncError::RateLimited) => {
                tracing::warn!("Verification rate limited, will retry later");
                self.ctx
                    .backoff
                    .penalize(ResourceClass::Session, self.ctx.settings.rate_limit_penalty);
                self.ctx
                    .store
                    .transition_phase(SessionPhase::Verifying, previous)
                    .await;
                Err(SyncError::RateLimited)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Verification failed");
                self.ctx.reset_session(SessionPhase::Anonymous).await;
                Err(e)
            }
        }
    }

    /// Installs the identity from `profile`.
    ///
    /// The same user keeps their session and data with a refreshed identity.
    /// A different user gets a new session whose bootstrap starts after
    /// `bootstrap_delay`.
    async fn authenticate(&self, profile: Profile, bootstrap_delay: Duration) -> SessionId {
        let identity = UserIdentity::from_profile(profile, &self.ctx.settings.server_origin);
        let user_id = identity.id;

        if let Some(session) = self.ctx.store.current_session().await {
            let same_user = self
                .ctx
                .store
                .identity()
                .await
                .map(|current| current.id == user_id)
                .unwrap_or(false);
            if same_user && self.ctx.store.replace_identity(session, identity.clone()).await {
                self.ctx.store.set_phase(SessionPhase::Authenticated).await;
                tracing::info!(user_id = %user_id, "Session confirmed");
                return session;
            }
        }

        let session = self.ctx.start_session(identity).await;
        self.bootstrap
            .schedule_start(session, user_id, bootstrap_delay);
        session
    }

    /// Looks for an existing backend session when nobody is signed in and
    /// the identity provider has no user.
    pub async fn check_backend_session(&self) -> SyncResult<SessionPhase> {
        if self.ctx.store.current_session().await.is_some() {
            return Ok(self.ctx.store.phase().await);
        }
        if matches!(self.ctx.identity.id_token().await, Ok(Some(_))) {
            tracing::debug!("Identity provider has a user, skipping backend session check");
            return Ok(self.ctx.store.phase().await);
        }

        let Some(_guard) = self.ctx.flights.try_enter(ResourceClass::Session) else {
            tracing::debug!("Session operation running, skipping backend session check");
            return Ok(self.ctx.store.phase().await);
        };

        tokio::time::sleep(self.ctx.settings.session_check_delay).await;
        if self.ctx.store.current_session().await.is_some() {
            return Ok(self.ctx.store.phase().await);
        }

        self.ctx.throttle(ResourceClass::Session).await;
        tracing::info!("Checking for an existing backend session");
        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                self.ctx.backend.current_session(),
            )
            .await;

        match result {
            Ok(profile) => {
                self.authenticate(profile, self.ctx.settings.settle_delay)
                    .await;
                Ok(SessionPhase::Authenticated)
            }
            Err(SyncError::RateLimited) => {
                self.ctx
                    .backoff
                    .penalize(ResourceClass::Session, self.ctx.settings.rate_limit_penalty);
                Err(SyncError::RateLimited)
            }
            Err(SyncError::Unauthenticated) => {
                tracing::info!("No backend session");
                self.ctx.reset_session(SessionPhase::Anonymous).await;
                Ok(SessionPhase::Anonymous)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Backend session check failed");
                self.ctx.reset_session(SessionPhase::Anonymous).await;
                Err(e)
            }
        }
    }

    /// Signs in with email and password
    pub async fn login(&self, email: &str, password: &str) -> SyncResult<UserIdentity> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(SyncError::InvalidInput(
                "Email and password are required".to_string(),
            ));
        }

        let Some(_guard) = self.ctx.flights.try_enter(ResourceClass::Session) else {
            return Err(SyncError::Conflict(
                "A sign-in is already in progress".to_string(),
            ));
        };

        self.ctx.throttle(ResourceClass::Session).await;
        tracing::info!(email = %email, "Signing in");
        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                self.ctx.backend.login(email, password),
            )
            .await;

        match result {
            Ok(profile) => {
                self.authenticate(profile, self.ctx.settings.login_settle)
                    .await;
                self.ctx
                    .store
                    .identity()
                    .await
                    .ok_or(SyncError::NotSignedIn)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Sign-in failed");
                if e == SyncError::RateLimited {
                    self.ctx
                        .backoff
                        .penalize(ResourceClass::Session, self.ctx.settings.rate_limit_penalty);
                }
                Err(e)
            }
        }
    }

    /// Ends the session.
    ///
    /// Local state is cleared first, in one step, so nothing can observe a
    /// half-cleared store while the sign-out calls run. The first sign-out
    /// failure is returned.
    pub async fn logout(&self) -> SyncResult<()> {
        let previous = self.ctx.reset_session(SessionPhase::Anonymous).await;
        tracing::info!(had_session = previous.is_some(), "Signing out");

        let provider = self.ctx.identity.sign_out().await;
        if let Err(e) = &provider {
            tracing::warn!(error = %e, "Identity provider sign-out failed");
        }

        let backend = self
            .ctx
            .call(self.ctx.settings.request_timeout, self.ctx.backend.sign_out())
            .await;
        if let Err(e) = &backend {
            tracing::warn!(error = %e, "Backend sign-out failed");
        }

        provider.and(backend)
    }

    /// Renames the signed-in user and installs the returned profile
    pub async fn update_profile(&self, fullname: &str) -> SyncResult<UserIdentity> {
        let fullname = fullname.trim();
        if fullname.is_empty() {
            return Err(SyncError::InvalidInput("Name cannot be empty".to_string()));
        }

        let (session, user_id) = self.ctx.active_user().await?;
        self.ctx.throttle(ResourceClass::Session).await;

        tracing::info!(user_id = %user_id, "Updating profile");
        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                self.ctx.backend.update_profile(user_id, fullname),
            )
            .await;

        self.install_profile(session, result).await
    }

    /// Re-reads the profile, then re-runs the staged bootstrap
    pub async fn refresh_user_data(&self) -> SyncResult<()> {
        let (session, user_id) = self.ctx.active_user().await?;

        tokio::time::sleep(self.ctx.settings.verify_delay).await;
        self.ctx.throttle(ResourceClass::Session).await;

        tracing::info!(user_id = %user_id, "Refreshing user data");
        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                self.ctx.backend.get_profile(user_id),
            )
            .await;

        self.install_profile(session, result).await?;
        self.bootstrap.run(session, user_id).await
    }

    async fn install_profile(
        &self,
        session: SessionId,
        result: SyncResult<Profile>,
    ) -> SyncResult<UserIdentity> {
        match result {
            Ok(profile) => {
                let identity =
                    UserIdentity::from_profile(profile, &self.ctx.settings.server_origin);
                if self
                    .ctx
                    .store
                    .replace_identity(session, identity.clone())
                    .await
                {
                    Ok(identity)
                } else {
                    Err(SyncError::NotSignedIn)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Profile request failed");
                self.ctx
                    .handle_failure(session, ResourceClass::Session, &e)
                    .await;
                Err(e)
            }
        }
    }
}
