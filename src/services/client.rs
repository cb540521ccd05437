//! Façade the presentation layer talks to.
//!
//! Wires the components around one [`SyncContext`] and exposes reads of the
//! entity store plus every user-facing operation.

use std::sync::Arc;

use crate::{
    config::SyncSettings,
    error::SyncResult,
    models::{
        Comment, Movie, MovieId, Notification, NotificationId, SessionPhase, UserIdentity,
        UserStats,
    },
    services::{
        backend::Backend,
        bootstrap::StagedBootstrap,
        context::SyncContext,
        fetchers::ResourceFetcher,
        identity::{IdentityEvent, IdentityProvider},
        mutations::{MutationEngine, MutationOutcome},
        notifications::NotificationService,
        recommendations::RecommendationService,
        session::SessionReconciler,
        store::{EntityState, LoadingFlags},
    },
};

#[derive(Clone)]
pub struct SyncClient {
    ctx: Arc<SyncContext>,
    fetcher: ResourceFetcher,
    mutations: MutationEngine,
    notifications: NotificationService,
    session: SessionReconciler,
    recommendations: RecommendationService,
}

impl SyncClient {
    pub fn new(
        backend: Arc<dyn Backend>,
        identity: Arc<dyn IdentityProvider>,
        settings: SyncSettings,
    ) -> Self {
        let ctx = SyncContext::new(backend, identity, settings);
        let fetcher = ResourceFetcher::new(Arc::clone(&ctx));
        let bootstrap = StagedBootstrap::new(Arc::clone(&ctx), fetcher.clone());

        Self {
            mutations: MutationEngine::new(Arc::clone(&ctx), fetcher.clone()),
            notifications: NotificationService::new(Arc::clone(&ctx), fetcher.clone()),
            session: SessionReconciler::new(Arc::clone(&ctx), bootstrap),
            recommendations: RecommendationService::new(Arc::clone(&ctx)),
            fetcher,
            ctx,
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    pub async fn snapshot(&self) -> EntityState {
        self.ctx.store.snapshot().await
    }

    pub async fn phase(&self) -> SessionPhase {
        self.ctx.store.phase().await
    }

    pub async fn identity(&self) -> Option<UserIdentity> {
        self.ctx.store.identity().await
    }

    pub async fn watchlist(&self) -> Vec<Movie> {
        self.ctx.store.watchlist().await
    }

    pub async fn liked(&self) -> Vec<MovieId> {
        self.ctx.store.liked().await
    }

    pub async fn is_liked(&self, movie_id: MovieId) -> bool {
        self.ctx.store.is_liked(movie_id).await
    }

    pub async fn is_in_watchlist(&self, movie_id: MovieId) -> bool {
        self.ctx.store.is_in_watchlist(movie_id).await
    }

    pub async fn loading(&self) -> LoadingFlags {
        self.ctx.store.loading().await
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.ctx.store.notifications().await
    }

    pub async fn unread_notifications(&self) -> u32 {
        self.ctx.store.unread_notifications().await
    }

    // ------------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------------

    pub async fn on_identity_event(&self, event: IdentityEvent) -> SyncResult<SessionPhase> {
        self.session.on_identity_event(event).await
    }

    pub async fn check_backend_session(&self) -> SyncResult<SessionPhase> {
        self.session.check_backend_session().await
    }

    pub async fn login(&self, email: &str, password: &str) -> SyncResult<UserIdentity> {
        self.session.login(email, password).await
    }

    pub async fn logout(&self) -> SyncResult<()> {
        self.session.logout().await
    }

    pub async fn update_profile(&self, fullname: &str) -> SyncResult<UserIdentity> {
        self.session.update_profile(fullname).await
    }

    pub async fn refresh_user_data(&self) -> SyncResult<()> {
        self.session.refresh_user_data().await
    }

    // ------------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------------

    pub async fn refresh_watchlist(&self, force: bool) -> SyncResult<Vec<Movie>> {
        self.fetcher.refresh_watchlist(force).await
    }

    pub async fn refresh_likes(&self, force: bool) -> SyncResult<Vec<MovieId>> {
        self.fetcher.refresh_likes(force).await
    }

    /// Statistics of the signed-in user; `force` bypasses the debounce window
    pub async fn user_stats(&self, force: bool) -> SyncResult<Option<UserStats>> {
        self.fetcher.refresh_stats(force).await
    }

    /// Notifications of the signed-in user; unforced reads inside the
    /// debounce window return the held list
    pub async fn refresh_notifications(&self, force: bool) -> SyncResult<Vec<Notification>> {
        self.fetcher.refresh_notifications(force).await
    }

    pub async fn refresh_unread_count(&self) -> SyncResult<u32> {
        self.fetcher.refresh_unread_count().await
    }

    pub async fn comments(&self, movie_id: MovieId, force: bool) -> SyncResult<Vec<Comment>> {
        self.fetcher.refresh_comments(movie_id, force).await
    }

    pub async fn recommended_movies(&self, limit: usize) -> SyncResult<Arc<Vec<Movie>>> {
        self.recommendations.recommended_movies(limit).await
    }

    pub async fn train_recommendations(&self) -> SyncResult<()> {
        self.recommendations.train_models().await
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    pub async fn add_to_watchlist(&self, movie: Movie) -> SyncResult<MutationOutcome> {
        self.mutations.add_to_watchlist(movie).await
    }

    pub async fn remove_from_watchlist(&self, movie_id: MovieId) -> SyncResult<MutationOutcome> {
        self.mutations.remove_from_watchlist(movie_id).await
    }

    pub async fn toggle_like(
        &self,
        movie_id: MovieId,
        details: Option<Movie>,
    ) -> SyncResult<MutationOutcome> {
        self.mutations.toggle_like(movie_id, details).await
    }

    pub async fn add_comment(&self, movie_id: MovieId, text: &str) -> SyncResult<()> {
        self.mutations.add_comment(movie_id, text).await
    }

    pub async fn mark_notification_read(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.notifications.mark_read(notification_id).await
    }

    pub async fn mark_all_notifications_read(&self) -> SyncResult<()> {
        self.notifications.mark_all_read().await
    }

    pub async fn delete_notification(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.notifications.delete(notification_id).await
    }
}
