//! Resource fetchers.
//!
//! Each read takes the resource's single-flight slot (subject to its
//! debounce window), waits out the backoff interval, calls the backend under
//! a deadline and replaces the store slice wholesale. A failed read leaves
//! the held data in place and marks the resource stale. Loading flags belong
//! to the caller holding the slot; a skipped read never touches them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{SyncError, SyncResult},
    models::{Comment, Movie, MovieId, Notification, ResourceClass, SessionId, UserId, UserStats},
    services::{
        backend::Backend,
        context::SyncContext,
        single_flight::{FlightGuard, FlightKey, Skip},
        store::{ReplaceOutcome, ResourceLoading},
    },
};

/// Result of the guarded read step
enum Read<T> {
    Fresh {
        value: T,
        epoch: u64,
        // Held until the store replacement is done
        _guard: FlightGuard,
    },
    Skipped(Skip),
}

#[derive(Clone)]
pub struct ResourceFetcher {
    ctx: Arc<SyncContext>,
}

impl ResourceFetcher {
    pub fn new(ctx: Arc<SyncContext>) -> Self {
        Self { ctx }
    }

    fn debounce_window(&self, key: FlightKey) -> Option<Duration> {
        match key {
            FlightKey::UnreadCount => None,
            key => self.ctx.settings.debounce_window(key.class()),
        }
    }

    async fn read<T, F, Fut>(
        &self,
        session: SessionId,
        user_id: UserId,
        key: impl Into<FlightKey>,
        loading: Option<ResourceLoading>,
        force: bool,
        remote: F,
    ) -> SyncResult<Read<T>>
    where
        F: FnOnce(Arc<dyn Backend>, UserId) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let key = key.into();
        let class = key.class();
        let guard = match self
            .ctx
            .flights
            .try_enter_debounced(key, self.debounce_window(key), force)
        {
            Ok(guard) => guard,
            Err(_) if !self.ctx.store.is_current(session).await => {
                return Err(SyncError::NotSignedIn);
            }
            Err(skip) => {
                tracing::debug!(resource = %class, reason = ?skip, "Skipping fetch");
                return Ok(Read::Skipped(skip));
            }
        };

        if let Some(which) = loading {
            self.ctx.store.set_loading(session, which, true).await;
        }
        self.ctx.throttle(class).await;

        if !self.ctx.store.is_current(session).await {
            tracing::debug!(resource = %class, session = %session, "Session ended before fetch");
            return Err(SyncError::NotSignedIn);
        }

        let epoch = self.ctx.store.mutation_epoch(class).await;
        tracing::info!(resource = %class, user_id = %user_id, force, "Fetching resource");

        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                remote(Arc::clone(&self.ctx.backend), user_id),
            )
            .await;
        if let Some(which) = loading {
            self.ctx.store.set_loading(session, which, false).await;
        }

        match result {
            Ok(value) => Ok(Read::Fresh {
                value,
                epoch,
                _guard: guard,
            }),
            Err(e) => {
                tracing::warn!(resource = %class, error = %e, "Fetch failed, keeping previous data");
                self.ctx.store.mark_stale(session, class).await;
                self.ctx.handle_failure(session, class, &e).await;
                Err(e)
            }
        }
    }

    fn log_replace(class: ResourceClass, outcome: ReplaceOutcome, count: usize) {
        match outcome {
            ReplaceOutcome::Applied => {
                tracing::info!(resource = %class, count, "Resource refreshed")
            }
            ReplaceOutcome::Superseded => tracing::debug!(
                resource = %class,
                "Local edits since the fetch began, result not applied"
            ),
            ReplaceOutcome::StaleSession => {
                tracing::debug!(resource = %class, "Session ended, fetch result dropped")
            }
        }
    }

    /// Reads the watchlist for `session` and replaces the stored one
    pub async fn fetch_watchlist(
        &self,
        session: SessionId,
        user_id: UserId,
        force: bool,
    ) -> SyncResult<Vec<Movie>> {
        let read = self
            .read(session, user_id, ResourceClass::Watchlist, None, force, |backend, user| async move {
                backend.get_watchlist(user).await
            })
            .await?;

        match read {
            Read::Fresh { value, epoch, .. } => {
                let outcome = self
                    .ctx
                    .store
                    .replace_watchlist(session, value.clone(), epoch)
                    .await;
                Self::log_replace(ResourceClass::Watchlist, outcome, value.len());
                Ok(value)
            }
            Read::Skipped(_) => Ok(self.ctx.store.watchlist().await),
        }
    }

    /// Reads the liked movie ids for `session` and replaces the stored set
    pub async fn fetch_likes(
        &self,
        session: SessionId,
        user_id: UserId,
        force: bool,
    ) -> SyncResult<Vec<MovieId>> {
        let read = self
            .read(session, user_id, ResourceClass::Likes, None, force, |backend, user| async move {
                backend.get_likes(user).await
            })
            .await?;

        match read {
            Read::Fresh { value, epoch, .. } => {
                let outcome = self.ctx.store.replace_likes(session, value.clone(), epoch).await;
                Self::log_replace(ResourceClass::Likes, outcome, value.len());
                Ok(value)
            }
            Read::Skipped(_) => Ok(self.ctx.store.liked().await),
        }
    }

    /// Reads the usage statistics for `session` and replaces the stored
    /// snapshot. The previous snapshot stays visible while the read runs.
    pub async fn fetch_stats(
        &self,
        session: SessionId,
        user_id: UserId,
        force: bool,
    ) -> SyncResult<Option<UserStats>> {
        let read = self
            .read(
                session,
                user_id,
                ResourceClass::Stats,
                Some(ResourceLoading::Stats),
                force,
                |backend, user| async move { backend.get_stats(user).await },
            )
            .await?;

        match read {
            Read::Fresh { value, .. } => {
                let outcome = self.ctx.store.replace_stats(session, value.clone()).await;
                Self::log_replace(ResourceClass::Stats, outcome, 1);
                Ok(Some(value))
            }
            Read::Skipped(_) => Ok(self.ctx.store.stats().await),
        }
    }

    /// Reads the latest notifications for `session`. Unforced reads inside
    /// the debounce window return the held list.
    pub async fn fetch_notifications(
        &self,
        session: SessionId,
        user_id: UserId,
        force: bool,
    ) -> SyncResult<Vec<Notification>> {
        let read = self
            .read(
                session,
                user_id,
                ResourceClass::Notifications,
                Some(ResourceLoading::Notifications),
                force,
                |backend, user| async move { backend.get_notifications(user).await },
            )
            .await?;

        match read {
            Read::Fresh { value, epoch, .. } => {
                let outcome = self
                    .ctx
                    .store
                    .replace_notifications(session, value.clone(), epoch)
                    .await;
                Self::log_replace(ResourceClass::Notifications, outcome, value.len());
                Ok(value)
            }
            Read::Skipped(_) => Ok(self.ctx.store.notifications().await),
        }
    }

    /// Reads the unread-notification counter for `session`
    pub async fn fetch_unread_count(&self, session: SessionId, user_id: UserId) -> SyncResult<u32> {
        let read = self
            .read(session, user_id, FlightKey::UnreadCount, None, true, |backend, user| async move {
                backend.get_unread_count(user).await
            })
            .await?;

        match read {
            Read::Fresh { value, epoch, .. } => {
                let outcome = self
                    .ctx
                    .store
                    .replace_unread_count(session, value, epoch)
                    .await;
                Self::log_replace(ResourceClass::Notifications, outcome, 1);
                Ok(value)
            }
            Read::Skipped(_) => Ok(self.ctx.store.unread_notifications().await),
        }
    }

    /// Reads the comment thread of `movie_id`.
    ///
    /// An unforced read returns a non-empty held thread without calling the
    /// backend, and is dropped inside the debounce window of the last read.
    pub async fn fetch_comments(
        &self,
        session: SessionId,
        user_id: UserId,
        movie_id: MovieId,
        force: bool,
    ) -> SyncResult<Vec<Comment>> {
        if !force && self.ctx.store.is_current(session).await {
            if let Some(held) = self.ctx.store.comments(movie_id).await {
                if !held.is_empty() {
                    tracing::debug!(movie_id = %movie_id, count = held.len(), "Serving held comments");
                    return Ok(held);
                }
            }
        }

        let read = self
            .read(
                session,
                user_id,
                FlightKey::Comments(movie_id),
                Some(ResourceLoading::Comments(movie_id)),
                force,
                move |backend, user| async move { backend.get_comments(movie_id, user).await },
            )
            .await?;

        match read {
            Read::Fresh { value, .. } => {
                let outcome = self
                    .ctx
                    .store
                    .replace_comments(session, movie_id, value.clone())
                    .await;
                Self::log_replace(ResourceClass::Comments, outcome, value.len());
                Ok(value)
            }
            Read::Skipped(_) => Ok(self.ctx.store.comments(movie_id).await.unwrap_or_default()),
        }
    }

    pub async fn refresh_watchlist(&self, force: bool) -> SyncResult<Vec<Movie>> {
        let (session, user_id) = self.ctx.active_user().await?;
        self.fetch_watchlist(session, user_id, force).await
    }

    pub async fn refresh_likes(&self, force: bool) -> SyncResult<Vec<MovieId>> {
        let (session, user_id) = self.ctx.active_user().await?;
        self.fetch_likes(session, user_id, force).await
    }

    pub async fn refresh_stats(&self, force: bool) -> SyncResult<Option<UserStats>> {
        let (session, user_id) = self.ctx.active_user().await?;
        self.fetch_stats(session, user_id, force).await
    }

    pub async fn refresh_notifications(&self, force: bool) -> SyncResult<Vec<Notification>> {
        let (session, user_id) = self.ctx.active_user().await?;
        self.fetch_notifications(session, user_id, force).await
    }

    pub async fn refresh_unread_count(&self) -> SyncResult<u32> {
        let (session, user_id) = self.ctx.active_user().await?;
        self.fetch_unread_count(session, user_id).await
    }

    pub async fn refresh_comments(&self, movie_id: MovieId, force: bool) -> SyncResult<Vec<Comment>> {
        let (session, user_id) = self.ctx.active_user().await?;
        self.fetch_comments(session, user_id, movie_id, force).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NotificationId, SessionPhase};
    use crate::services::backend::MockBackend;
    use crate::services::test_support::{context, sign_in, USER};
    use std::time::Duration;
    use tokio::time::Instant;

    fn stats(liked: u32) -> UserStats {
        UserStats {
            liked_movies: liked,
            watchlist_count: 1,
            comments_count: 0,
            member_since: "2024-01-01".to_string(),
            ..UserStats::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchlist_fetch_replaces_store() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_watchlist()
            .times(1)
            .returning(|_| Ok(vec![Movie::new(MovieId(1), "Up"), Movie::new(MovieId(2), "Cars")]));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        let movies = fetcher.fetch_watchlist(session, USER, true).await.unwrap();

        assert_eq!(movies.len(), 2);
        assert_eq!(ctx.store.watchlist().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_keeps_previous_stats() {
        let mut backend = MockBackend::new();
        let mut calls = 0;
        backend.expect_get_stats().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Ok(stats(3))
            } else {
                Err(SyncError::Unknown("boom".to_string()))
            }
        });

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        fetcher.fetch_stats(session, USER, true).await.unwrap();
        assert_eq!(ctx.store.stats().await, Some(stats(3)));

        let err = fetcher.fetch_stats(session, USER, true).await.unwrap_err();
        assert!(matches!(err, SyncError::Unknown(_)));
        assert_eq!(ctx.store.stats().await, Some(stats(3)));
        assert!(ctx.store.is_stale(ResourceClass::Stats).await);
        assert!(!ctx.store.loading().await.stats);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_refresh_clears_stale_marker() {
        let mut backend = MockBackend::new();
        let mut calls = 0;
        backend.expect_get_likes().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(SyncError::NetworkTimeout)
            } else {
                Ok(vec![MovieId(4)])
            }
        });

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        assert!(fetcher.fetch_likes(session, USER, true).await.is_err());
        assert!(ctx.store.is_stale(ResourceClass::Likes).await);

        fetcher.fetch_likes(session, USER, true).await.unwrap();
        assert!(!ctx.store.is_stale(ResourceClass::Likes).await);
        assert_eq!(ctx.store.liked().await, vec![MovieId(4)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_fetch_waits_min_interval() {
        let mut backend = MockBackend::new();
        backend.expect_get_watchlist().times(2).returning(|_| Ok(vec![]));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        fetcher.fetch_watchlist(session, USER, true).await.unwrap();
        tokio::time::advance(Duration::from_millis(1_000)).await;

        let start = Instant::now();
        fetcher.fetch_watchlist(session, USER, true).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(4_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_fetch_extends_backoff() {
        let mut backend = MockBackend::new();
        let mut calls = 0;
        backend.expect_get_watchlist().times(2).returning(move |_| {
            calls += 1;
            if calls == 1 {
                Err(SyncError::RateLimited)
            } else {
                Ok(vec![])
            }
        });

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        let err = fetcher.fetch_watchlist(session, USER, true).await.unwrap_err();
        assert_eq!(err, SyncError::RateLimited);

        // Plain interval would already allow a call
        tokio::time::advance(Duration::from_millis(6_000)).await;

        let start = Instant::now();
        fetcher.fetch_watchlist(session, USER, true).await.unwrap();
        assert!(start.elapsed() >= ctx.settings.rate_limit_penalty - Duration::from_millis(6_000));
        assert_eq!(ctx.store.phase().await, SessionPhase::Authenticated);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unauthenticated_fetch_clears_session() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_likes()
            .returning(|_| Err(SyncError::Unauthenticated));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        assert_eq!(
            fetcher.fetch_likes(session, USER, true).await.unwrap_err(),
            SyncError::Unauthenticated
        );
        assert_eq!(ctx.store.phase().await, SessionPhase::Anonymous);
        assert!(ctx.store.identity().await.is_none());
        assert_eq!(ctx.store.current_session().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unforced_stats_inside_window_returns_last_value() {
        let mut backend = MockBackend::new();
        backend.expect_get_stats().times(1).returning(|_| Ok(stats(1)));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        fetcher.fetch_stats(session, USER, false).await.unwrap();
        let again = fetcher.fetch_stats(session, USER, false).await.unwrap();

        assert_eq!(again, Some(stats(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_fetch_of_same_class_is_skipped() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_watchlist()
            .times(1)
            .returning(|_| Ok(vec![Movie::new(MovieId(7), "Se7en")]));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        let _guard = ctx.flights.try_enter(ResourceClass::Watchlist).unwrap();
        let skipped = fetcher.fetch_watchlist(session, USER, true).await.unwrap();
        assert!(skipped.is_empty());
        drop(_guard);

        let fresh = fetcher.fetch_watchlist(session, USER, true).await.unwrap();
        assert_eq!(fresh.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_for_ended_session_is_refused() {
        let ctx = context(MockBackend::new());
        let session = sign_in(&ctx).await;
        ctx.reset_session(SessionPhase::Anonymous).await;

        let fetcher = ResourceFetcher::new(ctx.clone());
        assert_eq!(
            fetcher.fetch_watchlist(session, USER, true).await,
            Err(SyncError::NotSignedIn)
        );
        assert!(ctx.store.watchlist().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_read_does_not_return_next_session_data() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_likes()
            .times(1)
            .returning(|_| Ok(vec![MovieId(9)]));

        let ctx = context(backend);
        let old = sign_in(&ctx).await;
        let current = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());
        fetcher.fetch_likes(current, USER, true).await.unwrap();

        // The slot is busy, so the read for the ended session is skipped
        let _guard = ctx.flights.try_enter(ResourceClass::Likes).unwrap();
        assert_eq!(
            fetcher.fetch_likes(old, USER, true).await,
            Err(SyncError::NotSignedIn)
        );
        assert_eq!(fetcher.fetch_likes(current, USER, true).await, Ok(vec![MovieId(9)]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skipped_stats_read_keeps_loading_flag_of_running_read() {
        let mut backend = MockBackend::new();
        backend.expect_get_stats().times(1).returning(|_| Ok(stats(2)));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        // The running read holds the slot while it waits out the interval
        ctx.throttle(ResourceClass::Stats).await;
        let running = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { fetcher.fetch_stats(session, USER, true).await }
        });
        while !ctx.store.loading().await.stats {
            tokio::task::yield_now().await;
        }

        assert_eq!(fetcher.fetch_stats(session, USER, true).await, Ok(None));
        assert!(ctx.store.loading().await.stats);

        assert_eq!(running.await.unwrap(), Ok(Some(stats(2))));
        assert!(!ctx.store.loading().await.stats);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unforced_notifications_inside_window_are_debounced() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_notifications()
            .times(2)
            .returning(|_| Ok(vec![Notification::new(NotificationId(1), "Reply")]));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        fetcher.fetch_notifications(session, USER, true).await.unwrap();
        tokio::time::advance(Duration::from_millis(10_000)).await;
        // Served from the store, no backend call
        assert_eq!(fetcher.fetch_notifications(session, USER, false).await.unwrap().len(), 1);

        tokio::time::advance(Duration::from_millis(20_000)).await;
        fetcher.fetch_notifications(session, USER, false).await.unwrap();
        assert!(!ctx.store.loading().await.notifications);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unread_count_replaces_store() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_unread_count()
            .withf(|user| *user == USER)
            .times(1)
            .returning(|_| Ok(4));

        let ctx = context(backend);
        sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        assert_eq!(fetcher.refresh_unread_count().await, Ok(4));
        assert_eq!(ctx.store.unread_notifications().await, 4);
    }

    fn comment(id: i64, movie: i64) -> Comment {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "user_id": 1,
            "movie_id": movie,
            "content": format!("Comment {}", id)
        }))
        .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_unforced_comment_read_serves_held_thread() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_comments()
            .withf(|movie, user| *movie == MovieId(5) && *user == USER)
            .times(2)
            .returning(|_, _| Ok(vec![comment(1, 5)]));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        fetcher.fetch_comments(session, USER, MovieId(5), false).await.unwrap();
        let held = fetcher.fetch_comments(session, USER, MovieId(5), false).await.unwrap();
        assert_eq!(held, vec![comment(1, 5)]);

        // Forced reads bypass both the held thread and the window
        fetcher.fetch_comments(session, USER, MovieId(5), true).await.unwrap();
        assert!(ctx.store.loading().await.comments.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_comment_thread_is_debounced() {
        let mut backend = MockBackend::new();
        backend
            .expect_get_comments()
            .times(2)
            .returning(|_, _| Ok(Vec::new()));

        let ctx = context(backend);
        let session = sign_in(&ctx).await;
        let fetcher = ResourceFetcher::new(ctx.clone());

        fetcher.fetch_comments(session, USER, MovieId(6), false).await.unwrap();
        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert!(fetcher.fetch_comments(session, USER, MovieId(6), false).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_millis(2_000)).await;
        fetcher.fetch_comments(session, USER, MovieId(6), false).await.unwrap();
        assert_eq!(ctx.store.comments(MovieId(6)).await, Some(Vec::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_requires_signed_in_user() {
        let ctx = context(MockBackend::new());
        let fetcher = ResourceFetcher::new(ctx);
        assert_eq!(
            fetcher.refresh_watchlist(true).await.unwrap_err(),
            SyncError::NotSignedIn
        );
    }
}
