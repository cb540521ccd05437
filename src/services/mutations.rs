//! Optimistic mutation engine.
//!
//! A mutation moves through `Applying -> Confirming` and ends `Committed` or
//! `RolledBack`. The local edit is written before the backend call is
//! issued; on failure the exact pre-mutation value of the entity is
//! restored. Only one mutation per movie id and target may be in flight.

use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::{SyncError, SyncResult},
    models::{
        LikeReceipt, LikeRequest, Movie, MovieId, ResourceClass, SessionId, UserId,
        WatchlistEntryRequest, WatchlistReceipt,
    },
    services::{
        backend::Backend,
        context::SyncContext,
        fetchers::ResourceFetcher,
        scheduler::TaskSlot,
        store::{EntitySnapshot, EntityState, MutationTarget},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationPhase {
    Applying,
    Confirming,
    Committed,
    RolledBack,
}

impl Display for MutationPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MutationPhase::Applying => "applying",
            MutationPhase::Confirming => "confirming",
            MutationPhase::Committed => "committed",
            MutationPhase::RolledBack => "rolled_back",
        };
        write!(f, "{}", name)
    }
}

/// How a mutation request resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    /// The backend accepted the change
    Committed,
    /// The local state already held the requested value; nothing was sent
    Unchanged,
}

/// One optimistic write: the local edit, the remote call and the commit step
struct Mutation<A, C, K> {
    target: MutationTarget,
    movie_id: MovieId,
    apply: A,
    call: C,
    commit: K,
    /// Whether a `Conflict` reply means the backend already holds the value
    conflict_is_success: fn(&EntitySnapshot) -> bool,
}

#[derive(Clone)]
pub struct MutationEngine {
    ctx: Arc<SyncContext>,
    fetcher: ResourceFetcher,
}

impl MutationEngine {
    pub fn new(ctx: Arc<SyncContext>, fetcher: ResourceFetcher) -> Self {
        Self { ctx, fetcher }
    }

    fn trace(target: MutationTarget, movie_id: MovieId, phase: MutationPhase) {
        tracing::debug!(target_kind = ?target, movie_id = %movie_id, phase = %phase, "Mutation");
    }

    async fn run<A, C, Fut, R, K>(&self, mutation: Mutation<A, C, K>) -> SyncResult<MutationOutcome>
    where
        A: FnOnce(&mut EntityState),
        C: FnOnce(Arc<dyn Backend>, UserId, EntitySnapshot) -> Fut,
        Fut: Future<Output = SyncResult<R>>,
        K: FnOnce(&mut EntityState, Option<R>),
    {
        let Mutation {
            target,
            movie_id,
            apply,
            call,
            commit,
            conflict_is_success,
        } = mutation;

        let (session, user_id) = self.ctx.active_user().await?;
        let class = target.resource_class();

        Self::trace(target, movie_id, MutationPhase::Applying);
        let snapshot = self
            .ctx
            .store
            .begin_mutation(session, target, movie_id, apply)
            .await?;

        self.ctx.throttle(class).await;

        let result = if self.ctx.store.is_current(session).await {
            Self::trace(target, movie_id, MutationPhase::Confirming);
            self.ctx
                .call(
                    self.ctx.settings.request_timeout,
                    call(Arc::clone(&self.ctx.backend), user_id, snapshot.clone()),
                )
                .await
                .map(Some)
        } else {
            Err(SyncError::NotSignedIn)
        };

        let result = match result {
            Err(SyncError::Conflict(reason)) if conflict_is_success(&snapshot) => {
                tracing::info!(movie_id = %movie_id, reason = %reason, "Backend already holds the change");
                Ok(None)
            }
            other => other,
        };

        match result {
            Ok(receipt) => {
                self.ctx
                    .store
                    .commit_mutation(session, target, movie_id, |state| commit(state, receipt))
                    .await;
                Self::trace(target, movie_id, MutationPhase::Committed);
                self.schedule_confirmation(session, user_id, target);
                Ok(MutationOutcome::Committed)
            }
            Err(e) => {
                self.ctx
                    .store
                    .rollback_mutation(session, target, movie_id, snapshot)
                    .await;
                Self::trace(target, movie_id, MutationPhase::RolledBack);
                tracing::warn!(movie_id = %movie_id, error = %e, "Mutation rolled back");
                self.ctx.handle_failure(session, class, &e).await;
                Err(e)
            }
        }
    }

    /// Schedules the delayed confirmation refresh of the mutated resource
    /// and a later statistics refresh. Neither is awaited.
    fn schedule_confirmation(&self, session: SessionId, user_id: UserId, target: MutationTarget) {
        let delay = self.ctx.settings.confirm_refresh_delay;
        let fetcher = self.fetcher.clone();

        match target {
            MutationTarget::Watchlist => {
                self.ctx
                    .scheduler
                    .schedule(session, TaskSlot::ConfirmWatchlist, delay, async move {
                        if let Err(e) = fetcher.fetch_watchlist(session, user_id, true).await {
                            tracing::warn!(error = %e, "Watchlist confirmation refresh failed");
                        }
                    })
            }
            MutationTarget::Like => {
                self.ctx
                    .scheduler
                    .schedule(session, TaskSlot::ConfirmLikes, delay, async move {
                        if let Err(e) = fetcher.fetch_likes(session, user_id, true).await {
                            tracing::warn!(error = %e, "Likes confirmation refresh failed");
                        }
                    })
            }
        }

        self.schedule_stats_refresh(session, user_id, self.ctx.settings.stats_refresh_delay);
    }

    fn schedule_stats_refresh(&self, session: SessionId, user_id: UserId, delay: Duration) {
        let fetcher = self.fetcher.clone();
        self.ctx
            .scheduler
            .schedule(session, TaskSlot::StatsRefresh, delay, async move {
                if let Err(e) = fetcher.fetch_stats(session, user_id, true).await {
                    tracing::warn!(error = %e, "Statistics refresh failed");
                }
            });
    }

    /// Adds `movie` to the watchlist
    pub async fn add_to_watchlist(&self, movie: Movie) -> SyncResult<MutationOutcome> {
        let movie_id = movie.id;
        if self.ctx.store.is_in_watchlist(movie_id).await
            && !self.ctx.store.is_watchlist_loading(movie_id).await
        {
            tracing::debug!(movie_id = %movie_id, "Movie already in watchlist");
            return Ok(MutationOutcome::Unchanged);
        }

        let entry = WatchlistEntryRequest::from(&movie);
        tracing::info!(movie_id = %movie_id, title = %movie.title, "Adding to watchlist");

        self.run(Mutation {
            target: MutationTarget::Watchlist,
            movie_id,
            apply: |state: &mut EntityState| {
                state.watchlist.insert(movie_id, movie);
            },
            call: |backend: Arc<dyn Backend>, user_id: UserId, _: EntitySnapshot| async move {
                backend.add_to_watchlist(user_id, &entry).await
            },
            commit: |state: &mut EntityState, receipt: Option<WatchlistReceipt>| {
                if let Some(movie) = receipt.and_then(|r| r.movie).filter(|m| m.id == movie_id) {
                    state.watchlist.insert(movie_id, movie);
                }
            },
            conflict_is_success: |_| true,
        })
        .await
    }

    /// Removes `movie_id` from the watchlist
    pub async fn remove_from_watchlist(&self, movie_id: MovieId) -> SyncResult<MutationOutcome> {
        tracing::info!(movie_id = %movie_id, "Removing from watchlist");

        self.run(Mutation {
            target: MutationTarget::Watchlist,
            movie_id,
            apply: |state: &mut EntityState| {
                state.watchlist.remove(&movie_id);
            },
            call: |backend: Arc<dyn Backend>, user_id: UserId, _: EntitySnapshot| async move {
                backend.remove_from_watchlist(user_id, movie_id).await
            },
            commit: |_: &mut EntityState, _: Option<WatchlistReceipt>| {},
            conflict_is_success: |_| false,
        })
        .await
    }

    /// Flips the liked state of `movie_id`.
    ///
    /// `details` are forwarded when liking so the backend can record a movie
    /// it has not seen before.
    pub async fn toggle_like(
        &self,
        movie_id: MovieId,
        details: Option<Movie>,
    ) -> SyncResult<MutationOutcome> {
        let entry = details.as_ref().map(WatchlistEntryRequest::from);

        self.run(Mutation {
            target: MutationTarget::Like,
            movie_id,
            apply: |state: &mut EntityState| {
                let liking = state.liked.insert(movie_id);
                if !liking {
                    state.liked.remove(&movie_id);
                }
                if let Some(count) = state.like_counts.get_mut(&movie_id) {
                    *count = if liking {
                        count.saturating_add(1)
                    } else {
                        count.saturating_sub(1)
                    };
                }
                tracing::info!(movie_id = %movie_id, liking, "Toggling like");
            },
            call: |backend: Arc<dyn Backend>, user_id: UserId, snapshot: EntitySnapshot| async move {
                if was_liked(&snapshot) {
                    backend.unlike(movie_id, user_id).await
                } else {
                    let request = LikeRequest {
                        user_id,
                        movie: entry,
                    };
                    backend.like(movie_id, &request).await
                }
            },
            commit: |state: &mut EntityState, receipt: Option<LikeReceipt>| {
                let Some(receipt) = receipt else { return };
                if let Some(count) = receipt.likes_count {
                    state.like_counts.insert(movie_id, count);
                }
                match receipt.liked {
                    Some(true) => {
                        state.liked.insert(movie_id);
                    }
                    Some(false) => {
                        state.liked.remove(&movie_id);
                    }
                    None => {}
                }
            },
            // Liking something already liked on the backend
            conflict_is_success: |snapshot| !was_liked(snapshot),
        })
        .await
    }

    /// Posts a comment, then schedules a forced re-read of the movie's
    /// comments and a statistics refresh
    pub async fn add_comment(&self, movie_id: MovieId, text: &str) -> SyncResult<()> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SyncError::InvalidInput(
                "Comment text cannot be empty".to_string(),
            ));
        }

        let (session, user_id) = self.ctx.active_user().await?;
        self.ctx.throttle(ResourceClass::Comments).await;

        tracing::info!(movie_id = %movie_id, user_id = %user_id, "Adding comment");
        let backend = Arc::clone(&self.ctx.backend);
        let result = self
            .ctx
            .call(
                self.ctx.settings.request_timeout,
                backend.add_comment(movie_id, user_id, content),
            )
            .await;

        match result {
            Ok(()) => {
                let fetcher = self.fetcher.clone();
                self.ctx.scheduler.schedule(
                    session,
                    TaskSlot::Comments(movie_id),
                    Duration::ZERO,
                    async move {
                        if let Err(e) = fetcher.fetch_comments(session, user_id, movie_id, true).await {
                            tracing::warn!(movie_id = %movie_id, error = %e, "Comment refresh failed");
                        }
                    },
                );
                self.schedule_stats_refresh(session, user_id, self.ctx.settings.comment_stats_delay);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(movie_id = %movie_id, error = %e, "Failed to add comment");
                self.ctx
                    .handle_failure(session, ResourceClass::Comments, &e)
                    .await;
                Err(e)
            }
        }
    }
}

fn was_liked(snapshot: &EntitySnapshot) -> bool {
    matches!(snapshot, EntitySnapshot::Like { liked: true, .. })
}
