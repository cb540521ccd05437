//! Staged bootstrap.
//!
//! On entering an authenticated session the watchlist is read at once, the
//! likes after `bootstrap_likes_delay`, the statistics after
//! `bootstrap_stats_delay` and the unread-notification counter after
//! `bootstrap_notifications_delay`, from where it keeps polling. The stages
//! never overlap, which keeps the burst of start-up reads under the
//! backend's limiter. Pending stages belong to the session and die with it.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::SyncResult,
    models::{SessionId, UserId},
    services::{
        context::SyncContext, fetchers::ResourceFetcher, notifications::NotificationService,
        scheduler::TaskSlot,
    },
};

#[derive(Clone)]
pub struct StagedBootstrap {
    ctx: Arc<SyncContext>,
    fetcher: ResourceFetcher,
    notifications: NotificationService,
}

impl StagedBootstrap {
    pub fn new(ctx: Arc<SyncContext>, fetcher: ResourceFetcher) -> Self {
        let notifications = NotificationService::new(Arc::clone(&ctx), fetcher.clone());
        Self {
            ctx,
            fetcher,
            notifications,
        }
    }

    /// Reads the watchlist now and schedules the later stages.
    ///
    /// The later stages are scheduled even if the watchlist read fails, as
    /// long as the session survived it. The watchlist error is returned.
    pub async fn run(&self, session: SessionId, user_id: UserId) -> SyncResult<()> {
        if !self.ctx.store.is_current(session).await {
            tracing::debug!(session = %session, "Session ended before bootstrap");
            return Ok(());
        }

        tracing::info!(session = %session, user_id = %user_id, "Starting staged bootstrap");
        let watchlist = self.fetcher.fetch_watchlist(session, user_id, true).await;

        if !self.ctx.store.is_current(session).await {
            return watchlist.map(|_| ());
        }

        let settings = &self.ctx.settings;

        let fetcher = self.fetcher.clone();
        self.ctx.scheduler.schedule(
            session,
            TaskSlot::BootstrapLikes,
            settings.bootstrap_likes_delay,
            async move {
                if let Err(e) = fetcher.fetch_likes(session, user_id, true).await {
                    tracing::warn!(error = %e, "Bootstrap likes stage failed");
                }
            },
        );

        let fetcher = self.fetcher.clone();
        self.ctx.scheduler.schedule(
            session,
            TaskSlot::BootstrapStats,
            settings.bootstrap_stats_delay,
            async move {
                if let Err(e) = fetcher.fetch_stats(session, user_id, false).await {
                    tracing::warn!(error = %e, "Bootstrap statistics stage failed");
                }
            },
        );

        self.notifications
            .schedule_unread_poll(session, user_id, settings.bootstrap_notifications_delay);

        watchlist.map(|_| ())
    }

    /// Runs the bootstrap for `session` after `delay`
    pub fn schedule_start(&self, session: SessionId, user_id: UserId, delay: Duration) {
        let bootstrap = self.clone();
        self.ctx
            .scheduler
            .schedule(session, TaskSlot::Bootstrap, delay, async move {
                if let Err(e) = bootstrap.run(session, user_id).await {
                    tracing::warn!(error = %e, "Bootstrap watchlist stage failed");
                }
            });
    }
}
