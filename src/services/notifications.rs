//! Notification edits and the unread-counter poll.
//!
//! Edits are applied to the held notifications only after the backend
//! confirms them. One edit per notification may be in flight, plus one
//! mark-all.

use std::sync::Arc;
use std::time::Duration;

use crate::{
    error::SyncResult,
    models::{NotificationId, ResourceClass, SessionId, UserId},
    services::{
        context::SyncContext, fetchers::ResourceFetcher, scheduler::TaskSlot,
        store::NotificationEdit,
    },
};

#[derive(Clone)]
pub struct NotificationService {
    ctx: Arc<SyncContext>,
    fetcher: ResourceFetcher,
}

impl NotificationService {
    pub fn new(ctx: Arc<SyncContext>, fetcher: ResourceFetcher) -> Self {
        Self { ctx, fetcher }
    }

    pub async fn mark_read(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.edit(NotificationEdit::MarkRead(notification_id)).await
    }

    pub async fn mark_all_read(&self) -> SyncResult<()> {
        self.edit(NotificationEdit::MarkAllRead).await
    }

    pub async fn delete(&self, notification_id: NotificationId) -> SyncResult<()> {
        self.edit(NotificationEdit::Delete(notification_id)).await
    }

    async fn edit(&self, edit: NotificationEdit) -> SyncResult<()> {
        let (session, user_id) = self.ctx.active_user().await?;
        self.ctx.store.begin_notification_edit(session, edit).await?;
        self.ctx.throttle(ResourceClass::Notifications).await;

        tracing::info!(edit = ?edit, user_id = %user_id, "Updating notifications");
        let backend = Arc::clone(&self.ctx.backend);
        let call = async move {
            match edit {
                NotificationEdit::MarkRead(id) => backend.mark_notification_read(id).await,
                NotificationEdit::MarkAllRead => backend.mark_all_notifications_read(user_id).await,
                NotificationEdit::Delete(id) => backend.delete_notification(id).await,
            }
        };
        let result = self.ctx.call(self.ctx.settings.request_timeout, call).await;

        self.ctx
            .store
            .finish_notification_edit(session, edit, result.is_ok())
            .await;

        if let Err(e) = &result {
            tracing::warn!(edit = ?edit, error = %e, "Notification update failed");
            self.ctx
                .handle_failure(session, ResourceClass::Notifications, e)
                .await;
        }
        result
    }

    /// Reads the unread counter after `delay`, then every
    /// `unread_poll_interval` for as long as `session` stays current
    pub fn schedule_unread_poll(&self, session: SessionId, user_id: UserId, delay: Duration) {
        let service = self.clone();
        self.ctx
            .scheduler
            .schedule(session, TaskSlot::UnreadPoll, delay, async move {
                if let Err(e) = service.fetcher.fetch_unread_count(session, user_id).await {
                    tracing::warn!(error = %e, "Unread notification poll failed");
                }
                if service.ctx.store.is_current(session).await {
                    let interval = service.ctx.settings.unread_poll_interval;
                    service.schedule_unread_poll(session, user_id, interval);
                }
            });
    }
}
