//! Cancellable delayed tasks keyed by session.
//!
//! Every task belongs to a session and a named slot. Scheduling into an
//! occupied slot replaces the pending task, and ending a session aborts all
//! of its tasks at once.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::models::{MovieId, SessionId};

/// Named slot for a scheduled task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskSlot {
    /// Initial staged bootstrap after authentication
    Bootstrap,
    BootstrapLikes,
    BootstrapStats,
    ConfirmWatchlist,
    ConfirmLikes,
    StatsRefresh,
    /// Periodic unread-notification counter read; reschedules itself
    UnreadPoll,
    /// Forced re-read of a movie's comments after posting one
    Comments(MovieId),
}

#[derive(Debug)]
struct Pending {
    generation: u64,
    handle: AbortHandle,
}

#[derive(Debug, Default)]
struct Registry {
    next_generation: u64,
    sessions: HashMap<SessionId, HashMap<TaskSlot, Pending>>,
}

#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    registry: Arc<Mutex<Registry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `task` after `delay` unless the session or slot is cancelled
    /// first. A task already pending in the same slot is aborted.
    pub fn schedule<F>(&self, session: SessionId, slot: TaskSlot, delay: Duration, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut registry = self.lock();
        registry.next_generation += 1;
        let generation = registry.next_generation;

        let scheduler = self.clone();
        let join = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Leave the registry before running so the task can reschedule its own slot
            scheduler.finish(session, slot, generation);
            tracing::debug!(session = %session, slot = ?slot, "Scheduled task firing");
            task.await;
        });

        let slots = registry.sessions.entry(session).or_default();
        if let Some(previous) = slots.insert(
            slot,
            Pending {
                generation,
                handle: join.abort_handle(),
            },
        ) {
            previous.handle.abort();
            tracing::debug!(session = %session, slot = ?slot, "Replaced pending task");
        }
    }

    /// Aborts every pending task of `session`
    pub fn cancel_session(&self, session: SessionId) {
        let slots = self.lock().sessions.remove(&session);
        if let Some(slots) = slots {
            tracing::info!(session = %session, cancelled = slots.len(), "Cancelled scheduled tasks");
            for pending in slots.into_values() {
                pending.handle.abort();
            }
        }
    }

    pub fn is_pending(&self, session: SessionId, slot: TaskSlot) -> bool {
        self.lock()
            .sessions
            .get(&session)
            .map(|slots| slots.contains_key(&slot))
            .unwrap_or(false)
    }

    pub fn pending_count(&self, session: SessionId) -> usize {
        self.lock()
            .sessions
            .get(&session)
            .map(HashMap::len)
            .unwrap_or(0)
    }

    fn finish(&self, session: SessionId, slot: TaskSlot, generation: u64) {
        let mut registry = self.lock();
        if let Some(slots) = registry.sessions.get_mut(&session) {
            if slots.get(&slot).map(|p| p.generation) == Some(generation) {
                slots.remove(&slot);
            }
            if slots.is_empty() {
                registry.sessions.remove(&session);
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
