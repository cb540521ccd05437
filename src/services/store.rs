//! In-memory entity store for the signed-in user.
//!
//! Every write that originates from asynchronous work (fetch results,
//! mutation confirmations, scheduled refreshes) names the session it was
//! started under and is discarded when that session is no longer current.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{
    error::{SyncError, SyncResult},
    models::{
        Comment, Movie, MovieId, Notification, NotificationId, ResourceClass, SessionId,
        SessionPhase, UserIdentity, UserStats,
    },
};

/// Reads and writes currently in flight
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct LoadingFlags {
    pub likes: BTreeSet<MovieId>,
    pub watchlist: BTreeSet<MovieId>,
    pub stats: bool,
    pub recommendations: bool,
    pub notifications: bool,
    pub notification_edits: BTreeSet<NotificationId>,
    pub all_notifications: bool,
    pub comments: BTreeSet<MovieId>,
}

/// Read-side loading flag owned by whoever holds the resource's flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceLoading {
    Stats,
    Recommendations,
    Notifications,
    Comments(MovieId),
}

/// Observable state of the current user
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EntityState {
    pub phase: SessionPhase,
    pub identity: Option<UserIdentity>,
    pub watchlist: BTreeMap<MovieId, Movie>,
    pub liked: BTreeSet<MovieId>,
    /// Aggregate like count per movie, when known
    pub like_counts: BTreeMap<MovieId, u64>,
    pub stats: Option<UserStats>,
    pub notifications: Vec<Notification>,
    pub unread_notifications: u32,
    /// Comment threads per movie, as last read
    pub comments: BTreeMap<MovieId, Vec<Comment>>,
    pub loading: LoadingFlags,
    /// Resources whose last refresh failed; their data may be out of date
    pub stale: BTreeSet<ResourceClass>,
}

/// Which per-entity value a mutation edits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationTarget {
    Watchlist,
    Like,
}

impl MutationTarget {
    pub fn resource_class(self) -> ResourceClass {
        match self {
            MutationTarget::Watchlist => ResourceClass::Watchlist,
            MutationTarget::Like => ResourceClass::Likes,
        }
    }
}

/// Confirmed change to the held notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationEdit {
    MarkRead(NotificationId),
    MarkAllRead,
    Delete(NotificationId),
}

/// Value of one entity captured before an optimistic edit
#[derive(Debug, Clone, PartialEq)]
pub enum EntitySnapshot {
    Watchlist(Option<Movie>),
    Like { liked: bool, count: Option<u64> },
}

/// Result of a wholesale replacement attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Applied,
    /// A mutation on the same resource is in flight or landed after the
    /// read began; the read result is not applied
    Superseded,
    /// The session that issued the read has ended
    StaleSession,
}

#[derive(Debug, Default)]
struct StoreInner {
    session: Option<SessionId>,
    /// Bumped on every optimistic edit of a resource
    epochs: HashMap<ResourceClass, u64>,
    state: EntityState,
}

impl StoreInner {
    fn is_current(&self, session: SessionId) -> bool {
        self.session == Some(session)
    }

    fn flags(&mut self, target: MutationTarget) -> &mut BTreeSet<MovieId> {
        match target {
            MutationTarget::Watchlist => &mut self.state.loading.watchlist,
            MutationTarget::Like => &mut self.state.loading.likes,
        }
    }

    fn capture(&self, target: MutationTarget, movie_id: MovieId) -> EntitySnapshot {
        match target {
            MutationTarget::Watchlist => {
                EntitySnapshot::Watchlist(self.state.watchlist.get(&movie_id).cloned())
            }
            MutationTarget::Like => EntitySnapshot::Like {
                liked: self.state.liked.contains(&movie_id),
                count: self.state.like_counts.get(&movie_id).copied(),
            },
        }
    }

    fn restore(&mut self, movie_id: MovieId, snapshot: EntitySnapshot) {
        match snapshot {
            EntitySnapshot::Watchlist(Some(movie)) => {
                self.state.watchlist.insert(movie_id, movie);
            }
            EntitySnapshot::Watchlist(None) => {
                self.state.watchlist.remove(&movie_id);
            }
            EntitySnapshot::Like { liked, count } => {
                if liked {
                    self.state.liked.insert(movie_id);
                } else {
                    self.state.liked.remove(&movie_id);
                }
                match count {
                    Some(count) => self.state.like_counts.insert(movie_id, count),
                    None => self.state.like_counts.remove(&movie_id),
                };
            }
        }
    }

    fn epoch(&self, class: ResourceClass) -> u64 {
        self.epochs.get(&class).copied().unwrap_or(0)
    }

    fn has_pending_edits(&self, class: ResourceClass) -> bool {
        let loading = &self.state.loading;
        match class {
            ResourceClass::Watchlist => !loading.watchlist.is_empty(),
            ResourceClass::Likes => !loading.likes.is_empty(),
            ResourceClass::Notifications => {
                !loading.notification_edits.is_empty() || loading.all_notifications
            }
            _ => false,
        }
    }

    fn check_replace(
        &self,
        session: SessionId,
        class: ResourceClass,
        epoch_at_start: u64,
    ) -> ReplaceOutcome {
        if !self.is_current(session) {
            return ReplaceOutcome::StaleSession;
        }
        if self.has_pending_edits(class) || self.epoch(class) != epoch_at_start {
            return ReplaceOutcome::Superseded;
        }
        ReplaceOutcome::Applied
    }

    fn bump_epoch(&mut self, class: ResourceClass) {
        *self.epochs.entry(class).or_insert(0) += 1;
    }

    fn apply_notification_edit(&mut self, edit: NotificationEdit) {
        let state = &mut self.state;
        match edit {
            NotificationEdit::MarkRead(id) => {
                let held = state.notifications.iter_mut().find(|n| n.id == id);
                // The count comes from the server, so an id that is not held
                // still counts as unread
                let was_unread = held.as_ref().map_or(true, |n| !n.read_status);
                if let Some(notification) = held {
                    notification.read_status = true;
                }
                if was_unread {
                    state.unread_notifications = state.unread_notifications.saturating_sub(1);
                }
            }
            NotificationEdit::MarkAllRead => {
                for notification in state.notifications.iter_mut() {
                    notification.read_status = true;
                }
                state.unread_notifications = 0;
            }
            NotificationEdit::Delete(id) => {
                let Some(index) = state.notifications.iter().position(|n| n.id == id) else {
                    return;
                };
                let removed = state.notifications.remove(index);
                if !removed.read_status {
                    state.unread_notifications = state.unread_notifications.saturating_sub(1);
                }
            }
        }
    }
}

/// Shared handle to the entity store
#[derive(Clone, Default)]
pub struct EntityStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------------
    // Session lifecycle
    // ------------------------------------------------------------------------

    /// Starts a new session: drops all previous data and installs `identity`
    pub async fn begin_session(&self, identity: UserIdentity) -> SessionId {
        let session = SessionId::new();
        let mut inner = self.inner.write().await;
        *inner = StoreInner {
            session: Some(session),
            epochs: HashMap::new(),
            state: EntityState {
                phase: SessionPhase::Authenticated,
                identity: Some(identity),
                ..EntityState::default()
            },
        };
        session
    }

    /// Clears identity and every per-user value in one step.
    ///
    /// Returns the session that was current, if any.
    pub async fn clear_all(&self, phase: SessionPhase) -> Option<SessionId> {
        let mut inner = self.inner.write().await;
        let previous = inner.session.take();
        *inner = StoreInner {
            session: None,
            epochs: HashMap::new(),
            state: EntityState {
                phase,
                ..EntityState::default()
            },
        };
        previous
    }

    pub async fn set_phase(&self, phase: SessionPhase) {
        self.inner.write().await.state.phase = phase;
    }

    /// Moves `from` to `to` only if the phase is currently `from`
    pub async fn transition_phase(&self, from: SessionPhase, to: SessionPhase) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state.phase == from {
            inner.state.phase = to;
            true
        } else {
            false
        }
    }

    pub async fn replace_identity(&self, session: SessionId, identity: UserIdentity) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return false;
        }
        inner.state.identity = Some(identity);
        true
    }

    // ------------------------------------------------------------------------
    // Readers
    // ------------------------------------------------------------------------

    pub async fn snapshot(&self) -> EntityState {
        self.inner.read().await.state.clone()
    }

    pub async fn current_session(&self) -> Option<SessionId> {
        self.inner.read().await.session
    }

    pub async fn is_current(&self, session: SessionId) -> bool {
        self.inner.read().await.is_current(session)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.inner.read().await.state.phase
    }

    pub async fn identity(&self) -> Option<UserIdentity> {
        self.inner.read().await.state.identity.clone()
    }

    pub async fn watchlist(&self) -> Vec<Movie> {
        self.inner.read().await.state.watchlist.values().cloned().collect()
    }

    pub async fn is_in_watchlist(&self, movie_id: MovieId) -> bool {
        self.inner.read().await.state.watchlist.contains_key(&movie_id)
    }

    pub async fn liked(&self) -> Vec<MovieId> {
        self.inner.read().await.state.liked.iter().copied().collect()
    }

    pub async fn is_liked(&self, movie_id: MovieId) -> bool {
        self.inner.read().await.state.liked.contains(&movie_id)
    }

    pub async fn like_count(&self, movie_id: MovieId) -> Option<u64> {
        self.inner.read().await.state.like_counts.get(&movie_id).copied()
    }

    pub async fn stats(&self) -> Option<UserStats> {
        self.inner.read().await.state.stats.clone()
    }

    pub async fn loading(&self) -> LoadingFlags {
        self.inner.read().await.state.loading.clone()
    }

    pub async fn is_like_loading(&self, movie_id: MovieId) -> bool {
        self.inner.read().await.state.loading.likes.contains(&movie_id)
    }

    pub async fn is_watchlist_loading(&self, movie_id: MovieId) -> bool {
        self.inner.read().await.state.loading.watchlist.contains(&movie_id)
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.inner.read().await.state.notifications.clone()
    }

    pub async fn unread_notifications(&self) -> u32 {
        self.inner.read().await.state.unread_notifications
    }

    /// Comments held for `movie_id`; `None` when they were never read
    pub async fn comments(&self, movie_id: MovieId) -> Option<Vec<Comment>> {
        self.inner.read().await.state.comments.get(&movie_id).cloned()
    }

    pub async fn is_stale(&self, class: ResourceClass) -> bool {
        self.inner.read().await.state.stale.contains(&class)
    }

    /// Optimistic-edit counter for `class`, captured by readers before a
    /// fetch so a later replacement can detect intervening edits
    pub async fn mutation_epoch(&self, class: ResourceClass) -> u64 {
        self.inner.read().await.epoch(class)
    }

    // ------------------------------------------------------------------------
    // Wholesale replacement (fetchers)
    // ------------------------------------------------------------------------

    pub async fn replace_watchlist(
        &self,
        session: SessionId,
        movies: Vec<Movie>,
        epoch_at_start: u64,
    ) -> ReplaceOutcome {
        let mut inner = self.inner.write().await;
        let outcome = inner.check_replace(session, ResourceClass::Watchlist, epoch_at_start);
        if outcome == ReplaceOutcome::Applied {
            // Keyed by id, so duplicates in the payload collapse
            inner.state.watchlist = movies.into_iter().map(|m| (m.id, m)).collect();
            inner.state.stale.remove(&ResourceClass::Watchlist);
        }
        outcome
    }

    pub async fn replace_likes(
        &self,
        session: SessionId,
        movie_ids: Vec<MovieId>,
        epoch_at_start: u64,
    ) -> ReplaceOutcome {
        let mut inner = self.inner.write().await;
        let outcome = inner.check_replace(session, ResourceClass::Likes, epoch_at_start);
        if outcome == ReplaceOutcome::Applied {
            inner.state.liked = movie_ids.into_iter().collect();
            inner.state.stale.remove(&ResourceClass::Likes);
        }
        outcome
    }

    pub async fn replace_stats(&self, session: SessionId, stats: UserStats) -> ReplaceOutcome {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return ReplaceOutcome::StaleSession;
        }
        inner.state.stats = Some(stats);
        inner.state.stale.remove(&ResourceClass::Stats);
        ReplaceOutcome::Applied
    }

    pub async fn replace_notifications(
        &self,
        session: SessionId,
        notifications: Vec<Notification>,
        epoch_at_start: u64,
    ) -> ReplaceOutcome {
        let mut inner = self.inner.write().await;
        let outcome = inner.check_replace(session, ResourceClass::Notifications, epoch_at_start);
        if outcome == ReplaceOutcome::Applied {
            inner.state.notifications = notifications;
            inner.state.stale.remove(&ResourceClass::Notifications);
        }
        outcome
    }

    pub async fn replace_unread_count(
        &self,
        session: SessionId,
        unread: u32,
        epoch_at_start: u64,
    ) -> ReplaceOutcome {
        let mut inner = self.inner.write().await;
        let outcome = inner.check_replace(session, ResourceClass::Notifications, epoch_at_start);
        if outcome == ReplaceOutcome::Applied {
            inner.state.unread_notifications = unread;
        }
        outcome
    }

    pub async fn replace_comments(
        &self,
        session: SessionId,
        movie_id: MovieId,
        comments: Vec<Comment>,
    ) -> ReplaceOutcome {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return ReplaceOutcome::StaleSession;
        }
        inner.state.comments.insert(movie_id, comments);
        inner.state.stale.remove(&ResourceClass::Comments);
        ReplaceOutcome::Applied
    }

    pub async fn mark_stale(&self, session: SessionId, class: ResourceClass) {
        let mut inner = self.inner.write().await;
        if inner.is_current(session) {
            inner.state.stale.insert(class);
        }
    }

    pub async fn set_loading(&self, session: SessionId, which: ResourceLoading, loading: bool) {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return;
        }
        let flags = &mut inner.state.loading;
        match which {
            ResourceLoading::Stats => flags.stats = loading,
            ResourceLoading::Recommendations => flags.recommendations = loading,
            ResourceLoading::Notifications => flags.notifications = loading,
            ResourceLoading::Comments(movie_id) => {
                if loading {
                    flags.comments.insert(movie_id);
                } else {
                    flags.comments.remove(&movie_id);
                }
            }
        }
    }

    // ------------------------------------------------------------------------
    // Optimistic mutations
    // ------------------------------------------------------------------------

    /// Sets the loading flag for `movie_id`, captures its current value and
    /// applies the optimistic edit, all under one lock.
    ///
    /// Fails with `MutationInFlight` if the flag is already set.
    pub async fn begin_mutation<F>(
        &self,
        session: SessionId,
        target: MutationTarget,
        movie_id: MovieId,
        apply: F,
    ) -> SyncResult<EntitySnapshot>
    where
        F: FnOnce(&mut EntityState),
    {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return Err(SyncError::NotSignedIn);
        }
        if inner.flags(target).contains(&movie_id) {
            return Err(SyncError::MutationInFlight(movie_id));
        }

        let snapshot = inner.capture(target, movie_id);
        inner.flags(target).insert(movie_id);
        inner.bump_epoch(target.resource_class());
        apply(&mut inner.state);

        Ok(snapshot)
    }

    /// Clears the loading flag and applies authoritative values, if any
    pub async fn commit_mutation<F>(
        &self,
        session: SessionId,
        target: MutationTarget,
        movie_id: MovieId,
        apply: F,
    ) -> bool
    where
        F: FnOnce(&mut EntityState),
    {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return false;
        }
        inner.flags(target).remove(&movie_id);
        apply(&mut inner.state);
        true
    }

    /// Clears the loading flag and restores the captured value
    pub async fn rollback_mutation(
        &self,
        session: SessionId,
        target: MutationTarget,
        movie_id: MovieId,
        snapshot: EntitySnapshot,
    ) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return false;
        }
        inner.flags(target).remove(&movie_id);
        inner.restore(movie_id, snapshot);
        true
    }

    // ------------------------------------------------------------------------
    // Notification edits
    // ------------------------------------------------------------------------

    /// Marks `edit` in flight; the held notifications change only once the
    /// backend confirms it
    pub async fn begin_notification_edit(
        &self,
        session: SessionId,
        edit: NotificationEdit,
    ) -> SyncResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return Err(SyncError::NotSignedIn);
        }
        let flags = &mut inner.state.loading;
        match edit {
            NotificationEdit::MarkRead(id) | NotificationEdit::Delete(id) => {
                if !flags.notification_edits.insert(id) {
                    return Err(SyncError::NotificationInFlight(id));
                }
            }
            NotificationEdit::MarkAllRead => {
                if flags.all_notifications {
                    return Err(SyncError::NotificationsInFlight);
                }
                flags.all_notifications = true;
            }
        }
        Ok(())
    }

    /// Clears the in-flight marker of `edit` and, when `confirmed`, applies
    /// it. Returns false if `session` has ended.
    pub async fn finish_notification_edit(
        &self,
        session: SessionId,
        edit: NotificationEdit,
        confirmed: bool,
    ) -> bool {
        let mut inner = self.inner.write().await;
        if !inner.is_current(session) {
            return false;
        }
        match edit {
            NotificationEdit::MarkRead(id) | NotificationEdit::Delete(id) => {
                inner.state.loading.notification_edits.remove(&id);
            }
            NotificationEdit::MarkAllRead => inner.state.loading.all_notifications = false,
        }
        if confirmed {
            inner.apply_notification_edit(edit);
            inner.bump_epoch(ResourceClass::Notifications);
        }
        true
    }
}
