//! Single-flight guard with per-resource debounce.
//!
//! At most one operation per [`FlightKey`] runs at a time. Entering hands
//! back a [`FlightGuard`] that frees the slot when dropped, so early returns
//! and cancelled futures release it too.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use crate::models::{MovieId, ResourceClass};

/// One single-flight slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightKey {
    Resource(ResourceClass),
    /// Unread-notification counter, read apart from the notification list
    UnreadCount,
    /// Comment thread of one movie
    Comments(MovieId),
}

impl FlightKey {
    /// Backoff class the keyed operation is throttled under
    pub fn class(self) -> ResourceClass {
        match self {
            FlightKey::Resource(class) => class,
            FlightKey::UnreadCount => ResourceClass::Notifications,
            FlightKey::Comments(_) => ResourceClass::Comments,
        }
    }
}

impl From<ResourceClass> for FlightKey {
    fn from(class: ResourceClass) -> Self {
        FlightKey::Resource(class)
    }
}

type Slots = Arc<Mutex<HashMap<FlightKey, FlightState>>>;

#[derive(Debug, Default)]
struct FlightState {
    in_flight: bool,
    last_started: Option<Instant>,
}

/// Why an entry attempt was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Another operation for the key is running
    InFlight,
    /// An unforced request arrived inside the debounce window
    Debounced,
}

#[derive(Debug, Default, Clone)]
pub struct SingleFlight {
    slots: Slots,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `key` in flight, or returns `None` if it already is
    pub fn try_enter(&self, key: impl Into<FlightKey>) -> Option<FlightGuard> {
        self.try_enter_debounced(key, None, true).ok()
    }

    /// Like [`try_enter`](Self::try_enter), but an unforced request is also
    /// refused when the previous operation for `key` started less than
    /// `window` ago
    pub fn try_enter_debounced(
        &self,
        key: impl Into<FlightKey>,
        window: Option<Duration>,
        force: bool,
    ) -> Result<FlightGuard, Skip> {
        let key = key.into();
        let mut slots = self.lock();
        let state = slots.entry(key).or_default();

        if state.in_flight {
            return Err(Skip::InFlight);
        }

        let now = Instant::now();
        if let (false, Some(window), Some(last)) = (force, window, state.last_started) {
            if now.saturating_duration_since(last) < window {
                return Err(Skip::Debounced);
            }
        }

        state.in_flight = true;
        state.last_started = Some(now);

        Ok(FlightGuard {
            slots: Arc::clone(&self.slots),
            key,
        })
    }

    pub fn is_in_flight(&self, key: impl Into<FlightKey>) -> bool {
        self.lock()
            .get(&key.into())
            .map(|s| s.in_flight)
            .unwrap_or(false)
    }

    /// Forgets debounce history of the per-user resources. The session
    /// slot keeps its history so identity signals stay debounced across
    /// sign-in and sign-out. In-flight markers stay owned by their guards.
    pub fn reset(&self) {
        for (key, state) in self.lock().iter_mut() {
            if *key != FlightKey::Resource(ResourceClass::Session) {
                state.last_started = None;
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<FlightKey, FlightState>> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Releases the single-flight slot on drop
#[derive(Debug)]
pub struct FlightGuard {
    slots: Slots,
    key: FlightKey,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let mut slots = self
            .slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(state) = slots.get_mut(&self.key) {
            state.in_flight = false;
        }
    }
}
