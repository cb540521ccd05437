//! Per-resource-class backoff.
//!
//! Each class keeps the start instant of its latest claimed call. A caller
//! claims the next free start, `min_interval` after the previous one, under
//! the tracker lock, then sleeps until it. Concurrent callers therefore line
//! up one interval apart instead of waking together. A rate-limited reply
//! pushes the record into the future; callers already asleep notice the
//! penalty when they wake and claim again.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use crate::models::ResourceClass;

#[derive(Debug, Clone, Copy)]
struct Record {
    last: Instant,
    penalties: u64,
}

impl Record {
    fn next_slot(&self, min_interval: Duration, now: Instant) -> Instant {
        (self.last + min_interval).max(now)
    }
}

#[derive(Debug, Default)]
pub struct BackoffTracker {
    records: Mutex<HashMap<ResourceClass, Record>>,
}

impl BackoffTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the next call slot for `class` and suspends the caller until it
    /// arrives. Returns the total time waited.
    pub async fn acquire(&self, class: ResourceClass, min_interval: Duration) -> Duration {
        let start = Instant::now();

        loop {
            let (slot, penalties) = {
                let now = Instant::now();
                let mut records = self.lock();
                let slot = records
                    .get(&class)
                    .map_or(now, |record| record.next_slot(min_interval, now));
                let record = records.entry(class).or_insert(Record { last: slot, penalties: 0 });
                record.last = slot;
                (slot, record.penalties)
            };

            let wait = slot.saturating_duration_since(Instant::now());
            if wait.is_zero() {
                break;
            }

            tracing::debug!(
                resource = %class,
                wait_ms = wait.as_millis() as u64,
                "Waiting to avoid rate limiting"
            );
            tokio::time::sleep_until(slot).await;

            // A reset drops the record; only a penalty applied meanwhile
            // moves the slot
            match self.lock().get(&class) {
                Some(record) if record.penalties != penalties => {
                    tracing::debug!(resource = %class, "Backoff extended while waiting, claiming again");
                }
                _ => break,
            }
        }

        start.elapsed()
    }

    /// Pushes the record for `class` to at least `now + penalty`
    pub fn penalize(&self, class: ResourceClass, penalty: Duration) {
        let until = Instant::now() + penalty;
        tracing::warn!(
            resource = %class,
            penalty_ms = penalty.as_millis() as u64,
            "Rate limited, extending backoff"
        );

        let mut records = self.lock();
        let record = records.entry(class).or_insert(Record { last: until, penalties: 0 });
        record.last = record.last.max(until);
        record.penalties += 1;
    }

    /// Forgets every record except the session one, so a rate-limited
    /// verification stays penalised across a sign-out
    pub fn reset(&self) {
        self.lock().retain(|class, _| *class == ResourceClass::Session);
    }

    /// How long a caller claiming now would have to wait
    #[cfg(test)]
    pub fn required_wait(&self, class: ResourceClass, min_interval: Duration) -> Duration {
        let now = Instant::now();
        self.lock()
            .get(&class)
            .map_or(Duration::ZERO, |record| {
                record.next_slot(min_interval, now).saturating_duration_since(now)
            })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ResourceClass, Record>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
