//! Countdown timer registry.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Default countdown tick cadence.
const TICK: Duration = Duration::from_secs(1);

struct TimerEntry {
    generation: u64,
    expires_at: DateTime<Utc>,
    cancel: CancellationToken,
}

/// A registry of per-entity countdown timers.
///
/// Arming an already-armed ID replaces its timer; the replaced timer never
/// fires. Each timer fires its callback exactly once, at the first tick at
/// or after the deadline, then disarms itself.
///
/// Must be used within a Tokio runtime — arming spawns the countdown task.
pub struct ExpiryClock {
    timers: Arc<Mutex<HashMap<String, TimerEntry>>>,
    next_generation: AtomicU64,
    tick: Duration,
}

impl Default for ExpiryClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ExpiryClock {
    /// Create a clock with the standard one-second tick.
    #[must_use]
    pub fn new() -> Self {
        Self::with_tick(TICK)
    }

    /// Create a clock with a custom tick cadence (tests).
    #[must_use]
    pub fn with_tick(tick: Duration) -> Self {
        Self {
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            tick,
        }
    }

    /// Arm (or replace) the timer for `id`, firing `on_expire` once when
    /// `expires_at` passes.
    pub fn arm<F>(&self, id: impl Into<String>, expires_at: DateTime<Utc>, on_expire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let id = id.into();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        let remaining = (expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + remaining;

        {
            let mut timers = self.timers.lock();
            if let Some(previous) = timers.insert(
                id.clone(),
                TimerEntry {
                    generation,
                    expires_at,
                    cancel: cancel.clone(),
                },
            ) {
                previous.cancel.cancel();
            }
        }

        let timers = Arc::clone(&self.timers);
        let tick = self.tick;
        drop(tokio::spawn(async move {
            if !run_countdown(deadline, tick, &cancel).await {
                return;
            }
            // Fire only if we are still the registered timer for this ID;
            // a disarm or replacement that raced the last tick wins.
            let still_armed = {
                let mut map = timers.lock();
                match map.get(&id) {
                    Some(entry) if entry.generation == generation => {
                        let _ = map.remove(&id);
                        true
                    }
                    _ => false,
                }
            };
            if still_armed {
                debug!(id, "expiry timer fired");
                on_expire();
            }
        }));
    }

    /// Disarm the timer for `id`, if armed.
    pub fn disarm(&self, id: &str) {
        if let Some(entry) = self.timers.lock().remove(id) {
            entry.cancel.cancel();
        }
    }

    /// Disarm every timer.
    pub fn clear(&self) {
        for (_, entry) in self.timers.lock().drain() {
            entry.cancel.cancel();
        }
    }

    /// Seconds until `id` expires, clamped to zero. `None` when not armed.
    #[must_use]
    pub fn remaining_seconds(&self, id: &str) -> Option<i64> {
        self.timers
            .lock()
            .get(id)
            .map(|entry| (entry.expires_at - Utc::now()).num_seconds().max(0))
    }

    /// Number of currently armed timers.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.timers.lock().len()
    }
}

/// Tick until the deadline passes. Returns `false` when cancelled first.
async fn run_countdown(deadline: Instant, tick: Duration, cancel: &CancellationToken) -> bool {
    let mut interval = time::interval(tick);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if Instant::now() >= deadline {
                    return true;
                }
            }
            () = cancel.cancelled() => {
                return false;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
