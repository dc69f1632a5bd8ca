//! Keyed write-side throttling driven by an injectable clock.
//!
//! ```text
//! offer(k, v1) ─┐
//! offer(k, v2) ─┤  window  ├─► drain_due() yields (k, v3) once
//! offer(k, v3) ─┘
//! ```
//!
//! The first offer for a key opens a window; later offers inside it only
//! replace the pending value. When the window has elapsed the latest value
//! is released exactly once. Nothing here sleeps or spawns: the owner asks
//! [`Throttle::next_deadline`] and calls [`Throttle::drain_due`] when it fits.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source, measured from an arbitrary origin.
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven clock. Clones share the same time, so a test can keep one
/// and hand another to the engine.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.micros.fetch_add(by.as_micros() as u64, Ordering::SeqCst);
    }

    /// Jump to an absolute time. Going backwards is ignored.
    pub fn set(&self, at: Duration) {
        self.micros.fetch_max(at.as_micros() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone)]
struct Pending<V> {
    value: V,
    opened_at: Duration,
    coalesced: u64,
}

/// Running counters, useful for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleStats {
    /// Values offered.
    pub offered: u64,
    /// Values released by [`Throttle::drain_due`].
    pub released: u64,
    /// Values overwritten before release.
    pub coalesced: u64,
}

/// Coalesces rapid updates per key into one release per window.
#[derive(Debug, Clone)]
pub struct Throttle<K, V> {
    window: Duration,
    pending: HashMap<K, Pending<V>>,
    stats: ThrottleStats,
}

impl<K, V> Throttle<K, V>
where
    K: Eq + Hash + Clone,
{
    /// A zero `window` releases every value on the next drain.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            stats: ThrottleStats::default(),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record `value` for `key`, replacing any value still pending for it.
    pub fn offer(&mut self, key: K, value: V, now: Duration) {
        self.stats.offered += 1;
        match self.pending.get_mut(&key) {
            Some(pending) => {
                pending.value = value;
                pending.coalesced += 1;
                self.stats.coalesced += 1;
            }
            None => {
                self.pending.insert(
                    key,
                    Pending {
                        value,
                        opened_at: now,
                        coalesced: 0,
                    },
                );
            }
        }
    }

    /// Remove and return every entry whose window has elapsed at `now`.
    pub fn drain_due(&mut self, now: Duration) -> Vec<(K, V)> {
        let window = self.window;
        let due: Vec<K> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_sub(p.opened_at) >= window)
            .map(|(k, _)| k.clone())
            .collect();

        let mut released = Vec::with_capacity(due.len());
        for key in due {
            if let Some(pending) = self.pending.remove(&key) {
                if pending.coalesced > 0 {
                    log::trace!("released after coalescing {} update(s)", pending.coalesced);
                }
                released.push((key, pending.value));
            }
        }
        self.stats.released += released.len() as u64;
        released
    }

    /// Drop whatever is pending for `key`.
    pub fn cancel(&mut self, key: &K) -> Option<V> {
        self.pending.remove(key).map(|p| p.value)
    }

    /// Earliest time at which [`Throttle::drain_due`] will release something.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending
            .values()
            .map(|p| p.opened_at + self.window)
            .min()
    }

    /// Drop everything pending.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_idle(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> ThrottleStats {
        self.stats
    }
}
