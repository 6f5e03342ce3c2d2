//! Rate counters.
//!
//! The core only requires an atomic check-and-increment interface; a
//! distributed store can stand behind the same trait for multi-instance
//! deployments. The in-process implementation uses fixed one-minute windows.

use dashmap::DashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomic check-and-increment counter interface.
pub trait RateCounter: Send + Sync {
    /// Atomically check the counter for `key` against `limit` and increment
    /// it. Returns `false` when the limit is already reached (the increment
    /// is not applied in that case).
    fn check_and_increment(&self, key: &str, limit: u64) -> bool;

    /// Reset the counter for `key`.
    fn reset(&self, key: &str);
}

#[derive(Debug)]
struct WindowSlot {
    window: u64,
    count: u64,
}

/// In-process counter with fixed one-minute windows.
///
/// Suitable for single-instance deployments; counters roll over when the
/// window changes.
#[derive(Debug, Default)]
pub struct AtomicRateCounter {
    slots: DashMap<String, WindowSlot>,
}

impl AtomicRateCounter {
    /// Create an empty counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn current_window() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() / 60)
            .unwrap_or(0)
    }
}

impl RateCounter for AtomicRateCounter {
    fn check_and_increment(&self, key: &str, limit: u64) -> bool {
        let window = Self::current_window();
        let mut slot = self.slots.entry(key.to_string()).or_insert(WindowSlot {
            window,
            count: 0,
        });
        if slot.window != window {
            slot.window = window;
            slot.count = 0;
        }
        if slot.count >= limit {
            return false;
        }
        slot.count += 1;
        true
    }

    fn reset(&self, key: &str) {
        self.slots.remove(key);
    }
}
