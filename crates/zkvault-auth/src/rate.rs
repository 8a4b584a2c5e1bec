//! Injected rate-limit counting.
//!
//! The counter is an explicit dependency rather than a process-global so
//! that login and hint flows stay testable without real time, and so that a
//! horizontally scaled deployment can back it with a shared store instead
//! of per-process memory.

use std::sync::Arc;

use dashmap::DashMap;

/// A windowed hit counter keyed by arbitrary strings (email, IP, ...).
pub trait RateCounter: Send + Sync {
    /// Record a hit for `key` at `now` and return the total hits in the
    /// current window of `window_secs`.
    fn hit(&self, key: &str, window_secs: i64, now: i64) -> u32;
}

/// In-memory counter on `DashMap`: one fixed window per key.
#[derive(Default)]
pub struct MemoryRateCounter {
    buckets: DashMap<String, (i64, u32)>,
}

impl MemoryRateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convenience constructor for the usual `Arc<dyn RateCounter>` shape.
    pub fn shared() -> Arc<dyn RateCounter> {
        Arc::new(Self::new())
    }
}

impl RateCounter for MemoryRateCounter {
    fn hit(&self, key: &str, window_secs: i64, now: i64) -> u32 {
        let window_start = now - now.rem_euclid(window_secs.max(1));
        let mut entry = self.buckets.entry(key.to_string()).or_insert((window_start, 0));
        if entry.0 != window_start {
            *entry = (window_start, 0);
        }
        entry.1 += 1;
        entry.1
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_within_a_window() {
        let counter = MemoryRateCounter::new();
        assert_eq!(counter.hit("a@x.com", 60, 1_000), 1);
        assert_eq!(counter.hit("a@x.com", 60, 1_030), 2);
        assert_eq!(counter.hit("other", 60, 1_030), 1);
    }

    #[test]
    fn window_rollover_resets() {
        let counter = MemoryRateCounter::new();
        assert_eq!(counter.hit("a@x.com", 60, 1_000), 1);
        assert_eq!(counter.hit("a@x.com", 60, 1_000 + 120), 1);
    }
}
