//! # Replay Guard
//!
//! Optional second line of defence on top of the timestamp window: remembers
//! every accepted signature until its timestamp falls out of the window, and
//! rejects a second request carrying the same signature.
//!
//! Memory is bounded by the request rate times the window length.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Time-bounded cache of accepted signatures.
pub struct ReplayGuard {
    /// Signature fingerprint -> request timestamp.
    seen: Mutex<HashMap<Vec<u8>, i64>>,

    /// Accepted window in seconds on either side of `now`.
    window_secs: u64,

    /// Garbage collection interval in seconds.
    gc_interval_secs: u64,

    /// Last garbage collection time.
    last_gc: Mutex<i64>,
}

impl ReplayGuard {
    /// Default garbage collection interval.
    pub const DEFAULT_GC_INTERVAL: u64 = 10;

    /// Create a guard for the given timestamp window.
    #[must_use]
    pub fn new(window_secs: u64) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            window_secs,
            gc_interval_secs: Self::DEFAULT_GC_INTERVAL,
            last_gc: Mutex::new(0),
        }
    }

    /// Record a signature fingerprint, returning `false` if it was already
    /// recorded.
    ///
    /// Callers must have checked the timestamp window first; this only
    /// deduplicates.
    pub fn check_and_record(&self, signature: &[u8], timestamp: i64, now: i64) -> bool {
        self.maybe_collect(now);

        let mut seen = self.seen.lock();
        if seen.contains_key(signature) {
            return false;
        }
        seen.insert(signature.to_vec(), timestamp);
        true
    }

    /// Number of signatures currently remembered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }

    /// Whether no signatures are remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.lock().is_empty()
    }

    fn maybe_collect(&self, now: i64) {
        let mut last_gc = self.last_gc.lock();
        if now.abs_diff(*last_gc) <= self.gc_interval_secs {
            return;
        }
        *last_gc = now;
        drop(last_gc);

        let window = self.window_secs;
        // A timestamp further than the window from now can never be accepted again
        self.seen
            .lock()
            .retain(|_, timestamp| now.abs_diff(*timestamp) <= window);
    }
}
