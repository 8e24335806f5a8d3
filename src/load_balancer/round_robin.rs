//! Round-robin cursor.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared monotonically increasing counter used to rotate through backends.
///
/// The counter is unsigned and wraps on overflow, so the derived index can
/// never be negative.
#[derive(Debug, Default)]
pub struct RoundRobinCursor {
    counter: AtomicUsize,
}

impl RoundRobinCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the cursor and return the index it pointed at, in `0..len`.
    ///
    /// `len` must be non-zero.
    pub fn next_index(&self, len: usize) -> usize {
        self.counter.fetch_add(1, Ordering::Relaxed) % len
    }

    /// Number of times the cursor has been advanced (modulo wrap).
    pub fn position(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}
