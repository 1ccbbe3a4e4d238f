//! In-process request counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Attempt counts of one logical request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestStats {
    /// Attempts made.
    pub attempts: u32,
    /// Attempts that failed over.
    pub failed_attempts: u32,
    /// Wall time of the whole request.
    pub elapsed: Duration,
}

/// Histogram buckets: 0, 1, 2, 3 and 4+ attempts per request.
pub const ATTEMPT_BUCKETS: usize = 5;

/// Counters shared by every request of one client.
#[derive(Debug, Default)]
pub struct ClientStats {
    requests: AtomicU64,
    attempts: AtomicU64,
    failed_attempts: AtomicU64,
    request_time_us: AtomicU64,
    attempt_histogram: [AtomicU64; ATTEMPT_BUCKETS],
}

/// A point-in-time copy of [`ClientStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Logical requests finished.
    pub requests: u64,
    /// Attempts made across all requests.
    pub attempts: u64,
    /// Attempts that failed over.
    pub failed_attempts: u64,
    /// Total wall time of all requests.
    pub request_time: Duration,
    /// Requests per attempt count, see [`ATTEMPT_BUCKETS`].
    pub attempt_histogram: [u64; ATTEMPT_BUCKETS],
}

impl ClientStats {
    /// Fresh counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one finished request in.
    pub fn record(&self, request: &RequestStats) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.attempts
            .fetch_add(u64::from(request.attempts), Ordering::Relaxed);
        self.failed_attempts
            .fetch_add(u64::from(request.failed_attempts), Ordering::Relaxed);
        let micros = u64::try_from(request.elapsed.as_micros()).unwrap_or(u64::MAX);
        self.request_time_us.fetch_add(micros, Ordering::Relaxed);
        let bucket = (request.attempts as usize).min(ATTEMPT_BUCKETS - 1);
        self.attempt_histogram[bucket].fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            request_time: Duration::from_micros(self.request_time_us.load(Ordering::Relaxed)),
            attempt_histogram: std::array::from_fn(|i| {
                self.attempt_histogram[i].load(Ordering::Relaxed)
            }),
        }
    }
}
