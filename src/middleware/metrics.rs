use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use super::Middleware;
use crate::context::Context;

/// Middleware for collecting request metrics
///
/// All counters use atomic operations for thread-safe updates without locks.
///
/// Metrics collected:
/// - Total request count
/// - Average latency (time spent in the rest of the chain)
/// - Aborted requests
/// - Requests that recorded at least one error
/// - Requests served with an active session
#[derive(Default)]
pub struct MetricsMiddleware {
    request_count: AtomicUsize,
    total_latency_ns: AtomicU64,
    aborted: AtomicUsize,
    errored: AtomicUsize,
    session_requests: AtomicUsize,
}

impl MetricsMiddleware {
    /// Create a new metrics middleware with all counters initialized to zero
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the total number of requests processed
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }

    /// Calculate the average request latency
    ///
    /// Returns zero duration if no requests have been processed yet.
    #[must_use]
    pub fn average_latency(&self) -> Duration {
        let count = self.request_count.load(Ordering::Relaxed) as u64;
        if count == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(self.total_latency_ns.load(Ordering::Relaxed) / count)
        }
    }

    #[must_use]
    pub fn aborted(&self) -> usize {
        self.aborted.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn errored(&self) -> usize {
        self.errored.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn session_requests(&self) -> usize {
        self.session_requests.load(Ordering::Relaxed)
    }
}

impl Middleware for MetricsMiddleware {
    fn before(&self, _ctx: &mut Context) -> Option<u16> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        None
    }

    fn after(&self, ctx: &mut Context, latency: Duration) {
        self.total_latency_ns.fetch_add(
            u64::try_from(latency.as_nanos()).unwrap_or(u64::MAX),
            Ordering::Relaxed,
        );
        if ctx.is_aborted() {
            self.aborted.fetch_add(1, Ordering::Relaxed);
        }
        if !ctx.errors().is_empty() {
            self.errored.fetch_add(1, Ordering::Relaxed);
        }
        if ctx.session().is_some() {
            self.session_requests.fetch_add(1, Ordering::Relaxed);
        }
    }
}
