use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counts outbound model calls for logging. Cheap to clone; clones share counters.
#[derive(Clone)]
pub struct RequestCounter {
    generate_count: Arc<AtomicU64>,
    failure_count: Arc<AtomicU64>,
    start_time: DateTime<Utc>,
}

impl RequestCounter {
    pub fn new() -> Self {
        Self {
            generate_count: Arc::new(AtomicU64::new(0)),
            failure_count: Arc::new(AtomicU64::new(0)),
            start_time: Utc::now(),
        }
    }

    pub fn log_generate_request(&self, context: &str) -> u64 {
        let count = self.generate_count.fetch_add(1, Ordering::SeqCst) + 1;

        tracing::info!(
            "GEMINI API REQUEST #{} | Type: GENERATE | Context: {} | Elapsed: {}s | Failed: {} | Rate: {:.2} req/min",
            count,
            context,
            self.get_elapsed_seconds(),
            self.get_failure_count(),
            self.get_request_rate()
        );

        count
    }

    pub fn record_failure(&self) -> u64 {
        self.failure_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get_generate_count(&self) -> u64 {
        self.generate_count.load(Ordering::SeqCst)
    }

    pub fn get_failure_count(&self) -> u64 {
        self.failure_count.load(Ordering::SeqCst)
    }

    fn get_elapsed_seconds(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds().max(0)
    }

    fn get_request_rate(&self) -> f64 {
        let elapsed = self.get_elapsed_seconds() as f64;
        if elapsed < 1.0 {
            return 0.0;
        }
        (self.get_generate_count() as f64 / elapsed) * 60.0 // requests per minute
    }

    pub fn print_summary(&self) {
        tracing::info!(
            "GEMINI API SUMMARY | Total: {} requests | Failed: {} | Elapsed: {}s | Avg Rate: {:.2} req/min",
            self.get_generate_count(),
            self.get_failure_count(),
            self.get_elapsed_seconds(),
            self.get_request_rate()
        );
    }
}

impl Default for RequestCounter {
    fn default() -> Self {
        Self::new()
    }
}
