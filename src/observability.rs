use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{info, warn};

/// Routine engine counters
#[derive(Debug, Default)]
pub struct EngineMetrics {
    pub transitions: AtomicU64,
    pub rejected_transitions: AtomicU64,
    pub conflict_retries: AtomicU64,
    pub history_entries_written: AtomicU64,
    pub history_failures: AtomicU64,
    pub access_denials: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub notifications_dropped: AtomicU64,
    pub instances_generated: AtomicU64,
    pub generation_failures: AtomicU64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_transition(&self) {
        self.transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_transition(&self) {
        self.rejected_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_conflict_retry(&self) {
        self.conflict_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_history_entries(&self, count: u64) {
        self.history_entries_written.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_history_failure(&self) {
        self.history_failures.fetch_add(1, Ordering::Relaxed);
        warn!("Activity history write failed");
    }

    pub fn record_access_denial(&self) {
        self.access_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_instances_generated(&self, count: u64) {
        self.instances_generated.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_generation_failure(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_stats(&self) -> EngineStats {
        EngineStats {
            transitions: self.transitions.load(Ordering::Relaxed),
            rejected_transitions: self.rejected_transitions.load(Ordering::Relaxed),
            conflict_retries: self.conflict_retries.load(Ordering::Relaxed),
            history_entries_written: self.history_entries_written.load(Ordering::Relaxed),
            history_failures: self.history_failures.load(Ordering::Relaxed),
            access_denials: self.access_denials.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            instances_generated: self.instances_generated.load(Ordering::Relaxed),
            generation_failures: self.generation_failures.load(Ordering::Relaxed),
        }
    }

    pub fn log_stats(&self) {
        let stats = self.get_stats();
        info!(
            "Engine metrics: transitions={}, rejected={}, conflict_retries={}, history_written={}, history_failures={}, access_denials={}, notifications_sent={}, notifications_dropped={}, instances_generated={}, generation_failures={}",
            stats.transitions,
            stats.rejected_transitions,
            stats.conflict_retries,
            stats.history_entries_written,
            stats.history_failures,
            stats.access_denials,
            stats.notifications_sent,
            stats.notifications_dropped,
            stats.instances_generated,
            stats.generation_failures
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct EngineStats {
    pub transitions: u64,
    pub rejected_transitions: u64,
    pub conflict_retries: u64,
    pub history_entries_written: u64,
    pub history_failures: u64,
    pub access_denials: u64,
    pub notifications_sent: u64,
    pub notifications_dropped: u64,
    pub instances_generated: u64,
    pub generation_failures: u64,
}

/// Global metrics instance
static ENGINE_METRICS: std::sync::LazyLock<EngineMetrics> =
    std::sync::LazyLock::new(EngineMetrics::new);

pub fn engine_metrics() -> &'static EngineMetrics {
    &ENGINE_METRICS
}

/// Time an operation and log its duration
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start: Instant::now(),
        }
    }

    pub fn finish(self) {
        let duration = self.start.elapsed();
        info!(
            operation = %self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[macro_export]
macro_rules! time_operation {
    ($operation:expr, $body:expr) => {{
        let timer = $crate::observability::OperationTimer::new($operation);
        let result = $body;
        timer.finish();
        result
    }};
}
