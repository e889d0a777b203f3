use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    push_applied: AtomicU64,
    push_ignored: AtomicU64,
    rollbacks: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_push_applied() {
    increment(&COUNTERS.push_applied);
}

pub fn record_push_ignored() {
    increment(&COUNTERS.push_ignored);
}

pub fn record_rollback() {
    increment(&COUNTERS.rollbacks);
}

#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct DashboardMetricsSnapshot {
    pub push_events_applied: u64,
    pub push_events_ignored: u64,
    pub optimistic_rollbacks: u64,
}

pub fn snapshot() -> DashboardMetricsSnapshot {
    DashboardMetricsSnapshot {
        push_events_applied: COUNTERS.push_applied.load(Ordering::Relaxed),
        push_events_ignored: COUNTERS.push_ignored.load(Ordering::Relaxed),
        optimistic_rollbacks: COUNTERS.rollbacks.load(Ordering::Relaxed),
    }
}
