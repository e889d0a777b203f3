use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
struct Counters {
    reserved: AtomicU64,
    established: AtomicU64,
    failed: AtomicU64,
    teardown: AtomicU64,
}

static COUNTERS: Lazy<Counters> = Lazy::new(Counters::default);

fn increment(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

pub fn record_reserved() {
    increment(&COUNTERS.reserved);
}

pub fn record_established() {
    increment(&COUNTERS.established);
}

pub fn record_failed() {
    increment(&COUNTERS.failed);
}

pub fn record_teardown() {
    increment(&COUNTERS.teardown);
}

#[derive(Clone, Debug, Default)]
pub struct RegistryMetricsSnapshot {
    pub subscribe_reserved: u64,
    pub subscribe_established: u64,
    pub subscribe_failed: u64,
    pub teardown: u64,
}

pub fn snapshot() -> RegistryMetricsSnapshot {
    RegistryMetricsSnapshot {
        subscribe_reserved: COUNTERS.reserved.load(Ordering::Relaxed),
        subscribe_established: COUNTERS.established.load(Ordering::Relaxed),
        subscribe_failed: COUNTERS.failed.load(Ordering::Relaxed),
        teardown: COUNTERS.teardown.load(Ordering::Relaxed),
    }
}
