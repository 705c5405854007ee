//! Process-wide counters for the bridge.
//! Cheap relaxed atomics; read them with [`snapshot`].
use std::sync::atomic::{AtomicU64, Ordering};

static RECORDS_DECODED: AtomicU64 = AtomicU64::new(0);
static DECODE_FAILURES: AtomicU64 = AtomicU64::new(0);
static MESSAGES_PUBLISHED: AtomicU64 = AtomicU64::new(0);
static PUBLISH_FAILURES: AtomicU64 = AtomicU64::new(0);
static PARTIAL_PUBLISHES: AtomicU64 = AtomicU64::new(0);
static FRAGMENTS_EVICTED: AtomicU64 = AtomicU64::new(0);
static DELETIONS_ISSUED: AtomicU64 = AtomicU64::new(0);
static BUFFER_OVERFLOWS: AtomicU64 = AtomicU64::new(0);
static FETCHES_ISSUED: AtomicU64 = AtomicU64::new(0);

pub fn inc_records_decoded() { RECORDS_DECODED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_decode_failures() { DECODE_FAILURES.fetch_add(1, Ordering::Relaxed); }
pub fn inc_messages_published() { MESSAGES_PUBLISHED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_publish_failures() { PUBLISH_FAILURES.fetch_add(1, Ordering::Relaxed); }
pub fn inc_partial_publishes() { PARTIAL_PUBLISHES.fetch_add(1, Ordering::Relaxed); }
pub fn inc_fragments_evicted() { FRAGMENTS_EVICTED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_deletions_issued() { DELETIONS_ISSUED.fetch_add(1, Ordering::Relaxed); }
pub fn inc_buffer_overflows() { BUFFER_OVERFLOWS.fetch_add(1, Ordering::Relaxed); }
pub fn inc_fetches_issued() { FETCHES_ISSUED.fetch_add(1, Ordering::Relaxed); }

#[derive(Debug, Default, Clone)]
pub struct Snapshot {
    pub records_decoded: u64,
    pub decode_failures: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub partial_publishes: u64,
    pub fragments_evicted: u64,
    pub deletions_issued: u64,
    pub buffer_overflows: u64,
    pub fetches_issued: u64,
}

pub fn snapshot() -> Snapshot {
    Snapshot {
        records_decoded: RECORDS_DECODED.load(Ordering::Relaxed),
        decode_failures: DECODE_FAILURES.load(Ordering::Relaxed),
        messages_published: MESSAGES_PUBLISHED.load(Ordering::Relaxed),
        publish_failures: PUBLISH_FAILURES.load(Ordering::Relaxed),
        partial_publishes: PARTIAL_PUBLISHES.load(Ordering::Relaxed),
        fragments_evicted: FRAGMENTS_EVICTED.load(Ordering::Relaxed),
        deletions_issued: DELETIONS_ISSUED.load(Ordering::Relaxed),
        buffer_overflows: BUFFER_OVERFLOWS.load(Ordering::Relaxed),
        fetches_issued: FETCHES_ISSUED.load(Ordering::Relaxed),
    }
}
