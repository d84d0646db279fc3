use std::sync::atomic::{AtomicU64, Ordering};

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Allocate the next process-wide sequence number.
pub fn next_sequence() -> u64 {
    RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

/// Allocate a prefixed identifier such as `poll-000042`.
pub fn next_id(prefix: &str) -> String {
    format!("{prefix}-{:06}", next_sequence())
}
