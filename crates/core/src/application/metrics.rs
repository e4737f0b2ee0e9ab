// Job counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic job counters, shared between the workers and the accounting loop.
///
/// All counters are monotone. `done` counts every decoded job whose `done`
/// hook has run, whatever the outcome; `failed` and `panicked` count the
/// failing subset, so successful completions are `done - failed - panicked`.
#[derive(Debug, Default)]
pub struct JobCounters {
    received: AtomicU64,
    done: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
    invalid: AtomicU64,
    unknown_type: AtomicU64,
}

impl JobCounters {
    pub(crate) fn incr_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_done(&self) {
        self.done.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_panicked(&self) {
        self.panicked.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn incr_unknown_type(&self) {
        self.unknown_type.fetch_add(1, Ordering::Relaxed);
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.panicked.load(Ordering::Relaxed)
    }

    pub fn invalid(&self) -> u64 {
        self.invalid.load(Ordering::Relaxed)
    }

    pub fn unknown_type(&self) -> u64 {
        self.unknown_type.load(Ordering::Relaxed)
    }

    /// Every message that reached a terminal state: completed, failed, or
    /// panicked jobs (all inside `done`) plus rejected messages.
    pub fn job_counter(&self) -> u64 {
        self.done() + self.invalid() + self.unknown_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_counter_sums_terminal_states() {
        let counters = JobCounters::default();
        counters.incr_done();
        counters.incr_done();
        counters.incr_failed();
        counters.incr_invalid();
        counters.incr_unknown_type();

        // failed jobs still pass through done; only rejects add on top
        assert_eq!(counters.job_counter(), 4);
        assert_eq!(counters.done(), 2);
        assert_eq!(counters.failed(), 1);
    }
}
