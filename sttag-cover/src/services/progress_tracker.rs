//! Thread-safe run progress counters
//!
//! Counters are plain atomics mutated with fetch-and-add. `completed` is
//! always bumped before `succeeded` and [`ProgressTracker::snapshot`] reads
//! them in the opposite order, so an observer never sees
//! `succeeded > completed`. A reset landing between the two reads is the one
//! exception; `snapshot` detects it and reads again.
//!
//! Every mutation emits a [`TaggerEvent::ProgressChanged`] with `emit_lossy`;
//! observers are never needed for correctness.

use std::sync::atomic::{AtomicUsize, Ordering};

use sttag_common::events::{EventBus, TaggerEvent};

use crate::models::ProgressSnapshot;

pub struct ProgressTracker {
    total: AtomicUsize,
    completed: AtomicUsize,
    succeeded: AtomicUsize,
    event_bus: EventBus,
}

impl ProgressTracker {
    pub fn new(event_bus: EventBus) -> Self {
        Self {
            total: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            event_bus,
        }
    }

    /// Reset to `(total, 0, 0)`
    ///
    /// Only called between runs, when no task is mutating the counters.
    pub fn reset(&self, total: usize) {
        self.succeeded.store(0, Ordering::SeqCst);
        self.completed.store(0, Ordering::SeqCst);
        self.total.store(total, Ordering::SeqCst);
        self.notify();
    }

    /// Count one finished item
    pub fn increment_completed(&self, succeeded: bool) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        if succeeded {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }
        self.notify();
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        loop {
            let succeeded = self.succeeded();
            let completed = self.completed();
            let total = self.total();
            // Only a concurrent reset can make these disagree
            if succeeded <= completed {
                return ProgressSnapshot {
                    total,
                    completed,
                    succeeded,
                };
            }
            std::hint::spin_loop();
        }
    }

    pub fn steps_text(&self) -> String {
        self.snapshot().steps_text()
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        self.event_bus.emit_lossy(TaggerEvent::ProgressChanged {
            total: snapshot.total,
            completed: snapshot.completed,
            succeeded: snapshot.succeeded,
            steps_text: snapshot.steps_text(),
            timestamp: chrono::Utc::now(),
        });
    }
}
