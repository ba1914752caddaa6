//! Concurrent batch engine
//!
//! One tokio task per work item. Each task opens its file on the blocking
//! pool, derives the group key, then races the caller's per-item future
//! against the run's cancellation token.
//!
//! Per-item outcomes:
//! - unsupported format, blank group key, `Ok(false)`: completed only
//! - `Ok(true)`: completed and succeeded
//! - any error or panic: completed, recorded as a [`FailureRecord`]
//! - cancelled before or during the per-item future: not counted
//! - cancelled after the per-item future entered [`commit_blocking`]: the run
//!   waits for it and counts its result
//!
//! Only [`TaggerError::Busy`] and [`TaggerError::Cancelled`] are returned from
//! [`BatchProcessor::run`]; item failures travel in the [`RunOutcome`].

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Context;
use futures::FutureExt;
use sttag_common::events::{CacheOperation, EventBus, TaggerEvent};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{TaggerError, TaggerResult};
use crate::models::{FailureRecord, RunOutcome};
use crate::services::media_file::{MediaError, MediaFile, MediaOpener};
use crate::services::progress_tracker::ProgressTracker;

tokio::task_local! {
    static ITEM_COMMITTED: Arc<AtomicBool>;
}

/// Run `work` on the blocking pool as the item's commit point
///
/// Once called from a per-item future, cancellation no longer abandons that
/// item: the run waits for `work` to finish and counts its result. Outside a
/// run this is a plain `spawn_blocking`.
pub async fn commit_blocking<F, T>(work: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let _ = ITEM_COMMITTED.try_with(|committed| committed.store(true, Ordering::Release));
    tokio::task::spawn_blocking(work)
        .await
        .context("Blocking task failed")?
}

/// How one item ended
#[derive(Debug)]
enum ItemStatus {
    Skipped,
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Append-only failure collection shared by all tasks of a run
#[derive(Default)]
struct FailureLog {
    records: Mutex<Vec<FailureRecord>>,
}

impl FailureLog {
    fn push(&self, path: PathBuf, error: String) {
        self.lock().push(FailureRecord { path, error });
    }

    fn take(&self) -> Vec<FailureRecord> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<FailureRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Clears the busy flag and token when a run ends, however it ends
struct RunGuard<'a> {
    processor: &'a BatchProcessor,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.processor.lock_token() = None;
        self.processor.busy.store(false, Ordering::Release);
    }
}

pub struct BatchProcessor {
    opener: Arc<dyn MediaOpener>,
    progress: Arc<ProgressTracker>,
    event_bus: EventBus,
    busy: AtomicBool,
    current_token: Mutex<Option<CancellationToken>>,
}

impl BatchProcessor {
    pub fn new(opener: Arc<dyn MediaOpener>, event_bus: EventBus) -> Self {
        Self {
            opener,
            progress: Arc::new(ProgressTracker::new(event_bus.clone())),
            event_bus,
            busy: AtomicBool::new(false),
            current_token: Mutex::new(None),
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Signal the active run; no-op when idle
    ///
    /// Returns whether a run was signalled.
    pub fn cancel(&self) -> bool {
        match self.lock_token().as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Process every item concurrently with `per_item`
    ///
    /// `per_item` receives the opened file of each item that has a non-blank
    /// group key and reports whether it changed anything.
    pub async fn run<F, Fut>(
        &self,
        operation: CacheOperation,
        items: impl IntoIterator<Item = PathBuf>,
        per_item: F,
        external_cancel: &CancellationToken,
    ) -> TaggerResult<RunOutcome>
    where
        F: Fn(Box<dyn MediaFile>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(TaggerError::Busy);
        }

        let token = external_cancel.child_token();
        *self.lock_token() = Some(token.clone());
        let _guard = RunGuard { processor: self };

        let items: Vec<PathBuf> = items.into_iter().collect();
        let run_id = Uuid::new_v4();

        self.event_bus.emit_lossy(TaggerEvent::RunStarted {
            run_id,
            operation,
            total: items.len(),
            timestamp: chrono::Utc::now(),
        });
        self.progress.reset(items.len());
        info!(run_id = %run_id, operation = %operation, total = items.len(), "Run started");

        let per_item = Arc::new(per_item);
        let failures = Arc::new(FailureLog::default());
        let mut tasks = JoinSet::new();

        for path in items {
            let opener = Arc::clone(&self.opener);
            let per_item = Arc::clone(&per_item);
            let progress = Arc::clone(&self.progress);
            let failures = Arc::clone(&failures);
            let token = token.clone();

            tasks.spawn(async move {
                let status = AssertUnwindSafe(process_item(path.clone(), opener, per_item, token))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| ItemStatus::Failed(panic_message(panic.as_ref())));

                match status {
                    ItemStatus::Skipped => progress.increment_completed(false),
                    ItemStatus::Succeeded => progress.increment_completed(true),
                    ItemStatus::Failed(error) => {
                        warn!(file = %path.display(), error = %error, "Item failed");
                        failures.push(path, error);
                        progress.increment_completed(false);
                    }
                    ItemStatus::Cancelled => {
                        debug!(file = %path.display(), "Item cancelled");
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            // Panics are caught inside the task, so only runtime shutdown lands here.
            if let Err(e) = joined {
                warn!(run_id = %run_id, error = %e, "Task aborted");
            }
        }

        let outcome = RunOutcome {
            run_id,
            operation,
            counters: self.progress.snapshot(),
            failures: failures.take(),
        };

        if token.is_cancelled() {
            info!(
                run_id = %run_id,
                operation = %operation,
                progress = %outcome.counters,
                "Run cancelled"
            );
            self.event_bus.emit_lossy(TaggerEvent::RunCancelled {
                run_id,
                operation,
                completed: outcome.counters.completed,
                total: outcome.counters.total,
                timestamp: chrono::Utc::now(),
            });
            return Err(TaggerError::Cancelled(Box::new(outcome)));
        }

        if outcome.has_failures() {
            warn!(run_id = %run_id, "{} errors", outcome.failures.len());
        }
        info!(
            run_id = %run_id,
            operation = %operation,
            progress = %outcome.counters,
            "Run completed"
        );
        self.event_bus.emit_lossy(TaggerEvent::RunCompleted {
            run_id,
            operation,
            total: outcome.counters.total,
            completed: outcome.counters.completed,
            succeeded: outcome.counters.succeeded,
            failed_paths: outcome
                .failures
                .iter()
                .map(|f| f.path.to_string_lossy().into_owned())
                .collect(),
            timestamp: chrono::Utc::now(),
        });

        Ok(outcome)
    }

    fn lock_token(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.current_token
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn process_item<F, Fut>(
    path: PathBuf,
    opener: Arc<dyn MediaOpener>,
    per_item: Arc<F>,
    token: CancellationToken,
) -> ItemStatus
where
    F: Fn(Box<dyn MediaFile>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
{
    if token.is_cancelled() {
        return ItemStatus::Cancelled;
    }

    let open_path = path.clone();
    let opened = tokio::task::spawn_blocking(move || opener.open(&open_path)).await;
    let media = match opened {
        Ok(Ok(media)) => media,
        Ok(Err(MediaError::UnsupportedFormat(_))) => {
            debug!(file = %path.display(), "Unsupported format, skipping");
            return ItemStatus::Skipped;
        }
        Ok(Err(e)) => return ItemStatus::Failed(e.to_string()),
        Err(e) => return ItemStatus::Failed(format!("Open task failed: {}", e)),
    };

    let has_key = media
        .group_key()
        .map(|key| !key.trim().is_empty())
        .unwrap_or(false);
    if !has_key {
        debug!(file = %path.display(), "No album tag, skipping");
        return ItemStatus::Skipped;
    }

    let committed = Arc::new(AtomicBool::new(false));
    let work = ITEM_COMMITTED.scope(Arc::clone(&committed), (*per_item)(media));
    tokio::pin!(work);

    let finished = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        result = &mut work => Some(result),
    };

    let result = match finished {
        Some(result) => result,
        None if committed.load(Ordering::Acquire) => {
            debug!(file = %path.display(), "Cancelled during commit, finishing item");
            work.await
        }
        None => return ItemStatus::Cancelled,
    };

    match result {
        Ok(true) => ItemStatus::Succeeded,
        Ok(false) => ItemStatus::Skipped,
        Err(e) => ItemStatus::Failed(format!("{:#}", e)),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("Task panicked: {}", msg)
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("Task panicked: {}", msg)
    } else {
        "Task panicked".to_string()
    }
}
