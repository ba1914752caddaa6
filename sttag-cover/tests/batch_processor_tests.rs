//! Batch engine tests against an in-memory media store

mod helpers;

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sttag_common::events::{CacheOperation, EventBus, TaggerEvent};
use sttag_cover::services::{commit_blocking, BatchProcessor, DedupSet, MediaFile};
use sttag_cover::TaggerError;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use helpers::{FakeOpener, FakeTrack};

fn processor_with(tracks: Vec<(PathBuf, FakeTrack)>) -> (Arc<BatchProcessor>, EventBus) {
    let opener = FakeOpener::new();
    for (path, track) in tracks {
        opener.insert(path, track);
    }
    let bus = EventBus::new(1024);
    (
        Arc::new(BatchProcessor::new(Arc::new(opener), bus.clone())),
        bus,
    )
}

fn paths(n: usize) -> Vec<PathBuf> {
    (0..n)
        .map(|i| PathBuf::from(format!("/music/track{:03}.mp3", i)))
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_all_items_succeed() {
    let items = paths(25);
    let (processor, _bus) = processor_with(
        items
            .iter()
            .map(|p| (p.clone(), FakeTrack::album("Akira")))
            .collect(),
    );

    let outcome = processor
        .run(
            CacheOperation::Apply,
            items,
            |_media: Box<dyn MediaFile>| async { anyhow::Ok(true) },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.counters.total, 25);
    assert_eq!(outcome.counters.completed, 25);
    assert_eq!(outcome.counters.succeeded, 25);
    assert!(outcome.failures.is_empty());
    assert!(!processor.is_busy());
}

#[tokio::test]
async fn test_empty_run_completes() {
    let (processor, _bus) = processor_with(vec![]);
    let outcome = processor
        .run(
            CacheOperation::Populate,
            Vec::new(),
            |_media: Box<dyn MediaFile>| async { anyhow::Ok(true) },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.counters.steps_text(), "(Tagged files : 0) 0/0");
}

#[tokio::test]
async fn test_blank_group_key_never_succeeds() {
    let items = vec![
        PathBuf::from("/music/none.mp3"),
        PathBuf::from("/music/blank.mp3"),
        PathBuf::from("/music/keyed.mp3"),
    ];
    let (processor, _bus) = processor_with(vec![
        (items[0].clone(), FakeTrack::default()),
        (items[1].clone(), FakeTrack::album("   ")),
        (items[2].clone(), FakeTrack::album("Paprika")),
    ]);

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_in = Arc::clone(&calls);
    let outcome = processor
        .run(
            CacheOperation::Apply,
            items,
            move |_media: Box<dyn MediaFile>| {
                let calls = Arc::clone(&calls_in);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(true)
                }
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(outcome.counters.completed, 3);
    assert_eq!(outcome.counters.succeeded, 1);
    assert!(outcome.failures.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failures_are_collected_not_propagated() {
    let unsupported = PathBuf::from("/music/cover.jpg");
    let corrupt = PathBuf::from("/music/broken.flac");
    let erroring = PathBuf::from("/music/erroring.mp3");
    let panicking = PathBuf::from("/music/panicking.mp3");
    let fine = PathBuf::from("/music/fine.mp3");

    let (processor, _bus) = processor_with(vec![
        (unsupported.clone(), FakeTrack::unsupported()),
        (corrupt.clone(), FakeTrack::corrupt()),
        (erroring.clone(), FakeTrack::album("error")),
        (panicking.clone(), FakeTrack::album("panic")),
        (fine.clone(), FakeTrack::album("fine")),
    ]);

    let outcome = processor
        .run(
            CacheOperation::Populate,
            vec![
                unsupported.clone(),
                corrupt.clone(),
                erroring.clone(),
                panicking.clone(),
                fine.clone(),
            ],
            |media: Box<dyn MediaFile>| async move {
                match media.group_key().as_deref() {
                    Some("error") => anyhow::bail!("lookup exploded"),
                    Some("panic") => panic!("per-item bug"),
                    _ => Ok(true),
                }
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.counters.total, 5);
    assert_eq!(outcome.counters.completed, 5);
    assert_eq!(outcome.counters.succeeded, 1);

    let mut failed: Vec<PathBuf> = outcome.failures.iter().map(|f| f.path.clone()).collect();
    failed.sort();
    let mut expected = vec![corrupt, erroring, panicking];
    expected.sort();
    assert_eq!(failed, expected);

    let report = outcome.failure_report().unwrap();
    assert!(report.starts_with("3 errors\n"));
    assert!(outcome
        .failures
        .iter()
        .any(|f| f.error.contains("lookup exploded")));
    assert!(outcome.failures.iter().any(|f| f.error.contains("panicked")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_shared_key_claimed_once_across_tasks() {
    let items = paths(100);
    let (processor, _bus) = processor_with(
        items
            .iter()
            .map(|p| (p.clone(), FakeTrack::anime("Neon Genesis Evangelion")))
            .collect(),
    );

    let claimed = Arc::new(DedupSet::new());
    let claims = Arc::clone(&claimed);
    let outcome = processor
        .run(
            CacheOperation::Populate,
            items,
            move |media: Box<dyn MediaFile>| {
                let claims = Arc::clone(&claims);
                async move {
                    let key = media.group_key().unwrap_or_default();
                    tokio::task::yield_now().await;
                    anyhow::Ok(claims.claim(&key))
                }
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.counters.completed, 100);
    assert_eq!(outcome.counters.succeeded, 1);
    assert_eq!(claimed.len(), 1);
}

#[tokio::test]
async fn test_cancellation_mid_run_stops_new_work() {
    let items = paths(20);
    let (processor, _bus) = processor_with(
        items
            .iter()
            .map(|p| (p.clone(), FakeTrack::album("Perfect Blue")))
            .collect(),
    );

    let external = CancellationToken::new();
    let started = Arc::new(AtomicUsize::new(0));
    let started_after_cancel = Arc::new(AtomicUsize::new(0));

    let per_item = {
        let external = external.clone();
        let started = Arc::clone(&started);
        let started_after_cancel = Arc::clone(&started_after_cancel);
        move |_media: Box<dyn MediaFile>| {
            let external = external.clone();
            let started = Arc::clone(&started);
            let started_after_cancel = Arc::clone(&started_after_cancel);
            async move {
                if external.is_cancelled() {
                    started_after_cancel.fetch_add(1, Ordering::SeqCst);
                }
                if started.fetch_add(1, Ordering::SeqCst) + 1 == 3 {
                    external.cancel();
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
                anyhow::Ok(true)
            }
        }
    };

    let result = processor
        .run(CacheOperation::Apply, items, per_item, &external)
        .await;

    match result {
        Err(TaggerError::Cancelled(outcome)) => {
            assert_eq!(outcome.counters.total, 20);
            assert!(outcome.counters.completed < 20);
            assert!(outcome.counters.succeeded <= outcome.counters.completed);
        }
        other => panic!("expected Cancelled, got {:?}", other.map(|o| o.counters)),
    }
    assert_eq!(started.load(Ordering::SeqCst), 3);
    assert_eq!(started_after_cancel.load(Ordering::SeqCst), 0);
    assert!(!processor.is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_after_commit_waits_for_item() {
    let items = paths(1);
    let (processor, _bus) = processor_with(vec![(items[0].clone(), FakeTrack::album("Memories"))]);

    let external = CancellationToken::new();
    let finished = Arc::new(AtomicUsize::new(0));

    let per_item = {
        let external = external.clone();
        let finished = Arc::clone(&finished);
        move |_media: Box<dyn MediaFile>| {
            let external = external.clone();
            let finished = Arc::clone(&finished);
            commit_blocking(move || {
                external.cancel();
                std::thread::sleep(Duration::from_millis(100));
                finished.fetch_add(1, Ordering::SeqCst);
                anyhow::Ok(true)
            })
        }
    };

    let result = processor
        .run(CacheOperation::Apply, items, per_item, &external)
        .await;

    match result {
        Err(TaggerError::Cancelled(outcome)) => {
            assert_eq!(outcome.counters.completed, 1);
            assert_eq!(outcome.counters.succeeded, 1);
        }
        other => panic!("expected Cancelled, got {:?}", other.map(|o| o.counters)),
    }
    assert_eq!(finished.load(Ordering::SeqCst), 1);
    assert!(!processor.is_busy());
}

#[tokio::test]
async fn test_pre_cancelled_token_does_no_work() {
    let items = paths(5);
    let (processor, _bus) = processor_with(
        items
            .iter()
            .map(|p| (p.clone(), FakeTrack::album("Tokyo Godfathers")))
            .collect(),
    );

    let external = CancellationToken::new();
    external.cancel();

    let result = processor
        .run(
            CacheOperation::Apply,
            items,
            |_media: Box<dyn MediaFile>| async { anyhow::Ok(true) },
            &external,
        )
        .await;

    match result {
        Err(TaggerError::Cancelled(outcome)) => {
            assert_eq!(outcome.counters.total, 5);
            assert_eq!(outcome.counters.completed, 0);
        }
        other => panic!("expected Cancelled, got {:?}", other.map(|o| o.counters)),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_overlapping_run_is_busy_and_cancel_signals_active_run() {
    let items = paths(4);
    let (processor, _bus) = processor_with(
        items
            .iter()
            .map(|p| (p.clone(), FakeTrack::album("Millennium Actress")))
            .collect(),
    );

    // Zero permits: every per-item future blocks until the run is cancelled.
    let gate = Arc::new(Semaphore::new(0));
    let entered = Arc::new(AtomicUsize::new(0));

    let first = {
        let processor = Arc::clone(&processor);
        let gate = Arc::clone(&gate);
        let entered = Arc::clone(&entered);
        tokio::spawn(async move {
            processor
                .run(
                    CacheOperation::Populate,
                    items,
                    move |_media: Box<dyn MediaFile>| {
                        let gate = Arc::clone(&gate);
                        let entered = Arc::clone(&entered);
                        async move {
                            entered.fetch_add(1, Ordering::SeqCst);
                            let _permit = gate.acquire().await?;
                            anyhow::Ok(true)
                        }
                    },
                    &CancellationToken::new(),
                )
                .await
        })
    };

    while entered.load(Ordering::SeqCst) == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(processor.is_busy());

    let second = processor
        .run(
            CacheOperation::Apply,
            paths(1),
            |_media: Box<dyn MediaFile>| async { anyhow::Ok(true) },
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(second, Err(TaggerError::Busy)));

    assert!(processor.cancel());
    match first.await.unwrap() {
        Err(TaggerError::Cancelled(outcome)) => {
            assert_eq!(outcome.counters.succeeded, 0);
        }
        other => panic!("expected Cancelled, got {:?}", other.map(|o| o.counters)),
    }

    assert!(!processor.is_busy());
    assert!(!processor.cancel());
}

#[tokio::test]
async fn test_cancel_when_idle_is_noop() {
    let (processor, _bus) = processor_with(vec![]);
    assert!(!processor.cancel());
    assert!(!processor.is_busy());
}

#[tokio::test]
async fn test_run_lifecycle_events() {
    let items = paths(3);
    let (processor, bus) = processor_with(
        items
            .iter()
            .map(|p| (p.clone(), FakeTrack::album("Memories")))
            .collect(),
    );
    let mut rx = bus.subscribe();

    let outcome = processor
        .run(
            CacheOperation::Apply,
            items,
            |_media: Box<dyn MediaFile>| async { anyhow::Ok(false) },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    match events.first() {
        Some(TaggerEvent::RunStarted { run_id, total, .. }) => {
            assert_eq!(*run_id, outcome.run_id);
            assert_eq!(*total, 3);
        }
        other => panic!("expected RunStarted first, got {:?}", other),
    }
    match events.last() {
        Some(TaggerEvent::RunCompleted {
            completed,
            succeeded,
            failed_paths,
            ..
        }) => {
            assert_eq!(*completed, 3);
            assert_eq!(*succeeded, 0);
            assert!(failed_paths.is_empty());
        }
        other => panic!("expected RunCompleted last, got {:?}", other),
    }

    let progress_events = events
        .iter()
        .filter(|e| matches!(e, TaggerEvent::ProgressChanged { .. }))
        .count();
    // one for the reset, one per item
    assert_eq!(progress_events, 4);
}
