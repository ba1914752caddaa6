//! Cover cache façade
//!
//! Two operations on top of [`BatchProcessor`]:
//! - **populate**: for each album tagged with the managed album artist, look
//!   up the title remotely once per run and store the best match's image as
//!   `{cover_root}/{album}.jpg`
//! - **apply**: embed `{album}.*` from the cover folder into each audio file
//!
//! Starting an operation cancels any run in progress, or any call still
//! waiting to start, and waits for it to unwind before the new one begins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard};

use anyhow::Context;
use sttag_common::events::CacheOperation;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{TaggerError, TaggerResult};
use crate::models::{ProgressSnapshot, RunOutcome};
use crate::services::asset_fetch::AssetFetch;
use crate::services::batch_processor::{commit_blocking, BatchProcessor};
use crate::services::best_match;
use crate::services::dedup::DedupSet;
use crate::services::file_scanner::FileScanner;
use crate::services::jikan_client::MetadataLookup;
use crate::services::media_file::MediaFile;
use crate::services::validation::{to_safe_file_name, to_safe_search_term};

pub struct CoverCacheService {
    processor: Arc<BatchProcessor>,
    lookup: Arc<dyn MetadataLookup>,
    fetcher: Arc<dyn AssetFetch>,
    scanner: FileScanner,
    album_artist: String,
    run_lock: Mutex<()>,
    active: std::sync::Mutex<Option<ActiveCall>>,
    next_call: AtomicU64,
}

/// Token of the newest populate/apply call, running or waiting for `run_lock`
struct ActiveCall {
    id: u64,
    token: CancellationToken,
}

/// Unregisters a call's token when the call ends, unless a newer call replaced it
struct CallGuard<'a> {
    service: &'a CoverCacheService,
    id: u64,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.service.lock_active();
        if active.as_ref().map(|call| call.id) == Some(self.id) {
            *active = None;
        }
    }
}

impl CoverCacheService {
    pub fn new(
        processor: Arc<BatchProcessor>,
        lookup: Arc<dyn MetadataLookup>,
        fetcher: Arc<dyn AssetFetch>,
        album_artist: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            lookup,
            fetcher,
            scanner: FileScanner::new(),
            album_artist: album_artist.into(),
            run_lock: Mutex::new(()),
            active: std::sync::Mutex::new(None),
            next_call: AtomicU64::new(0),
        }
    }

    /// Download missing covers for managed albums under `music_root`
    pub async fn populate_cache(
        &self,
        music_root: &Path,
        cover_root: &Path,
        cancel: &CancellationToken,
    ) -> TaggerResult<RunOutcome> {
        check_directories(music_root, cover_root)?;
        let (token, _call) = self.register_call(cancel);
        let _run = self.run_lock.lock().await;

        let items = self.enumerate(music_root).await?;
        let context = Arc::new(PopulateContext {
            lookup: Arc::clone(&self.lookup),
            fetcher: Arc::clone(&self.fetcher),
            scanner: self.scanner.clone(),
            cover_root: cover_root.to_path_buf(),
            album_artist: self.album_artist.clone(),
            claimed: DedupSet::new(),
        });

        self.processor
            .run(
                CacheOperation::Populate,
                items,
                move |media| {
                    let context = Arc::clone(&context);
                    async move { context.populate_one(media).await }
                },
                &token,
            )
            .await
    }

    /// Embed cached covers into the audio files under `music_root`
    pub async fn apply_cache(
        &self,
        music_root: &Path,
        cover_root: &Path,
        cancel: &CancellationToken,
    ) -> TaggerResult<RunOutcome> {
        check_directories(music_root, cover_root)?;
        let (token, _call) = self.register_call(cancel);
        let _run = self.run_lock.lock().await;

        let items = self.enumerate(music_root).await?;
        let scanner = self.scanner.clone();
        let cover_root = cover_root.to_path_buf();

        self.processor
            .run(
                CacheOperation::Apply,
                items,
                move |media| {
                    let scanner = scanner.clone();
                    let cover_root = cover_root.clone();
                    commit_blocking(move || apply_one(media, &scanner, &cover_root))
                },
                &token,
            )
            .await
    }

    /// Signal the active call; returns whether one was running or starting
    pub fn cancel(&self) -> bool {
        match self.lock_active().as_ref() {
            Some(call) => {
                call.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.processor.is_busy()
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.processor.progress().snapshot()
    }

    /// Make this call the active one, cancelling whichever call it replaces
    fn register_call(&self, cancel: &CancellationToken) -> (CancellationToken, CallGuard<'_>) {
        let id = self.next_call.fetch_add(1, Ordering::Relaxed);
        let token = cancel.child_token();

        let previous = self.lock_active().replace(ActiveCall {
            id,
            token: token.clone(),
        });
        if let Some(previous) = previous {
            debug!(call = previous.id, "Cancelling superseded call");
            previous.token.cancel();
        }

        (token, CallGuard { service: self, id })
    }

    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveCall>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enumerate(&self, music_root: &Path) -> TaggerResult<Vec<PathBuf>> {
        let scanner = self.scanner.clone();
        let root = music_root.to_path_buf();
        tokio::task::spawn_blocking(move || scanner.scan(&root))
            .await
            .map_err(|e| TaggerError::Precondition(format!("Scan task failed: {}", e)))?
            .map_err(|e| TaggerError::Precondition(e.to_string()))
    }
}

/// Music folder must exist; cover folder is created when missing
fn check_directories(music_root: &Path, cover_root: &Path) -> TaggerResult<()> {
    if !music_root.is_dir() {
        return Err(TaggerError::Precondition(format!(
            "Music folder does not exist: {}",
            music_root.display()
        )));
    }

    if !cover_root.is_dir() {
        std::fs::create_dir_all(cover_root).map_err(|e| {
            TaggerError::Precondition(format!(
                "Cannot create cover folder {}: {}",
                cover_root.display(),
                e
            ))
        })?;
        info!(folder = %cover_root.display(), "Created cover folder");
    }

    Ok(())
}

struct PopulateContext {
    lookup: Arc<dyn MetadataLookup>,
    fetcher: Arc<dyn AssetFetch>,
    scanner: FileScanner,
    cover_root: PathBuf,
    album_artist: String,
    claimed: DedupSet,
}

impl PopulateContext {
    async fn populate_one(&self, media: Box<dyn MediaFile>) -> anyhow::Result<bool> {
        if !media.album_artists().iter().any(|a| a == &self.album_artist) {
            return Ok(false);
        }
        let Some(album) = media.group_key() else {
            return Ok(false);
        };
        let path = media.path().to_path_buf();
        drop(media);

        if !self.claimed.claim(&album) {
            return Ok(false);
        }

        let file_name = to_safe_file_name(&album);
        if file_name.trim().is_empty() {
            anyhow::bail!("Album '{}' has no file-name-safe characters", album);
        }

        if self.scanner.has_cover(&self.cover_root, &file_name)? {
            debug!(album = %album, "Cover already cached");
            return Ok(false);
        }

        let query = to_safe_search_term(&album);
        let candidates = self.lookup.search_by_title(&query).await?;
        if candidates.is_empty() {
            debug!(album = %album, query = %query, "No search results");
            return Ok(false);
        }

        let best = best_match::select(&candidates, &album)?;
        let bytes = self.fetcher.download(&best.image_url).await?;

        let cover_path = self.cover_root.join(format!("{}.jpg", file_name));
        tokio::fs::write(&cover_path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", cover_path.display()))?;

        info!(
            album = %album,
            title = %best.title,
            cover = %cover_path.display(),
            source = %path.display(),
            "Cached cover"
        );
        Ok(true)
    }
}

/// Embed the cached cover for one file; `false` when none or already embedded
fn apply_one(
    mut media: Box<dyn MediaFile>,
    scanner: &FileScanner,
    cover_root: &Path,
) -> anyhow::Result<bool> {
    let Some(album) = media.group_key() else {
        return Ok(false);
    };
    let file_name = to_safe_file_name(&album);
    if file_name.trim().is_empty() {
        return Ok(false);
    }

    let Some(cover_path) = scanner.find_cover(cover_root, &file_name)? else {
        return Ok(false);
    };

    let data = std::fs::read(&cover_path)
        .with_context(|| format!("Failed to read {}", cover_path.display()))?;
    if media.artwork().as_deref() == Some(data.as_slice()) {
        return Ok(false);
    }

    media.set_artwork(data)?;
    media.save()?;

    debug!(
        file = %media.path().display(),
        cover = %cover_path.display(),
        "Embedded cover"
    );
    Ok(true)
}
