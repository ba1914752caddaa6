//! Shared fakes for sttag-cover integration tests
//!
//! - [`FakeOpener`]: in-memory tag store keyed by path
//! - [`FakeLookup`]: canned search results keyed by query
//! - [`FakeFetcher`]: canned downloads keyed by URL

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sttag_cover::models::Candidate;
use sttag_cover::services::{
    AssetFetch, FetchError, LookupError, MediaError, MediaFile, MediaOpener, MetadataLookup,
};

/// Tags of one fake audio file
#[derive(Debug, Clone, Default)]
pub struct FakeTrack {
    pub album: Option<String>,
    pub album_artists: Vec<String>,
    pub artwork: Option<Vec<u8>>,
    /// Open fails with `UnsupportedFormat`
    pub unsupported: bool,
    /// Open fails with a read error
    pub corrupt: bool,
}

impl FakeTrack {
    pub fn album(album: &str) -> Self {
        Self {
            album: Some(album.to_string()),
            ..Self::default()
        }
    }

    pub fn anime(album: &str) -> Self {
        Self {
            album: Some(album.to_string()),
            album_artists: vec!["Anime".to_string()],
            ..Self::default()
        }
    }

    pub fn unsupported() -> Self {
        Self {
            unsupported: true,
            ..Self::default()
        }
    }

    pub fn corrupt() -> Self {
        Self {
            corrupt: true,
            ..Self::default()
        }
    }
}

type TrackStore = Arc<Mutex<HashMap<PathBuf, FakeTrack>>>;

#[derive(Default)]
pub struct FakeOpener {
    tracks: TrackStore,
    saves: Arc<SaveCounters>,
}

/// Save bookkeeping shared with every opened file
#[derive(Default)]
struct SaveCounters {
    started: AtomicUsize,
    finished: AtomicUsize,
    delay: Mutex<Duration>,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, track: FakeTrack) {
        self.tracks.lock().unwrap().insert(path.into(), track);
    }

    pub fn track(&self, path: &Path) -> Option<FakeTrack> {
        self.tracks.lock().unwrap().get(path).cloned()
    }

    /// Saves that ran to completion
    pub fn save_count(&self) -> usize {
        self.saves.finished.load(Ordering::SeqCst)
    }

    pub fn saves_started(&self) -> usize {
        self.saves.started.load(Ordering::SeqCst)
    }

    /// Make every save block its thread for `delay`
    pub fn slow_saves(&self, delay: Duration) {
        *self.saves.delay.lock().unwrap() = delay;
    }
}

impl MediaOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaFile>, MediaError> {
        let track = self
            .tracks
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| MediaError::UnsupportedFormat(path.to_path_buf()))?;

        if track.unsupported {
            return Err(MediaError::UnsupportedFormat(path.to_path_buf()));
        }
        if track.corrupt {
            return Err(MediaError::ReadError(
                path.to_path_buf(),
                "truncated frame header".to_string(),
            ));
        }

        Ok(Box::new(FakeMediaFile {
            path: path.to_path_buf(),
            track,
            store: Arc::clone(&self.tracks),
            saves: Arc::clone(&self.saves),
        }))
    }
}

struct FakeMediaFile {
    path: PathBuf,
    track: FakeTrack,
    store: TrackStore,
    saves: Arc<SaveCounters>,
}

impl MediaFile for FakeMediaFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn group_key(&self) -> Option<String> {
        self.track.album.clone()
    }

    fn album_artists(&self) -> Vec<String> {
        self.track.album_artists.clone()
    }

    fn artwork(&self) -> Option<Vec<u8>> {
        self.track.artwork.clone()
    }

    fn set_artwork(&mut self, data: Vec<u8>) -> Result<(), MediaError> {
        self.track.artwork = Some(data);
        Ok(())
    }

    fn save(&mut self) -> Result<(), MediaError> {
        self.saves.started.fetch_add(1, Ordering::SeqCst);
        let delay = *self.saves.delay.lock().unwrap();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
        self.store
            .lock()
            .unwrap()
            .insert(self.path.clone(), self.track.clone());
        self.saves.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLookup {
    results: Mutex<HashMap<String, Vec<Candidate>>>,
    queries: Mutex<Vec<String>>,
    calls: AtomicUsize,
    stalled: AtomicUsize,
}

impl FakeLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, query: &str, candidates: Vec<Candidate>) {
        self.results
            .lock()
            .unwrap()
            .insert(query.to_string(), candidates);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// The next `calls` searches never answer
    pub fn stall_next(&self, calls: usize) {
        self.stalled.store(calls, Ordering::SeqCst);
    }
}

#[async_trait]
impl MetadataLookup for FakeLookup {
    async fn search_by_title(&self, query: &str) -> Result<Vec<Candidate>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().unwrap().push(query.to_string());

        let stall = self
            .stalled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stall {
            std::future::pending::<()>().await;
        }

        // Yield so concurrent claimants genuinely overlap.
        tokio::task::yield_now().await;

        Ok(self
            .results
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeFetcher {
    assets: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn serve(&self, url: &str, bytes: &[u8]) {
        self.assets
            .lock()
            .unwrap()
            .insert(url.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl AssetFetch for FakeFetcher {
    async fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.assets
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError::HttpStatus {
                url: url.to_string(),
                status: 404,
            })
    }
}

pub fn candidate(title: &str, popularity: Option<u64>, image_url: &str) -> Candidate {
    Candidate {
        title: title.to_string(),
        popularity,
        image_url: image_url.to_string(),
    }
}
