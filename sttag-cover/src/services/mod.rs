//! Business logic services

pub mod asset_fetch;
pub mod batch_processor;
pub mod best_match;
pub mod cover_cache;
pub mod dedup;
pub mod file_scanner;
pub mod jikan_client;
pub mod media_file;
pub mod progress_tracker;
pub mod validation;

pub use asset_fetch::{AssetFetch, FetchError, HttpAssetFetcher};
pub use batch_processor::{commit_blocking, BatchProcessor};
pub use cover_cache::CoverCacheService;
pub use dedup::DedupSet;
pub use file_scanner::{FileScanner, ScanError};
pub use jikan_client::{JikanClient, LookupError, MetadataLookup};
pub use media_file::{LoftyOpener, MediaError, MediaFile, MediaOpener};
pub use progress_tracker::ProgressTracker;
