//! Music and cover folder scanning
//!
//! The music scan returns every regular file under the root; deciding which
//! ones are audio is left to the tag reader, which reports anything it cannot
//! parse as an unsupported format.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// File scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot read a directory listing
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

/// Recursive folder scanner
#[derive(Debug, Clone)]
pub struct FileScanner {
    ignored_names: Vec<String>,
    max_depth: Option<usize>,
}

impl FileScanner {
    /// Create new file scanner with the default ignored names
    ///
    /// Ignores system entries like .DS_Store, Thumbs.db, .git, etc.
    pub fn new() -> Self {
        Self {
            ignored_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
            max_depth: None,
        }
    }

    /// Limit recursion depth (root is depth 0)
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Enumerate every file under `root_path`
    ///
    /// Unreadable entries are logged and skipped; only an invalid root fails.
    pub fn scan(&self, root_path: &Path) -> Result<Vec<PathBuf>, ScanError> {
        check_directory(root_path)?;

        let mut files = Vec::new();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root_path)
            .follow_links(false)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        files.push(entry.path().to_path_buf());
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        tracing::debug!(
            root = %root_path.display(),
            count = files.len(),
            "Scan complete"
        );

        Ok(files)
    }

    /// First file named `{name}.*` anywhere under `cover_root`
    pub fn find_cover(&self, cover_root: &Path, name: &str) -> Result<Option<PathBuf>, ScanError> {
        check_directory(cover_root)?;

        let prefix = format!("{}.", name);
        let found = WalkDir::new(cover_root)
            .follow_links(false)
            .max_depth(self.max_depth.unwrap_or(usize::MAX))
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .find(|entry| entry.file_name().to_string_lossy().starts_with(&prefix))
            .map(|entry| entry.into_path());

        Ok(found)
    }

    /// Whether a file named `{name}.*` exists directly in `cover_root`
    pub fn has_cover(&self, cover_root: &Path, name: &str) -> Result<bool, ScanError> {
        check_directory(cover_root)?;

        let prefix = format!("{}.", name);
        let entries = std::fs::read_dir(cover_root)
            .map_err(|e| ScanError::FileAccessError(cover_root.to_path_buf(), e.to_string()))?;

        for entry in entries.flatten() {
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && entry.file_name().to_string_lossy().starts_with(&prefix) {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Check if entry should be processed
    fn should_process_entry(
        &self,
        entry: &DirEntry,
        symlink_visited: &mut HashSet<PathBuf>,
    ) -> bool {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy();

        for ignored in &self.ignored_names {
            if file_name == ignored.as_str() {
                return false;
            }
        }

        // Detect symlink loops
        if entry.file_type().is_symlink() {
            if let Ok(canonical) = path.canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", path.display());
                    return false;
                }
            }
        }

        true
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

fn check_directory(path: &Path) -> Result<(), ScanError> {
    if !path.exists() {
        return Err(ScanError::PathNotFound(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ScanError::NotADirectory(path.to_path_buf()));
    }
    Ok(())
}
