//! Audio file tag access
//!
//! [`MediaOpener`] and [`MediaFile`] are the seam between the batch engine and
//! the tag library. [`LoftyOpener`] is the production implementation; tests
//! substitute in-memory fakes.
//!
//! All methods are blocking. Callers run them on the blocking thread pool.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use lofty::config::WriteOptions;
use lofty::error::{ErrorKind, LoftyError};
use lofty::file::{TaggedFile, TaggedFileExt};
use lofty::picture::{Picture, PictureType};
use lofty::prelude::*;
use lofty::probe::Probe;
use lofty::tag::{ItemKey, Tag};
use thiserror::Error;

/// Tag access errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Not a recognized audio container; the batch engine skips these silently
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(PathBuf),

    /// Tag read failure
    #[error("Failed to read {0}: {1}")]
    ReadError(PathBuf, String),

    /// Tag write failure
    #[error("Failed to write {0}: {1}")]
    WriteError(PathBuf, String),

    /// Image data could not be parsed as a picture
    #[error("Invalid picture data: {0}")]
    InvalidPicture(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An opened audio file
///
/// Dropping the value closes the file.
pub trait MediaFile: Send {
    fn path(&self) -> &Path;

    /// Album tag; the group key for cover lookups
    fn group_key(&self) -> Option<String>;

    fn album_artists(&self) -> Vec<String>;

    /// Embedded front cover bytes
    fn artwork(&self) -> Option<Vec<u8>>;

    /// Replace all embedded pictures with `data` as the front cover
    fn set_artwork(&mut self, data: Vec<u8>) -> Result<(), MediaError>;

    /// Persist pending tag changes
    fn save(&mut self) -> Result<(), MediaError>;
}

/// Opens audio files for tag access
pub trait MediaOpener: Send + Sync {
    /// Fails with [`MediaError::UnsupportedFormat`] for non-audio files
    fn open(&self, path: &Path) -> Result<Box<dyn MediaFile>, MediaError>;
}

/// lofty-backed [`MediaOpener`]
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyOpener;

impl LoftyOpener {
    pub fn new() -> Self {
        Self
    }
}

impl MediaOpener for LoftyOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn MediaFile>, MediaError> {
        let tagged_file = Probe::open(path)
            .map_err(|e| classify(path, e))?
            .guess_file_type()?
            .read()
            .map_err(|e| classify(path, e))?;

        Ok(Box::new(LoftyMediaFile {
            path: path.to_path_buf(),
            tagged_file,
        }))
    }
}

fn classify(path: &Path, err: LoftyError) -> MediaError {
    match err.kind() {
        ErrorKind::UnknownFormat => MediaError::UnsupportedFormat(path.to_path_buf()),
        _ => MediaError::ReadError(path.to_path_buf(), err.to_string()),
    }
}

struct LoftyMediaFile {
    path: PathBuf,
    tagged_file: TaggedFile,
}

impl LoftyMediaFile {
    fn tag(&self) -> Option<&Tag> {
        self.tagged_file
            .primary_tag()
            .or_else(|| self.tagged_file.first_tag())
    }

    /// Primary tag, created when the file has none yet
    fn primary_tag_mut(&mut self) -> Result<&mut Tag, MediaError> {
        let tag_type = self.tagged_file.primary_tag_type();
        if self.tagged_file.tag(tag_type).is_none() {
            self.tagged_file.insert_tag(Tag::new(tag_type));
        }
        self.tagged_file.tag_mut(tag_type).ok_or_else(|| {
            MediaError::WriteError(
                self.path.clone(),
                format!("File does not support {:?} tags", tag_type),
            )
        })
    }
}

impl MediaFile for LoftyMediaFile {
    fn path(&self) -> &Path {
        &self.path
    }

    fn group_key(&self) -> Option<String> {
        self.tag()
            .and_then(|tag| tag.album().map(|album| album.to_string()))
    }

    fn album_artists(&self) -> Vec<String> {
        let Some(tag) = self.tag() else {
            return Vec::new();
        };

        // Some taggers pack several artists into one frame.
        tag.get_strings(&ItemKey::AlbumArtist)
            .flat_map(|value| value.split(';'))
            .map(str::trim)
            .filter(|artist| !artist.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn artwork(&self) -> Option<Vec<u8>> {
        let tag = self.tag()?;
        tag.pictures()
            .iter()
            .find(|p| p.pic_type() == PictureType::CoverFront)
            .or_else(|| tag.pictures().first())
            .map(|p| p.data().to_vec())
    }

    fn set_artwork(&mut self, data: Vec<u8>) -> Result<(), MediaError> {
        let mut picture = Picture::from_reader(&mut Cursor::new(data))
            .map_err(|e| MediaError::InvalidPicture(e.to_string()))?;
        picture.set_pic_type(PictureType::CoverFront);

        let tag = self.primary_tag_mut()?;
        let existing: Vec<PictureType> = tag.pictures().iter().map(|p| p.pic_type()).collect();
        for pic_type in existing {
            tag.remove_picture_type(pic_type);
        }
        tag.push_picture(picture);

        Ok(())
    }

    fn save(&mut self) -> Result<(), MediaError> {
        let path = self.path.clone();
        let tag = self.primary_tag_mut()?;
        tag.save_to_path(&path, WriteOptions::default())
            .map_err(|e| MediaError::WriteError(path.clone(), e.to_string()))?;

        tracing::debug!(file = %path.display(), "Saved tags");
        Ok(())
    }
}
