//! # sttag Common Library
//!
//! Shared code for the sttag cover tagger:
//! - Error types
//! - Configuration loading and folder resolution
//! - Event types (TaggerEvent enum) and the EventBus

pub mod config;
pub mod error;
pub mod events;

pub use error::{Error, Result};
