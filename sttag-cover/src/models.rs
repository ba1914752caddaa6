//! Data types shared by the batch engine, the façade and the HTTP API

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use sttag_common::events::CacheOperation;
use uuid::Uuid;

/// Point-in-time copy of the progress counters
///
/// Invariant: `succeeded <= completed <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
}

impl ProgressSnapshot {
    /// `(Tagged files : {succeeded}) {completed}/{total}`
    pub fn steps_text(&self) -> String {
        format!(
            "(Tagged files : {}) {}/{}",
            self.succeeded, self.completed, self.total
        )
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.steps_text())
    }
}

/// One item that failed during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a finished (or cancelled) run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub operation: CacheOperation,
    pub counters: ProgressSnapshot,
    /// Unordered; empty when every item completed cleanly
    pub failures: Vec<FailureRecord>,
}

impl RunOutcome {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Aggregate failure report: `"{n} errors"` followed by one path per line
    pub fn failure_report(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }

        let mut report = format!("{} errors", self.failures.len());
        for failure in &self.failures {
            report.push('\n');
            report.push_str(&failure.path.to_string_lossy());
        }
        Some(report)
    }
}

/// A metadata search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Display title
    pub title: String,
    /// Popularity score (member count); `None` loses every tie-break
    pub popularity: Option<u64>,
    /// Cover image location
    pub image_url: String,
}
