//! Best candidate selection for a metadata search
//!
//! Exact title matches beat prefix matches; inside a tier the most popular
//! candidate wins. Comparison is Unicode-lowercase and locale independent.

use crate::error::{TaggerError, TaggerResult};
use crate::models::Candidate;

/// Pick the single best candidate for `target`
///
/// 1. Titles equal to `target` (case-insensitive)
/// 2. Otherwise titles starting with `target`
/// 3. Otherwise [`TaggerError::NoMatchFound`]
///
/// Ties resolve by popularity; an absent score loses every tie-break and the
/// first candidate in input order wins among equal scores.
pub fn select<'a>(candidates: &'a [Candidate], target: &str) -> TaggerResult<&'a Candidate> {
    let needle = target.to_lowercase();

    let exact = candidates
        .iter()
        .filter(|c| c.title.to_lowercase() == needle);
    if let Some(best) = most_popular(exact) {
        return Ok(best);
    }

    let prefixed = candidates
        .iter()
        .filter(|c| c.title.to_lowercase().starts_with(&needle));
    if let Some(best) = most_popular(prefixed) {
        return Ok(best);
    }

    Err(TaggerError::NoMatchFound(target.to_string()))
}

/// First candidate with the highest popularity
fn most_popular<'a>(candidates: impl Iterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    // `max_by_key` keeps the last maximum; fold to keep the first.
    candidates.fold(None, |best: Option<&'a Candidate>, candidate| match best {
        Some(current) if candidate.popularity <= current.popularity => Some(current),
        _ => Some(candidate),
    })
}
