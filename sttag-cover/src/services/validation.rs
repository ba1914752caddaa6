//! File-name and search-term sanitization
//!
//! The illegal set is the portable one (`< > : " / \ | ? *`, NUL and control
//! characters 1-31) on every platform, so a cover folder written on one host
//! stays valid on any other.

/// Characters that may not appear in a file name
fn is_illegal(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*') || (c as u32) < 32
}

/// Remove every illegal character, preserving the order of the rest
///
/// `to_safe_file_name("A:B/C") == "ABC"`
pub fn to_safe_file_name(s: &str) -> String {
    s.chars().filter(|c| !is_illegal(*c)).collect()
}

/// Replace every illegal character with a single space
///
/// Character count and order are preserved.
/// `to_safe_search_term("A:B/C") == "A B C"`
pub fn to_safe_search_term(s: &str) -> String {
    s.chars()
        .map(|c| if is_illegal(c) { ' ' } else { c })
        .collect()
}
