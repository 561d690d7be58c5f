//! The analysis request flow: upload validation and text extraction,
//! the AI fit report, and the stored history. The quota gate runs
//! before any of this work starts.

pub mod extract;
pub mod handlers;
pub mod history;
pub mod report;

/// Truncates to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
