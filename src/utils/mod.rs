//! Common utilities and helper functions
//!
//! This module provides shared utilities used across the application.

pub mod backoff;

pub use backoff::Backoff;

/// Truncate text to a maximum length, char-boundary safe
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
