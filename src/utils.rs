//! Utility functions for text normalization, keyword handling and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace normalization and title-casing of extracted text
//! - Comma-separated list parsing for keywords and sources
//! - Region-hint derivation from search keywords
//! - String truncation for logging
//! - File system validation for output directories

use once_cell::sync::Lazy;
use regex::Regex;
use std::fs as stdfs;
use tokio::fs;
use tracing::{info, instrument};

use crate::error::Result;

static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9\s]").unwrap());

/// Collapse runs of whitespace (including newlines) into single spaces and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title-case a string: the first letter after any non-letter is upper-cased,
/// every other letter lower-cased.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(title_case("desa SUKAWATI"), "Desa Sukawati");
/// assert_eq!(title_case("nusa-dua"), "Nusa-Dua");
/// ```
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Split a comma-separated list, trimming entries and dropping empty ones.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Derive a region hint from a search keyword.
///
/// Keywords are of the form `"<disaster> <regency>"`, e.g. `"banjir Gianyar"`,
/// so the second word is the regency. Commas are stripped.
pub fn region_hint_from_keyword(keyword: &str) -> Option<String> {
    keyword
        .split_whitespace()
        .nth(1)
        .map(|w| w.replace(',', "").trim().to_string())
        .filter(|w| !w.is_empty())
}

/// Lower-case text and strip everything but ASCII letters, digits and spaces.
///
/// Used for keyword matching, never for extraction (it destroys the
/// capitalization the location patterns rely on).
pub fn clean_content(content: &str) -> String {
    let lowered = content.to_lowercase();
    let stripped = NON_ALNUM.replace_all(&lowered, "");
    normalize_whitespace(&stripped)
}

/// Truncate a string for logging purposes.
///
/// Long strings are truncated to at most `max` bytes (on a character
/// boundary) with an ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(+{} bytes)", &s[..end], s.len() - end)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or is not writable.
#[instrument(level = "info", skip_all, fields(path = %path))]
pub async fn ensure_writable_dir(path: &str) -> Result<()> {
    fs::create_dir_all(path).await?;
    // Try a small sync write using std fs (simpler error surface)
    let probe_path = format!("{}/..__probe_write__", path.trim_end_matches('/'));
    stdfs::File::create(&probe_path)?;
    let _ = stdfs::remove_file(&probe_path);
    info!("Output directory is writable");
    Ok(())
}
