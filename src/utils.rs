//! Small helpers shared across the pipeline.
//!
//! - Title clean-up before delivery
//! - String truncation for logging response bodies
//! - Parent directory bootstrap for the state database and log file

use html_escape::decode_html_entities;
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Decode HTML entities in a title and trim surrounding whitespace.
///
/// Titles coming out of the extractor are usually already decoded, but some
/// pages double-encode (`&amp;quot;`), so this runs once more right before a
/// title leaves the process.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(decode_title("  Tom &amp; Jerry "), "Tom & Jerry");
/// ```
pub fn decode_title(raw: &str) -> String {
    decode_html_entities(raw).trim().to_string()
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and the number of dropped bytes appended.
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Create the parent directory of `path` if it has one and it is missing.
///
/// # Errors
///
/// Returns an error if the directory cannot be created (permissions,
/// read-only filesystem, a file in the way, ...).
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).await?;
    info!(dir = %parent.display(), "Ensured directory exists");
    Ok(())
}
