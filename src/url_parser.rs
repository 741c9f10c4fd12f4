//! Accept folder ids either raw or as pasted Drive URLs.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{DriveError, Result};

/// Drive URL shapes that carry an id, tried in order. The id is capture 1.
static URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://drive\.google\.com/drive/(?:u/\d+/)?folders/([a-zA-Z0-9_-]+)",
        r"^https?://drive\.google\.com/file/d/([a-zA-Z0-9_-]+)",
        r"^https?://drive\.google\.com/open\?(?:.*&)?id=([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("invalid Drive URL regex"))
    .collect()
});

/// Valid Google Drive ID pattern (alphanumeric, underscore, hyphen).
static ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("invalid ID regex"));

/// Extract a Google Drive ID from a URL or validate a raw ID.
///
/// # Examples
///
/// ```
/// use drive_tree::url_parser::extract_id;
///
/// let id = extract_id("https://drive.google.com/drive/u/0/folders/1abc123").unwrap();
/// assert_eq!(id, "1abc123");
///
/// let id = extract_id("1abc123").unwrap();
/// assert_eq!(id, "1abc123");
/// ```
pub fn extract_id(url_or_id: &str) -> Result<String> {
    let trimmed = url_or_id.trim();

    let from_url = URL_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(trimmed)?.get(1));
    if let Some(id) = from_url {
        return Ok(id.as_str().to_string());
    }

    if ID_REGEX.is_match(trimmed) {
        return Ok(trimmed.to_string());
    }

    Err(DriveError::InvalidUrlOrId(url_or_id.to_string()))
}
