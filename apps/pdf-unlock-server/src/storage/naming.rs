//! Collision-resistant file naming
//!
//! Names look like `{safeTitle}_{YYYYMMDD_HHMMSS_ffffff}_{token}.{ext}`. The
//! microsecond timestamp keeps names sortable and readable; the random token
//! breaks ties between requests landing on the same microsecond.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Maximum length (in characters) of the sanitized title
pub const MAX_TITLE_CHARS: usize = 64;

/// Maximum UTF-8 length of the sanitized title
///
/// File names are limited to 255 bytes and the timestamp, token, extension
/// and `.meta` sidecar suffix take up to 42 of them.
pub const MAX_TITLE_BYTES: usize = 128;

/// Placeholder used when a title sanitizes to nothing
pub const DEFAULT_TITLE: &str = "document";

/// Length of the random suffix in hex characters
const TOKEN_LEN: usize = 8;

/// The parts a generated file name is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingToken {
    pub safe_title: String,
    pub timestamp: DateTime<Utc>,
    pub random_suffix: String,
}

impl NamingToken {
    /// Build a token for `title` stamped with the current time
    pub fn new(title: &str) -> Self {
        Self::at(title, Utc::now())
    }

    /// Build a token for `title` stamped with `timestamp`
    pub fn at(title: &str, timestamp: DateTime<Utc>) -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self {
            safe_title: sanitize_title(title),
            timestamp,
            random_suffix: simple[..TOKEN_LEN].to_string(),
        }
    }

    /// Render the final file name with the given extension
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "{}_{}_{}.{}",
            self.safe_title,
            self.timestamp.format("%Y%m%d_%H%M%S_%6f"),
            self.random_suffix,
            extension.trim_start_matches('.')
        )
    }
}

/// Generate a unique file name for `title` with extension `extension`
pub fn generate_file_name(title: &str, extension: &str) -> String {
    NamingToken::new(title).file_name(extension)
}

/// Make a free-text title safe for use in a file name
///
/// Keeps alphanumerics, `_`, `-` and whitespace, then collapses runs of
/// whitespace and dashes into a single underscore.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace())
        .collect();

    let mut safe = String::with_capacity(kept.len());
    let mut pending_separator = false;
    for c in kept.trim().chars() {
        if c == '-' || c.is_whitespace() {
            pending_separator = true;
            continue;
        }
        if pending_separator {
            safe.push('_');
            pending_separator = false;
        }
        safe.push(c);
    }

    let mut truncated = String::with_capacity(MAX_TITLE_BYTES);
    for c in safe.chars().take(MAX_TITLE_CHARS) {
        if truncated.len() + c.len_utf8() > MAX_TITLE_BYTES {
            break;
        }
        truncated.push(c);
    }
    let truncated = truncated.trim_matches('_');

    if truncated.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        truncated.to_string()
    }
}
