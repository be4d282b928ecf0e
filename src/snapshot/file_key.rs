//! Deterministic file keys for captured pages.
//!
//! A page captured from `https://ex.com/news/today` is stored as
//! `ex.com_news_today.txt`: host (plus port, if any) followed by the path, with
//! path separators and characters that are unsafe in file names replaced by
//! [`ESCAPE_CHAR`].
//!
//! Distinct URLs can map to the same key (`/a/b` and `/a_b`). Within one
//! snapshot the last capture written under a key wins.

use url::Url;

/// Replacement for path separators and unsafe characters.
pub const ESCAPE_CHAR: char = '_';

/// Extension of every capture file.
pub const FILE_EXTENSION: &str = "txt";

/// Keys are cut to this many characters to stay under file name limits.
const MAX_KEY_CHARS: usize = 200;

/// Returns the file key for `url`, or `None` if it is not an absolute URL with a host.
#[must_use]
pub fn file_key_for_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let mut raw = host.to_string();
    if let Some(port) = parsed.port() {
        raw.push(':');
        raw.push_str(&port.to_string());
    }
    raw.push_str(parsed.path());
    Some(escape_component(&raw))
}

/// File name (key plus extension) for a key.
#[must_use]
pub fn file_name_for_key(key: &str) -> String {
    format!("{key}.{FILE_EXTENSION}")
}

/// Inverse of [`file_name_for_key`]; `None` for names without the capture extension.
#[must_use]
pub fn key_from_file_name(name: &str) -> Option<&str> {
    let key = name.strip_suffix(FILE_EXTENSION)?.strip_suffix('.')?;
    (!key.is_empty()).then_some(key)
}

/// Replaces separators, reserved characters, and control characters with [`ESCAPE_CHAR`].
///
/// Unlike a general filename sanitizer, runs are not collapsed: every input
/// character maps to exactly one output character so keys stay predictable.
#[must_use]
pub fn escape_component(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ESCAPE_CHAR,
            c if c.is_control() => ESCAPE_CHAR,
            c => c,
        })
        .take(MAX_KEY_CHARS)
        .collect()
}
