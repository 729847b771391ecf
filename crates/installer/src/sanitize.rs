//! File-name sanitization for user- and remote-derived names

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters the game's platform rejects in file names, plus control characters.
static INVALID_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([<>:"/\\|?*\x00-\x1F]*\.+$)|([<>:"/\\|?*\x00-\x1F]+)"#)
        .expect("sanitizer pattern is valid")
});

/// Make `name` usable as a single directory or file name.
///
/// Each run of invalid characters, and any run of invalid characters followed
/// by trailing dots, collapses to one `_`. Surrounding whitespace is trimmed
/// first so the function is idempotent.
pub fn sanitize_name(name: &str) -> String {
    INVALID_NAME_PATTERN.replace_all(name.trim(), "_").into_owned()
}

/// Lowercased [`sanitize_name`], the form used for spawn names.
pub fn sanitize_identifier(name: &str) -> String {
    sanitize_name(&name.to_lowercase())
}
