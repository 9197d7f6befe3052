//! Reference string utilities.
//!
//! Classifies and cleans up the raw attribute values found in HTML
//! (`src`, `href`) before they are treated as filesystem paths.

use std::borrow::Cow;

use percent_encoding::percent_decode_str;

/// Check if a reference is external (has a URL scheme like http:, data:, etc.)
///
/// A valid scheme must:
/// - Have at least 2 characters before the colon (so `C:\x` is not a scheme)
/// - Only contain ASCII alphanumeric or `+`, `-`, `.`
///
/// # Examples
/// ```ignore
/// assert!(is_external_link("https://example.com/app.js"));
/// assert!(is_external_link("data:text/css,body{}"));
/// assert!(!is_external_link("/app.js"));
/// assert!(!is_external_link("./file.js"));
/// ```
#[inline]
pub fn is_external_link(link: &str) -> bool {
    link.find(':').is_some_and(|pos| {
        pos > 1
            && link[..pos]
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    })
}

/// Check if a reference is protocol-relative (`//cdn.example.com/x.js`).
#[inline]
pub fn is_protocol_relative(link: &str) -> bool {
    link.starts_with("//")
}

/// Strip `?query` and `#fragment` suffixes from a reference.
///
/// # Examples
/// ```ignore
/// assert_eq!(strip_query_fragment("app.js?v=2#main"), "app.js");
/// assert_eq!(strip_query_fragment("app.js"), "app.js");
/// ```
#[inline]
pub fn strip_query_fragment(link: &str) -> &str {
    let end = link.find(['?', '#']).unwrap_or(link.len());
    &link[..end]
}

/// Decode `%XX` escapes in a reference path.
///
/// Invalid UTF-8 after decoding falls back to the raw input.
pub fn decode_path(link: &str) -> Cow<'_, str> {
    percent_decode_str(link)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(link))
}
