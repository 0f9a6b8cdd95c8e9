//! Helpers for sanitizing data before it enters tracing span attributes.

use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks credentials in the userinfo part of a URL.
///
/// - `https://key@search.local:7700` → `https://****@search.local:7700`
/// - `http://localhost:7700` → unchanged
pub fn redact_url(url: &str) -> String {
    if let Some(scheme_end) = url.find("://") {
        let after_scheme = &url[scheme_end + 3..];
        let authority_end = after_scheme.find('/').unwrap_or(after_scheme.len());
        if let Some(at_pos) = after_scheme[..authority_end].rfind('@') {
            let scheme = &url[..scheme_end + 3];
            let after_at = &after_scheme[at_pos + 1..];
            return format!("{}****@{}", scheme, after_at);
        }
    }

    url.to_string()
}
