//! URL synthesis for entries.
//!
//! An entry's URL is its path relative to the base directory with every
//! segment percent-encoded on its own, prefixed with `/`. The same string is
//! used for direct links and as the expansion API's `path` parameter.

use std::path::{Component, Path};

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Path segment reserved for the service's own endpoints.
pub const API_SEGMENT: &str = "_lister";

/// Everything except RFC 3986 unreserved characters gets encoded.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Percent-encode a single path segment.
pub fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Build the site URL for `path`, which must lie inside `base`.
///
/// The base itself maps to `/`. Paths that would route into the service's
/// own endpoint namespace fall back to a flat `/<name>` URL.
pub fn entry_url(base: &Path, path: &Path) -> String {
    let relative = match path.strip_prefix(base) {
        Ok(rel) => rel,
        Err(_) => {
            tracing::warn!(
                "Path {:?} is not under base {:?}, using flat URL",
                path,
                base
            );
            return flat_url(path);
        }
    };

    let segments: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if segments.iter().any(|s| s == API_SEGMENT) {
        tracing::warn!(
            "URL for {:?} would contain the reserved segment {:?}, using flat URL",
            path,
            API_SEGMENT
        );
        return flat_url(path);
    }

    let encoded: Vec<String> = segments.iter().map(|s| encode_segment(s)).collect();
    format!("/{}", encoded.join("/"))
}

fn flat_url(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/{}", encode_segment(&name))
}
