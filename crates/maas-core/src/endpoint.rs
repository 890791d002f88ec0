//! Base URL normalization.
//!
//! MAAS serves each protocol version under `{base}/api/{major}.{minor}/`. These
//! helpers are the only URL-shape rules the client depends on.

/// Ensure the URL ends with exactly one slash.
#[must_use]
pub fn ensure_trailing_slash(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

/// Append the `api/{version}/` segment to a base URL.
///
/// ```
/// use maas_core::endpoint::add_api_version_to_url;
///
/// assert_eq!(
///     add_api_version_to_url("http://x/maas", "1.0"),
///     "http://x/maas/api/1.0/"
/// );
/// ```
#[must_use]
pub fn add_api_version_to_url(base_url: &str, version: &str) -> String {
    format!("{}api/{version}/", ensure_trailing_slash(base_url))
}

/// Split a versioned URL into its base and version segment.
///
/// Returns `Some((base, version))` for URLs of the form `.../api/{x.y}[/]`, where
/// `base` keeps a single trailing slash. Unversioned URLs return `None` and
/// should be used unchanged.
///
/// ```
/// use maas_core::endpoint::split_versioned_url;
///
/// assert_eq!(
///     split_versioned_url("http://x/maas/api/3.0"),
///     Some(("http://x/maas/".to_string(), "3.0".to_string()))
/// );
/// assert_eq!(split_versioned_url("http://x/maas"), None);
/// ```
#[must_use]
pub fn split_versioned_url(url: &str) -> Option<(String, String)> {
    let trimmed = url.strip_suffix('/').unwrap_or(url);
    let (prefix, version) = trimmed.rsplit_once("/api/")?;
    if prefix.is_empty() || !is_version_segment(version) {
        return None;
    }
    Some((format!("{prefix}/"), version.to_string()))
}

/// `digits "." digits`, the same shape as an API version.
fn is_version_segment(segment: &str) -> bool {
    let is_number = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
    segment
        .split_once('.')
        .is_some_and(|(major, minor)| is_number(major) && is_number(minor))
}
