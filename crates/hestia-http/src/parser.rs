//! Request-head parsing.

use hestia_core::{HestiaError, Method};

use crate::urlencoded::url_decode;

/// The parsed request line.
#[derive(Debug, Clone)]
pub struct RequestLine {
    /// The recognised method, or [`Method::Unknown`].
    pub method: Method,
    /// The verbatim method token, kept for error reporting.
    pub method_token: String,
    /// The raw target path, before percent-decoding.
    pub path: String,
    /// The raw query string, when the target carried one.
    pub query: Option<String>,
    /// `true` when the protocol version defaults to keep-alive
    /// (`HTTP/1.1` or higher).
    pub keep_alive_default: bool,
}

/// Parses `METHOD TARGET HTTP/x.y`.
///
/// # Errors
///
/// Returns [`HestiaError::Parse`] when the line does not have exactly
/// three tokens or the third is not an `HTTP/` version. An unrecognised
/// method is not an error here; it parses to [`Method::Unknown`] so the
/// caller can answer `501`.
pub fn parse_request_line(line: &str) -> Result<RequestLine, HestiaError> {
    let mut tokens = line.split_whitespace();
    let (Some(method_token), Some(target), Some(version), None) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return Err(HestiaError::Parse(format!("bad request line: {line:?}")));
    };

    let version = version
        .strip_prefix("HTTP/")
        .ok_or_else(|| HestiaError::Parse(format!("bad protocol version: {line:?}")))?;

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };

    Ok(RequestLine {
        method: Method::from_token(method_token),
        method_token: method_token.to_string(),
        path: path.to_string(),
        query,
        keep_alive_default: version_at_least_1_1(version),
    })
}

fn version_at_least_1_1(version: &str) -> bool {
    let mut parts = version.splitn(2, '.');
    let major: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor: u32 = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    major > 1 || (major == 1 && minor >= 1)
}

/// Splits a header line at its first colon, trimming the name and value.
///
/// Returns `None` for lines with no colon at all.
#[must_use]
pub fn split_header_line(line: &str) -> Option<(&str, &str)> {
    let (name, value) = line.split_once(':')?;
    Some((name.trim(), value.trim()))
}

/// Case-insensitively checks a comma-separated header value for a token.
#[must_use]
pub fn value_has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}

/// Canonicalises a request path for dispatch: completes directory URLs
/// with `index.html`, percent-decodes, and strips leading slashes.
#[must_use]
pub fn normalize_url(raw_path: &str) -> String {
    let mut url = raw_path.to_string();
    if url.is_empty() || url.ends_with('/') {
        url.push_str("index.html");
    }
    url_decode(&url).trim_start_matches('/').to_string()
}
