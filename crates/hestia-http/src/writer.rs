//! Response-head serialisation.
//!
//! Header emission order is part of the server's observable behaviour and
//! is kept stable: status line, `Date`, `Server`, authentication
//! challenge, CORS, caller headers, cookies, `Accept-Ranges`,
//! `Connection`, `Content-Type`, `Content-Encoding`, `Content-Length`.

use std::fmt::Write as _;

use hestia_core::{reason_phrase, CorsPolicy, ResponseCookie};

use crate::cookie::serialize_cookie;
use crate::date::http_date_now;

/// The challenge sent with `401` when HTTP Basic credentials are required.
pub const BASIC_CHALLENGE: &str =
    "Basic realm=\"Restricted area: please enter Login/Password\"";

/// Everything needed to serialise one response head.
#[derive(Debug)]
pub struct ResponseHead<'a> {
    /// Status code.
    pub status: u16,
    /// Explicit reason phrase; defaults from the status table.
    pub reason: Option<&'a str>,
    /// Value of the `Server:` header.
    pub server_name: &'a str,
    /// Whether the connection stays open after this response.
    pub keep_alive: bool,
    /// Body length in bytes (after compression negotiation).
    pub content_length: usize,
    /// Body MIME type.
    pub content_type: &'a str,
    /// Whether the body bytes on the wire are gzip-encoded.
    pub gzip_encoded: bool,
    /// `Set-Cookie` entries.
    pub cookies: &'a [ResponseCookie],
    /// CORS policy.
    pub cors: &'a CorsPolicy,
    /// Caller-supplied extra header lines.
    pub extra_headers: &'a [String],
    /// `WWW-Authenticate` challenge; emitted only with status `401`.
    pub auth_challenge: Option<&'a str>,
}

/// Serialises the head, including the terminating blank line.
#[must_use]
pub fn serialize_head(head: &ResponseHead<'_>) -> String {
    let mut out = String::with_capacity(256);
    let reason = head.reason.unwrap_or_else(|| reason_phrase(head.status));

    let _ = write!(out, "HTTP/1.1 {} {}\r\n", head.status, reason);
    let _ = write!(out, "Date: {}\r\n", http_date_now());
    let _ = write!(out, "Server: {}\r\n", head.server_name);

    if head.status == 401 {
        let challenge = head.auth_challenge.unwrap_or(BASIC_CHALLENGE);
        let _ = write!(out, "WWW-Authenticate: {challenge}\r\n");
    }

    if head.cors.is_enabled() {
        let _ = write!(
            out,
            "Access-Control-Allow-Origin: {}\r\n",
            head.cors.domain()
        );
        if head.cors.allows_credentials() {
            out.push_str("Access-Control-Allow-Credentials: true\r\n");
        }
    }

    for line in head.extra_headers {
        let _ = write!(out, "{line}\r\n");
    }

    for cookie in head.cookies {
        let _ = write!(out, "Set-Cookie: {}\r\n", serialize_cookie(cookie));
    }

    out.push_str("Accept-Ranges: bytes\r\n");
    out.push_str(if head.keep_alive {
        "Connection: Keep-Alive\r\n"
    } else {
        "Connection: close\r\n"
    });

    let _ = write!(out, "Content-Type: {}\r\n", head.content_type);
    if head.gzip_encoded {
        out.push_str("Content-Encoding: gzip\r\n");
    }
    if head.content_length > 0 {
        let _ = write!(out, "Content-Length: {}\r\n", head.content_length);
    }

    out.push_str("\r\n");
    out
}

/// A minimal HTML document naming an error status, used as the body of
/// server-generated error responses.
#[must_use]
pub fn error_page(status: u16) -> String {
    let reason = reason_phrase(status);
    format!(
        "<html><head><title>{status} {reason}</title></head>\
         <body><h1>Error {status}: {reason}</h1></body></html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(status: u16) -> ResponseHead<'static> {
        ResponseHead {
            status,
            reason: None,
            server_name: "Hestia",
            keep_alive: true,
            content_length: 0,
            content_type: "text/html",
            gzip_encoded: false,
            cookies: &[],
            cors: cors_disabled(),
            extra_headers: &[],
            auth_challenge: None,
        }
    }

    fn cors_disabled() -> &'static CorsPolicy {
        static DISABLED: std::sync::OnceLock<CorsPolicy> = std::sync::OnceLock::new();
        DISABLED.get_or_init(CorsPolicy::default)
    }

    #[test]
    fn test_header_order() {
        let mut h = head(200);
        h.content_length = 5;
        let out = serialize_head(&h);

        let lines: Vec<&str> = out.split("\r\n").collect();
        assert_eq!(lines[0], "HTTP/1.1 200 OK");
        assert!(lines[1].starts_with("Date: "));
        assert!(lines[1].ends_with(" GMT"));
        assert_eq!(lines[2], "Server: Hestia");
        assert_eq!(lines[3], "Accept-Ranges: bytes");
        assert_eq!(lines[4], "Connection: Keep-Alive");
        assert_eq!(lines[5], "Content-Type: text/html");
        assert_eq!(lines[6], "Content-Length: 5");
        assert_eq!(lines[7], "");
        assert_eq!(lines[8], "");
    }

    #[test]
    fn test_zero_length_omits_content_length() {
        let out = serialize_head(&head(204));
        assert!(!out.contains("Content-Length"));
        assert!(out.starts_with("HTTP/1.1 204 No Content\r\n"));
    }

    #[test]
    fn test_basic_challenge_on_401() {
        let out = serialize_head(&head(401));
        assert!(out.contains(
            "WWW-Authenticate: Basic realm=\"Restricted area: please enter Login/Password\"\r\n"
        ));
    }

    #[test]
    fn test_explicit_challenge_overrides_default() {
        let mut h = head(401);
        h.auth_challenge = Some("Bearer realm=\"api\", error=\"invalid_token\"");
        let out = serialize_head(&h);
        assert!(out.contains("WWW-Authenticate: Bearer realm=\"api\", error=\"invalid_token\"\r\n"));
        assert!(!out.contains("Basic realm"));
    }

    #[test]
    fn test_challenge_absent_without_401() {
        let mut h = head(200);
        h.auth_challenge = Some("Bearer realm=\"api\"");
        assert!(!serialize_head(&h).contains("WWW-Authenticate"));
    }

    #[test]
    fn test_cors_headers() {
        let cors = CorsPolicy::allow("https://app.example", true);
        let h = ResponseHead {
            status: 200,
            reason: None,
            server_name: "Hestia",
            keep_alive: true,
            content_length: 0,
            content_type: "text/html",
            gzip_encoded: false,
            cookies: &[],
            cors: &cors,
            extra_headers: &[],
            auth_challenge: None,
        };
        let out = serialize_head(&h);
        assert!(out.contains("Access-Control-Allow-Origin: https://app.example\r\n"));
        assert!(out.contains("Access-Control-Allow-Credentials: true\r\n"));
    }

    #[test]
    fn test_gzip_encoding_header() {
        let mut h = head(200);
        h.gzip_encoded = true;
        h.content_length = 10;
        let out = serialize_head(&h);
        assert!(out.contains("Content-Encoding: gzip\r\n"));
    }

    #[test]
    fn test_unknown_status_phrase() {
        let out = serialize_head(&head(299));
        assert!(out.starts_with("HTTP/1.1 299 Unspecified\r\n"));
    }

    #[test]
    fn test_error_page_names_status() {
        let page = error_page(404);
        assert!(page.contains("Error 404: Not Found"));
    }
}
