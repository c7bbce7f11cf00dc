//! Cookie parsing and serialisation.

use std::collections::HashMap;

use hestia_core::ResponseCookie;

use crate::date::http_date;

/// Parses a request `Cookie:` header value into `cookies`.
///
/// Pairs split on `;`; leading non-graphic characters are stripped from
/// each key and the pair splits at the first `=`.
pub fn parse_cookies(header: &str, cookies: &mut HashMap<String, String>) {
    for pair in header.split(';') {
        let pair = pair.trim_start_matches(|c: char| !c.is_ascii_graphic());
        if pair.is_empty() {
            continue;
        }
        let (name, value) = match pair.split_once('=') {
            Some((n, v)) => (n, v),
            None => (pair, ""),
        };
        cookies.insert(name.to_string(), value.to_string());
    }
}

/// Serialises one `Set-Cookie` header value.
#[must_use]
pub fn serialize_cookie(cookie: &ResponseCookie) -> String {
    let mut out = format!("{}={}", cookie.name(), cookie.value());
    if let Some(max_age) = cookie.max_age_secs() {
        out.push_str(&format!("; Max-Age={max_age}"));
    }
    if let Some(expires) = cookie.expires_at() {
        out.push_str(&format!("; Expires={}", http_date(expires)));
    }
    if let Some(domain) = cookie.domain_value() {
        out.push_str(&format!("; Domain={domain}"));
    }
    if let Some(path) = cookie.path_value() {
        out.push_str(&format!("; Path={path}"));
    }
    if cookie.is_secure() {
        out.push_str("; Secure");
    }
    if cookie.is_http_only() {
        out.push_str("; HttpOnly");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(header: &str) -> HashMap<String, String> {
        let mut cookies = HashMap::new();
        parse_cookies(header, &mut cookies);
        cookies
    }

    #[test]
    fn test_parse_simple_pairs() {
        let cookies = parsed("SID=abc123; theme=dark");
        assert_eq!(cookies["SID"], "abc123");
        assert_eq!(cookies["theme"], "dark");
    }

    #[test]
    fn test_parse_strips_leading_junk() {
        let cookies = parsed("  SID=x;\t theme=y");
        assert_eq!(cookies["SID"], "x");
        assert_eq!(cookies["theme"], "y");
    }

    #[test]
    fn test_parse_splits_on_first_equals() {
        let cookies = parsed("data=a=b=c");
        assert_eq!(cookies["data"], "a=b=c");
    }

    #[test]
    fn test_parse_valueless_cookie() {
        let cookies = parsed("bare");
        assert_eq!(cookies["bare"], "");
    }

    #[test]
    fn test_serialize_full_cookie() {
        let cookie = ResponseCookie::new("SID", "abc")
            .max_age(1200)
            .domain("example.com")
            .path("/")
            .secure()
            .http_only();
        assert_eq!(
            serialize_cookie(&cookie),
            "SID=abc; Max-Age=1200; Domain=example.com; Path=/; Secure; HttpOnly"
        );
    }

    #[test]
    fn test_serialize_minimal_cookie() {
        let cookie = ResponseCookie::new("a", "b");
        assert_eq!(serialize_cookie(&cookie), "a=b");
    }
}
