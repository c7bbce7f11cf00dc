//! URL and form decoding.

use std::collections::HashMap;

/// Percent-decodes a URL component.
///
/// `+` becomes a space, `%hh` decodes to the named byte and the literal
/// escape `%%` becomes a single `%`. A dangling `%` at the end of the
/// input is dropped rather than treated as an error; a `%` followed by
/// non-hex characters passes through unchanged.
#[must_use]
pub fn url_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' => {
                if i + 1 < bytes.len() && bytes[i + 1] == b'%' {
                    out.push(b'%');
                    i += 2;
                } else if i + 3 <= bytes.len() && is_hex2(&bytes[i + 1..i + 3]) {
                    out.push(hex2(&bytes[i + 1..i + 3]));
                    i += 3;
                } else if i + 1 == bytes.len() {
                    // dangling escape at end of input is dropped
                    i += 1;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_hex2(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0].is_ascii_hexdigit() && bytes[1].is_ascii_hexdigit()
}

fn hex2(bytes: &[u8]) -> u8 {
    let digit = |b: u8| (b as char).to_digit(16).unwrap_or(0) as u8;
    digit(bytes[0]) * 16 + digit(bytes[1])
}

/// Parses a query string or urlencoded form body into `params`.
///
/// Items split on `&`, each item on its first `=`; an item with no `=`
/// yields the key with an empty value. For a key `k` arriving repeatedly
/// with values `v1..vN`, the map ends up with `k → vN` and
/// `k[] → v1|v2|…|vN`: the history entry is created on the second
/// occurrence from the remembered first value and extended on every one
/// after that.
pub fn parse_params(input: &str, params: &mut HashMap<String, String>) {
    for item in input.split('&') {
        if item.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = match item.split_once('=') {
            Some((k, v)) => (k, v),
            None => (item, ""),
        };
        let key = url_decode(raw_key);
        let value = url_decode(raw_value);

        if let Some(previous) = params.get(&key).cloned() {
            let history_key = format!("{key}[]");
            match params.get_mut(&history_key) {
                Some(history) => {
                    history.push('|');
                    history.push_str(&value);
                }
                None => {
                    params.insert(history_key, format!("{previous}|{value}"));
                }
            }
        }
        params.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(input: &str) -> HashMap<String, String> {
        let mut params = HashMap::new();
        parse_params(input, &mut params);
        params
    }

    #[test]
    fn test_decode_basics() {
        assert_eq!(url_decode("a+b"), "a b");
        assert_eq!(url_decode("a%20b"), "a b");
        assert_eq!(url_decode("%41%42%43"), "ABC");
        assert_eq!(url_decode("plain"), "plain");
    }

    #[test]
    fn test_decode_escape_edge_cases() {
        assert_eq!(url_decode("100%%"), "100%");
        assert_eq!(url_decode("dangling%"), "dangling");
        assert_eq!(url_decode("%zz"), "%zz");
        assert_eq!(url_decode("%4"), "%4");
    }

    #[test]
    fn test_decode_unreserved_identity() {
        let unreserved = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";
        assert_eq!(url_decode(unreserved), unreserved);
    }

    #[test]
    fn test_single_parameters() {
        let params = parsed("a=1&b=two&c=%33");
        assert_eq!(params["a"], "1");
        assert_eq!(params["b"], "two");
        assert_eq!(params["c"], "3");
    }

    #[test]
    fn test_missing_equals_yields_empty_value() {
        let params = parsed("flag&x=1");
        assert_eq!(params["flag"], "");
        assert_eq!(params["x"], "1");
    }

    #[test]
    fn test_repeated_key_history() {
        let params = parsed("k=a&k=b&k=c");
        assert_eq!(params["k"], "c");
        assert_eq!(params["k[]"], "a|b|c");
    }

    #[test]
    fn test_two_occurrences() {
        let params = parsed("k=v1&other=x&k=v2");
        assert_eq!(params["k"], "v2");
        assert_eq!(params["k[]"], "v1|v2");
        assert_eq!(params["other"], "x");
    }

    #[test]
    fn test_decoded_keys_merge() {
        // "%6b" is "k", so the history rule applies across encodings.
        let params = parsed("k=1&%6b=2");
        assert_eq!(params["k"], "2");
        assert_eq!(params["k[]"], "1|2");
    }
}
