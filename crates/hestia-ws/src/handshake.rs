//! Upgrade handshake helpers.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::{Digest, Sha1};

/// The fixed GUID appended to the client key, per RFC 6455.
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Derives the `Sec-WebSocket-Accept` value from a client's
/// `Sec-WebSocket-Key`.
#[must_use]
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Serialises the `101 Switching Protocols` response head, including the
/// terminating blank line.
#[must_use]
pub fn upgrade_response_head(client_key: &str, permessage_deflate: bool) -> String {
    let mut head = String::with_capacity(160);
    head.push_str("HTTP/1.1 101 Switching Protocols\r\n");
    head.push_str("Upgrade: websocket\r\n");
    head.push_str("Connection: Upgrade\r\n");
    head.push_str(&format!("Sec-WebSocket-Accept: {}\r\n", accept_key(client_key)));
    if permessage_deflate {
        head.push_str("Sec-WebSocket-Extensions: permessage-deflate\r\n");
    }
    head.push_str("\r\n");
    head
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc_sample_key() {
        // The worked example from RFC 6455 section 1.3.
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_upgrade_head_shape() {
        let head = upgrade_response_head("dGhlIHNhbXBsZSBub25jZQ==", false);
        assert!(head.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(head.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(!head.contains("permessage-deflate"));
        assert!(head.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_upgrade_head_advertises_compression() {
        let head = upgrade_response_head("x", true);
        assert!(head.contains("Sec-WebSocket-Extensions: permessage-deflate\r\n"));
    }
}
