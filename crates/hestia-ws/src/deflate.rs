//! Per-message-deflate contexts (RFC 7692).
//!
//! Compression state is kept across messages in both directions: the
//! deflate window carries over so repeated payloads shrink, and the
//! inflate side maintains the matching dictionary. One context pair
//! exists per client, owned by its sender and receiver tasks.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress};

use crate::error::WsError;

/// The sync-flush trailer that is stripped from (and restored to) every
/// message, per RFC 7692 section 7.2.1.
const FLUSH_TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// Outbound compression context for one client.
#[derive(Debug)]
pub struct MessageDeflate {
    context: Compress,
}

impl MessageDeflate {
    /// Creates a raw-deflate context with the default level.
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: Compress::new(Compression::default(), false),
        }
    }

    /// Compresses one message payload, retaining the window for the next
    /// message.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Compression`] when the underlying coder fails.
    pub fn compress(&mut self, data: &[u8]) -> Result<Vec<u8>, WsError> {
        let mut out = Vec::with_capacity(data.len() / 2 + 64);
        let mut read = 0usize;
        loop {
            if out.capacity() - out.len() < 1024 {
                out.reserve(4096);
            }
            let before = self.context.total_in();
            self.context
                .compress_vec(&data[read..], &mut out, FlushCompress::Sync)
                .map_err(|err| WsError::Compression(err.to_string()))?;
            read += (self.context.total_in() - before) as usize;
            // The sync flush is complete once spare output room remains.
            if read == data.len() && out.len() < out.capacity() {
                break;
            }
        }
        if out.ends_with(&FLUSH_TRAILER) {
            out.truncate(out.len() - FLUSH_TRAILER.len());
        }
        Ok(out)
    }
}

impl Default for MessageDeflate {
    fn default() -> Self {
        Self::new()
    }
}

/// Inbound decompression context for one client.
#[derive(Debug)]
pub struct MessageInflate {
    context: Decompress,
}

impl MessageInflate {
    /// Creates a raw-inflate context.
    #[must_use]
    pub fn new() -> Self {
        Self {
            context: Decompress::new(false),
        }
    }

    /// Decompresses one message payload, retaining the dictionary for the
    /// next message.
    ///
    /// # Errors
    ///
    /// Returns [`WsError::Compression`] on a corrupt deflate stream.
    pub fn decompress(&mut self, data: &[u8]) -> Result<Vec<u8>, WsError> {
        let mut input = Vec::with_capacity(data.len() + FLUSH_TRAILER.len());
        input.extend_from_slice(data);
        input.extend_from_slice(&FLUSH_TRAILER);

        let mut out = Vec::with_capacity(data.len() * 2 + 64);
        let mut read = 0usize;
        loop {
            if out.capacity() - out.len() < 1024 {
                out.reserve(4096);
            }
            let before = self.context.total_in();
            self.context
                .decompress_vec(&input[read..], &mut out, FlushDecompress::Sync)
                .map_err(|err| WsError::Compression(err.to_string()))?;
            read += (self.context.total_in() - before) as usize;
            if read == input.len() && out.len() < out.capacity() {
                break;
            }
        }
        Ok(out)
    }
}

impl Default for MessageInflate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_single_message() {
        let mut deflate = MessageDeflate::new();
        let mut inflate = MessageInflate::new();

        let message = b"per-message-deflate keeps its window between messages";
        let wire = deflate.compress(message).unwrap();
        assert!(!wire.ends_with(&FLUSH_TRAILER));
        assert_eq!(inflate.decompress(&wire).unwrap(), message);
    }

    #[test]
    fn test_window_carries_across_messages() {
        let mut deflate = MessageDeflate::new();
        let mut inflate = MessageInflate::new();

        let message = b"a fairly repetitive payload, a fairly repetitive payload";
        let first = deflate.compress(message).unwrap();
        let second = deflate.compress(message).unwrap();
        // The second copy compresses against the retained window.
        assert!(second.len() < first.len());

        assert_eq!(inflate.decompress(&first).unwrap(), message);
        assert_eq!(inflate.decompress(&second).unwrap(), message);
    }

    #[test]
    fn test_rfc7692_sample_payloads() {
        // The "Hello" examples from RFC 7692 section 7.2.3: the first
        // message in full, the second shrunk by the shared window.
        let mut inflate = MessageInflate::new();
        let first = [0xf2, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00];
        let second = [0xf2, 0x00, 0x11, 0x00, 0x00];
        assert_eq!(inflate.decompress(&first).unwrap(), b"Hello");
        assert_eq!(inflate.decompress(&second).unwrap(), b"Hello");
    }

    #[test]
    fn test_corrupt_stream_is_an_error() {
        let mut inflate = MessageInflate::new();
        assert!(inflate.decompress(&[0xFF, 0xFF, 0x12, 0x34]).is_err());
    }

    #[test]
    fn test_empty_message() {
        let mut deflate = MessageDeflate::new();
        let mut inflate = MessageInflate::new();
        let wire = deflate.compress(b"").unwrap();
        assert_eq!(inflate.decompress(&wire).unwrap(), b"");
    }
}
