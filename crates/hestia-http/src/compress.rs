//! Gzip bodies and content negotiation.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use hestia_core::HestiaError;

/// Bodies at or under this size are never worth compressing.
pub const MIN_COMPRESS_BYTES: usize = 2048;

/// Gzip-compresses a buffer.
///
/// # Errors
///
/// Returns [`HestiaError::Compression`] when the encoder fails.
pub fn gzip_encode(data: &[u8]) -> Result<Vec<u8>, HestiaError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .and_then(|()| encoder.finish())
        .map_err(|err| HestiaError::Compression(err.to_string()))
}

/// Decompresses a gzip buffer.
///
/// # Errors
///
/// Returns [`HestiaError::Compression`] on a corrupt stream.
pub fn gzip_decode(data: &[u8]) -> Result<Vec<u8>, HestiaError> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|err| HestiaError::Compression(err.to_string()))?;
    Ok(out)
}

/// Whether a MIME type is worth compressing.
#[must_use]
pub fn is_compressible(mime: &str) -> bool {
    mime.starts_with("text/") || mime.starts_with("application/")
}

/// Applies the outgoing-body compression rules.
///
/// Pre-zipped content goes out as-is to gzip-capable clients and is
/// transparently decompressed for everyone else. Plain content is gzipped
/// when the client accepts it, the body is large enough and the MIME type
/// is textual, unless compression would grow it.
///
/// Returns the wire bytes and whether they are gzip-encoded.
///
/// # Errors
///
/// Returns [`HestiaError::Compression`] when a pre-zipped body cannot be
/// decompressed (the client would otherwise receive garbage) or encoding
/// fails.
pub fn negotiate(
    content: Vec<u8>,
    prezipped: bool,
    client_accepts_gzip: bool,
    mime: &str,
) -> Result<(Vec<u8>, bool), HestiaError> {
    if prezipped {
        if client_accepts_gzip {
            return Ok((content, true));
        }
        return gzip_decode(&content).map(|decoded| (decoded, false));
    }

    if client_accepts_gzip && content.len() > MIN_COMPRESS_BYTES && is_compressible(mime) {
        let encoded = gzip_encode(&content)?;
        if encoded.len() > content.len() {
            return Ok((content, false));
        }
        return Ok((encoded, true));
    }

    Ok((content, false))
}
