use thiserror::Error;

/// Errors raised by the websocket subsystem.
#[derive(Debug, Error)]
pub enum WsError {
    /// The peer violated the framing rules (for example an unmasked
    /// client frame or an oversized declared length).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// A per-message-deflate context failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// The underlying stream failed or closed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
