use thiserror::Error;

/// Errors produced while parsing a multipart body.
///
/// Every variant maps to `400 Bad Request` at the HTTP layer except
/// [`MultipartError::Io`], which indicates a spool-file failure on the
/// server side.
#[derive(Debug, Error)]
pub enum MultipartError {
    /// The `Content-Type` header carried no usable `boundary=` token.
    #[error("cannot find boundary in content type: \"{0}\"")]
    MissingBoundary(String),

    /// The buffered body grew past the configured ceiling.
    #[error("multipart data exceeds the configured limit of {limit} bytes")]
    TooLarge {
        /// The configured ceiling in bytes.
        limit: usize,
    },

    /// A part's header block was not `Content-Disposition: form-data` with
    /// a quoted `name=` attribute.
    #[error("malformed part headers: {0}")]
    MalformedHeaders(String),

    /// Creating or writing a spool file failed.
    #[error("spool file error: {0}")]
    Io(#[from] std::io::Error),
}
