//! Error taxonomy for the request lifecycle.
//!
//! Every failure the engine can observe while serving a connection maps to
//! one variant here, and each variant that is reportable to the client maps
//! to one HTTP status. I/O and TLS failures have no status: by the time
//! they surface there is no usable connection to answer on.

use hestia_multipart::MultipartError;
use http::StatusCode;
use thiserror::Error;

/// Result alias using [`HestiaError`].
pub type HestiaResult<T> = Result<T, HestiaError>;

/// Why a bearer token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// The token's signature did not verify.
    BadSignature,
    /// The token's expiration lies in the past.
    Expired,
    /// The token carries no expiration at all.
    MissingExpiration,
    /// The token does not grant access to the requested resource.
    InsufficientScope,
}

impl TokenRejection {
    /// The `error=` code used in the `WWW-Authenticate` challenge.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientScope => "insufficient_scope",
            _ => "invalid_token",
        }
    }

    /// The `error_description=` detail used in the challenge.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::BadSignature => "token signature verification failed",
            Self::Expired => "token has expired",
            Self::MissingExpiration => "token carries no expiration",
            Self::InsufficientScope => "token does not grant access to this resource",
        }
    }
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors observed while driving a connection.
#[derive(Debug, Error)]
pub enum HestiaError {
    /// The request line or a header could not be understood.
    #[error("malformed request: {0}")]
    Parse(String),

    /// The request method is outside the supported set.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Credentials are missing or wrong.
    #[error("authentication required")]
    AuthRequired,

    /// A bearer token was presented but rejected.
    #[error("bearer token rejected: {reason}")]
    AuthTokenInvalid {
        /// The stage at which verification failed.
        reason: TokenRejection,
    },

    /// No repository served the request.
    #[error("no repository served the request")]
    NotFound,

    /// The multipart body could not be parsed.
    #[error(transparent)]
    Multipart(#[from] MultipartError),

    /// Compressing or decompressing a body failed.
    #[error("compression error: {0}")]
    Compression(String),

    /// The connection socket failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The TLS layer failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// Anything unexpected.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HestiaError {
    /// The status code reported to the client, or `None` when the
    /// connection is torn down without a response.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Parse(_) | Self::Multipart(_) => Some(StatusCode::BAD_REQUEST),
            Self::UnsupportedMethod(_) => Some(StatusCode::NOT_IMPLEMENTED),
            Self::AuthRequired | Self::AuthTokenInvalid { .. } => {
                Some(StatusCode::UNAUTHORIZED)
            }
            Self::NotFound => Some(StatusCode::NOT_FOUND),
            Self::Compression(_) | Self::Internal(_) => {
                Some(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Self::Io(_) | Self::Tls(_) => None,
        }
    }
}
