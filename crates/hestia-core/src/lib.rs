//! Core types for the Hestia embeddable web server.
//!
//! This crate defines the vocabulary shared by every other Hestia crate:
//! the request/response model handed to content providers, the
//! [`Repository`] and [`DynamicPage`] traits applications implement to
//! serve content, the error taxonomy, and the MIME/status tables.
//!
//! Applications normally depend on the `hestia` facade crate rather than
//! on this crate directly.

mod error;
mod method;
mod mime;
mod repository;
mod request;
mod response;
mod status;

pub use error::{HestiaError, HestiaResult, TokenRejection};
pub use method::Method;
pub use mime::mime_for_url;
pub use repository::{DynamicPage, DynamicRepository, MemoryRepository, Repository};
pub use request::HttpRequest;
pub use response::{CorsPolicy, HttpResponse, ResponseCookie};
pub use status::reason_phrase;

/// Name of the session cookie attached to dynamic responses.
pub const SESSION_COOKIE_NAME: &str = "SID";
