//! Streaming `multipart/form-data` parser.
//!
//! This crate parses multipart request bodies incrementally: the connection
//! worker feeds it raw body chunks as they arrive on the socket, and the
//! parser assembles text fields in memory while spooling file fields to a
//! temporary directory. Nothing requires the whole body to be buffered at
//! once; the internal buffer only ever holds the bytes between two boundary
//! markers plus a small carry-over.
//!
//! # Example
//!
//! ```
//! use hestia_multipart::Parser;
//!
//! let content_type = "multipart/form-data; boundary=----x";
//! let mut parser = Parser::new(content_type, std::env::temp_dir()).unwrap();
//!
//! let body = b"------x\r\n\
//!     Content-Disposition: form-data; name=\"greeting\"\r\n\r\n\
//!     hello\r\n\
//!     ------x--\r\n";
//! parser.accept_data(body).unwrap();
//!
//! assert_eq!(parser.field("greeting").unwrap().text(), Some("hello"));
//! ```
//!
//! # Duplicate fields
//!
//! When the same field name appears more than once, the latest value wins
//! under the plain name and the full history is kept under `name[]` as a
//! `|`-joined string, matching the query-string convention of the rest of
//! the server.

mod error;
mod field;
mod parser;

pub use error::MultipartError;
pub use field::{Field, FieldData, FileData};
pub use parser::{Parser, DEFAULT_MAX_COLLECTED_BYTES};
