//! HTTP/1.1 wire handling.
//!
//! Everything in this crate works on bytes and strings already pulled off
//! the socket; the connection worker in `hestia-server` owns the I/O and
//! calls in here to parse request heads, decode parameters and cookies,
//! negotiate compression and serialise response heads.

pub mod compress;
pub mod cookie;
pub mod date;
pub mod parser;
pub mod urlencoded;
pub mod writer;

pub use parser::{parse_request_line, split_header_line, RequestLine};
pub use urlencoded::{parse_params, url_decode};
