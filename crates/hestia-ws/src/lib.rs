//! WebSocket support.
//!
//! This crate implements the server side of RFC 6455 on top of any
//! `AsyncRead + AsyncWrite` stream: handshake key derivation, frame
//! decoding and encoding, control-frame handling and the per-message-
//! deflate extension with stateful compression contexts per client.
//!
//! Applications register a [`WebSocketEndpoint`] implementation under a
//! URL; for every upgraded connection the server spawns a receiver task
//! and a sender task. Outbound messages go through a per-client FIFO so
//! delivery order matches enqueue order, and clients that cannot drain
//! their queue within the configured latency threshold are dropped.
//!
//! # Example
//!
//! ```
//! use hestia_ws::{WebSocketClient, WebSocketEndpoint};
//!
//! struct Echo;
//!
//! impl WebSocketEndpoint for Echo {
//!     fn on_text_message(&self, client: &WebSocketClient, message: &str) {
//!         client.send_text(message);
//!     }
//! }
//! ```

mod client;
mod deflate;
mod endpoint;
mod error;
mod frame;
mod handshake;

pub use client::{attach_client, ClientId, WebSocketClient, WsConfig};
pub use deflate::{MessageDeflate, MessageInflate};
pub use endpoint::{Endpoint, WebSocketEndpoint};
pub use error::WsError;
pub use frame::{encode_frame, read_frame, Frame, Opcode};
pub use handshake::{accept_key, upgrade_response_head};
