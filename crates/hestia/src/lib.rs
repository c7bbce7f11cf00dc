//! # Hestia
//!
//! **An embeddable HTTP/1.1 and WebSocket server.**
//!
//! Hestia links into an application that needs to expose dynamic pages,
//! fixed content and bidirectional real-time channels without running a
//! separate web-server process:
//!
//! - **Repositories** — ordered content providers with internal forwards
//! - **Dynamic pages** — request/response handlers with session access
//! - **Sessions** — typed per-session attributes with sliding expiration
//! - **WebSockets** — RFC 6455 framing with per-message-deflate
//! - **TLS** — optional, with mutual authentication and a DN allow-list
//! - **Authentication** — HTTP Basic lists and pluggable Bearer tokens
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use hestia::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pages = Arc::new(DynamicRepository::new());
//!     pages.add_page("hello", |_req: &mut HttpRequest, resp: &mut HttpResponse| {
//!         resp.set_content_from_string("hello world");
//!         true
//!     });
//!
//!     Server::builder()
//!         .port(8080)
//!         .repository(pages)
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

// Re-export the component crates under stable names.
pub use hestia_core as core;
pub use hestia_http as http;
pub use hestia_multipart as multipart;
pub use hestia_server as server;
pub use hestia_session as session;
pub use hestia_ws as ws;

/// Convenient imports for typical embedders.
pub mod prelude {
    pub use hestia_core::{
        DynamicPage, DynamicRepository, HestiaError, HttpRequest, HttpResponse,
        MemoryRepository, Method, Repository, ResponseCookie,
    };
    pub use hestia_server::{Server, ServerConfig, ShutdownSignal};
    pub use hestia_session::{SessionStore, SessionValue};
    pub use hestia_ws::{Endpoint, WebSocketClient, WebSocketEndpoint};
}
