//! The Hestia embeddable web server.
//!
//! This crate owns everything between the listening socket and the
//! application's content providers: the IPv4/IPv6 listeners with their
//! host allow-list, the optional TLS layer with mutual authentication,
//! the per-connection keep-alive worker, the repository dispatcher, HTTP
//! Basic and Bearer authentication, and the handoff of upgraded
//! connections to the websocket subsystem.
//!
//! # Architecture
//!
//! ```text
//! listener ──► bounded connection tasks ──► keep-alive worker
//!                                             │
//!                        parse ── auth ── dispatch ── respond
//!                                             │
//!                                     websocket upgrade
//!                                   (sender + receiver task)
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use hestia_core::{DynamicRepository, HttpRequest, HttpResponse};
//! use hestia_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pages = Arc::new(DynamicRepository::new());
//!     pages.add_page("hello", |_req: &mut HttpRequest, resp: &mut HttpResponse| {
//!         resp.set_content_from_string("hello");
//!         true
//!     });
//!
//!     let mut server = Server::new(ServerConfig::builder().port(8080).build());
//!     server.add_repository(pages);
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

mod auth;
mod config;
mod connection;
mod dispatcher;
mod server;
mod shutdown;
mod stream;
mod tls;

pub use auth::{BasicAuth, BearerAuth};
pub use config::{ClientAuthSettings, IpNetwork, ServerConfig, ServerConfigBuilder, TlsSettings};
pub use dispatcher::{dispatch, DispatchOutcome, MAX_FORWARDS};
pub use server::{RunningServer, Server, ServerBuilder};
pub use shutdown::{ConnectionTracker, ShutdownSignal};
