//! Server-side session storage.
//!
//! Sessions are keyed by a 128-character alphanumeric identifier carried in
//! the `SID` cookie. Each session holds a map of named attributes and an
//! absolute expiration timestamp with sliding-window semantics: every
//! successful lookup pushes the expiration out by the configured lifetime.
//! A session can be pinned (expiration cleared) for as long as a websocket
//! client keeps it alive, then restored when the client detaches.
//!
//! The store is owned by the server and handed to every request by handle;
//! nothing here is process-global, so tests can create as many independent
//! stores as they like.

mod store;
mod value;

pub use store::{SessionStore, DEFAULT_SESSION_LIFETIME, SESSION_ID_LENGTH};
pub use value::SessionValue;
