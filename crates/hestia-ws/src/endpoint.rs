//! Websocket endpoints.

use std::collections::HashMap;
use std::sync::Arc;

use hestia_core::HttpRequest;
use parking_lot::Mutex;

use crate::client::{ClientId, WebSocketClient};

/// Application callbacks for one websocket destination.
///
/// All callbacks run on the client's receiver task; sends from inside a
/// callback only enqueue, so a slow peer never blocks message handling.
/// Every method has a no-op default, so an endpoint implements only what
/// it needs.
pub trait WebSocketEndpoint: Send + Sync {
    /// Called before the upgrade handshake is answered. Returning `false`
    /// rejects the upgrade.
    fn on_opening(&self, _request: &HttpRequest) -> bool {
        true
    }

    /// A complete text message arrived.
    fn on_text_message(&self, _client: &WebSocketClient, _message: &str) {}

    /// A complete binary message arrived.
    fn on_binary_message(&self, _client: &WebSocketClient, _message: &[u8]) {}

    /// A ping control frame arrived. The pong reply is sent automatically.
    fn on_ping(&self, _client: &WebSocketClient, _payload: &[u8]) {}

    /// A pong control frame arrived.
    fn on_pong(&self, _client: &WebSocketClient, _payload: &[u8]) {}

    /// A close control frame arrived. The close reply is sent
    /// automatically before the connection is dropped.
    fn on_close(&self, _client: &WebSocketClient, _payload: &[u8]) {}

    /// The client is going away; called exactly once per client.
    fn on_closing(&self, _client: &WebSocketClient) {}
}

/// A registered websocket destination and its connected clients.
pub struct Endpoint {
    path: String,
    handler: Arc<dyn WebSocketEndpoint>,
    compression_enabled: bool,
    clients: Mutex<HashMap<ClientId, Arc<WebSocketClient>>>,
}

impl Endpoint {
    /// Creates an endpoint that accepts per-message-deflate when clients
    /// offer it.
    #[must_use]
    pub fn new(path: impl Into<String>, handler: Arc<dyn WebSocketEndpoint>) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            handler,
            compression_enabled: true,
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// Creates an endpoint that always speaks uncompressed frames.
    #[must_use]
    pub fn without_compression(
        path: impl Into<String>,
        handler: Arc<dyn WebSocketEndpoint>,
    ) -> Arc<Self> {
        Arc::new(Self {
            path: path.into(),
            handler,
            compression_enabled: false,
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// The URL path this endpoint is registered under, leading slashes
    /// stripped.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The application callbacks.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn WebSocketEndpoint> {
        &self.handler
    }

    /// Whether this endpoint negotiates per-message-deflate.
    #[must_use]
    pub fn compression_enabled(&self) -> bool {
        self.compression_enabled
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Enqueues a text message to every connected client.
    ///
    /// Iterates a snapshot of the client set so long sends never hold the
    /// set lock.
    pub fn broadcast_text(&self, message: &str) {
        for client in self.snapshot() {
            client.send_text(message);
        }
    }

    /// Enqueues a binary message to every connected client. The payload
    /// is shared, not copied per client.
    pub fn broadcast_binary(&self, data: &[u8]) {
        let data = bytes::Bytes::copy_from_slice(data);
        for client in self.snapshot() {
            client.send_binary(data.clone());
        }
    }

    /// Asks every connected client to close; used during server shutdown.
    pub fn close_clients(&self) {
        for client in self.snapshot() {
            client.send_close();
        }
    }

    fn snapshot(&self) -> Vec<Arc<WebSocketClient>> {
        self.clients.lock().values().cloned().collect()
    }

    pub(crate) fn insert(&self, client: Arc<WebSocketClient>) {
        self.clients.lock().insert(client.id(), client);
    }

    /// Removes a client from the set. Safe to call repeatedly.
    pub(crate) fn detach(&self, id: ClientId) -> bool {
        self.clients.lock().remove(&id).is_some()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("path", &self.path)
            .field("compression_enabled", &self.compression_enabled)
            .field("clients", &self.client_count())
            .finish()
    }
}
