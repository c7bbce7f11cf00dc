//! Connected websocket clients and their task pair.
//!
//! Every upgraded connection is driven by two tasks: a receiver that
//! decodes inbound frames and fires endpoint callbacks, and a sender that
//! drains the client's outbound FIFO. The pair coordinates through the
//! client's closing flag and the queue itself; whichever side notices the
//! end first shuts the stream down, which unblocks the other.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use hestia_core::HttpRequest;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::deflate::{MessageDeflate, MessageInflate};
use crate::endpoint::Endpoint;
use crate::error::WsError;
use crate::frame::{encode_frame, read_frame, Opcode};

/// Tuning knobs for websocket clients.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// A queued message older than this on dequeue marks the client as
    /// too slow, and it is dropped.
    pub max_send_latency: Duration,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            max_send_latency: Duration::from_secs(1),
        }
    }
}

/// Identifier of one connected client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(Uuid);

impl ClientId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

enum Outbound {
    Frame {
        opcode: Opcode,
        payload: Bytes,
        enqueued_at: Instant,
    },
    Shutdown,
}

/// One connected websocket client.
///
/// The client owns the request that upgraded it and keeps its session
/// pinned until teardown. Handles are shared between the endpoint's
/// client set and the two driving tasks.
pub struct WebSocketClient {
    id: ClientId,
    endpoint: Weak<Endpoint>,
    request: HttpRequest,
    outbound: mpsc::UnboundedSender<Outbound>,
    closing: AtomicBool,
    torn_down: AtomicBool,
    compressed: bool,
    max_send_latency: Duration,
}

impl WebSocketClient {
    /// This client's identifier.
    #[must_use]
    pub fn id(&self) -> ClientId {
        self.id
    }

    /// The request that opened this connection.
    #[must_use]
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Whether this client negotiated per-message-deflate.
    #[must_use]
    pub fn is_compressed(&self) -> bool {
        self.compressed
    }

    /// Whether the connection is shutting down.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }

    /// Enqueues a text message. Returns `false` once the client is
    /// closing.
    pub fn send_text(&self, message: &str) -> bool {
        self.enqueue(Opcode::Text, Bytes::copy_from_slice(message.as_bytes()))
    }

    /// Enqueues a binary message. Returns `false` once the client is
    /// closing.
    pub fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.enqueue(Opcode::Binary, data.into())
    }

    /// Starts an orderly close: a close frame is sent, after which the
    /// connection is torn down.
    pub fn send_close(&self) -> bool {
        let sent = self.enqueue(Opcode::Close, Bytes::new());
        self.closing.store(true, Ordering::SeqCst);
        sent
    }

    fn reply_close(&self, payload: Vec<u8>) {
        let _ = self.enqueue(Opcode::Close, Bytes::from(payload));
        self.closing.store(true, Ordering::SeqCst);
    }

    fn enqueue(&self, opcode: Opcode, payload: Bytes) -> bool {
        if opcode != Opcode::Close && self.is_closing() {
            return false;
        }
        self.outbound
            .send(Outbound::Frame {
                opcode,
                payload,
                enqueued_at: Instant::now(),
            })
            .is_ok()
    }

    /// Releases everything this client holds: wakes the sender, restores
    /// the pinned session, leaves the endpoint's client set and fires
    /// `on_closing`. Runs its body exactly once no matter how many times
    /// or from where it is called.
    fn teardown(self: &Arc<Self>) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.outbound.send(Outbound::Shutdown);

        let session_id = self.request.session_id();
        if !session_id.is_empty() {
            self.request.sessions().restore(session_id);
        }

        if let Some(endpoint) = self.endpoint.upgrade() {
            endpoint.detach(self.id);
            endpoint.handler().on_closing(self);
        }
        tracing::debug!(client = %self.id, "websocket client detached");
    }
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("id", &self.id)
            .field("compressed", &self.compressed)
            .field("closing", &self.is_closing())
            .finish()
    }
}

/// Takes ownership of an upgraded connection and spawns its task pair.
///
/// The request's session, if any, is pinned for the lifetime of the
/// connection. `compressed` states whether both sides agreed on
/// per-message-deflate during the handshake.
pub fn attach_client<S>(
    endpoint: &Arc<Endpoint>,
    request: HttpRequest,
    stream: S,
    compressed: bool,
    config: WsConfig,
) -> Arc<WebSocketClient>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let session_id = request.session_id();
    if !session_id.is_empty() {
        request.sessions().pin(session_id);
    }

    let (outbound, queue) = mpsc::unbounded_channel();
    let client = Arc::new(WebSocketClient {
        id: ClientId::new(),
        endpoint: Arc::downgrade(endpoint),
        request,
        outbound,
        closing: AtomicBool::new(false),
        torn_down: AtomicBool::new(false),
        compressed,
        max_send_latency: config.max_send_latency,
    });
    endpoint.insert(Arc::clone(&client));

    let (reader, writer) = tokio::io::split(stream);
    tokio::spawn(sender_task(Arc::clone(&client), queue, writer));
    tokio::spawn(receiver_task(Arc::clone(&client), reader));
    client
}

async fn sender_task<W>(
    client: Arc<WebSocketClient>,
    mut queue: mpsc::UnboundedReceiver<Outbound>,
    mut writer: W,
) where
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut deflate = client.compressed.then(MessageDeflate::new);

    while let Some(item) = queue.recv().await {
        let Outbound::Frame {
            opcode,
            payload,
            enqueued_at,
        } = item
        else {
            break;
        };

        if enqueued_at.elapsed() > client.max_send_latency {
            tracing::warn!(client = %client.id(), "dropping client: send latency exceeded");
            break;
        }

        let (wire_payload, rsv1) = match deflate.as_mut() {
            Some(context) if opcode.is_data() => match context.compress(&payload) {
                Ok(compressed) => (Bytes::from(compressed), true),
                Err(err) => {
                    tracing::error!(client = %client.id(), "outbound compression failed: {err}");
                    break;
                }
            },
            _ => (payload, false),
        };

        let frame = encode_frame(opcode, rsv1, &wire_payload);
        if let Err(err) = writer.write_all(&frame).await {
            tracing::debug!(client = %client.id(), "send failed: {err}");
            break;
        }
        if opcode == Opcode::Close {
            break;
        }
    }

    let _ = writer.shutdown().await;
    client.teardown();
}

async fn receiver_task<R>(client: Arc<WebSocketClient>, mut reader: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    let handler = match client.endpoint.upgrade() {
        Some(endpoint) => Arc::clone(endpoint.handler()),
        None => {
            client.teardown();
            return;
        }
    };
    let mut inflate = client.compressed.then(MessageInflate::new);
    let mut fragments: Option<(Opcode, bool, Vec<u8>)> = None;

    loop {
        if client.is_closing() {
            break;
        }
        let frame = match read_frame(&mut reader).await {
            Ok(frame) => frame,
            Err(WsError::Io(err)) => {
                tracing::debug!(client = %client.id(), "receive ended: {err}");
                break;
            }
            Err(err) => {
                tracing::debug!(client = %client.id(), "closing client: {err}");
                break;
            }
        };

        let Some(opcode) = frame.opcode else {
            tracing::warn!(
                client = %client.id(),
                opcode = frame.raw_opcode,
                "ignoring frame with unknown opcode"
            );
            continue;
        };

        match opcode {
            Opcode::Text | Opcode::Binary | Opcode::Continuation => {
                let (message_opcode, message_compressed, mut buffer) =
                    match (opcode, fragments.take()) {
                        (Opcode::Continuation, Some(pending)) => pending,
                        (Opcode::Continuation, None) => {
                            tracing::debug!(client = %client.id(), "stray continuation frame");
                            break;
                        }
                        (first, _) => (first, frame.rsv1, Vec::new()),
                    };
                buffer.extend_from_slice(&frame.payload);
                if !frame.fin {
                    fragments = Some((message_opcode, message_compressed, buffer));
                    continue;
                }

                let payload = match (message_compressed, inflate.as_mut()) {
                    (true, Some(context)) => match context.decompress(&buffer) {
                        Ok(payload) => payload,
                        Err(err) => {
                            tracing::debug!(client = %client.id(), "inbound inflate failed: {err}");
                            break;
                        }
                    },
                    _ => buffer,
                };

                match message_opcode {
                    Opcode::Text => {
                        handler.on_text_message(&client, &String::from_utf8_lossy(&payload));
                    }
                    _ => handler.on_binary_message(&client, &payload),
                }
            }
            Opcode::Close => {
                handler.on_close(&client, &frame.payload);
                client.reply_close(frame.payload);
                break;
            }
            Opcode::Ping => {
                handler.on_ping(&client, &frame.payload);
                let _ = client.enqueue(Opcode::Pong, Bytes::from(frame.payload));
            }
            Opcode::Pong => handler.on_pong(&client, &frame.payload),
        }
    }

    client.teardown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::WebSocketEndpoint;
    use hestia_session::SessionStore;
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncReadExt;

    #[derive(Default)]
    struct Recorder {
        texts: Mutex<Vec<String>>,
        pings: Mutex<Vec<Vec<u8>>>,
        closed: Mutex<usize>,
    }

    impl WebSocketEndpoint for Recorder {
        fn on_text_message(&self, client: &WebSocketClient, message: &str) {
            self.texts.lock().push(message.to_string());
            client.send_text(&format!("echo:{message}"));
        }

        fn on_ping(&self, _client: &WebSocketClient, payload: &[u8]) {
            self.pings.lock().push(payload.to_vec());
        }

        fn on_closing(&self, _client: &WebSocketClient) {
            *self.closed.lock() += 1;
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::new(
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            Arc::new(SessionStore::new()),
        )
    }

    fn masked(opcode: u8, payload: &[u8]) -> Vec<u8> {
        let key = [0x11, 0x22, 0x33, 0x44];
        let mut out = vec![0x80 | opcode, 0x80 | payload.len() as u8];
        out.extend_from_slice(&key);
        out.extend(payload.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        out
    }

    async fn read_one_frame(stream: &mut tokio::io::DuplexStream) -> (u8, Vec<u8>) {
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await.unwrap();
        let len = (header[1] & 0x7F) as usize;
        assert!(len < 126, "test frames stay short");
        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await.unwrap();
        (header[0] & 0x0F, payload)
    }

    #[tokio::test]
    async fn test_text_message_dispatch_and_echo() {
        use tokio::io::AsyncWriteExt as _;

        let handler = Arc::new(Recorder::default());
        let endpoint = Endpoint::new("chat", handler.clone());
        let (server_side, mut client_side) = tokio::io::duplex(4096);
        attach_client(&endpoint, request(), server_side, false, WsConfig::default());

        client_side.write_all(&masked(0x1, b"hi")).await.unwrap();

        let (opcode, payload) = read_one_frame(&mut client_side).await;
        assert_eq!(opcode, 0x1);
        assert_eq!(payload, b"echo:hi");
        assert_eq!(handler.texts.lock().as_slice(), ["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_ping_answered_with_pong() {
        use tokio::io::AsyncWriteExt as _;

        let handler = Arc::new(Recorder::default());
        let endpoint = Endpoint::new("chat", handler.clone());
        let (server_side, mut client_side) = tokio::io::duplex(4096);
        attach_client(&endpoint, request(), server_side, false, WsConfig::default());

        client_side.write_all(&masked(0x9, b"beat")).await.unwrap();

        let (opcode, payload) = read_one_frame(&mut client_side).await;
        assert_eq!(opcode, 0xA);
        assert_eq!(payload, b"beat");
        assert_eq!(handler.pings.lock().as_slice(), [b"beat".to_vec()]);
    }

    #[tokio::test]
    async fn test_close_is_echoed_and_client_detached() {
        use tokio::io::AsyncWriteExt as _;

        let handler = Arc::new(Recorder::default());
        let endpoint = Endpoint::new("chat", handler.clone());
        let (server_side, mut client_side) = tokio::io::duplex(4096);
        let client = attach_client(&endpoint, request(), server_side, false, WsConfig::default());
        assert_eq!(endpoint.client_count(), 1);

        client_side
            .write_all(&masked(0x8, &[0x03, 0xE8]))
            .await
            .unwrap();

        let (opcode, payload) = read_one_frame(&mut client_side).await;
        assert_eq!(opcode, 0x8);
        assert_eq!(payload, [0x03, 0xE8]);

        // Stream reaches EOF after the close reply.
        let mut rest = Vec::new();
        client_side.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        // Let both tasks run their teardown on this runtime.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(endpoint.client_count(), 0);
        assert_eq!(*handler.closed.lock(), 1);
        assert!(client.is_closing());
        assert!(!client.send_text("late"));
    }

    #[tokio::test]
    async fn test_session_pinned_then_restored() {
        use tokio::io::AsyncWriteExt as _;

        let sessions = Arc::new(SessionStore::new());
        let mut req = HttpRequest::new(IpAddr::V4(Ipv4Addr::LOCALHOST), sessions.clone());
        let sid = sessions.create();
        req.set_session_id(sid.clone());

        let endpoint = Endpoint::new("chat", Arc::new(Recorder::default()));
        let (server_side, mut client_side) = tokio::io::duplex(4096);
        attach_client(&endpoint, req, server_side, false, WsConfig::default());

        // Pinned sessions survive a sweep no matter the clock.
        sessions.sweep();
        assert!(sessions.touch_if_exists(&sid));

        client_side.write_all(&masked(0x8, &[])).await.unwrap();
        let _ = read_one_frame(&mut client_side).await;
        let mut rest = Vec::new();
        client_side.read_to_end(&mut rest).await.unwrap();

        // Give the teardown a moment to run on this runtime.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(endpoint.client_count(), 0);
        assert!(sessions.touch_if_exists(&sid));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_clients_in_order() {
        let endpoint = Endpoint::new("feed", Arc::new(Recorder::default()));
        let (server_side, mut client_side) = tokio::io::duplex(4096);
        attach_client(&endpoint, request(), server_side, false, WsConfig::default());

        endpoint.broadcast_text("one");
        endpoint.broadcast_text("two");
        endpoint.broadcast_text("three");

        for expected in ["one", "two", "three"] {
            let (opcode, payload) = read_one_frame(&mut client_side).await;
            assert_eq!(opcode, 0x1);
            assert_eq!(payload, expected.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_compressed_round_trip() {
        use tokio::io::AsyncWriteExt as _;

        let handler = Arc::new(Recorder::default());
        let endpoint = Endpoint::new("chat", handler.clone());
        let (server_side, mut client_side) = tokio::io::duplex(4096);
        attach_client(&endpoint, request(), server_side, true, WsConfig::default());

        // "Hello" deflated, RFC 7692 sample; RSV1 marks compression.
        let deflated = [0xf2, 0x48, 0xcd, 0xc9, 0xc9, 0x07, 0x00];
        let key = [1u8, 2, 3, 4];
        let mut frame = vec![0x80 | 0x40 | 0x1, 0x80 | deflated.len() as u8];
        frame.extend_from_slice(&key);
        frame.extend(deflated.iter().enumerate().map(|(i, b)| b ^ key[i % 4]));
        client_side.write_all(&frame).await.unwrap();

        // The echo comes back compressed with RSV1 set.
        let mut header = [0u8; 2];
        client_side.read_exact(&mut header).await.unwrap();
        assert_eq!(header[0] & 0x40, 0x40);
        let len = (header[1] & 0x7F) as usize;
        let mut payload = vec![0u8; len];
        client_side.read_exact(&mut payload).await.unwrap();

        let mut inflate = MessageInflate::new();
        assert_eq!(inflate.decompress(&payload).unwrap(), b"echo:Hello");
        assert_eq!(handler.texts.lock().as_slice(), ["Hello".to_string()]);
    }
}
