//! Server assembly and the accept loops.
//!
//! The server binds IPv4 and IPv6 listeners (each disablable, the IPv6
//! socket set v6-only so the two never overlap), then fans accepted
//! connections out to tasks bounded by a semaphore sized to the
//! configured pool. Each connection task optionally performs the TLS
//! handshake before handing the stream to the keep-alive worker.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use hestia_core::{HestiaError, Repository};
use hestia_session::SessionStore;
use hestia_ws::{Endpoint, WebSocketEndpoint, WsConfig};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;

use crate::auth::{BasicAuth, BearerAuth};
use crate::config::{ServerConfig, ServerConfigBuilder};
use crate::connection::serve_connection;
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::stream::ClientStream;

/// How long shutdown waits for in-flight connections to finish.
const SHUTDOWN_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// State shared by every connection task.
pub(crate) struct ServerShared {
    pub(crate) config: ServerConfig,
    pub(crate) repositories: Vec<Arc<dyn Repository>>,
    pub(crate) endpoints: HashMap<String, Arc<Endpoint>>,
    pub(crate) sessions: Arc<SessionStore>,
    pub(crate) basic_auth: Option<BasicAuth>,
    pub(crate) bearer_auth: Option<BearerAuth>,
    pub(crate) ws_config: WsConfig,
}

/// The embeddable web server.
///
/// Register repositories and websocket endpoints, then [`run`](Server::run)
/// it. Repositories are consulted in registration order.
pub struct Server {
    config: ServerConfig,
    repositories: Vec<Arc<dyn Repository>>,
    endpoints: HashMap<String, Arc<Endpoint>>,
    sessions: Arc<SessionStore>,
    bearer_auth: Option<BearerAuth>,
    ws_config: WsConfig,
}

impl Server {
    /// Creates a server from a configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let sessions = Arc::new(SessionStore::with_lifetime(config.session_lifetime()));
        Self {
            config,
            repositories: Vec::new(),
            endpoints: HashMap::new(),
            sessions,
            bearer_auth: None,
            ws_config: WsConfig::default(),
        }
    }

    /// Creates a server builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The session store backing this server.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Appends a repository to the dispatch chain.
    pub fn add_repository(&mut self, repository: Arc<dyn Repository>) {
        self.repositories.push(repository);
    }

    /// Registers a websocket endpoint under a URL path.
    pub fn add_websocket_endpoint(
        &mut self,
        path: &str,
        handler: Arc<dyn WebSocketEndpoint>,
    ) {
        self.add_endpoint(Endpoint::new(path.trim_start_matches('/'), handler));
    }

    /// Registers a pre-built endpoint (for example one created with
    /// [`Endpoint::without_compression`]).
    pub fn add_endpoint(&mut self, endpoint: Arc<Endpoint>) {
        self.endpoints
            .insert(endpoint.path().trim_start_matches('/').to_string(), endpoint);
    }

    /// Enables Bearer-token authentication.
    pub fn set_bearer_auth(&mut self, bearer: BearerAuth) {
        self.bearer_auth = Some(bearer);
    }

    /// Overrides websocket client tuning.
    pub fn set_websocket_config(&mut self, ws_config: WsConfig) {
        self.ws_config = ws_config;
    }

    /// Runs until interrupted.
    ///
    /// # Errors
    ///
    /// Returns an error when the listeners cannot be bound or the TLS
    /// material cannot be loaded.
    pub async fn run(self) -> Result<(), HestiaError> {
        self.run_with_shutdown(ShutdownSignal::with_os_signals())
            .await
    }

    /// Runs until `shutdown` is triggered.
    ///
    /// # Errors
    ///
    /// See [`run`](Server::run).
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), HestiaError> {
        let running = self.start(shutdown).await?;
        running.wait().await;
        Ok(())
    }

    /// Binds the listeners and starts accepting, returning a handle that
    /// exposes the bound addresses. Useful for tests and embedders that
    /// need the actual port when binding port `0`.
    ///
    /// # Errors
    ///
    /// See [`run`](Server::run).
    pub async fn start(self, shutdown: ShutdownSignal) -> Result<RunningServer, HestiaError> {
        let basic_auth = (!self.config.basic_auth_users().is_empty())
            .then(|| BasicAuth::new(self.config.basic_auth_users().to_vec()));
        let tls = match self.config.tls() {
            Some(settings) => Some(crate::tls::build_acceptor(settings)?),
            None => None,
        };

        let port = self.config.port();
        let device = self.config.device();
        let mut listeners = Vec::new();
        if !self.config.ipv4_disabled() {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
            listeners.push(bind_listener(addr, device)?);
        }
        if !self.config.ipv6_disabled() {
            let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
            listeners.push(bind_listener(addr, device)?);
        }
        if listeners.is_empty() {
            return Err(HestiaError::Internal(
                "both the IPv4 and IPv6 listeners are disabled".to_string(),
            ));
        }

        let addrs: Vec<SocketAddr> = listeners
            .iter()
            .filter_map(|listener| listener.local_addr().ok())
            .collect();

        let shared = Arc::new(ServerShared {
            config: self.config,
            repositories: self.repositories,
            endpoints: self.endpoints,
            sessions: self.sessions,
            basic_auth,
            bearer_auth: self.bearer_auth,
            ws_config: self.ws_config,
        });
        let tracker = ConnectionTracker::new();
        let pool = Arc::new(Semaphore::new(shared.config.pool_size()));

        let accept_tasks: Vec<JoinHandle<()>> = listeners
            .into_iter()
            .map(|listener| {
                tokio::spawn(accept_loop(
                    Arc::clone(&shared),
                    listener,
                    tls.clone(),
                    Arc::clone(&pool),
                    tracker.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();

        tracing::info!(?addrs, "server listening");

        Ok(RunningServer {
            addrs,
            shared,
            tracker,
            shutdown,
            accept_tasks,
        })
    }
}

/// A started server.
pub struct RunningServer {
    addrs: Vec<SocketAddr>,
    shared: Arc<ServerShared>,
    tracker: ConnectionTracker,
    shutdown: ShutdownSignal,
    accept_tasks: Vec<JoinHandle<()>>,
}

impl RunningServer {
    /// The bound listener addresses.
    #[must_use]
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// The first bound address.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.addrs.first().copied()
    }

    /// A handle to the shutdown signal.
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// The session store backing the running server.
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.shared.sessions
    }

    /// Waits for shutdown, then drains: the accept loops stop, every
    /// websocket endpoint is asked to close its clients, and in-flight
    /// connections get a bounded grace period.
    pub async fn wait(self) {
        self.shutdown.recv().await;

        for task in self.accept_tasks {
            let _ = task.await;
        }
        for endpoint in self.shared.endpoints.values() {
            endpoint.close_clients();
        }

        tokio::select! {
            () = self.tracker.wait_for_drain() => {
                tracing::info!("all connections closed");
            }
            () = tokio::time::sleep(SHUTDOWN_DRAIN_TIMEOUT) => {
                tracing::warn!(
                    active = self.tracker.active_connections(),
                    "shutdown drain timed out"
                );
            }
        }
        tracing::info!("server stopped");
    }
}

/// Binds one listener with `SO_REUSEADDR`, v6-only for IPv6 addresses,
/// and the optional device binding.
fn bind_listener(addr: SocketAddr, device: Option<&str>) -> Result<TcpListener, HestiaError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    if let Some(device) = device {
        bind_device(&socket, device)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;
    Ok(TcpListener::from_std(socket.into())?)
}

#[cfg(target_os = "linux")]
fn bind_device(socket: &Socket, device: &str) -> Result<(), HestiaError> {
    socket.bind_device(Some(device.as_bytes()))?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn bind_device(_socket: &Socket, device: &str) -> Result<(), HestiaError> {
    tracing::warn!(device, "device binding is only supported on Linux; ignoring");
    Ok(())
}

async fn accept_loop(
    shared: Arc<ServerShared>,
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    pool: Arc<Semaphore>,
    tracker: ConnectionTracker,
    shutdown: ShutdownSignal,
) {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        if !shared.config.allows_peer(peer.ip()) {
                            tracing::warn!(peer = %peer, "peer rejected by host allow-list");
                            continue;
                        }
                        if let Err(err) = stream.set_nodelay(true) {
                            tracing::debug!(peer = %peer, "could not set TCP_NODELAY: {err}");
                        }

                        let shared = Arc::clone(&shared);
                        let tls = tls.clone();
                        let pool = Arc::clone(&pool);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            // Accepted connections queue here until a
                            // pool slot frees up.
                            let Ok(_permit) = pool.acquire_owned().await else {
                                return;
                            };
                            if shutdown.is_shutdown() {
                                return;
                            }

                            let stream = match tls {
                                Some(acceptor) => {
                                    let handshake = tokio::time::timeout(
                                        shared.config.socket_timeout(),
                                        acceptor.accept(stream),
                                    )
                                    .await;
                                    match handshake {
                                        Ok(Ok(tls_stream)) => {
                                            ClientStream::Tls(Box::new(tls_stream))
                                        }
                                        Ok(Err(err)) => {
                                            tracing::debug!(peer = %peer, "tls handshake failed: {err}");
                                            return;
                                        }
                                        Err(_) => {
                                            tracing::debug!(peer = %peer, "tls handshake timed out");
                                            return;
                                        }
                                    }
                                }
                                None => ClientStream::Plain(stream),
                            };

                            serve_connection(shared, stream, peer.ip()).await;
                            drop(token);
                        });
                    }
                    Err(err) => {
                        tracing::error!("accept failed: {err}");
                    }
                }
            }
            () = shutdown.recv() => break,
        }
    }
    // The listener drops here, closing the listening socket.
}

/// Builder for a fully wired [`Server`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use hestia_core::MemoryRepository;
/// use hestia_server::Server;
///
/// let files = Arc::new(MemoryRepository::new());
/// files.add_file("index.html", b"hello".to_vec());
///
/// let server = Server::builder()
///     .port(8080)
///     .repository(files)
///     .build();
/// ```
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfigBuilder,
    repositories: Vec<Arc<dyn Repository>>,
    endpoints: Vec<Arc<Endpoint>>,
    bearer_auth: Option<BearerAuth>,
    ws_config: Option<WsConfig>,
}

impl ServerBuilder {
    /// Creates a builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the listening port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config = self.config.port(port);
        self
    }

    /// Sets the bound on concurrently served connections.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.config = self.config.pool_size(size);
        self
    }

    /// Sets the per-operation socket timeout.
    #[must_use]
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.config = self.config.socket_timeout(timeout);
        self
    }

    /// Sets the `Server:` header value.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.config = self.config.server_name(name);
        self
    }

    /// Disables the IPv4 listener.
    #[must_use]
    pub fn disable_ipv4(mut self) -> Self {
        self.config = self.config.disable_ipv4();
        self
    }

    /// Disables the IPv6 listener.
    #[must_use]
    pub fn disable_ipv6(mut self) -> Self {
        self.config = self.config.disable_ipv6();
        self
    }

    /// Binds the listeners to a named device (Linux only).
    #[must_use]
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.config = self.config.device(device);
        self
    }

    /// Adds a network to the host allow-list.
    #[must_use]
    pub fn allow_network(mut self, network: crate::config::IpNetwork) -> Self {
        self.config = self.config.allow_network(network);
        self
    }

    /// Enables TLS.
    #[must_use]
    pub fn tls(mut self, settings: crate::config::TlsSettings) -> Self {
        self.config = self.config.tls(settings);
        self
    }

    /// Sets the multipart spool directory.
    #[must_use]
    pub fn multipart_temp_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.config = self.config.multipart_temp_dir(dir);
        self
    }

    /// Sets the ceiling on buffered multipart bytes.
    #[must_use]
    pub fn multipart_max_collected(mut self, max: usize) -> Self {
        self.config = self.config.multipart_max_collected(max);
        self
    }

    /// Adds one `user:password` line for HTTP Basic authentication.
    #[must_use]
    pub fn basic_auth_user(mut self, line: impl Into<String>) -> Self {
        self.config = self.config.basic_auth_user(line);
        self
    }

    /// Sets the sliding-window session lifetime.
    #[must_use]
    pub fn session_lifetime(mut self, lifetime: Duration) -> Self {
        self.config = self.config.session_lifetime(lifetime);
        self
    }

    /// Appends a repository to the dispatch chain.
    #[must_use]
    pub fn repository(mut self, repository: Arc<dyn Repository>) -> Self {
        self.repositories.push(repository);
        self
    }

    /// Registers a websocket endpoint under a URL path.
    #[must_use]
    pub fn websocket_endpoint(
        mut self,
        path: &str,
        handler: Arc<dyn WebSocketEndpoint>,
    ) -> Self {
        self.endpoints
            .push(Endpoint::new(path.trim_start_matches('/'), handler));
        self
    }

    /// Registers a pre-built endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: Arc<Endpoint>) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Enables Bearer-token authentication.
    #[must_use]
    pub fn bearer_auth(mut self, bearer: BearerAuth) -> Self {
        self.bearer_auth = Some(bearer);
        self
    }

    /// Overrides websocket client tuning.
    #[must_use]
    pub fn websocket_config(mut self, ws_config: WsConfig) -> Self {
        self.ws_config = Some(ws_config);
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        let mut server = Server::new(self.config.build());
        for repository in self.repositories {
            server.add_repository(repository);
        }
        for endpoint in self.endpoints {
            server.add_endpoint(endpoint);
        }
        if let Some(bearer) = self.bearer_auth {
            server.set_bearer_auth(bearer);
        }
        if let Some(ws_config) = self.ws_config {
            server.set_websocket_config(ws_config);
        }
        server
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_start_binds_ephemeral_port() {
        let server = Server::builder().port(0).disable_ipv6().build();
        let shutdown = ShutdownSignal::new();
        let running = server.start(shutdown.clone()).await.unwrap();

        let addr = running.local_addr().unwrap();
        assert_ne!(addr.port(), 0);

        shutdown.trigger();
        running.wait().await;
    }

    #[tokio::test]
    async fn test_run_with_immediate_shutdown() {
        let server = Server::builder().port(0).disable_ipv6().build();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            server.run_with_shutdown(shutdown),
        )
        .await;
        assert!(result.is_ok());
        assert!(result.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_both_listeners_disabled_is_an_error() {
        let server = Server::builder().disable_ipv4().disable_ipv6().build();
        let result = server.start(ShutdownSignal::new()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_wires_configuration() {
        let server = Server::builder()
            .port(9191)
            .pool_size(4)
            .server_name("UnitTest/1.0")
            .session_lifetime(Duration::from_secs(60))
            .build();
        assert_eq!(server.config().port(), 9191);
        assert_eq!(server.config().pool_size(), 4);
        assert_eq!(server.config().server_name(), "UnitTest/1.0");
        assert_eq!(server.sessions().lifetime(), Duration::from_secs(60));
    }
}
