//! Server configuration.
//!
//! All data-bearing settings live in [`ServerConfig`], constructed through
//! its builder. Callback-based settings (Bearer verification, websocket
//! endpoints, repositories) are registered on the server itself since they
//! cannot be serialised.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use hestia_core::HestiaError;
use serde::{Deserialize, Serialize};

/// Default listening port.
pub const DEFAULT_PORT: u16 = 8080;

/// Default bound on concurrently served connections.
pub const DEFAULT_POOL_SIZE: usize = 64;

/// Default socket send/receive timeout in seconds.
pub const DEFAULT_SOCKET_TIMEOUT_SECS: u64 = 3;

/// An address prefix in CIDR form, used for the host allow-list.
///
/// # Example
///
/// ```
/// use hestia_server::IpNetwork;
///
/// let net: IpNetwork = "10.0.0.0/8".parse().unwrap();
/// assert!(net.contains("10.1.2.3".parse().unwrap()));
/// assert!(!net.contains("11.0.0.1".parse().unwrap()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpNetwork {
    addr: IpAddr,
    prefix: u8,
}

impl IpNetwork {
    /// Whether `ip` falls inside this prefix. Families never match each
    /// other.
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(host)) => {
                let mask = prefix_mask_v4(self.prefix);
                u32::from(net) & mask == u32::from(host) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(host)) => {
                let mask = prefix_mask_v6(self.prefix);
                u128::from(net) & mask == u128::from(host) & mask
            }
            _ => false,
        }
    }
}

fn prefix_mask_v4(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p if p >= 32 => u32::MAX,
        p => u32::MAX << (32 - p),
    }
}

fn prefix_mask_v6(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        p if p >= 128 => u128::MAX,
        p => u128::MAX << (128 - p),
    }
}

impl FromStr for IpNetwork {
    type Err = HestiaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = match s.split_once('/') {
            Some((addr, prefix)) => {
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| HestiaError::Parse(format!("bad network prefix: {s:?}")))?;
                (addr, prefix)
            }
            None => (s, u8::MAX),
        };
        let addr: IpAddr = addr
            .parse()
            .map_err(|_| HestiaError::Parse(format!("bad network address: {s:?}")))?;
        let max = if addr.is_ipv4() { 32 } else { 128 };
        let prefix = if prefix == u8::MAX { max } else { prefix };
        if prefix > max {
            return Err(HestiaError::Parse(format!("network prefix too long: {s:?}")));
        }
        Ok(Self { addr, prefix })
    }
}

/// TLS settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSettings {
    /// PEM file with the certificate chain.
    pub cert_path: PathBuf,
    /// PEM file with the private key.
    pub key_path: PathBuf,
    /// Password for an encrypted private key.
    pub key_password: Option<String>,
    /// Mutual-TLS settings; absent for plain server-side TLS.
    pub client_auth: Option<ClientAuthSettings>,
}

/// Mutual-TLS (client certificate) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientAuthSettings {
    /// PEM bundle of CA certificates that client certificates must chain
    /// to.
    pub ca_path: PathBuf,
    /// Subject DNs granted access. A verified peer whose DN is not listed
    /// is answered with `403 Forbidden`.
    pub allowed_dns: Vec<String>,
}

/// Server configuration.
///
/// Use [`ServerConfig::builder()`] to construct instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    port: u16,
    pool_size: usize,
    socket_timeout: Duration,
    server_name: String,
    disable_ipv4: bool,
    disable_ipv6: bool,
    device: Option<String>,
    allowed_networks: Vec<IpNetwork>,
    tls: Option<TlsSettings>,
    multipart_temp_dir: PathBuf,
    multipart_max_collected: usize,
    basic_auth_users: Vec<String>,
    session_lifetime: Duration,
}

impl ServerConfig {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// The listening port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bound on concurrently served connections.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Per-operation socket timeout.
    #[must_use]
    pub fn socket_timeout(&self) -> Duration {
        self.socket_timeout
    }

    /// Value of the `Server:` response header.
    #[must_use]
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Whether the IPv4 listener is disabled.
    #[must_use]
    pub fn ipv4_disabled(&self) -> bool {
        self.disable_ipv4
    }

    /// Whether the IPv6 listener is disabled.
    #[must_use]
    pub fn ipv6_disabled(&self) -> bool {
        self.disable_ipv6
    }

    /// Network device the listeners bind to, when set (Linux only).
    #[must_use]
    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// The host allow-list. Empty means every peer is accepted.
    #[must_use]
    pub fn allowed_networks(&self) -> &[IpNetwork] {
        &self.allowed_networks
    }

    /// Whether a peer address passes the allow-list.
    #[must_use]
    pub fn allows_peer(&self, ip: IpAddr) -> bool {
        self.allowed_networks.is_empty()
            || self.allowed_networks.iter().any(|net| net.contains(ip))
    }

    /// TLS settings, when TLS is enabled.
    #[must_use]
    pub fn tls(&self) -> Option<&TlsSettings> {
        self.tls.as_ref()
    }

    /// Directory multipart file parts spool into.
    #[must_use]
    pub fn multipart_temp_dir(&self) -> &Path {
        &self.multipart_temp_dir
    }

    /// Ceiling on buffered multipart bytes.
    #[must_use]
    pub fn multipart_max_collected(&self) -> usize {
        self.multipart_max_collected
    }

    /// Configured `user:password` lines for HTTP Basic authentication.
    #[must_use]
    pub fn basic_auth_users(&self) -> &[String] {
        &self.basic_auth_users
    }

    /// Sliding-window session lifetime.
    #[must_use]
    pub fn session_lifetime(&self) -> Duration {
        self.session_lifetime
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfigBuilder::default().build()
    }
}

/// Builder for [`ServerConfig`].
///
/// # Example
///
/// ```
/// use hestia_server::ServerConfig;
/// use std::time::Duration;
///
/// let config = ServerConfig::builder()
///     .port(9090)
///     .pool_size(16)
///     .socket_timeout(Duration::from_secs(5))
///     .build();
/// assert_eq!(config.port(), 9090);
/// ```
#[derive(Debug, Default)]
pub struct ServerConfigBuilder {
    port: Option<u16>,
    pool_size: Option<usize>,
    socket_timeout: Option<Duration>,
    server_name: Option<String>,
    disable_ipv4: bool,
    disable_ipv6: bool,
    device: Option<String>,
    allowed_networks: Vec<IpNetwork>,
    tls: Option<TlsSettings>,
    multipart_temp_dir: Option<PathBuf>,
    multipart_max_collected: Option<usize>,
    basic_auth_users: Vec<String>,
    session_lifetime: Option<Duration>,
}

impl ServerConfigBuilder {
    /// Sets the listening port.
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the bound on concurrently served connections.
    #[must_use]
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size.max(1));
        self
    }

    /// Sets the per-operation socket timeout.
    #[must_use]
    pub fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = Some(timeout);
        self
    }

    /// Sets the `Server:` header value.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Disables the IPv4 listener.
    #[must_use]
    pub fn disable_ipv4(mut self) -> Self {
        self.disable_ipv4 = true;
        self
    }

    /// Disables the IPv6 listener.
    #[must_use]
    pub fn disable_ipv6(mut self) -> Self {
        self.disable_ipv6 = true;
        self
    }

    /// Binds the listeners to a named device (Linux only).
    #[must_use]
    pub fn device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Adds a network to the host allow-list.
    #[must_use]
    pub fn allow_network(mut self, network: IpNetwork) -> Self {
        self.allowed_networks.push(network);
        self
    }

    /// Enables TLS.
    #[must_use]
    pub fn tls(mut self, settings: TlsSettings) -> Self {
        self.tls = Some(settings);
        self
    }

    /// Sets the multipart spool directory.
    #[must_use]
    pub fn multipart_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.multipart_temp_dir = Some(dir.into());
        self
    }

    /// Sets the ceiling on buffered multipart bytes.
    #[must_use]
    pub fn multipart_max_collected(mut self, max: usize) -> Self {
        self.multipart_max_collected = Some(max);
        self
    }

    /// Adds one `user:password` line for HTTP Basic authentication.
    /// Configuring any line makes Basic authentication mandatory.
    #[must_use]
    pub fn basic_auth_user(mut self, line: impl Into<String>) -> Self {
        self.basic_auth_users.push(line.into());
        self
    }

    /// Sets the sliding-window session lifetime.
    #[must_use]
    pub fn session_lifetime(mut self, lifetime: Duration) -> Self {
        self.session_lifetime = Some(lifetime);
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            port: self.port.unwrap_or(DEFAULT_PORT),
            pool_size: self.pool_size.unwrap_or(DEFAULT_POOL_SIZE),
            socket_timeout: self
                .socket_timeout
                .unwrap_or(Duration::from_secs(DEFAULT_SOCKET_TIMEOUT_SECS)),
            server_name: self
                .server_name
                .unwrap_or_else(|| format!("Hestia/{}", env!("CARGO_PKG_VERSION"))),
            disable_ipv4: self.disable_ipv4,
            disable_ipv6: self.disable_ipv6,
            device: self.device,
            allowed_networks: self.allowed_networks,
            tls: self.tls,
            multipart_temp_dir: self
                .multipart_temp_dir
                .unwrap_or_else(std::env::temp_dir),
            multipart_max_collected: self
                .multipart_max_collected
                .unwrap_or(hestia_multipart::DEFAULT_MAX_COLLECTED_BYTES),
            basic_auth_users: self.basic_auth_users,
            session_lifetime: self
                .session_lifetime
                .unwrap_or(hestia_session::DEFAULT_SESSION_LIFETIME),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port(), 8080);
        assert_eq!(config.pool_size(), 64);
        assert_eq!(config.socket_timeout(), Duration::from_secs(3));
        assert!(config.server_name().starts_with("Hestia/"));
        assert!(!config.ipv4_disabled());
        assert!(!config.ipv6_disabled());
        assert!(config.allows_peer("203.0.113.7".parse().unwrap()));
    }

    #[test]
    fn test_ipv4_network_membership() {
        let net: IpNetwork = "192.168.1.0/24".parse().unwrap();
        assert!(net.contains("192.168.1.200".parse().unwrap()));
        assert!(!net.contains("192.168.2.1".parse().unwrap()));
        assert!(!net.contains("::1".parse().unwrap()));
    }

    #[test]
    fn test_ipv6_network_membership() {
        let net: IpNetwork = "2001:db8::/32".parse().unwrap();
        assert!(net.contains("2001:db8::42".parse().unwrap()));
        assert!(!net.contains("2001:db9::1".parse().unwrap()));
    }

    #[test]
    fn test_bare_address_is_a_host_network() {
        let net: IpNetwork = "127.0.0.1".parse().unwrap();
        assert!(net.contains("127.0.0.1".parse().unwrap()));
        assert!(!net.contains("127.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_bad_networks_rejected() {
        assert!("not-an-address/8".parse::<IpNetwork>().is_err());
        assert!("10.0.0.0/33".parse::<IpNetwork>().is_err());
        assert!("10.0.0.0/x".parse::<IpNetwork>().is_err());
    }

    #[test]
    fn test_allow_list_filters_peers() {
        let config = ServerConfig::builder()
            .allow_network("10.0.0.0/8".parse().unwrap())
            .build();
        assert!(config.allows_peer("10.20.30.40".parse().unwrap()));
        assert!(!config.allows_peer("192.168.0.1".parse().unwrap()));
    }
}
