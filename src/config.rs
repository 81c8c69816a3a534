//! Connection-level settings shared by every pool of a client.

use crate::dns::{GaiResolver, Resolve};
use crate::http::decompression::DecompressionMethods;
use crate::socket::proxy::ProxyResolve;
use crate::socket::tls::{DefaultTlsTarget, TlsConfig, TlsTarget};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default values.
pub mod defaults {
    use std::time::Duration;

    pub const MAX_CONNECTIONS_PER_SERVER: usize = usize::MAX;
    /// In KiB.
    pub const MAX_RESPONSE_HEADERS_LENGTH: usize = 64;
    pub const POOLED_CONNECTION_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
    pub const POOLED_CONNECTION_LIFETIME: Option<Duration> = None;
    pub const CONNECT_TIMEOUT: Option<Duration> = None;
    pub const INITIAL_READ_BUFFER_SIZE: usize = 4096;
    pub const INITIAL_WRITE_BUFFER_SIZE: usize = 4096;
    pub const USE_PROXY: bool = true;
    pub const READ_AHEAD: bool = true;

    pub const REQUEST_TIMEOUT: Option<Duration> = Some(Duration::from_secs(100));
    pub const MAX_RESPONSE_CONTENT_BUFFER_SIZE: usize = usize::MAX;

    /// Ceiling for one chunk-size or chunk-terminator line.
    pub const MAX_CHUNK_LINE_BYTES: usize = 16 * 1024;
    /// Ceiling for one trailer line.
    pub const MAX_TRAILER_LINE_BYTES: usize = 16 * 1024;
}

#[derive(Clone)]
pub struct ConnectionSettings {
    pub max_connections_per_server: usize,
    pub pooled_connection_idle_timeout: Duration,
    /// Connections older than this are not reused. `None` keeps them forever.
    pub pooled_connection_lifetime: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    /// In KiB.
    pub max_response_headers_length: usize,
    pub initial_read_buffer_size: usize,
    pub initial_write_buffer_size: usize,
    pub automatic_decompression: DecompressionMethods,
    pub use_proxy: bool,
    pub proxy: Option<Arc<dyn ProxyResolve>>,
    pub resolver: Arc<dyn Resolve>,
    pub tls_target: Arc<dyn TlsTarget>,
    pub tls_config: TlsConfig,
    /// Probe reused connections with a non-blocking read before sending.
    pub read_ahead: bool,
}

impl ConnectionSettings {
    pub fn max_response_headers_bytes(&self) -> usize {
        self.max_response_headers_length.saturating_mul(1024)
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            max_connections_per_server: defaults::MAX_CONNECTIONS_PER_SERVER,
            pooled_connection_idle_timeout: defaults::POOLED_CONNECTION_IDLE_TIMEOUT,
            pooled_connection_lifetime: defaults::POOLED_CONNECTION_LIFETIME,
            connect_timeout: defaults::CONNECT_TIMEOUT,
            max_response_headers_length: defaults::MAX_RESPONSE_HEADERS_LENGTH,
            initial_read_buffer_size: defaults::INITIAL_READ_BUFFER_SIZE,
            initial_write_buffer_size: defaults::INITIAL_WRITE_BUFFER_SIZE,
            automatic_decompression: DecompressionMethods::NONE,
            use_proxy: defaults::USE_PROXY,
            proxy: None,
            resolver: Arc::new(GaiResolver::new()),
            tls_target: Arc::new(DefaultTlsTarget),
            tls_config: TlsConfig::default(),
            read_ahead: defaults::READ_AHEAD,
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("max_connections_per_server", &self.max_connections_per_server)
            .field("pooled_connection_idle_timeout", &self.pooled_connection_idle_timeout)
            .field("pooled_connection_lifetime", &self.pooled_connection_lifetime)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_response_headers_length", &self.max_response_headers_length)
            .field("automatic_decompression", &self.automatic_decompression)
            .field("use_proxy", &self.use_proxy)
            .field("has_proxy", &self.proxy.is_some())
            .field("read_ahead", &self.read_ahead)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_table() {
        let settings = ConnectionSettings::default();
        assert_eq!(settings.max_connections_per_server, usize::MAX);
        assert_eq!(settings.pooled_connection_idle_timeout, Duration::from_secs(120));
        assert_eq!(settings.max_response_headers_bytes(), 64 * 1024);
        assert!(settings.connect_timeout.is_none());
        assert!(settings.use_proxy);
        assert!(settings.proxy.is_none());
        assert_eq!(settings.automatic_decompression, DecompressionMethods::NONE);
    }
}
