use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::config::ConnectionSettings;
use crate::dns::resolve_endpoint;
use crate::socket::key::{ConnectionKey, ConnectionKind};
use crate::socket::stream::BoxedSocket;
use crate::socket::tls::TlsConfig;
use std::io;
use tokio::net::TcpStream;

/// Opens the socket for one pool connection: resolve → TCP → TLS.
pub struct ConnectJob<'a> {
    key: &'a ConnectionKey,
    settings: &'a ConnectionSettings,
}

impl<'a> ConnectJob<'a> {
    pub fn new(key: &'a ConnectionKey, settings: &'a ConnectionSettings) -> Self {
        Self { key, settings }
    }

    pub async fn connect(self) -> Result<BoxedSocket, NetError> {
        match self.settings.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.dial())
                .await
                .map_err(|_| NetError::ConnectionTimedOut)?,
            None => self.dial().await,
        }
    }

    async fn dial(&self) -> Result<BoxedSocket, NetError> {
        if self.key.kind.is_tunnel() {
            tracing::debug!(key = %self.key, "CONNECT tunnels are not supported");
            return Err(NetError::TunnelConnectionFailed);
        }

        let (host, port) = self.key.dial_target().ok_or(NetError::InvalidUrl)?;
        let tcp = self.open_tcp(host, port).await?;

        match self.key.kind {
            ConnectionKind::Https => self.handshake(tcp).await,
            _ => Ok(BoxedSocket::new(tcp)),
        }
    }

    async fn open_tcp(&self, host: &str, port: u16) -> Result<TcpStream, NetError> {
        let addrs = resolve_endpoint(self.settings.resolver.as_ref(), host, port).await?;

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::trace!(error = %e, "TCP_NODELAY not applied");
                    }
                    tracing::debug!(%addr, key = %self.key, "connected");
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::trace!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }

        let err = last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no addresses to try"));
        Err(err).connection_context(host, port)
    }

    async fn handshake(&self, tcp: TcpStream) -> Result<BoxedSocket, NetError> {
        let target = self.settings.tls_target.as_ref();
        let server_name = target.server_name(self.key);

        let connector = self.settings.tls_config.build_connector()?;
        let mut config = connector.configure().map_err(|_| NetError::SslProtocolError)?;
        if !TlsConfig::should_set_sni(server_name) {
            config.set_use_server_name_indication(false);
            config.set_verify_hostname(false);
        }
        target.configure(self.key, &mut config)?;

        let tls = tokio_boring::connect(config, server_name, tcp).await.map_err(|e| {
            tracing::debug!(host = server_name, error = %e, "TLS handshake failed");
            NetError::SslHandshakeFailed { host: server_name.to_string(), reason: e.to_string() }
        })?;

        tracing::debug!(host = server_name, "TLS established");
        Ok(BoxedSocket::new(tls))
    }
}
