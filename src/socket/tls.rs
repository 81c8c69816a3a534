//! TLS client configuration (BoringSSL).
//!
//! [`TlsConfig`] shapes the connector shared by every secure dial; the
//! [`TlsTarget`] strategy decides per connection which server name to
//! present and how certificates are validated.

use crate::base::neterror::NetError;
use crate::socket::key::ConnectionKey;
use boring::ssl::{
    ConnectConfiguration, SslConnector, SslConnectorBuilder, SslMethod, SslVerifyMode, SslVersion,
};
use std::fmt;
use std::net::IpAddr;

#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub min_version: Option<SslVersion>,
    pub max_version: Option<SslVersion>,
    pub cipher_list: Option<String>,
    pub curves: Vec<String>,
    /// Only `http/1.1` makes sense here; the wire engine speaks nothing else.
    pub alpn_protos: Vec<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            min_version: Some(SslVersion::TLS1_2),
            max_version: Some(SslVersion::TLS1_3),
            cipher_list: None,
            curves: vec!["X25519".to_string(), "P-256".to_string(), "P-384".to_string()],
            alpn_protos: vec!["http/1.1".to_string()],
        }
    }
}

impl TlsConfig {
    pub fn apply_to_builder(&self, builder: &mut SslConnectorBuilder) -> Result<(), NetError> {
        builder.set_min_proto_version(self.min_version).map_err(|_| NetError::SslProtocolError)?;
        builder.set_max_proto_version(self.max_version).map_err(|_| NetError::SslProtocolError)?;

        if let Some(ciphers) = &self.cipher_list {
            builder.set_cipher_list(ciphers).map_err(|_| NetError::SslProtocolError)?;
        }
        if !self.curves.is_empty() {
            builder
                .set_curves_list(&self.curves.join(":"))
                .map_err(|_| NetError::SslProtocolError)?;
        }
        if !self.alpn_protos.is_empty() {
            builder
                .set_alpn_protos(&self.alpn_wire()?)
                .map_err(|_| NetError::SslProtocolError)?;
        }

        builder.set_verify(SslVerifyMode::PEER);
        Ok(())
    }

    pub fn build_connector(&self) -> Result<SslConnector, NetError> {
        let mut builder =
            SslConnector::builder(SslMethod::tls()).map_err(|_| NetError::SslProtocolError)?;
        self.apply_to_builder(&mut builder)?;
        Ok(builder.build())
    }

    fn alpn_wire(&self) -> Result<Vec<u8>, NetError> {
        let mut wire = Vec::new();
        for proto in &self.alpn_protos {
            let len = u8::try_from(proto.len()).map_err(|_| NetError::SslProtocolError)?;
            wire.push(len);
            wire.extend_from_slice(proto.as_bytes());
        }
        Ok(wire)
    }

    /// SNI must not be sent for IP literals (RFC 6066).
    pub fn should_set_sni(host: &str) -> bool {
        host.trim_start_matches('[').trim_end_matches(']').parse::<IpAddr>().is_err()
    }
}

/// Per-connection TLS policy.
pub trait TlsTarget: Send + Sync {
    /// Name presented in SNI and checked against the certificate.
    fn server_name<'k>(&self, key: &'k ConnectionKey) -> &'k str {
        key.sni_host.as_deref().unwrap_or(&key.host)
    }

    /// Adjusts the handshake configuration before it starts.
    fn configure(&self, _key: &ConnectionKey, _config: &mut ConnectConfiguration) -> Result<(), NetError> {
        Ok(())
    }
}

/// Validates the peer chain and host name against the system roots.
#[derive(Debug, Clone, Default)]
pub struct DefaultTlsTarget;

impl TlsTarget for DefaultTlsTarget {}

/// Skips certificate and host-name validation.
///
/// Meant for local test servers with self-signed certificates.
#[derive(Debug, Clone, Default)]
pub struct DangerAcceptInvalidCerts;

impl TlsTarget for DangerAcceptInvalidCerts {
    fn configure(&self, key: &ConnectionKey, config: &mut ConnectConfiguration) -> Result<(), NetError> {
        tracing::warn!(%key, "certificate validation disabled");
        config.set_verify_hostname(false);
        config.set_verify(SslVerifyMode::NONE);
        Ok(())
    }
}

impl fmt::Debug for dyn TlsTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TlsTarget")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::key::ConnectionKind;

    #[test]
    fn sni_skipped_for_ip_literals() {
        assert!(TlsConfig::should_set_sni("example.com"));
        assert!(!TlsConfig::should_set_sni("127.0.0.1"));
        assert!(!TlsConfig::should_set_sni("[::1]"));
    }

    #[test]
    fn server_name_prefers_sni_host() {
        let key = ConnectionKey::new(ConnectionKind::Https, "10.0.0.1", 443).with_sni_host("api.test");
        assert_eq!(DefaultTlsTarget.server_name(&key), "api.test");

        let plain = ConnectionKey::new(ConnectionKind::Https, "api.test", 443);
        assert_eq!(DefaultTlsTarget.server_name(&plain), "api.test");
    }

    #[test]
    fn alpn_wire_format() {
        let config = TlsConfig::default();
        assert_eq!(config.alpn_wire().unwrap(), b"\x08http/1.1".to_vec());
    }

    #[test]
    fn default_connector_builds() {
        assert!(TlsConfig::default().build_connector().is_ok());
    }
}
