//! Pool keys.

use std::fmt;
use url::Url;

/// How a pool reaches its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionKind {
    /// Plain TCP straight to the origin.
    Http,
    /// TLS straight to the origin.
    Https,
    /// Plain TCP to an HTTP proxy; requests use absolute-form targets.
    Proxy,
    /// CONNECT tunnel through a proxy, plain HTTP inside.
    ProxyTunnel,
    /// CONNECT tunnel through a proxy, TLS inside.
    SslProxyTunnel,
}

impl ConnectionKind {
    pub fn is_secure(self) -> bool {
        matches!(self, ConnectionKind::Https | ConnectionKind::SslProxyTunnel)
    }

    pub fn is_tunnel(self) -> bool {
        matches!(self, ConnectionKind::ProxyTunnel | ConnectionKind::SslProxyTunnel)
    }

    /// Whether request lines carry the absolute URI instead of path + query.
    pub fn uses_absolute_form(self) -> bool {
        self == ConnectionKind::Proxy
    }
}

/// Identity of a connection pool.
///
/// Two requests share connections iff their keys are equal. Keys are
/// immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub kind: ConnectionKind,
    pub host: String,
    pub port: u16,
    pub sni_host: Option<String>,
    pub proxy: Option<Url>,
}

impl ConnectionKey {
    pub fn new(kind: ConnectionKind, host: impl Into<String>, port: u16) -> Self {
        Self { kind, host: host.into(), port, sni_host: None, proxy: None }
    }

    pub fn with_sni_host(mut self, sni_host: impl Into<String>) -> Self {
        self.sni_host = Some(sni_host.into());
        self
    }

    pub fn with_proxy(mut self, proxy: Url) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// The host:port pair the socket is opened to.
    pub fn dial_target(&self) -> Option<(&str, u16)> {
        match self.kind {
            ConnectionKind::Http | ConnectionKind::Https => Some((self.host.as_str(), self.port)),
            ConnectionKind::Proxy | ConnectionKind::ProxyTunnel | ConnectionKind::SslProxyTunnel => {
                let proxy = self.proxy.as_ref()?;
                Some((proxy.host_str()?, proxy.port_or_known_default()?))
            }
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.proxy, self.kind) {
            (Some(proxy), ConnectionKind::Proxy) => write!(f, "{:?} via {}", self.kind, proxy),
            (Some(proxy), _) => {
                write!(f, "{:?} {}:{} via {}", self.kind, self.host, self.port, proxy)
            }
            (None, _) => write!(f, "{:?} {}:{}", self.kind, self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn equal_keys_share_a_pool() {
        let a = ConnectionKey::new(ConnectionKind::Https, "example.com", 443)
            .with_sni_host("example.com");
        let b = ConnectionKey::new(ConnectionKind::Https, "example.com", 443)
            .with_sni_host("example.com");
        let c = ConnectionKey::new(ConnectionKind::Https, "example.com", 443)
            .with_sni_host("other.example");

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn dial_target_prefers_proxy() {
        let direct = ConnectionKey::new(ConnectionKind::Http, "origin.test", 8080);
        assert_eq!(direct.dial_target(), Some(("origin.test", 8080)));

        let proxy = Url::parse("http://proxy.test:3128").unwrap();
        let via = ConnectionKey::new(ConnectionKind::Proxy, "", 0).with_proxy(proxy);
        assert_eq!(via.dial_target(), Some(("proxy.test", 3128)));
        assert!(via.kind.uses_absolute_form());

        let missing = ConnectionKey::new(ConnectionKind::Proxy, "", 0);
        assert_eq!(missing.dial_target(), None);
    }

    #[test]
    fn kind_flags() {
        assert!(ConnectionKind::Https.is_secure());
        assert!(ConnectionKind::SslProxyTunnel.is_secure());
        assert!(!ConnectionKind::Proxy.is_secure());
        assert!(ConnectionKind::ProxyTunnel.is_tunnel());
        assert!(!ConnectionKind::Http.uses_absolute_form());
    }
}
