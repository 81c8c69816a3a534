//! Key → pool routing.

use crate::base::neterror::NetError;
use crate::config::ConnectionSettings;
use crate::http::request::HttpRequest;
use crate::http::response::HttpResponse;
use crate::socket::key::{ConnectionKey, ConnectionKind};
use crate::socket::pool::ConnectionPool;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Owns one [`ConnectionPool`] per [`ConnectionKey`].
pub struct PoolManager {
    pools: DashMap<ConnectionKey, ConnectionPool>,
    settings: Arc<ConnectionSettings>,
    disposed: AtomicBool,
}

impl PoolManager {
    pub fn new(settings: ConnectionSettings) -> Self {
        Self::with_shared_settings(Arc::new(settings))
    }

    pub fn with_shared_settings(settings: Arc<ConnectionSettings>) -> Self {
        Self { pools: DashMap::new(), settings, disposed: AtomicBool::new(false) }
    }

    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Maps a request to the pool it belongs to.
    pub fn key_for(&self, request: &HttpRequest) -> Result<ConnectionKey, NetError> {
        let url = &request.url;
        let secure = match url.scheme() {
            "http" => false,
            "https" => true,
            _ => return Err(NetError::UnknownUrlScheme),
        };
        let host = url.host_str().ok_or(NetError::InvalidUrl)?;
        let port = url.port_or_known_default().ok_or(NetError::InvalidUrl)?;

        if let Some(proxy) = self.proxy_for(url) {
            return Ok(if secure {
                ConnectionKey::new(ConnectionKind::SslProxyTunnel, host, port)
                    .with_sni_host(request.host_header_name().unwrap_or(host))
                    .with_proxy(proxy)
            } else {
                ConnectionKey::new(ConnectionKind::Proxy, "", 0).with_proxy(proxy)
            });
        }

        Ok(if secure {
            ConnectionKey::new(ConnectionKind::Https, host, port)
                .with_sni_host(request.host_header_name().unwrap_or(host))
        } else {
            ConnectionKey::new(ConnectionKind::Http, host, port)
        })
    }

    fn proxy_for(&self, url: &Url) -> Option<Url> {
        if !self.settings.use_proxy {
            return None;
        }
        let resolver = self.settings.proxy.as_ref()?;
        match resolver.proxy_for(url) {
            Ok(Some(proxy)) if proxy.scheme() == "http" => Some(proxy),
            Ok(Some(proxy)) => {
                tracing::debug!(%proxy, "only http:// proxies are supported; going direct");
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, target = %url, "proxy lookup failed; going direct");
                None
            }
        }
    }

    pub fn pool_for(&self, key: &ConnectionKey) -> ConnectionPool {
        if let Some(pool) = self.pools.get(key) {
            return pool.clone();
        }
        self.pools
            .entry(key.clone())
            .or_insert_with(|| {
                tracing::debug!(%key, "new pool");
                ConnectionPool::new(key.clone(), Arc::clone(&self.settings))
            })
            .clone()
    }

    pub async fn send(
        &self,
        request: &HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, NetError> {
        if self.is_disposed() {
            return Err(NetError::Disposed);
        }
        request.validate()?;
        let key = self.key_for(request)?;
        self.pool_for(&key).send(request, token).await
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn cleanup_idle(&self) {
        for pool in self.pools.iter() {
            pool.cleanup_idle();
        }
    }

    /// Periodically sweeps idle connections in every pool.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(manager) if !manager.is_disposed() => manager.cleanup_idle(),
                    _ => break,
                }
            }
        });
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pools: Vec<ConnectionPool> = self.pools.iter().map(|p| p.clone()).collect();
        self.pools.clear();
        for pool in pools {
            pool.dispose();
        }
    }
}

impl Drop for PoolManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.pools.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socket::proxy::{ProxyResolve, ProxySettings};
    use http::header::{HeaderValue, HOST};

    fn request(url: &str) -> HttpRequest {
        HttpRequest::get(Url::parse(url).unwrap())
    }

    #[test]
    fn direct_keys() {
        let manager = PoolManager::new(ConnectionSettings::default());

        let key = manager.key_for(&request("http://example.com/x")).unwrap();
        assert_eq!(key, ConnectionKey::new(ConnectionKind::Http, "example.com", 80));

        let key = manager.key_for(&request("https://example.com:8443/")).unwrap();
        assert_eq!(key.kind, ConnectionKind::Https);
        assert_eq!(key.port, 8443);
        assert_eq!(key.sni_host.as_deref(), Some("example.com"));
    }

    #[test]
    fn host_header_sets_sni() {
        let manager = PoolManager::new(ConnectionSettings::default());
        let mut req = request("https://10.0.0.1/");
        req.headers.insert(HOST, HeaderValue::from_static("api.test:443"));
        let key = manager.key_for(&req).unwrap();
        assert_eq!(key.host, "10.0.0.1");
        assert_eq!(key.sni_host.as_deref(), Some("api.test"));
    }

    #[test]
    fn unknown_scheme() {
        let manager = PoolManager::new(ConnectionSettings::default());
        assert!(matches!(
            manager.key_for(&request("ftp://example.com/")),
            Err(NetError::UnknownUrlScheme)
        ));
    }

    #[test]
    fn proxy_routing() {
        let settings = ConnectionSettings {
            proxy: Some(Arc::new(ProxySettings::new("http://proxy.test:3128").unwrap())),
            ..Default::default()
        };
        let manager = PoolManager::new(settings);

        let plain = manager.key_for(&request("http://a.test/")).unwrap();
        assert_eq!(plain.kind, ConnectionKind::Proxy);
        assert_eq!(plain.host, "");
        let other = manager.key_for(&request("http://b.test/")).unwrap();
        assert_eq!(plain, other);

        let secure = manager.key_for(&request("https://a.test/")).unwrap();
        assert_eq!(secure.kind, ConnectionKind::SslProxyTunnel);
        assert_eq!(secure.host, "a.test");
    }

    struct FailingProxy;

    impl ProxyResolve for FailingProxy {
        fn proxy_for(&self, _target: &Url) -> Result<Option<Url>, NetError> {
            Err(NetError::ConnectionFailed)
        }
    }

    #[test]
    fn proxy_errors_go_direct() {
        let settings =
            ConnectionSettings { proxy: Some(Arc::new(FailingProxy)), ..Default::default() };
        let manager = PoolManager::new(settings);
        let key = manager.key_for(&request("http://a.test/")).unwrap();
        assert_eq!(key.kind, ConnectionKind::Http);
    }

    #[test]
    fn use_proxy_off() {
        let settings = ConnectionSettings {
            proxy: Some(Arc::new(ProxySettings::new("http://proxy.test:3128").unwrap())),
            use_proxy: false,
            ..Default::default()
        };
        let manager = PoolManager::new(settings);
        let key = manager.key_for(&request("http://a.test/")).unwrap();
        assert_eq!(key.kind, ConnectionKind::Http);
    }

    #[test]
    fn pools_are_shared_per_key() {
        let manager = PoolManager::new(ConnectionSettings::default());
        let key = ConnectionKey::new(ConnectionKind::Http, "a.test", 80);
        let _ = manager.pool_for(&key);
        let _ = manager.pool_for(&key);
        let _ = manager.pool_for(&ConnectionKey::new(ConnectionKind::Http, "b.test", 80));
        assert_eq!(manager.pool_count(), 2);
    }

    #[tokio::test]
    async fn disposed_manager_rejects() {
        let manager = PoolManager::new(ConnectionSettings::default());
        manager.dispose();
        let err = manager
            .send(&request("http://a.test/"), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, NetError::Disposed));
    }
}
