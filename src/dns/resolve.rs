use crate::base::neterror::NetError;
use std::{
    borrow::Cow,
    collections::HashMap,
    fmt,
    future::Future,
    net::{IpAddr, SocketAddr},
    pin::Pin,
    sync::Arc,
};

/// A host name handed to a [`Resolve`] strategy.
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct Name {
    host: Box<str>,
}

impl Name {
    #[inline]
    pub fn new(host: impl Into<Box<str>>) -> Self {
        Self { host: host.into() }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.host
    }
}

impl From<&str> for Name {
    fn from(value: &str) -> Self {
        Name::new(value)
    }
}

impl From<String> for Name {
    fn from(value: String) -> Self {
        Name::new(value)
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.host, f)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.host, f)
    }
}

pub type Addrs = Box<dyn Iterator<Item = SocketAddr> + Send>;

pub type Resolving = Pin<Box<dyn Future<Output = Result<Addrs, NetError>> + Send>>;

/// Endpoint-resolution strategy used when dialing.
///
/// Implementations return addresses with port 0; [`resolve_endpoint`]
/// stamps the destination port onto each of them.
pub trait Resolve: Send + Sync {
    fn resolve(&self, name: Name) -> Resolving;
}

impl<R: Resolve + ?Sized> Resolve for Arc<R> {
    fn resolve(&self, name: Name) -> Resolving {
        (**self).resolve(name)
    }
}

/// Resolves `host:port` into the ordered list of addresses to try.
///
/// IP literals (bracketed IPv6 included) never reach the resolver.
pub async fn resolve_endpoint(
    resolver: &dyn Resolve,
    host: &str,
    port: u16,
) -> Result<Vec<SocketAddr>, NetError> {
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let addrs: Vec<SocketAddr> = resolver
        .resolve(Name::new(bare))
        .await?
        .map(|mut addr| {
            addr.set_port(port);
            addr
        })
        .collect();

    if addrs.is_empty() {
        return Err(NetError::NameNotResolved);
    }
    Ok(addrs)
}

/// Resolver that answers from a fixed table before deferring to `inner`.
///
/// ```rust,ignore
/// let mut overrides = HashMap::new();
/// overrides.insert("api.local".into(), vec!["127.0.0.1:0".parse().unwrap()]);
/// let resolver = DnsResolverWithOverrides::new(Arc::new(GaiResolver::new()), overrides);
/// ```
pub struct DnsResolverWithOverrides {
    inner: Arc<dyn Resolve>,
    overrides: Arc<HashMap<Cow<'static, str>, Vec<SocketAddr>>>,
}

impl DnsResolverWithOverrides {
    pub fn new(
        inner: Arc<dyn Resolve>,
        overrides: HashMap<Cow<'static, str>, Vec<SocketAddr>>,
    ) -> Self {
        Self { inner, overrides: Arc::new(overrides) }
    }

    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

impl Resolve for DnsResolverWithOverrides {
    fn resolve(&self, name: Name) -> Resolving {
        match self.overrides.get(name.as_str()) {
            Some(pinned) => {
                tracing::trace!(host = %name, "using pinned addresses");
                let addrs: Addrs = Box::new(pinned.clone().into_iter());
                Box::pin(std::future::ready(Ok(addrs)))
            }
            None => self.inner.resolve(name),
        }
    }
}

impl fmt::Debug for DnsResolverWithOverrides {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolverWithOverrides")
            .field("override_count", &self.overrides.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedResolver {
        answer: Vec<SocketAddr>,
        calls: AtomicUsize,
    }

    impl FixedResolver {
        fn new(answer: Vec<SocketAddr>) -> Arc<Self> {
            Arc::new(Self { answer, calls: AtomicUsize::new(0) })
        }
    }

    impl Resolve for FixedResolver {
        fn resolve(&self, _name: Name) -> Resolving {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let addrs = self.answer.clone();
            Box::pin(async move { Ok(Box::new(addrs.into_iter()) as Addrs) })
        }
    }

    fn v4(a: u8, b: u8, c: u8, d: u8) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::new(a, b, c, d)), 0)
    }

    #[test]
    fn name_conversions() {
        assert_eq!(Name::from("example.com").as_str(), "example.com");
        assert_eq!(Name::from(String::from("a.test")).to_string(), "a.test");
        assert_eq!(Name::new("x"), Name::new("x"));
    }

    #[tokio::test]
    async fn ip_literal_bypasses_resolver() {
        let inner = FixedResolver::new(vec![v4(8, 8, 8, 8)]);
        let addrs = resolve_endpoint(inner.as_ref(), "127.0.0.1", 8080).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:8080".parse().unwrap()]);

        let addrs = resolve_endpoint(inner.as_ref(), "[::1]", 443).await.unwrap();
        assert!(addrs[0].is_ipv6());
        assert_eq!(addrs[0].port(), 443);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolved_addresses_get_destination_port() {
        let inner = FixedResolver::new(vec![v4(10, 0, 0, 1), v4(10, 0, 0, 2)]);
        let addrs = resolve_endpoint(inner.as_ref(), "svc.local", 9000).await.unwrap();
        assert_eq!(addrs.len(), 2);
        assert!(addrs.iter().all(|a| a.port() == 9000));
    }

    #[tokio::test]
    async fn empty_answer_is_name_not_resolved() {
        let inner = FixedResolver::new(vec![]);
        let err = resolve_endpoint(inner.as_ref(), "nothing.local", 80).await.unwrap_err();
        assert!(matches!(err, NetError::NameNotResolved));
    }

    #[tokio::test]
    async fn overrides_win_then_fall_through() {
        let inner = FixedResolver::new(vec![v4(8, 8, 8, 8)]);
        let mut overrides = HashMap::new();
        overrides.insert(Cow::Borrowed("pinned.local"), vec![v4(127, 0, 0, 1)]);
        let resolver = DnsResolverWithOverrides::new(inner.clone(), overrides);
        assert_eq!(resolver.override_count(), 1);

        let hit: Vec<_> = resolver.resolve(Name::new("pinned.local")).await.unwrap().collect();
        assert_eq!(hit, vec![v4(127, 0, 0, 1)]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 0);

        let miss: Vec<_> = resolver.resolve(Name::new("other.local")).await.unwrap().collect();
        assert_eq!(miss, vec![v4(8, 8, 8, 8)]);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}
