use super::{Addrs, Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use hickory_resolver::{
    config::{LookupIpStrategy, ResolverConfig},
    name_server::TokioConnectionProvider,
    TokioResolver,
};
use std::{io, net::SocketAddr, sync::LazyLock};

static SHARED: LazyLock<TokioResolver> = LazyLock::new(|| {
    let mut builder = TokioResolver::builder_tokio().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "system resolver config unreadable, using defaults");
        TokioResolver::builder_with_config(
            ResolverConfig::default(),
            TokioConnectionProvider::default(),
        )
    });
    builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
    builder.build()
});

/// Async resolver backed by hickory-dns.
///
/// All instances share one lazily built resolver, configured from the
/// system settings when they can be read.
#[derive(Debug, Clone)]
pub struct HickoryResolver {
    inner: &'static LazyLock<TokioResolver>,
}

impl HickoryResolver {
    pub fn new() -> Self {
        Self { inner: &SHARED }
    }
}

impl Default for HickoryResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolve for HickoryResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.inner;
        Box::pin(async move {
            let domain = name.as_str();
            tracing::trace!(domain = %domain, "hickory lookup");

            let lookup = resolver
                .lookup_ip(domain)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e.to_string()))
                .dns_context(domain)?;

            let addrs: Vec<SocketAddr> = lookup.iter().map(|ip| SocketAddr::new(ip, 0)).collect();
            tracing::debug!(domain = %domain, count = addrs.len(), "resolved");
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::neterror::NetError;

    #[tokio::test]
    async fn invalid_tld_fails_with_domain() {
        let err = HickoryResolver::new()
            .resolve(Name::new("no-such-host.invalid"))
            .await
            .err()
            .expect("lookup should fail");
        match err {
            NetError::NameNotResolvedFor { domain, .. } => {
                assert_eq!(domain, "no-such-host.invalid")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn clones_share_resolver() {
        let a = HickoryResolver::new();
        let b = a.clone();
        assert!(std::ptr::eq(a.inner, b.inner));
    }
}
