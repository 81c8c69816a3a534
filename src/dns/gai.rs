use super::{Addrs, Name, Resolve, Resolving};
use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use std::net::ToSocketAddrs;

/// `getaddrinfo` resolver run on tokio's blocking pool.
///
/// Honours the system resolver configuration (hosts file, search domains).
/// This is the default strategy for [`ConnectionSettings`](crate::config::ConnectionSettings).
#[derive(Clone, Debug, Default)]
pub struct GaiResolver;

impl GaiResolver {
    pub fn new() -> Self {
        Self
    }
}

impl Resolve for GaiResolver {
    fn resolve(&self, name: Name) -> Resolving {
        Box::pin(async move {
            let host = name.to_string();
            tracing::trace!(host = %host, "getaddrinfo lookup");

            let lookup = {
                let host = host.clone();
                tokio::task::spawn_blocking(move || {
                    (host.as_str(), 0u16).to_socket_addrs().map(Iterator::collect::<Vec<_>>)
                })
            };

            let addrs = lookup
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "resolver task did not complete");
                    NetError::NameNotResolved
                })?
                .dns_context(&host)?;

            tracing::debug!(host = %host, count = addrs.len(), "resolved");
            Ok(Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_localhost() {
        let addrs: Vec<_> = GaiResolver::new().resolve(Name::new("localhost")).await.unwrap().collect();
        assert!(!addrs.is_empty());
        assert!(addrs.iter().all(|a| a.ip().is_loopback()));
    }
}
