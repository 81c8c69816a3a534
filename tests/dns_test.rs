//! Endpoint resolution through the configured strategy.

mod common;

use common::{ok, serve, Reply};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use wirenet::dns::{resolve_endpoint, DnsResolverWithOverrides, GaiResolver};
use wirenet::socket::{ConnectionKey, ConnectionKind};
use wirenet::{Client, NetError};

fn pinned(host: &'static str) -> DnsResolverWithOverrides {
    let mut table: HashMap<_, Vec<SocketAddr>> = HashMap::new();
    table.insert(host.into(), vec!["127.0.0.1:0".parse().unwrap()]);
    DnsResolverWithOverrides::new(Arc::new(GaiResolver::new()), table)
}

#[tokio::test]
async fn test_override_stamps_port() {
    let addrs = resolve_endpoint(&pinned("api.local"), "api.local", 8080).await.unwrap();
    assert_eq!(addrs, vec!["127.0.0.1:8080".parse::<SocketAddr>().unwrap()]);
}

#[tokio::test]
async fn test_ip_literals_skip_resolver() {
    let addrs = resolve_endpoint(&pinned("api.local"), "[::1]", 443).await.unwrap();
    assert_eq!(addrs, vec!["[::1]:443".parse::<SocketAddr>().unwrap()]);
}

#[tokio::test]
async fn test_client_uses_pinned_host() {
    let server = serve(|_, _, _| Reply::Send(ok("pinned"))).await;
    let client = Client::builder().resolver(pinned("service.internal")).build();

    let url = format!("http://service.internal:{}/", server.port());
    let resp = client.get(&url).send().await.unwrap();
    assert_eq!(resp.text().await.unwrap(), "pinned");

    let request = &server.requests()[0];
    assert!(request.contains(&format!("Host: service.internal:{}\r\n", server.port())));

    let key = ConnectionKey::new(ConnectionKind::Http, "service.internal", server.port());
    assert_eq!(client.pool_manager().pool_for(&key).idle_count(), 1);
}

#[tokio::test]
async fn test_unresolvable_host() {
    let client = Client::new();
    let err = client.get("http://does-not-exist.invalid/").send().await.unwrap_err();
    assert_eq!(err.kind(), wirenet::base::neterror::ErrorKind::Connect);
    assert!(!matches!(err, NetError::Cancelled));
}
