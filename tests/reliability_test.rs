//! Retry behavior for failures on reused connections.

mod common;

use common::{ok, serve, Reply};
use wirenet::base::neterror::ErrorKind;
use wirenet::{Client, NetError};

#[tokio::test]
async fn test_retry_on_reused_socket_failure() {
    // The first connection answers once, then hangs up on the second request.
    let server = serve(|conn, nth, _| match (conn, nth) {
        (0, 0) => Reply::Send(ok("OK")),
        (0, _) => Reply::Close,
        _ => Reply::Send(ok("RETRY")),
    })
    .await;
    let client = Client::new();

    let first = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(first.text().await.unwrap(), "OK");

    let second = client.get(server.url("/")).send().await.unwrap();
    assert_eq!(second.text().await.unwrap(), "RETRY");
    assert_eq!(server.accepts(), 2);
}

#[tokio::test]
async fn test_fresh_connection_failure_not_retried() {
    let server = serve(|_, _, _| Reply::Close).await;
    let client = Client::new();

    let err = client.get(server.url("/")).send().await.unwrap_err();
    assert!(matches!(err, NetError::EmptyResponse));
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn test_protocol_error_not_retried() {
    let server = serve(|_, nth, _| match nth {
        0 => Reply::Send(ok("OK")),
        _ => Reply::Send(b"HTTX/1.1 200 OK\r\n\r\n".to_vec()),
    })
    .await;
    let client = Client::new();

    client.get(server.url("/")).send().await.unwrap();
    let err = client.get(server.url("/")).send().await.unwrap_err();
    assert!(matches!(err, NetError::InvalidStatusLine));
    assert!(err.is_protocol_error());
    assert_eq!(server.accepts(), 1);
}

#[tokio::test]
async fn test_retry_happens_only_once() {
    let server = serve(|conn, nth, _| match (conn, nth) {
        (0, 0) => Reply::Send(ok("OK")),
        _ => Reply::Close,
    })
    .await;
    let client = Client::new();

    client.get(server.url("/")).send().await.unwrap();
    let err = client.get(server.url("/")).send().await.unwrap_err();
    assert!(matches!(err, NetError::EmptyResponse));
    assert_eq!(server.accepts(), 2);
}

#[tokio::test]
async fn test_server_close_while_idle_is_detected() {
    let server = serve(|_, _, _| {
        Reply::SendAndClose(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nhi".to_vec())
    })
    .await;
    let client = Client::new();

    for _ in 0..3 {
        let resp = client.get(server.url("/")).send().await.unwrap();
        assert_eq!(resp.text().await.unwrap(), "hi");
    }
    assert_eq!(server.accepts(), 3);
}
