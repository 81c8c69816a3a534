//! Response body streaming.
//!
//! A body owns its connection until the last byte is read, then hands it
//! back to the pool. Dropping a body early closes the connection.

use crate::base::neterror::NetError;
use crate::http::chunked::ChunkedDecoder;
use crate::http::connection::HttpConnection;
use crate::http::decompression::ContentDecoder;
use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;
use http::HeaderMap;
use tokio_util::sync::CancellationToken;

/// Size of the buffers used by [`ResponseBody::chunk`] and buffering.
const READ_CHUNK: usize = 16 * 1024;
const DECODE_SCRATCH: usize = 8 * 1024;

enum Source {
    Empty,
    ContentLength { conn: HttpConnection, remaining: u64 },
    Chunked { conn: HttpConnection, decoder: ChunkedDecoder },
    /// Read until the peer closes.
    Raw { conn: HttpConnection },
    Buffered(Bytes),
    Done,
    /// Detached by an error or cancellation.
    Failed,
}

impl Source {
    fn holds_connection(&self) -> bool {
        matches!(self, Source::ContentLength { .. } | Source::Chunked { .. } | Source::Raw { .. })
    }

    async fn read(&mut self, buf: &mut [u8], trailers: &mut HeaderMap) -> Result<usize, NetError> {
        let (n, done) = match self {
            Source::Empty | Source::Done => return Ok(0),
            Source::Failed => return Err(NetError::Disposed),
            Source::Buffered(bytes) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                bytes.advance(n);
                (n, bytes.is_empty())
            }
            Source::ContentLength { conn, remaining } => {
                let cap = usize::try_from(*remaining).unwrap_or(usize::MAX).min(buf.len());
                let n = conn.read_body(&mut buf[..cap]).await?;
                if n == 0 {
                    tracing::debug!(conn = conn.id(), remaining = *remaining, "premature end of body");
                    return Err(NetError::ContentLengthMismatch);
                }
                *remaining -= n as u64;
                (n, *remaining == 0)
            }
            Source::Chunked { conn, decoder } => {
                let n = decoder.read(conn, buf).await?;
                if decoder.is_done() {
                    trailers.extend(decoder.take_trailers());
                }
                (n, decoder.is_done())
            }
            Source::Raw { conn } => {
                let n = conn.read_body(buf).await?;
                (n, n == 0)
            }
        };
        if done {
            self.finish();
        }
        Ok(n)
    }

    fn finish(&mut self) {
        match std::mem::replace(self, Source::Done) {
            Source::ContentLength { conn, .. } | Source::Chunked { conn, .. } => conn.complete(),
            Source::Raw { conn } => {
                tracing::trace!(conn = conn.id(), "read-until-close body finished");
            }
            _ => {}
        }
    }
}

struct Decoding {
    decoder: ContentDecoder,
    scratch: Box<[u8]>,
    eof: bool,
}

/// Body of an [`HttpResponse`](crate::http::HttpResponse).
pub struct ResponseBody {
    source: Source,
    decoding: Option<Decoding>,
    token: Option<CancellationToken>,
    trailers: HeaderMap,
}

impl ResponseBody {
    fn with_source(source: Source, token: Option<CancellationToken>) -> Self {
        Self { source, decoding: None, token, trailers: HeaderMap::new() }
    }

    pub fn empty() -> Self {
        Self::with_source(Source::Empty, None)
    }

    /// A body that is already in memory.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Self::empty();
        }
        Self::with_source(Source::Buffered(bytes), None)
    }

    pub(crate) fn content_length(conn: HttpConnection, len: u64, token: CancellationToken) -> Self {
        Self::with_source(Source::ContentLength { conn, remaining: len }, Some(token))
    }

    pub(crate) fn chunked(conn: HttpConnection, token: CancellationToken) -> Self {
        Self::with_source(Source::Chunked { conn, decoder: ChunkedDecoder::new() }, Some(token))
    }

    pub(crate) fn raw(conn: HttpConnection, token: CancellationToken) -> Self {
        Self::with_source(Source::Raw { conn }, Some(token))
    }

    /// Decodes everything read from now on through `decoder`.
    ///
    /// Ignored on bodies that have nothing left to read.
    pub fn set_decoder(&mut self, decoder: ContentDecoder) {
        if matches!(self.source, Source::Empty | Source::Done | Source::Failed) {
            return;
        }
        self.decoding = Some(Decoding {
            decoder,
            scratch: vec![0; DECODE_SCRATCH].into_boxed_slice(),
            eof: false,
        });
    }

    pub fn is_decoded(&self) -> bool {
        self.decoding.is_some()
    }

    /// True once every byte has been read.
    pub fn is_complete(&self) -> bool {
        let drained = self.decoding.as_ref().map_or(true, |d| d.eof && !d.decoder.has_output());
        drained && matches!(self.source, Source::Empty | Source::Done)
    }

    /// Trailer fields of a chunked body, filled once it is fully read.
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    pub(crate) fn take_trailers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.trailers)
    }

    /// Reads body bytes into `buf`. `Ok(0)` means the body is complete.
    ///
    /// Any error detaches and closes the connection; further reads fail with
    /// [`NetError::Disposed`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        if buf.is_empty() {
            return Ok(0);
        }
        let outcome = match self.token.clone().filter(|_| self.source.holds_connection()) {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(NetError::Cancelled),
                read = self.read_decoded(buf) => read,
            },
            None => self.read_decoded(buf).await,
        };
        if let Err(error) = &outcome {
            if self.source.holds_connection() {
                tracing::debug!(%error, "response body failed; closing connection");
            }
            self.fail();
        }
        outcome
    }

    async fn read_decoded(&mut self, buf: &mut [u8]) -> Result<usize, NetError> {
        let Some(layer) = self.decoding.as_mut() else {
            return self.source.read(buf, &mut self.trailers).await;
        };
        loop {
            if layer.decoder.has_output() {
                return Ok(layer.decoder.read_decoded(buf));
            }
            if layer.eof {
                return Ok(0);
            }
            let n = self.source.read(&mut layer.scratch, &mut self.trailers).await?;
            let decoded = if n == 0 {
                layer.eof = true;
                layer.decoder.finish()
            } else {
                layer.decoder.feed(&layer.scratch[..n])
            };
            decoded.map_err(|e| {
                tracing::debug!(error = %e, "content decoding failed");
                NetError::ContentDecodingFailed
            })?;
        }
    }

    fn fail(&mut self) {
        self.source = Source::Failed;
        self.decoding = None;
    }

    /// Next piece of the body, or `None` at the end.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, NetError> {
        if self.decoding.is_none() {
            if let Source::Buffered(bytes) = &mut self.source {
                let bytes = std::mem::take(bytes);
                self.source = Source::Done;
                return Ok(Some(bytes));
            }
        }
        let mut buf = vec![0; READ_CHUNK];
        let n = self.read(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        buf.truncate(n);
        Ok(Some(Bytes::from(buf)))
    }

    /// Reads the rest of the body into memory, keeping it readable.
    ///
    /// Fails with [`NetError::ResponseBodyTooLarge`] past `limit` bytes.
    pub async fn buffer(&mut self, limit: usize) -> Result<Bytes, NetError> {
        if self.decoding.is_none() {
            match &self.source {
                Source::Buffered(bytes) if bytes.len() <= limit => return Ok(bytes.clone()),
                Source::Empty | Source::Done => return Ok(Bytes::new()),
                Source::ContentLength { remaining, .. }
                    if usize::try_from(*remaining).map_or(true, |len| len > limit) =>
                {
                    self.fail();
                    return Err(NetError::ResponseBodyTooLarge { limit });
                }
                _ => {}
            }
        }

        let mut out = BytesMut::new();
        let mut buf = vec![0; READ_CHUNK];
        loop {
            let n = self.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            if out.len().saturating_add(n) > limit {
                self.fail();
                return Err(NetError::ResponseBodyTooLarge { limit });
            }
            out.extend_from_slice(&buf[..n]);
        }

        let bytes = out.freeze();
        self.decoding = None;
        self.source = if bytes.is_empty() { Source::Done } else { Source::Buffered(bytes.clone()) };
        Ok(bytes)
    }

    pub async fn bytes(mut self) -> Result<Bytes, NetError> {
        self.buffer(usize::MAX).await
    }

    pub async fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec()).map_err(|_| NetError::InvalidUtf8)
    }

    pub async fn json<T: serde::de::DeserializeOwned>(self) -> Result<T, NetError> {
        let bytes = self.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|_| NetError::JsonParseError)
    }

    /// The body as a stream of chunks. Ends after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Bytes, NetError>> + Send {
        futures::stream::unfold(Some(self), |body| async move {
            let mut body = body?;
            match body.chunk().await {
                Ok(Some(bytes)) => Some((Ok(bytes), Some(body))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

impl Default for ResponseBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.source {
            Source::Empty => "empty",
            Source::ContentLength { .. } => "content-length",
            Source::Chunked { .. } => "chunked",
            Source::Raw { .. } => "raw",
            Source::Buffered(_) => "buffered",
            Source::Done => "done",
            Source::Failed => "failed",
        };
        f.debug_struct("ResponseBody")
            .field("state", &state)
            .field("decoded", &self.decoding.is_some())
            .field("trailers", &self.trailers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionSettings;
    use crate::socket::key::ConnectionKind;
    use crate::socket::pool::SlotGuard;
    use crate::socket::stream::BoxedSocket;
    use futures::StreamExt;
    use std::io::Write;
    use tokio::io::{AsyncWriteExt, DuplexStream};

    fn connection() -> (HttpConnection, DuplexStream) {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let conn = HttpConnection::new(
            1,
            BoxedSocket::new(client),
            ConnectionKind::Http,
            &ConnectionSettings::default(),
            SlotGuard::detached(),
        );
        (conn, server)
    }

    #[tokio::test]
    async fn content_length_body() {
        let (conn, mut server) = connection();
        server.write_all(b"hello world").await.unwrap();
        let mut body = ResponseBody::content_length(conn, 11, CancellationToken::new());

        let mut buf = [0u8; 5];
        assert_eq!(body.read(&mut buf).await.unwrap(), 5);
        assert_eq!(&buf, b"hello");
        let rest = body.buffer(usize::MAX).await.unwrap();
        assert_eq!(&rest[..], b" world");

        let mut again = [0u8; 16];
        assert_eq!(body.read(&mut again).await.unwrap(), 6);
        assert_eq!(body.read(&mut again).await.unwrap(), 0);
        assert!(body.is_complete());
    }

    #[tokio::test]
    async fn premature_eof_is_a_mismatch() {
        let (conn, mut server) = connection();
        server.write_all(b"short").await.unwrap();
        drop(server);
        let mut body = ResponseBody::content_length(conn, 10, CancellationToken::new());

        let err = body.buffer(usize::MAX).await.unwrap_err();
        assert!(matches!(err, NetError::ContentLengthMismatch));
        let mut buf = [0u8; 4];
        assert!(matches!(body.read(&mut buf).await, Err(NetError::Disposed)));
    }

    #[tokio::test]
    async fn chunked_body_with_trailers() {
        let (conn, mut server) = connection();
        server
            .write_all(b"4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\nX-Trailer: v\r\n\r\n")
            .await
            .unwrap();
        let mut body = ResponseBody::chunked(conn, CancellationToken::new());

        let bytes = body.buffer(usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Wikipedia");
        assert_eq!(body.trailers().get("x-trailer").unwrap(), "v");
    }

    #[tokio::test]
    async fn bad_chunk_terminator() {
        let (conn, mut server) = connection();
        server.write_all(b"3\r\nabcX\r\n0\r\n\r\n").await.unwrap();
        let body = ResponseBody::chunked(conn, CancellationToken::new());
        assert!(matches!(body.bytes().await, Err(NetError::InvalidChunkedEncoding)));
    }

    #[tokio::test]
    async fn raw_reads_until_close() {
        let (conn, mut server) = connection();
        server.write_all(b"all of it").await.unwrap();
        drop(server);
        let body = ResponseBody::raw(conn, CancellationToken::new());
        assert_eq!(body.text().await.unwrap(), "all of it");
    }

    #[tokio::test]
    async fn limit_enforced() {
        let (conn, mut server) = connection();
        server.write_all(b"0123456789").await.unwrap();
        let mut body = ResponseBody::content_length(conn, 10, CancellationToken::new());
        assert!(matches!(
            body.buffer(4).await,
            Err(NetError::ResponseBodyTooLarge { limit: 4 })
        ));

        let (conn, mut server) = connection();
        server.write_all(b"4\r\nabcd\r\n4\r\nefgh\r\n0\r\n\r\n").await.unwrap();
        let mut body = ResponseBody::chunked(conn, CancellationToken::new());
        assert!(matches!(
            body.buffer(6).await,
            Err(NetError::ResponseBodyTooLarge { limit: 6 })
        ));
    }

    #[tokio::test]
    async fn cancellation_detaches() {
        let (conn, _server) = connection();
        let token = CancellationToken::new();
        let mut body = ResponseBody::content_length(conn, 10, token.clone());
        token.cancel();
        let mut buf = [0u8; 4];
        assert!(matches!(body.read(&mut buf).await, Err(NetError::Cancelled)));
        assert!(matches!(body.read(&mut buf).await, Err(NetError::Disposed)));
    }

    #[tokio::test]
    async fn gzip_layer() {
        let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
        enc.write_all(b"compressed payload").unwrap();
        let gz = enc.finish().unwrap();

        let (conn, mut server) = connection();
        server.write_all(&gz).await.unwrap();
        let mut body = ResponseBody::content_length(conn, gz.len() as u64, CancellationToken::new());
        body.set_decoder(ContentDecoder::gzip());
        assert_eq!(body.text().await.unwrap(), "compressed payload");
    }

    #[tokio::test]
    async fn decoder_ignored_on_empty_body() {
        let mut body = ResponseBody::empty();
        body.set_decoder(ContentDecoder::gzip());
        assert!(!body.is_decoded());
        assert!(body.is_complete());
        assert!(body.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_of_chunks() {
        let body = ResponseBody::from_bytes("abc");
        let chunks: Vec<_> = body.into_stream().collect().await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0].as_ref().unwrap()[..], b"abc");
    }
}
