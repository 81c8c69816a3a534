//! HTTP/1.1 wire engine for a single pooled connection.

use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::config::ConnectionSettings;
use crate::http::body::ResponseBody;
use crate::http::buffer::ReadBuffer;
use crate::http::parse::{
    has_token, is_content_header, last_token, parse_header_line, parse_status_line,
};
use crate::http::request::{encode_head, HttpRequest};
use crate::http::response::HttpResponse;
use crate::socket::key::ConnectionKind;
use crate::socket::pool::SlotGuard;
use crate::socket::stream::BoxedSocket;
use futures::FutureExt;
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderMap, Method, StatusCode, Version};
use std::borrow::Cow;
use std::ops::Range;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

/// How the response body is delimited on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Empty,
    ContentLength(u64),
    Chunked,
    /// Read until the peer closes.
    UntilClose,
}

/// Parsed status line and headers of a final response.
#[derive(Debug)]
pub struct ResponseHead {
    pub version: Version,
    pub status: StatusCode,
    pub reason: Cow<'static, str>,
    pub headers: HeaderMap,
    pub content_headers: HeaderMap,
    pub framing: Framing,
}

/// A failed exchange. The socket is gone; the pool slot is kept so the
/// caller can redial without re-queuing.
#[derive(Debug)]
pub struct ConnectionFailure {
    pub error: NetError,
    slot: SlotGuard,
}

impl ConnectionFailure {
    pub fn into_slot(self) -> SlotGuard {
        self.slot
    }

    pub fn into_error(self) -> NetError {
        self.error
    }
}

/// One HTTP/1.1 connection: socket, buffers and reuse bookkeeping.
///
/// Dropping a connection closes the socket and releases its pool slot.
#[derive(Debug)]
pub struct HttpConnection {
    id: u64,
    socket: BoxedSocket,
    write_buf: Vec<u8>,
    write_batch: usize,
    read_buf: ReadBuffer,
    max_headers_bytes: usize,
    absolute_form: bool,
    read_ahead: bool,
    close_after_use: bool,
    reused: bool,
    created_at: Instant,
    slot: SlotGuard,
}

impl HttpConnection {
    pub fn new(
        id: u64,
        socket: BoxedSocket,
        kind: ConnectionKind,
        settings: &ConnectionSettings,
        slot: SlotGuard,
    ) -> Self {
        Self {
            id,
            socket,
            write_buf: Vec::with_capacity(settings.initial_write_buffer_size),
            write_batch: settings.initial_write_buffer_size,
            read_buf: ReadBuffer::with_capacity(settings.initial_read_buffer_size),
            max_headers_bytes: settings.max_response_headers_bytes(),
            absolute_form: kind.uses_absolute_form(),
            read_ahead: settings.read_ahead,
            close_after_use: false,
            reused: false,
            created_at: Instant::now(),
            slot,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub(crate) fn mark_reused(&mut self) {
        self.reused = true;
    }

    pub(crate) fn is_expired(&self, lifetime: Option<Duration>) -> bool {
        lifetime.is_some_and(|limit| self.created_at.elapsed() >= limit)
    }

    /// Runs one request/response exchange up to the end of the headers.
    ///
    /// The returned response owns this connection until its body is drained.
    /// Cancellation drops the socket mid-flight.
    pub async fn send(
        mut self,
        request: &HttpRequest,
        token: &CancellationToken,
    ) -> Result<HttpResponse, ConnectionFailure> {
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(NetError::Cancelled),
            head = self.exchange(request) => head,
        };

        match outcome {
            Ok(head) => Ok(self.into_response(head, token.clone())),
            Err(error) => {
                tracing::debug!(conn = self.id, reused = self.reused, %error, "exchange failed");
                Err(ConnectionFailure { error, slot: self.into_slot() })
            }
        }
    }

    async fn exchange(&mut self, request: &HttpRequest) -> Result<ResponseHead, NetError> {
        if self.reused && self.read_ahead {
            self.read_ahead()?;
        }
        self.write_request(request).await?;
        self.read_head(&request.method).await
    }

    fn into_response(self, head: ResponseHead, token: CancellationToken) -> HttpResponse {
        let ResponseHead { version, status, reason, headers, content_headers, framing } = head;
        tracing::debug!(conn = self.id, status = status.as_u16(), ?framing, "response head");

        let body = match framing {
            Framing::Empty => {
                self.complete();
                ResponseBody::empty()
            }
            Framing::ContentLength(len) => ResponseBody::content_length(self, len, token),
            Framing::Chunked => ResponseBody::chunked(self, token),
            Framing::UntilClose => ResponseBody::raw(self, token),
        };
        HttpResponse::new(version, status, reason, headers, content_headers, body)
    }

    /// Hands the connection back after its body was fully read.
    ///
    /// Leftover buffered bytes mean the framing is out of sync with the
    /// peer, so the connection is closed instead of reused.
    pub(crate) fn complete(self) {
        if !self.read_buf.is_empty() {
            tracing::warn!(
                conn = self.id,
                leftover = self.read_buf.len(),
                "unconsumed bytes after response; closing"
            );
            return;
        }
        if self.close_after_use {
            tracing::debug!(conn = self.id, "closing after use");
            return;
        }
        match self.slot.pool() {
            Some(pool) => pool.return_connection(self),
            None => tracing::trace!(conn = self.id, "no owning pool; closing"),
        }
    }

    pub(crate) fn into_slot(self) -> SlotGuard {
        self.slot
    }

    /// Non-blocking check that an idle connection is still clean.
    ///
    /// Fails if the peer closed, errored, or sent bytes nobody asked for.
    pub(crate) fn probe(&mut self) -> Result<(), NetError> {
        if !self.read_buf.is_empty() {
            return Err(NetError::DataReceivedUnexpectedly);
        }
        match self.fill().now_or_never() {
            None => Ok(()),
            Some(Ok(0)) => Err(NetError::ConnectionClosed),
            Some(Ok(_)) => Err(NetError::DataReceivedUnexpectedly),
            Some(Err(e)) => Err(e),
        }
    }

    /// Picks up a close or early bytes that arrived while idle.
    fn read_ahead(&mut self) -> Result<(), NetError> {
        match self.fill().now_or_never() {
            None => Ok(()),
            Some(Ok(0)) => Err(NetError::ConnectionClosed),
            Some(Ok(n)) => {
                tracing::trace!(conn = self.id, bytes = n, "read-ahead kept early bytes");
                Ok(())
            }
            Some(Err(e)) => Err(e),
        }
    }

    async fn write_request(&mut self, request: &HttpRequest) -> Result<(), NetError> {
        self.write_buf.clear();
        encode_head(request, self.absolute_form, &mut self.write_buf)?;

        let body = request.body.as_deref().unwrap_or_default();
        let batched = self.write_buf.len() + body.len() <= self.write_batch;
        if batched {
            self.write_buf.extend_from_slice(body);
        }
        tracing::trace!(conn = self.id, bytes = self.write_buf.len(), "writing request head");

        self.socket.write_all(&self.write_buf).await.transport_context()?;
        if !batched {
            self.socket.write_all(body).await.transport_context()?;
        }
        self.socket.flush().await.transport_context()
    }

    async fn read_head(&mut self, method: &Method) -> Result<ResponseHead, NetError> {
        let mut budget = self.max_headers_bytes;
        loop {
            let line = match self.read_line(budget).await {
                Ok(Some(range)) => range,
                Ok(None) if self.read_buf.is_empty() => return Err(NetError::EmptyResponse),
                Ok(None) => return Err(NetError::ResponseHeadersTruncated),
                Err(NetError::LineTooLong { .. }) => return Err(NetError::ResponseHeadersTooBig),
                Err(e) => return Err(e),
            };
            budget = budget.saturating_sub(line.len() + 2);
            let status_line = parse_status_line(self.read_buf.slice(line))?;

            let mut headers = HeaderMap::new();
            let mut content_headers = HeaderMap::new();
            loop {
                let line = match self.read_line(budget).await {
                    Ok(Some(range)) => range,
                    Ok(None) => return Err(NetError::ResponseHeadersTruncated),
                    Err(NetError::LineTooLong { .. }) => {
                        return Err(NetError::ResponseHeadersTooBig)
                    }
                    Err(e) => return Err(e),
                };
                budget = budget.saturating_sub(line.len() + 2);
                if line.is_empty() {
                    break;
                }
                let (name, value) = parse_header_line(self.read_buf.slice(line))?;
                if is_content_header(&name) {
                    content_headers.append(name, value);
                } else {
                    headers.append(name, value);
                }
            }

            let status = status_line.status;
            if status.is_informational() && status != StatusCode::SWITCHING_PROTOCOLS {
                tracing::trace!(conn = self.id, status = status.as_u16(), "skipping interim response");
                continue;
            }

            self.close_after_use = wants_close(status_line.version, &headers)
                || status == StatusCode::SWITCHING_PROTOCOLS;
            let framing = self.select_framing(method, status, &headers, &content_headers)?;

            return Ok(ResponseHead {
                version: status_line.version,
                status,
                reason: status_line.reason,
                headers,
                content_headers,
                framing,
            });
        }
    }

    fn select_framing(
        &mut self,
        method: &Method,
        status: StatusCode,
        headers: &HeaderMap,
        content_headers: &HeaderMap,
    ) -> Result<Framing, NetError> {
        if *method == Method::HEAD
            || status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            return Ok(Framing::Empty);
        }

        if let Some(te) = headers.get_all(TRANSFER_ENCODING).iter().last() {
            if last_token(te).is_some_and(|t| t.eq_ignore_ascii_case(b"chunked")) {
                return Ok(Framing::Chunked);
            }
            self.close_after_use = true;
            return Ok(Framing::UntilClose);
        }

        match content_length(content_headers)? {
            Some(0) => Ok(Framing::Empty),
            Some(len) => Ok(Framing::ContentLength(len)),
            None if self.close_after_use => Ok(Framing::UntilClose),
            None => Ok(Framing::Empty),
        }
    }

    async fn fill(&mut self) -> Result<usize, NetError> {
        let spare = self.read_buf.spare();
        let n = self.socket.read(spare).await.transport_context()?;
        self.read_buf.advance_end(n);
        Ok(n)
    }

    /// Reads one line of at most `limit` bytes.
    ///
    /// `Ok(None)` means the peer closed before the line was terminated.
    /// The range indexes into the read buffer and is valid until the next read.
    pub(crate) async fn read_line(&mut self, limit: usize) -> Result<Option<Range<usize>>, NetError> {
        loop {
            if let Some(range) = self.read_buf.find_line() {
                if range.len() > limit {
                    return Err(NetError::LineTooLong { limit });
                }
                return Ok(Some(range));
            }
            if self.read_buf.len() > limit.saturating_add(1) {
                return Err(NetError::LineTooLong { limit });
            }
            if self.fill().await? == 0 {
                return Ok(None);
            }
        }
    }

    pub(crate) fn line(&self, range: Range<usize>) -> &[u8] {
        self.read_buf.slice(range)
    }

    /// Reads body bytes, serving buffered data first.
    ///
    /// Destinations at least as large as the read buffer bypass it.
    pub(crate) async fn read_body(&mut self, dst: &mut [u8]) -> Result<usize, NetError> {
        if !self.read_buf.is_empty() {
            return Ok(self.read_buf.copy_to(dst));
        }
        if dst.len() >= self.read_buf.capacity() {
            return self.socket.read(dst).await.transport_context();
        }
        if self.fill().await? == 0 {
            return Ok(0);
        }
        Ok(self.read_buf.copy_to(dst))
    }
}

fn wants_close(version: Version, headers: &HeaderMap) -> bool {
    let values = headers.get_all(CONNECTION);
    if values.iter().any(|v| has_token(v, "close")) {
        return true;
    }
    version == Version::HTTP_10 && !values.iter().any(|v| has_token(v, "keep-alive"))
}

/// All `Content-Length` values must agree.
fn content_length(content_headers: &HeaderMap) -> Result<Option<u64>, NetError> {
    let mut found: Option<u64> = None;
    for value in content_headers.get_all(CONTENT_LENGTH) {
        for part in value.as_bytes().split(|&b| b == b',') {
            let text = std::str::from_utf8(part).map_err(|_| NetError::InvalidResponse)?.trim();
            if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                return Err(NetError::InvalidResponse);
            }
            let len: u64 = text.parse().map_err(|_| NetError::InvalidResponse)?;
            match found {
                Some(prev) if prev != len => return Err(NetError::InvalidResponse),
                _ => found = Some(len),
            }
        }
    }
    Ok(found)
}
