//! HTTP response with body access.

use crate::base::neterror::NetError;
use crate::http::body::ResponseBody;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};
use std::borrow::Cow;

/// A received response.
///
/// Payload headers (`Content-Type`, `Content-Length`, ...) are kept apart
/// from the rest in [`content_headers`](Self::content_headers).
#[derive(Debug)]
pub struct HttpResponse {
    status: StatusCode,
    version: Version,
    reason: Cow<'static, str>,
    headers: HeaderMap,
    content_headers: HeaderMap,
    trailers: HeaderMap,
    body: Option<ResponseBody>,
}

impl HttpResponse {
    pub fn new(
        version: Version,
        status: StatusCode,
        reason: Cow<'static, str>,
        headers: HeaderMap,
        content_headers: HeaderMap,
        body: ResponseBody,
    ) -> Self {
        Self {
            status,
            version,
            reason,
            headers,
            content_headers,
            trailers: HeaderMap::new(),
            body: Some(body),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// Reason phrase as sent by the server; may be empty.
    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn content_headers(&self) -> &HeaderMap {
        &self.content_headers
    }

    pub fn content_headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.content_headers
    }

    /// Trailer fields merged by [`buffer_content`](Self::buffer_content).
    pub fn trailers(&self) -> &HeaderMap {
        &self.trailers
    }

    /// The body, or an empty one once it was taken.
    pub fn body_mut(&mut self) -> &mut ResponseBody {
        self.body.get_or_insert_with(ResponseBody::empty)
    }

    /// Take the response body for consumption.
    /// Can only be called once - subsequent calls return None.
    pub fn take_body(&mut self) -> Option<ResponseBody> {
        self.body.take()
    }

    /// Reads the whole body into memory and merges its trailers.
    ///
    /// The body stays readable from the in-memory copy afterwards.
    pub async fn buffer_content(&mut self, limit: usize) -> Result<Bytes, NetError> {
        let body = self.body.as_mut().ok_or(NetError::Disposed)?;
        let bytes = body.buffer(limit).await?;
        let trailers = body.take_trailers();
        self.trailers.extend(trailers);
        Ok(bytes)
    }

    pub async fn bytes(mut self) -> Result<Bytes, NetError> {
        self.body.take().ok_or(NetError::Disposed)?.bytes().await
    }

    pub async fn text(mut self) -> Result<String, NetError> {
        self.body.take().ok_or(NetError::Disposed)?.text().await
    }

    pub async fn json<T: serde::de::DeserializeOwned>(mut self) -> Result<T, NetError> {
        self.body.take().ok_or(NetError::Disposed)?.json().await
    }
}
