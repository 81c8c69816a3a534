//! Requests and request-head serialization.

use crate::base::neterror::NetError;
use crate::http::parse::write_title_case;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::Method;
use url::{Position, Url};

/// An outgoing request.
///
/// Payload headers (`Content-Type`, `Content-Encoding`, ...) live in
/// `content_headers` and are only written when a body is present.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub content_headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            content_headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// Host name from an explicit `Host` header, port stripped.
    pub fn host_header_name(&self) -> Option<&str> {
        let host = self.headers.get(HOST)?.to_str().ok()?;
        let name = match host.strip_prefix('[') {
            Some(v6) => v6.split(']').next().unwrap_or(v6),
            None => host.rsplit_once(':').map_or(host, |(name, _)| name),
        };
        (!name.is_empty()).then_some(name)
    }

    /// Rejects what [`encode_head`] would reject, before a connection is
    /// committed to the request.
    pub fn validate(&self) -> Result<(), NetError> {
        self.url.host_str().ok_or(NetError::InvalidUrl)?;
        let payload = self.body.as_ref().map(|_| &self.content_headers);
        let values = self.headers.values().chain(payload.into_iter().flat_map(HeaderMap::values));
        for value in values {
            if !value.as_bytes().is_ascii() {
                return Err(NetError::InvalidHeaderValue);
            }
        }
        Ok(())
    }
}

/// Serializes the request line and headers into `out`.
///
/// The body is not written; `Content-Length` is computed from it.
pub fn encode_head(
    request: &HttpRequest,
    absolute_form: bool,
    out: &mut Vec<u8>,
) -> Result<(), NetError> {
    let url = &request.url;
    out.extend_from_slice(request.method.as_str().as_bytes());
    out.push(b' ');
    if absolute_form {
        // Userinfo never goes on the wire.
        let host = url.host_str().ok_or(NetError::InvalidUrl)?;
        out.extend_from_slice(url.scheme().as_bytes());
        out.extend_from_slice(b"://");
        push_ascii(out, host.as_bytes())?;
        if let Some(port) = url.port() {
            out.push(b':');
            out.extend_from_slice(port.to_string().as_bytes());
        }
    }
    push_ascii(out, url[Position::BeforePath..Position::AfterQuery].as_bytes())?;
    out.extend_from_slice(b" HTTP/1.1\r\n");

    out.extend_from_slice(b"Host: ");
    match request.headers.get(HOST) {
        Some(explicit) => push_ascii(out, explicit.as_bytes())?,
        None => {
            let host = url.host_str().ok_or(NetError::InvalidUrl)?;
            push_ascii(out, host.as_bytes())?;
            if let Some(port) = url.port() {
                out.push(b':');
                out.extend_from_slice(port.to_string().as_bytes());
            }
        }
    }
    out.extend_from_slice(b"\r\n");

    write_headers(&request.headers, out)?;

    match &request.body {
        None => out.extend_from_slice(b"Content-Length: 0\r\n"),
        Some(body) => {
            write_headers(&request.content_headers, out)?;
            out.extend_from_slice(b"Content-Length: ");
            out.extend_from_slice(body.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
    }

    out.extend_from_slice(b"\r\n");
    Ok(())
}

fn write_headers(headers: &HeaderMap, out: &mut Vec<u8>) -> Result<(), NetError> {
    for name in headers.keys() {
        if skip_header(name) {
            continue;
        }
        write_title_case(name, out);
        out.extend_from_slice(b": ");
        for (i, value) in headers.get_all(name).iter().enumerate() {
            if i > 0 {
                out.extend_from_slice(b"; ");
            }
            push_value(out, value)?;
        }
        out.extend_from_slice(b"\r\n");
    }
    Ok(())
}

/// Headers the encoder writes itself. Bodies are always sent with a
/// computed `Content-Length`, never chunked.
fn skip_header(name: &HeaderName) -> bool {
    *name == HOST || *name == CONTENT_LENGTH || *name == TRANSFER_ENCODING
}

fn push_value(out: &mut Vec<u8>, value: &HeaderValue) -> Result<(), NetError> {
    push_ascii(out, value.as_bytes())
}

fn push_ascii(out: &mut Vec<u8>, bytes: &[u8]) -> Result<(), NetError> {
    if !bytes.is_ascii() {
        return Err(NetError::InvalidHeaderValue);
    }
    out.extend_from_slice(bytes);
    Ok(())
}
