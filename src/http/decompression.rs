//! Automatic `gzip` / `deflate` response decompression.

use crate::http::pipeline::{Handler, HandlerFuture, Next};
use crate::http::request::HttpRequest;
use bytes::{Buf, BytesMut};
use flate2::write::{DeflateDecoder, GzDecoder, ZlibDecoder};
use http::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use http::HeaderMap;
use std::io::{self, Write};
use std::ops::BitOr;
use tokio_util::sync::CancellationToken;

/// Set of content codings the client decodes on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DecompressionMethods(u8);

impl DecompressionMethods {
    pub const NONE: Self = Self(0);
    pub const GZIP: Self = Self(1);
    pub const DEFLATE: Self = Self(1 << 1);
    pub const ALL: Self = Self(Self::GZIP.0 | Self::DEFLATE.0);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn tokens(self) -> impl Iterator<Item = &'static str> {
        [(Self::GZIP, "gzip"), (Self::DEFLATE, "deflate")]
            .into_iter()
            .filter(move |(m, _)| self.contains(*m))
            .map(|(_, token)| token)
    }

    fn for_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            Some(Self::GZIP)
        } else if token.eq_ignore_ascii_case("deflate") {
            Some(Self::DEFLATE)
        } else {
            None
        }
    }
}

impl BitOr for DecompressionMethods {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

enum Inner {
    Gzip(GzDecoder<Vec<u8>>),
    Zlib(ZlibDecoder<Vec<u8>>),
    Deflate(DeflateDecoder<Vec<u8>>),
    /// `deflate` is sent both zlib-wrapped and raw; decided on the first
    /// two bytes.
    Sniffing(Vec<u8>),
}

/// Push-style streaming decoder.
///
/// Compressed bytes go in through [`feed`](Self::feed); decoded bytes come
/// out through [`read_decoded`](Self::read_decoded).
pub struct ContentDecoder {
    inner: Inner,
    out: BytesMut,
}

impl ContentDecoder {
    pub fn gzip() -> Self {
        Self { inner: Inner::Gzip(GzDecoder::new(Vec::new())), out: BytesMut::new() }
    }

    pub fn deflate() -> Self {
        Self { inner: Inner::Sniffing(Vec::with_capacity(2)), out: BytesMut::new() }
    }

    fn for_method(method: DecompressionMethods) -> Option<Self> {
        if method == DecompressionMethods::GZIP {
            Some(Self::gzip())
        } else if method == DecompressionMethods::DEFLATE {
            Some(Self::deflate())
        } else {
            None
        }
    }

    pub fn has_output(&self) -> bool {
        !self.out.is_empty()
    }

    /// Copies decoded bytes into `dst`.
    pub fn read_decoded(&mut self, dst: &mut [u8]) -> usize {
        let n = self.out.len().min(dst.len());
        dst[..n].copy_from_slice(&self.out[..n]);
        self.out.advance(n);
        n
    }

    pub fn feed(&mut self, input: &[u8]) -> io::Result<()> {
        match &mut self.inner {
            Inner::Gzip(d) => d.write_all(input)?,
            Inner::Zlib(d) => d.write_all(input)?,
            Inner::Deflate(d) => d.write_all(input)?,
            Inner::Sniffing(head) => {
                head.extend_from_slice(input);
                if head.len() < 2 {
                    return Ok(());
                }
                let head = std::mem::take(head);
                self.inner = if is_zlib_header(head[0], head[1]) {
                    Inner::Zlib(ZlibDecoder::new(Vec::new()))
                } else {
                    Inner::Deflate(DeflateDecoder::new(Vec::new()))
                };
                return self.feed(&head);
            }
        }
        self.collect();
        Ok(())
    }

    /// Flushes the decoder at end of input. Fails on a truncated stream.
    pub fn finish(&mut self) -> io::Result<()> {
        match &mut self.inner {
            Inner::Gzip(d) => d.try_finish()?,
            Inner::Zlib(d) => d.try_finish()?,
            Inner::Deflate(d) => d.try_finish()?,
            Inner::Sniffing(head) if head.is_empty() => {}
            Inner::Sniffing(_) => {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated deflate stream"))
            }
        }
        self.collect();
        Ok(())
    }

    fn collect(&mut self) {
        let produced = match &mut self.inner {
            Inner::Gzip(d) => d.get_mut(),
            Inner::Zlib(d) => d.get_mut(),
            Inner::Deflate(d) => d.get_mut(),
            Inner::Sniffing(_) => return,
        };
        if !produced.is_empty() {
            self.out.extend_from_slice(produced);
            produced.clear();
        }
    }
}

impl std::fmt::Debug for ContentDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            Inner::Gzip(_) => "gzip",
            Inner::Zlib(_) => "zlib",
            Inner::Deflate(_) => "deflate",
            Inner::Sniffing(_) => "deflate?",
        };
        f.debug_struct("ContentDecoder").field("kind", &kind).field("pending", &self.out.len()).finish()
    }
}

/// RFC 1950: compression method 8 and a header checksum divisible by 31.
fn is_zlib_header(cmf: u8, flg: u8) -> bool {
    cmf & 0x0f == 8 && (u16::from(cmf) << 8 | u16::from(flg)) % 31 == 0
}

/// Pipeline stage that advertises and undoes content codings.
#[derive(Debug, Clone, Copy)]
pub struct Decompression {
    methods: DecompressionMethods,
}

impl Decompression {
    pub fn new(methods: DecompressionMethods) -> Self {
        Self { methods }
    }

    pub fn methods(&self) -> DecompressionMethods {
        self.methods
    }
}

impl Handler for Decompression {
    fn send<'a>(
        &'a self,
        mut request: HttpRequest,
        token: &'a CancellationToken,
        next: Next<'a>,
    ) -> HandlerFuture<'a> {
        Box::pin(async move {
            add_accept_encoding(&mut request.headers, self.methods);
            let mut response = next.run(request, token).await?;

            let Some(method) = take_last_coding(response.content_headers_mut(), self.methods)
            else {
                return Ok(response);
            };
            let Some(decoder) = ContentDecoder::for_method(method) else {
                return Ok(response);
            };
            tracing::trace!(?decoder, "decompressing response body");
            response.content_headers_mut().remove(CONTENT_LENGTH);
            response.body_mut().set_decoder(decoder);
            Ok(response)
        })
    }
}

/// Appends enabled codings the caller did not already list.
fn add_accept_encoding(headers: &mut HeaderMap, methods: DecompressionMethods) {
    let existing: Vec<String> = headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .collect();

    for token in methods.tokens() {
        if !existing.iter().any(|t| t == token) {
            headers.append(ACCEPT_ENCODING, HeaderValue::from_static(token));
        }
    }
}

/// Removes the outermost coding if it is one we decode.
///
/// Only the last token of the last `Content-Encoding` value is looked at.
/// The header is dropped once no codings remain.
fn take_last_coding(
    content_headers: &mut HeaderMap,
    methods: DecompressionMethods,
) -> Option<DecompressionMethods> {
    let values: Vec<HeaderValue> = content_headers.get_all(CONTENT_ENCODING).iter().cloned().collect();
    let last = values.last()?.to_str().ok()?;
    let (rest, token) = match last.rsplit_once(',') {
        Some((rest, token)) => (rest.trim_end(), token.trim()),
        None => ("", last.trim()),
    };

    let method = DecompressionMethods::for_token(token)?;
    if !methods.contains(method) {
        return None;
    }

    content_headers.remove(CONTENT_ENCODING);
    let keep = values.len() - 1;
    for value in values.iter().take(keep).cloned() {
        content_headers.append(CONTENT_ENCODING, value);
    }
    if !rest.is_empty() {
        if let Ok(value) = HeaderValue::from_str(rest) {
            content_headers.append(CONTENT_ENCODING, value);
        }
    }
    Some(method)
}
