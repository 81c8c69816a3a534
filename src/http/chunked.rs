//! Chunked transfer-coding decoder.

use crate::base::neterror::NetError;
use crate::config::defaults::{MAX_CHUNK_LINE_BYTES, MAX_TRAILER_LINE_BYTES};
use crate::http::connection::HttpConnection;
use crate::http::parse::parse_header_line;
use http::HeaderMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkState {
    ExpectChunkHeader,
    ExpectChunkData,
    ExpectChunkTerminator,
    ConsumeTrailers,
    Done,
}

/// Decodes one chunked body off a connection.
///
/// The decoder owns no I/O; each call borrows the connection it reads from.
/// Any error leaves the decoder in an unspecified state and the caller must
/// dispose the connection.
#[derive(Debug)]
pub struct ChunkedDecoder {
    state: ChunkState,
    remaining: u64,
    trailers: HeaderMap,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: ChunkState::ExpectChunkHeader, remaining: 0, trailers: HeaderMap::new() }
    }

    pub fn is_done(&self) -> bool {
        self.state == ChunkState::Done
    }

    pub fn take_trailers(&mut self) -> HeaderMap {
        std::mem::take(&mut self.trailers)
    }

    /// Reads decoded payload into `buf`. `Ok(0)` means the body is complete.
    pub async fn read(&mut self, conn: &mut HttpConnection, buf: &mut [u8]) -> Result<usize, NetError> {
        loop {
            match self.state {
                ChunkState::ExpectChunkHeader => {
                    let range = conn
                        .read_line(MAX_CHUNK_LINE_BYTES)
                        .await?
                        .ok_or(NetError::IncompleteChunkedEncoding)?;
                    let size = parse_chunk_size(conn.line(range))?;
                    tracing::trace!(conn = conn.id(), size, "chunk header");
                    if size == 0 {
                        self.state = ChunkState::ConsumeTrailers;
                    } else {
                        self.remaining = size;
                        self.state = ChunkState::ExpectChunkData;
                    }
                }
                ChunkState::ExpectChunkData => {
                    if buf.is_empty() {
                        return Ok(0);
                    }
                    let cap = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(buf.len());
                    let n = conn.read_body(&mut buf[..cap]).await?;
                    if n == 0 {
                        return Err(NetError::IncompleteChunkedEncoding);
                    }
                    self.remaining -= n as u64;
                    if self.remaining == 0 {
                        self.state = ChunkState::ExpectChunkTerminator;
                    }
                    return Ok(n);
                }
                ChunkState::ExpectChunkTerminator => {
                    let range = conn
                        .read_line(MAX_CHUNK_LINE_BYTES)
                        .await?
                        .ok_or(NetError::IncompleteChunkedEncoding)?;
                    if !range.is_empty() {
                        return Err(NetError::InvalidChunkedEncoding);
                    }
                    self.state = ChunkState::ExpectChunkHeader;
                }
                ChunkState::ConsumeTrailers => {
                    let range = conn
                        .read_line(MAX_TRAILER_LINE_BYTES)
                        .await?
                        .ok_or(NetError::IncompleteChunkedEncoding)?;
                    if range.is_empty() {
                        self.state = ChunkState::Done;
                        return Ok(0);
                    }
                    let (name, value) = parse_header_line(conn.line(range))?;
                    self.trailers.append(name, value);
                }
                ChunkState::Done => return Ok(0),
            }
        }
    }
}

/// Hex size followed by optional whitespace and an optional `;extension`.
fn parse_chunk_size(line: &[u8]) -> Result<u64, NetError> {
    let digits = line.iter().take_while(|b| b.is_ascii_hexdigit()).count();
    if digits == 0 {
        return Err(NetError::InvalidChunkedEncoding);
    }

    let mut size: u64 = 0;
    for &b in &line[..digits] {
        let nibble = (b as char).to_digit(16).ok_or(NetError::InvalidChunkedEncoding)?;
        size = size
            .checked_mul(16)
            .and_then(|s| s.checked_add(u64::from(nibble)))
            .ok_or(NetError::InvalidChunkedEncoding)?;
    }

    for &b in &line[digits..] {
        match b {
            b';' => break,
            b' ' | b'\t' => continue,
            _ => return Err(NetError::InvalidChunkedEncoding),
        }
    }
    Ok(size)
}
