use std::io;
use std::sync::Arc;
use thiserror::Error;

/// Coarse classification of a [`NetError`].
///
/// Callers that only care about *why* a request failed (dial, handshake,
/// framing, cancellation) match on this instead of the full error list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// DNS resolution or TCP connect failed.
    Connect,
    /// The TLS client handshake failed.
    TlsHandshake,
    /// The socket failed after it was established (reset, EOF, abort).
    Transport,
    /// The peer violated HTTP/1.1 framing.
    Protocol,
    /// The request was cancelled or timed out.
    Cancelled,
    /// A stream, connection, pool or client was used after release.
    Disposed,
    /// The request itself could not be sent as given.
    Request,
}

#[derive(Debug, Error, Clone)]
pub enum NetError {
    // Connection Errors
    #[error("Connection closed (TCP FIN)")]
    ConnectionClosed,
    #[error("Connection reset (TCP RST)")]
    ConnectionReset,
    #[error("Connection refused")]
    ConnectionRefused,
    #[error("Connection aborted")]
    ConnectionAborted,
    #[error("Connection failed")]
    ConnectionFailed,
    #[error("Name not resolved")]
    NameNotResolved,
    #[error("Socket not connected")]
    SocketNotConnected,
    #[error("SSL protocol error")]
    SslProtocolError,
    #[error("Tunnel connection failed")]
    TunnelConnectionFailed,
    #[error("Connection timed out")]
    ConnectionTimedOut,
    #[error("Connection to {host}:{port} failed: {source}")]
    ConnectionFailedTo {
        host: String,
        port: u16,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("Could not resolve {domain}: {source}")]
    NameNotResolvedFor {
        domain: String,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("TLS handshake with {host} failed: {reason}")]
    SslHandshakeFailed { host: String, reason: String },
    #[error("I/O error: {0}")]
    Io(#[source] Arc<io::Error>),

    // HTTP Errors
    #[error("Invalid URL")]
    InvalidUrl,
    #[error("Unknown URL scheme")]
    UnknownUrlScheme,
    #[error("Invalid response")]
    InvalidResponse,
    #[error("Invalid status line")]
    InvalidStatusLine,
    #[error("Invalid header line")]
    InvalidHeaderLine,
    #[error("Invalid chunked encoding")]
    InvalidChunkedEncoding,
    #[error("Invalid header value in request")]
    InvalidHeaderValue,
    #[error("Empty response")]
    EmptyResponse,
    #[error("Response headers too big")]
    ResponseHeadersTooBig,
    #[error("Response line exceeded {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("Response headers truncated")]
    ResponseHeadersTruncated,
    #[error("Content-Length mismatch")]
    ContentLengthMismatch,
    #[error("Incomplete chunked encoding")]
    IncompleteChunkedEncoding,
    #[error("Content decoding failed")]
    ContentDecodingFailed,
    #[error("Response body exceeds the buffer limit of {limit} bytes")]
    ResponseBodyTooLarge { limit: usize },
    #[error("Data received unexpectedly on idle socket")]
    DataReceivedUnexpectedly,
    #[error("Invalid UTF-8 in response body")]
    InvalidUtf8,
    #[error("JSON parse error")]
    JsonParseError,

    // Lifecycle
    #[error("Request cancelled")]
    Cancelled,
    #[error("Object used after it was disposed")]
    Disposed,

    #[error("Unknown error: {0}")]
    Unknown(i32),
}

impl NetError {
    pub fn connection_failed_to(host: &str, port: u16, source: io::Error) -> Self {
        NetError::ConnectionFailedTo { host: host.to_string(), port, source: Arc::new(source) }
    }

    pub fn dns_failed(domain: &str, source: io::Error) -> Self {
        NetError::NameNotResolvedFor { domain: domain.to_string(), source: Arc::new(source) }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            NetError::ConnectionRefused
            | NetError::ConnectionFailed
            | NetError::NameNotResolved
            | NetError::TunnelConnectionFailed
            | NetError::ConnectionTimedOut
            | NetError::ConnectionFailedTo { .. }
            | NetError::NameNotResolvedFor { .. } => ErrorKind::Connect,

            NetError::SslProtocolError | NetError::SslHandshakeFailed { .. } => {
                ErrorKind::TlsHandshake
            }

            NetError::ConnectionClosed
            | NetError::ConnectionReset
            | NetError::ConnectionAborted
            | NetError::SocketNotConnected
            | NetError::EmptyResponse
            | NetError::Io(_) => ErrorKind::Transport,

            NetError::InvalidResponse
            | NetError::InvalidStatusLine
            | NetError::InvalidHeaderLine
            | NetError::InvalidChunkedEncoding
            | NetError::ResponseHeadersTooBig
            | NetError::LineTooLong { .. }
            | NetError::ResponseHeadersTruncated
            | NetError::ContentLengthMismatch
            | NetError::IncompleteChunkedEncoding
            | NetError::ContentDecodingFailed
            | NetError::DataReceivedUnexpectedly => ErrorKind::Protocol,

            NetError::Cancelled => ErrorKind::Cancelled,
            NetError::Disposed => ErrorKind::Disposed,

            NetError::InvalidUrl
            | NetError::UnknownUrlScheme
            | NetError::InvalidHeaderValue
            | NetError::ResponseBodyTooLarge { .. }
            | NetError::InvalidUtf8
            | NetError::JsonParseError
            | NetError::Unknown(_) => ErrorKind::Request,
        }
    }

    pub fn is_protocol_error(&self) -> bool {
        self.kind() == ErrorKind::Protocol
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    pub fn as_i32(&self) -> i32 {
        match self {
            NetError::Cancelled => -3,
            NetError::ConnectionClosed => -100,
            NetError::ConnectionReset => -101,
            NetError::ConnectionRefused => -102,
            NetError::ConnectionAborted => -103,
            NetError::ConnectionFailed | NetError::ConnectionFailedTo { .. } => -104,
            NetError::NameNotResolved | NetError::NameNotResolvedFor { .. } => -105,
            NetError::SslProtocolError => -107,
            NetError::TunnelConnectionFailed => -111,
            NetError::SocketNotConnected => -112,
            NetError::ConnectionTimedOut => -118,
            NetError::SslHandshakeFailed { .. } => -148,

            NetError::InvalidUrl => -300,
            NetError::UnknownUrlScheme => -302,
            NetError::InvalidResponse => -320,
            NetError::InvalidChunkedEncoding => -321,
            NetError::EmptyResponse => -324,
            NetError::ResponseHeadersTooBig => -325,
            NetError::ContentDecodingFailed => -330,
            NetError::ContentLengthMismatch => -354,
            NetError::IncompleteChunkedEncoding => -355,
            NetError::ResponseHeadersTruncated => -357,
            NetError::InvalidHeaderValue => -370,
            // Codes below -900 have no Chromium counterpart.
            NetError::InvalidStatusLine => -901,
            NetError::InvalidHeaderLine => -902,
            NetError::LineTooLong { .. } => -903,
            NetError::DataReceivedUnexpectedly => -904,
            NetError::ResponseBodyTooLarge { .. } => -905,
            NetError::InvalidUtf8 => -906,
            NetError::JsonParseError => -907,
            NetError::Disposed => -908,
            NetError::Io(_) => -909,
            NetError::Unknown(code) => *code,
        }
    }
}

impl From<i32> for NetError {
    fn from(code: i32) -> Self {
        match code {
            -3 => NetError::Cancelled,
            -100 => NetError::ConnectionClosed,
            -101 => NetError::ConnectionReset,
            -102 => NetError::ConnectionRefused,
            -103 => NetError::ConnectionAborted,
            -104 => NetError::ConnectionFailed,
            -105 => NetError::NameNotResolved,
            -107 => NetError::SslProtocolError,
            -111 => NetError::TunnelConnectionFailed,
            -112 => NetError::SocketNotConnected,
            -118 => NetError::ConnectionTimedOut,

            -300 => NetError::InvalidUrl,
            -302 => NetError::UnknownUrlScheme,
            -320 => NetError::InvalidResponse,
            -321 => NetError::InvalidChunkedEncoding,
            -324 => NetError::EmptyResponse,
            -325 => NetError::ResponseHeadersTooBig,
            -330 => NetError::ContentDecodingFailed,
            -354 => NetError::ContentLengthMismatch,
            -355 => NetError::IncompleteChunkedEncoding,
            -357 => NetError::ResponseHeadersTruncated,
            -370 => NetError::InvalidHeaderValue,
            -901 => NetError::InvalidStatusLine,
            -902 => NetError::InvalidHeaderLine,
            -904 => NetError::DataReceivedUnexpectedly,
            -906 => NetError::InvalidUtf8,
            -907 => NetError::JsonParseError,
            -908 => NetError::Disposed,
            _ => NetError::Unknown(code),
        }
    }
}

impl From<io::Error> for NetError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionReset => NetError::ConnectionReset,
            io::ErrorKind::ConnectionAborted => NetError::ConnectionAborted,
            io::ErrorKind::ConnectionRefused => NetError::ConnectionRefused,
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => NetError::ConnectionClosed,
            io::ErrorKind::NotConnected => NetError::SocketNotConnected,
            io::ErrorKind::TimedOut => NetError::ConnectionTimedOut,
            _ => NetError::Io(Arc::new(e)),
        }
    }
}
