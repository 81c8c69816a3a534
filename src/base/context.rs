//! Context helpers for I/O failures.
//!
//! Dial and resolve paths see bare `io::Error`s; these helpers tag them with
//! the endpoint that failed so the resulting [`NetError`] is self-describing.

use crate::base::neterror::NetError;
use std::io;

pub trait IoResultExt<T> {
    /// Tags a connect failure with the destination endpoint.
    ///
    /// ```ignore
    /// use wirenet::base::context::IoResultExt;
    ///
    /// let tcp = TcpStream::connect(addr).await.connection_context("example.com", 80)?;
    /// // "Connection to example.com:80 failed: connection refused"
    /// ```
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError>;

    /// Tags a resolution failure with the queried domain.
    fn dns_context(self, domain: &str) -> Result<T, NetError>;

    /// Converts a failure after the socket was established.
    ///
    /// Socket-level kinds (reset, EOF, broken pipe) keep their dedicated
    /// variants; everything else is wrapped as [`NetError::Io`].
    fn transport_context(self) -> Result<T, NetError>;
}

impl<T> IoResultExt<T> for Result<T, io::Error> {
    fn connection_context(self, host: &str, port: u16) -> Result<T, NetError> {
        self.map_err(|e| NetError::connection_failed_to(host, port, e))
    }

    fn dns_context(self, domain: &str) -> Result<T, NetError> {
        self.map_err(|e| NetError::dns_failed(domain, e))
    }

    fn transport_context(self) -> Result<T, NetError> {
        self.map_err(NetError::from)
    }
}
