//! Retry classification for reused connections.
//!
//! A pooled connection may have been closed by the peer while it sat idle.
//! Such failures are retried once on a fresh connection; everything else
//! reaches the caller.

use crate::base::neterror::{ErrorKind, NetError};

/// Why a reused-connection failure was retried. Logged, never surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    ConnectionReset,
    ConnectionClosed,
    ConnectionAborted,
    SocketNotConnected,
    EmptyResponse,
    /// Any other socket-level failure.
    Transport,
}

impl RetryReason {
    /// `None` for failures that must not be retried: framing violations,
    /// cancellation, disposal, and request-construction errors.
    pub fn from_error(error: &NetError) -> Option<Self> {
        match error {
            NetError::ConnectionReset => Some(Self::ConnectionReset),
            NetError::ConnectionClosed => Some(Self::ConnectionClosed),
            NetError::ConnectionAborted => Some(Self::ConnectionAborted),
            NetError::SocketNotConnected => Some(Self::SocketNotConnected),
            NetError::EmptyResponse => Some(Self::EmptyResponse),
            e if e.kind() == ErrorKind::Transport => Some(Self::Transport),
            _ => None,
        }
    }
}
