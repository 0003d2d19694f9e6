//! Common error types for network operations

use thiserror::Error;

/// A common error type for network operations.
///
/// This enum defines the failures a [`Connection`](super::Connection) or a
/// [`Connect`](super::Connect) implementation can report. Protocol clients
/// built on top of the connection traits map these into their own error
/// types, keeping the "could not send" and "could not receive" cases apart.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Error)]
pub enum Error {
    /// An operation was attempted on a connection that is not open.
    #[error("connection is not open")]
    NotOpen,
    /// An error occurred during a write operation.
    #[error("write failed")]
    WriteError,
    /// An error occurred during a read operation.
    #[error("read failed")]
    ReadError,
    /// A connection attempt was refused.
    #[error("connection refused")]
    ConnectionRefused,
    /// A timeout occurred.
    #[error("operation timed out")]
    Timeout,
    /// The connection was closed.
    #[error("connection closed by peer")]
    ConnectionClosed,
    /// An invalid address was provided.
    #[error("invalid address")]
    InvalidAddress,
    /// A protocol-specific error occurred.
    #[error("protocol error")]
    ProtocolError,
}

impl Error {
    /// Returns `true` when the failure happened before any response byte
    /// could have been produced by the peer.
    pub fn is_send_side(&self) -> bool {
        matches!(
            self,
            Error::NotOpen
                | Error::WriteError
                | Error::ConnectionRefused
                | Error::InvalidAddress
        )
    }
}
