//! Connector implementations for the [`Connect`](super::Connect) traits.

/// Plain TCP connections backed by `std::net`.
pub mod tcp;

pub use tcp::{TcpConnection, TcpConnector};
