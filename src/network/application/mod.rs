//! # Application Layer Network Protocols
//!
//! Protocols that run on top of the [`Connection`](crate::network::Connection)
//! traits.
//!
//! - **[`http`]**: HTTP/1.1 client
//! - **[`onep`]**: One Platform JSON-RPC: call batching, deferred queues and
//!   response demultiplexing, carried over [`http`]

/// HTTP client implementation.
pub mod http;

/// One Platform JSON-RPC client.
pub mod onep;
