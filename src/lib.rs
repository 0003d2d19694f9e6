//! # libonep - One Platform client SDK
//!
//! A Rust client for the One Platform JSON-RPC API, which lets IoT devices
//! and the services around them store, read and manage time series on the
//! platform.
//!
//! ## Features
//!
//! ### Network
//! - **Connection traits**: protocol code is written against small
//!   read/write/close traits, so any stream can carry it
//! - **HTTP client**: minimal HTTP/1.1 client with fixed-capacity headers
//! - **JSON-RPC**: call batching, deferred per-identity queues, response
//!   demultiplexing and a typed method per remote procedure
//!
//! ### Datastore
//! - Buffered writes flushed by a background worker in one request
//! - Failed live writes kept and recorded later as history
//! - Read cache with expiry and alias lookup cache
//!
//! ## Usage
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! libonep = "0.1.0"
//! ```
//!
//! ### One call
//!
//! ```rust,no_run
//! use libonep::network::application::onep::{
//!     HttpTransport, Identity, OnepClient, ReadOptions, ResourceRef, TransportConfig,
//! };
//! use libonep::network::client::TcpConnector;
//!
//! let config = TransportConfig::default();
//! let client = OnepClient::new(HttpTransport::new(TcpConnector::default(), &config), config);
//! let me = Identity::cik("0123456789012345678901234567890123456789");
//!
//! let reply = client
//!     .read(&me, &ResourceRef::alias("temperature"), &ReadOptions::latest(1))
//!     .unwrap();
//! if reply.success {
//!     println!("{}", reply.payload);
//! }
//! ```
//!
//! ### Custom transports
//!
//! Anything implementing [`Transport`](network::application::onep::Transport)
//! can carry requests, e.g. a TLS stack or a recorded fixture:
//!
//! ```rust
//! use libonep::network::application::onep::{
//!     Identity, OnepClient, Transport, TransportConfig, TransportError, TransportRequest,
//!     TransportResponse,
//! };
//!
//! struct Canned;
//!
//! impl Transport for Canned {
//!     fn transmit(&self, _: &TransportRequest<'_>) -> Result<TransportResponse, TransportError> {
//!         Ok(TransportResponse {
//!             status_code: 200,
//!             body: r#"[{"id": 0, "status": "ok"}]"#.into(),
//!         })
//!     }
//! }
//!
//! let client = OnepClient::new(Canned, TransportConfig::default());
//! let reply = client.unmap(&Identity::cik("k"), "old").unwrap();
//! assert!(reply.is_ok_status());
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

/// Network abstraction layer: connection traits, the HTTP client and the
/// JSON-RPC protocol.
pub mod network;

/// Buffered writes, cached reads and the background flush worker.
pub mod datastore;
