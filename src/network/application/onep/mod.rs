#![allow(missing_docs)]

//! One Platform JSON-RPC
//!
//! Every request is a JSON object with an `auth` block and a list of numbered
//! calls; the platform answers each call separately, in whatever order it
//! likes. This module numbers calls ([`call`]), queues calls to be sent
//! together later ([`deferred`]), matches answers back to calls
//! ([`dispatch`]) and carries the bytes over HTTP ([`transport`]).
//! [`OnepClient`] ties these together.
//!
//! ```rust,no_run
//! use libonep::network::application::onep::{
//!     HttpTransport, Identity, OnepClient, PendingCall, ReadOptions, ResourceRef, TransportConfig,
//! };
//! use libonep::network::client::TcpConnector;
//!
//! let config = TransportConfig::default();
//! let transport = HttpTransport::new(TcpConnector::default(), &config);
//! let client = OnepClient::new(transport, config);
//! let me = Identity::cik("0123456789012345678901234567890123456789");
//!
//! let temp = ResourceRef::alias("temperature");
//! client.defer(&me, PendingCall::write(&temp, 21.5.into()));
//! client.defer(&me, PendingCall::read(&temp, &ReadOptions::latest(1)));
//! for result in client.send_deferred(&me).unwrap() {
//!     println!("{} -> {} {}", result.call.procedure.as_str(), result.success, result.payload);
//! }
//! ```

pub mod auth;
pub mod call;
pub mod client;
pub mod deferred;
pub mod dispatch;
pub mod error;
pub mod method;
pub mod transport;

pub use auth::{Identity, Scope};
pub use call::{CallComposer, CallEnvelope};
pub use client::OnepClient;
pub use deferred::{DeferredRequests, DrainedCalls};
pub use dispatch::{CallResult, Reply};
pub use error::RpcError;
pub use method::{
    DataPoint, DataportDescription, Format, Limit, LookupKind, PendingCall, Procedure, ReadOptions,
    ResourceRef, Sort, Visibility,
};
pub use transport::{
    HttpTransport, Transport, TransportConfig, TransportError, TransportRequest, TransportResponse,
};
