//! HTTP/1.1 client used as the JSON-RPC carrier.
//!
//! One request per connection. The client reads the status line and
//! headers, then the body by `Content-Length` (or until the peer closes).
//! Headers live in fixed-capacity `heapless` strings; response headers that
//! do not fit are skipped.
//!
//! ```rust,no_run
//! use libonep::network::application::http::{Client, Header, Headers, Method, Request};
//! use libonep::network::{Connect, client::TcpConnector};
//!
//! let mut connector = TcpConnector::default();
//! let connection = connector.connect("m2.exosite.com:80").unwrap();
//! let mut client = Client::new(connection);
//!
//! let mut headers = Headers::new();
//! headers.push(Header::new("Host", "m2.exosite.com").unwrap()).unwrap();
//! let request = Request {
//!     method: Method::Get,
//!     path: "/timestamp",
//!     headers,
//!     body: None,
//! };
//! let response = client.request(&request).unwrap();
//! println!("{}", response.status_code);
//! ```

/// HTTP client implementation and supporting types.
///
/// Contains the main [`Client`](client::Client) struct and all related types
/// for making HTTP requests and handling responses.
pub mod client;

pub use client::{Client, Header, Headers, Method, Request, Response};
