//! Moving serialized requests to the platform and bringing bodies back.

use super::error::RpcError;
use crate::network::application::http::{Client, Header, Headers, Method, Request};
use crate::network::error::Error as NetworkError;
use crate::network::{Close, TimedConnect};
use core::time::Duration;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::debug;

/// Where and how to reach the RPC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    /// API host name or address.
    pub host: String,
    pub port: u16,
    /// Path of the RPC handler.
    pub path: String,
    /// Whether the endpoint is reached over TLS. The connector given to
    /// [`HttpTransport`] is responsible for actually wrapping the stream.
    pub https: bool,
    /// Per-request deadline. Long-poll batches ignore it.
    pub timeout: Duration,
    /// Sent as `User-Agent` when set.
    pub user_agent: Option<String>,
    /// Keep a copy of every request body sent.
    pub log_requests: bool,
    /// Id given to the first call composed.
    pub start_id: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            host: "m2.exosite.com".into(),
            port: 80,
            path: "/onep:v1/rpc/process".into(),
            https: false,
            timeout: Duration::from_secs(3),
            user_agent: None,
            log_requests: false,
            start_id: 0,
        }
    }
}

impl TransportConfig {
    /// Defaults for the TLS endpoint on port 443.
    pub fn https() -> Self {
        Self {
            https: true,
            port: 443,
            ..Self::default()
        }
    }

    /// `host:port` as given to the connector.
    pub fn remote(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Failures below the JSON layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nothing (or not all) of the request reached the server.
    #[error("{0}")]
    Transmission(String),
    /// The request was sent but the response could not be read.
    #[error("{0}")]
    ResponseRead(String),
}

impl From<TransportError> for RpcError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Transmission(reason) => RpcError::RequestTransmission(reason),
            TransportError::ResponseRead(reason) => RpcError::ResponseRead(reason),
        }
    }
}

/// One outgoing request as handed to a [`Transport`].
#[derive(Debug)]
pub struct TransportRequest<'a> {
    pub method: Method,
    pub path: &'a str,
    pub body: &'a [u8],
    pub headers: &'a Headers,
    /// Send without any client-side deadline.
    pub no_timeout: bool,
}

/// What came back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
}

/// Carries request bodies to the platform.
///
/// Implementations are shared between the caller and the datastore's flush
/// worker, hence `&self` and `Send + Sync`.
pub trait Transport: Send + Sync {
    fn transmit(
        &self,
        request: &TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn transmit(
        &self,
        request: &TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        (**self).transmit(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transmit(
        &self,
        request: &TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        (**self).transmit(request)
    }
}

/// [`Transport`] over the crate's HTTP client.
///
/// A fresh connection is opened for every request, with the configured
/// deadline or none at all for long-poll batches.
#[derive(Debug)]
pub struct HttpTransport<K> {
    connector: Mutex<K>,
    remote: String,
    host_header: String,
    timeout: Duration,
}

impl<K> HttpTransport<K>
where
    K: TimedConnect,
{
    pub fn new(connector: K, config: &TransportConfig) -> Self {
        Self {
            connector: Mutex::new(connector),
            remote: config.remote(),
            host_header: config.remote(),
            timeout: config.timeout,
        }
    }
}

impl<K> Transport for HttpTransport<K>
where
    K: TimedConnect + Send,
    K::Connection: Send,
{
    fn transmit(
        &self,
        request: &TransportRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        let mut headers = Headers::new();
        let host = Header::new("Host", &self.host_header)
            .map_err(|e| TransportError::Transmission(format!("host header: {e}")))?;
        headers
            .push(host)
            .map_err(|_| TransportError::Transmission("too many request headers".into()))?;
        for header in request.headers {
            headers.push(header.clone()).map_err(|_| {
                TransportError::Transmission("too many request headers".into())
            })?;
        }

        let deadline = (!request.no_timeout).then_some(self.timeout);
        let connection = {
            let mut connector = self.connector.lock().unwrap_or_else(PoisonError::into_inner);
            connector
                .connect_timeout(&self.remote, deadline)
                .map_err(|e| {
                    TransportError::Transmission(format!("connect to {}: {e:?}", self.remote))
                })?
        };

        let mut client = Client::new(connection);
        let result = client.request(&Request {
            method: request.method,
            path: request.path,
            headers,
            body: Some(request.body),
        });
        if let Err(e) = client.into_inner().close() {
            debug!(error = ?e, "closing rpc connection failed");
        }

        let response = result.map_err(|e: NetworkError| {
            if e.is_send_side() {
                TransportError::Transmission(e.to_string())
            } else {
                TransportError::ResponseRead(e.to_string())
            }
        })?;

        let body = String::from_utf8(response.body)
            .map_err(|e| TransportError::ResponseRead(format!("response is not UTF-8: {e}")))?;
        Ok(TransportResponse {
            status_code: response.status_code,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Connect, Connection, Read, Write};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Wire {
        written: Mutex<Vec<u8>>,
        deadlines: Mutex<Vec<Option<Duration>>>,
    }

    struct Loopback {
        wire: Arc<Wire>,
        reply: &'static [u8],
        pos: usize,
    }

    impl Read for Loopback {
        type Error = NetworkError;
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf.len().min(self.reply.len() - self.pos);
            buf[..n].copy_from_slice(&self.reply[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for Loopback {
        type Error = NetworkError;
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.wire.written.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl Close for Loopback {
        type Error = NetworkError;
        fn close(self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl Connection for Loopback {}

    struct LoopbackConnector {
        wire: Arc<Wire>,
        reply: &'static [u8],
        refuse: bool,
        opened: AtomicUsize,
    }

    impl Connect for LoopbackConnector {
        type Connection = Loopback;
        type Error = NetworkError;
        fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error> {
            self.connect_timeout(remote, None)
        }
    }

    impl TimedConnect for LoopbackConnector {
        fn connect_timeout(
            &mut self,
            _remote: &str,
            timeout: Option<Duration>,
        ) -> Result<Self::Connection, Self::Error> {
            if self.refuse {
                return Err(NetworkError::ConnectionRefused);
            }
            self.opened.fetch_add(1, Ordering::Relaxed);
            self.wire.deadlines.lock().unwrap().push(timeout);
            Ok(Loopback {
                wire: self.wire.clone(),
                reply: self.reply,
                pos: 0,
            })
        }
    }

    fn transport(
        reply: &'static [u8],
        refuse: bool,
    ) -> (HttpTransport<LoopbackConnector>, Arc<Wire>) {
        let wire = Arc::new(Wire::default());
        let connector = LoopbackConnector {
            wire: wire.clone(),
            reply,
            refuse,
            opened: AtomicUsize::new(0),
        };
        (HttpTransport::new(connector, &TransportConfig::default()), wire)
    }

    fn post<'a>(body: &'a [u8], headers: &'a Headers, no_timeout: bool) -> TransportRequest<'a> {
        TransportRequest {
            method: Method::Post,
            path: "/onep:v1/rpc/process",
            body,
            headers,
            no_timeout,
        }
    }

    #[test]
    fn posts_body_with_host_header() {
        let (transport, wire) = transport(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n[]", false);
        let headers = Headers::new();
        let response = transport.transmit(&post(b"{}", &headers, false)).unwrap();
        assert_eq!(response.body, "[]");

        let sent = String::from_utf8(wire.written.lock().unwrap().clone()).unwrap();
        assert!(sent.starts_with("POST /onep:v1/rpc/process HTTP/1.1\r\nHost: m2.exosite.com:80\r\n"));
        assert!(sent.ends_with("\r\n\r\n{}"));
    }

    #[test]
    fn long_poll_opens_connection_without_deadline() {
        let (transport, wire) = transport(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n[]", false);
        let headers = Headers::new();
        transport.transmit(&post(b"{}", &headers, false)).unwrap();
        transport.transmit(&post(b"{}", &headers, true)).unwrap();
        assert_eq!(
            *wire.deadlines.lock().unwrap(),
            vec![Some(Duration::from_secs(3)), None]
        );
    }

    #[test]
    fn refused_connection_is_a_transmission_error() {
        let (transport, _) = transport(b"", true);
        let headers = Headers::new();
        let err = transport.transmit(&post(b"{}", &headers, false)).unwrap_err();
        assert!(matches!(err, TransportError::Transmission(_)));
        assert!(matches!(RpcError::from(err), RpcError::RequestTransmission(_)));
    }

    #[test]
    fn header_overflow_fails_before_connecting() {
        let (transport, wire) = transport(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n[]", false);
        let mut headers = Headers::new();
        for i in 0..headers.capacity() {
            headers.push(Header::new(&format!("X-Extra-{i}"), "1").unwrap()).unwrap();
        }
        let err = transport.transmit(&post(b"{}", &headers, false)).unwrap_err();
        assert!(matches!(err, TransportError::Transmission(ref m) if m.contains("too many")));
        assert!(wire.deadlines.lock().unwrap().is_empty());
        assert!(wire.written.lock().unwrap().is_empty());
    }

    #[test]
    fn silent_peer_is_a_response_read_error() {
        let (transport, _) = transport(b"", false);
        let headers = Headers::new();
        let err = transport.transmit(&post(b"{}", &headers, false)).unwrap_err();
        assert!(matches!(err, TransportError::ResponseRead(_)));
    }

    #[test]
    fn https_defaults_to_port_443() {
        let config = TransportConfig::https();
        assert!(config.https);
        assert_eq!(config.remote(), "m2.exosite.com:443");
        assert_eq!(config.path, TransportConfig::default().path);
    }
}
