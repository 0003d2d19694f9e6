use crate::network::error::Error;
use crate::network::{Close, Connect, Connection, Read, TimedConnect, Write};
use core::time::Duration;
use std::io::{ErrorKind, Read as StdRead, Write as StdWrite};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};

/// A TCP connection implementing the crate's connection traits.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl TcpConnection {
    /// Wrap an already connected stream.
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }
}

impl Read for TcpConnection {
    type Error = Error;

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        self.stream.read(buf).map_err(|e| match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => Error::Timeout,
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => Error::ConnectionClosed,
            _ => Error::ReadError,
        })
    }
}

impl Write for TcpConnection {
    type Error = Error;

    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        self.stream.write(buf).map_err(|_| Error::WriteError)
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.stream.flush().map_err(|_| Error::WriteError)
    }
}

impl Close for TcpConnection {
    type Error = Error;

    fn close(self) -> Result<(), Self::Error> {
        match self.stream.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            // The peer already hung up, which is what we wanted.
            Err(e) if e.kind() == ErrorKind::NotConnected => Ok(()),
            Err(_) => Err(Error::ConnectionClosed),
        }
    }
}

impl Connection for TcpConnection {}

/// Opens plain TCP connections.
///
/// `remote` is a `host:port` string. TLS is not handled here; wrap another
/// [`TimedConnect`] implementation around a TLS stream when HTTPS is needed.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Deadline applied by [`Connect::connect`].
    pub default_timeout: Option<Duration>,
}

impl TcpConnector {
    /// Create a connector whose plain `connect` uses `default_timeout`.
    pub fn new(default_timeout: Option<Duration>) -> Self {
        Self { default_timeout }
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(Some(Duration::from_secs(3)))
    }
}

impl Connect for TcpConnector {
    type Connection = TcpConnection;
    type Error = Error;

    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error> {
        let timeout = self.default_timeout;
        self.connect_timeout(remote, timeout)
    }
}

impl TimedConnect for TcpConnector {
    fn connect_timeout(
        &mut self,
        remote: &str,
        timeout: Option<Duration>,
    ) -> Result<Self::Connection, Self::Error> {
        let addrs = remote
            .to_socket_addrs()
            .map_err(|_| Error::InvalidAddress)?;

        let mut last_error = Error::InvalidAddress;
        for addr in addrs {
            let attempt = match timeout {
                Some(t) => TcpStream::connect_timeout(&addr, t),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    // A zero duration is rejected by std; treat it as "no deadline".
                    let deadline = timeout.filter(|t| !t.is_zero());
                    stream
                        .set_read_timeout(deadline)
                        .map_err(|_| Error::NotOpen)?;
                    stream
                        .set_write_timeout(deadline)
                        .map_err(|_| Error::NotOpen)?;
                    return Ok(TcpConnection::new(stream));
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => last_error = Error::Timeout,
                Err(_) => last_error = Error::ConnectionRefused,
            }
        }
        Err(last_error)
    }
}
