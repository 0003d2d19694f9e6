//! A network abstraction layer
//!
//! This module provides the traits protocol clients are written against. A
//! connection is anything that can read, write and be closed; a connector opens
//! connections to a remote address. The JSON-RPC transport only ever talks to
//! these traits, so a TLS stream or an in-memory pipe can be substituted for
//! the plain TCP connector in [`client::tcp`].
//!

#![deny(unsafe_code)]

use core::time::Duration;

/// Common error types for network operations
pub mod error;

/// Concrete connectors
pub mod client;

/// Application layer protocols
pub mod application;

/// Re-exports of common traits
pub mod prelude {
    pub use super::{Close, Connect, Connection, Read, TimedConnect, Write};
}

pub trait Read {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Read data from the connection
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

pub trait Write {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Write data to the connection
    fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error>;
    /// Flush the write buffer
    fn flush(&mut self) -> Result<(), Self::Error>;
}

pub trait Close {
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Close the connection
    fn close(self) -> Result<(), Self::Error>;
}

/// A synchronous connection
pub trait Connection: Read + Write + Close {}

/// A synchronous connector (client)
pub trait Connect {
    /// Associated connection type
    type Connection: Connection;
    /// Associated error type
    type Error: core::fmt::Debug;
    /// Open a connection
    fn connect(&mut self, remote: &str) -> Result<Self::Connection, Self::Error>;
}

/// A connector whose connections carry an I/O deadline.
///
/// `None` opens a connection without any client-side deadline. This is what
/// long-poll calls need, since the server decides when they return.
pub trait TimedConnect: Connect {
    /// Open a connection whose reads and writes give up after `timeout`.
    fn connect_timeout(
        &mut self,
        remote: &str,
        timeout: Option<Duration>,
    ) -> Result<Self::Connection, Self::Error>;
}
