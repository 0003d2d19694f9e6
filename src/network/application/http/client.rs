use crate::network::Connection;
use crate::network::error::Error;
use heapless::{String, Vec};

/// Maximum number of headers carried by a request or response.
pub const MAX_HEADERS: usize = 16;
/// Maximum length of a header name.
pub const MAX_HEADER_NAME_LEN: usize = 64;
/// Maximum length of a header value.
pub const MAX_HEADER_VALUE_LEN: usize = 256;

const READ_CHUNK: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String<MAX_HEADER_NAME_LEN>,
    pub value: String<MAX_HEADER_VALUE_LEN>,
}

impl Header {
    /// Build a header, failing if either part exceeds its fixed capacity.
    pub fn new(name: &str, value: &str) -> Result<Self, Error> {
        Ok(Self {
            name: String::try_from(name).map_err(|_| Error::ProtocolError)?,
            value: String::try_from(value).map_err(|_| Error::ProtocolError)?,
        })
    }
}

pub type Headers = Vec<Header, MAX_HEADERS>;

#[derive(Debug)]
pub struct Request<'a> {
    pub method: Method,
    pub path: &'a str,
    pub headers: Headers,
    pub body: Option<&'a [u8]>,
}

#[derive(Debug)]
pub struct Response {
    pub status_code: u16,
    pub headers: Headers,
    pub body: std::vec::Vec<u8>,
}

impl Response {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// A minimal HTTP/1.1 client over any [`Connection`].
///
/// One request is sent per connection; the body is read until
/// `Content-Length` bytes arrived, or until the peer closes when the header
/// is absent.
#[derive(Debug)]
pub struct Client<C: Connection> {
    connection: C,
}

impl<C: Connection> Client<C> {
    pub fn new(connection: C) -> Self {
        Self { connection }
    }

    /// Give the connection back, e.g. to close it.
    pub fn into_inner(self) -> C {
        self.connection
    }

    pub fn request(&mut self, request: &Request) -> Result<Response, Error> {
        let request_buf = encode_request(request);

        // --- Send Request ---
        let mut written = 0;
        while written < request_buf.len() {
            match self.connection.write(&request_buf[written..]) {
                Ok(0) => return Err(Error::WriteError),
                Ok(n) => written += n,
                Err(_) => return Err(Error::WriteError),
            }
        }
        self.connection.flush().map_err(|_| Error::WriteError)?;

        // --- Receive Headers ---
        let mut response_buf: std::vec::Vec<u8> = std::vec::Vec::with_capacity(READ_CHUNK);
        let mut chunk = [0u8; READ_CHUNK];
        let header_end_pos = loop {
            if let Some(pos) = find_slice(&response_buf, b"\r\n\r\n") {
                break pos;
            }
            match self.connection.read(&mut chunk) {
                Ok(0) if response_buf.is_empty() => return Err(Error::ConnectionClosed),
                Ok(0) => return Err(Error::ProtocolError),
                Ok(n) => response_buf.extend_from_slice(&chunk[..n]),
                Err(_) => return Err(Error::ReadError),
            }
        };

        // --- Parse Response ---
        let header_str = core::str::from_utf8(&response_buf[..header_end_pos])
            .map_err(|_| Error::ProtocolError)?;
        let mut lines = header_str.lines();

        // Parse status line
        let status_line = lines.next().ok_or(Error::ProtocolError)?;
        let mut status_parts = status_line.splitn(3, ' ');
        status_parts.next(); // Skip HTTP version
        let status_code = status_parts
            .next()
            .ok_or(Error::ProtocolError)?
            .parse::<u16>()
            .map_err(|_| Error::ProtocolError)?;

        // Parse headers
        let mut response_headers = Headers::new();
        let mut content_length: Option<usize> = None;
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let mut parts = line.splitn(2, ':');
            let name = parts.next().ok_or(Error::ProtocolError)?.trim();
            let value = parts.next().ok_or(Error::ProtocolError)?.trim();

            if name.eq_ignore_ascii_case("Content-Length") {
                content_length = value.parse::<usize>().ok();
            }

            // Headers we have no room for are skipped; the body is what matters.
            if let Ok(header) = Header::new(name, value) {
                let _ = response_headers.push(header);
            }
        }

        let mut body = response_buf.split_off(header_end_pos + 4);

        // --- Receive Body ---
        match content_length {
            Some(len) => {
                while body.len() < len {
                    match self.connection.read(&mut chunk) {
                        Ok(0) => return Err(Error::ConnectionClosed), // Prematurely closed
                        Ok(n) => body.extend_from_slice(&chunk[..n]),
                        Err(_) => return Err(Error::ReadError),
                    }
                }
                body.truncate(len);
            }
            None => loop {
                match self.connection.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => body.extend_from_slice(&chunk[..n]),
                    Err(_) => return Err(Error::ReadError),
                }
            },
        }

        Ok(Response {
            status_code,
            headers: response_headers,
            body,
        })
    }
}

fn encode_request(request: &Request) -> std::vec::Vec<u8> {
    let body_len = request.body.map_or(0, <[u8]>::len);
    let mut buf = std::vec::Vec::with_capacity(256 + body_len);

    // Request line
    buf.extend_from_slice(request.method.as_str().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(request.path.as_bytes());
    buf.extend_from_slice(b" HTTP/1.1\r\n");

    // Headers
    for header in &request.headers {
        buf.extend_from_slice(header.name.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(header.value.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    // Body
    match request.body {
        Some(body) => {
            buf.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
            buf.extend_from_slice(body);
        }
        None => buf.extend_from_slice(b"\r\n"),
    }
    buf
}

/// Finds the first occurrence of a slice in another slice and returns its starting position.
fn find_slice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{Close, Read, Write};

    struct Scripted {
        incoming: std::vec::Vec<u8>,
        pos: usize,
        chunk: usize,
        written: std::vec::Vec<u8>,
    }

    impl Scripted {
        fn new(incoming: &[u8], chunk: usize) -> Self {
            Self {
                incoming: incoming.to_vec(),
                pos: 0,
                chunk,
                written: std::vec::Vec::new(),
            }
        }
    }

    impl Read for Scripted {
        type Error = Error;
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
            let n = buf
                .len()
                .min(self.chunk)
                .min(self.incoming.len() - self.pos);
            buf[..n].copy_from_slice(&self.incoming[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    impl Write for Scripted {
        type Error = Error;
        fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl Close for Scripted {
        type Error = Error;
        fn close(self) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    impl Connection for Scripted {}

    #[test]
    fn post_writes_content_length_and_body() {
        let conn = Scripted::new(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\n[]", 512);
        let mut client = Client::new(conn);
        let mut headers = Headers::new();
        headers.push(Header::new("Host", "m2.exosite.com:80").unwrap()).unwrap();
        let request = Request {
            method: Method::Post,
            path: "/onep:v1/rpc/process",
            headers,
            body: Some(b"{\"calls\":[]}"),
        };

        let response = client.request(&request).unwrap();
        assert_eq!(response.status_code, 200);
        assert_eq!(response.body, b"[]");

        let sent = std::string::String::from_utf8(client.into_inner().written).unwrap();
        assert!(sent.starts_with("POST /onep:v1/rpc/process HTTP/1.1\r\n"));
        assert!(sent.contains("Host: m2.exosite.com:80\r\n"));
        assert!(sent.contains("Content-Length: 12\r\n\r\n{\"calls\":[]}"));
    }

    #[test]
    fn only_given_headers_are_sent() {
        let conn = Scripted::new(b"HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n", 512);
        let mut client = Client::new(conn);
        let request = Request {
            method: Method::Get,
            path: "/",
            headers: Headers::new(),
            body: None,
        };
        client.request(&request).unwrap();

        let sent = std::string::String::from_utf8(client.into_inner().written).unwrap();
        assert_eq!(sent, "GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn body_spanning_many_reads_is_reassembled() {
        let body = "x".repeat(5000);
        let raw = format!("HTTP/1.1 200 OK\r\ncontent-length: {}\r\n\r\n{}", body.len(), body);
        let mut client = Client::new(Scripted::new(raw.as_bytes(), 7));
        let request = Request {
            method: Method::Get,
            path: "/",
            headers: Headers::new(),
            body: None,
        };

        let response = client.request(&request).unwrap();
        assert_eq!(response.body.len(), 5000);
        assert_eq!(response.header("Content-Length"), Some("5000"));
    }

    #[test]
    fn body_without_length_reads_until_close() {
        let mut client = Client::new(Scripted::new(b"HTTP/1.0 200 OK\r\n\r\n{\"error\":1}", 4));
        let request = Request {
            method: Method::Get,
            path: "/",
            headers: Headers::new(),
            body: None,
        };
        assert_eq!(client.request(&request).unwrap().body, b"{\"error\":1}");
    }

    #[test]
    fn truncated_body_reports_closed_connection() {
        let mut client = Client::new(Scripted::new(
            b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc",
            64,
        ));
        let request = Request {
            method: Method::Get,
            path: "/",
            headers: Headers::new(),
            body: None,
        };
        assert_eq!(client.request(&request).unwrap_err(), Error::ConnectionClosed);
    }

    #[test]
    fn empty_reply_is_connection_closed() {
        let mut client = Client::new(Scripted::new(b"", 64));
        let request = Request {
            method: Method::Get,
            path: "/",
            headers: Headers::new(),
            body: None,
        };
        assert_eq!(client.request(&request).unwrap_err(), Error::ConnectionClosed);
    }
}
