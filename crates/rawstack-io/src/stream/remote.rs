//! Network sources.
//!
//! URL sources go through a [`UrlOpener`]. The built-in [`HttpOpener`]
//! handles `file://` locally and `http://` with a plain HTTP/1.0 GET,
//! optionally through a proxy. Anything else (TLS, auth, other schemes)
//! needs a caller-supplied opener.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::debug;

use crate::observer::ProxySettings;

/// Opens a byte stream for a URL.
pub trait UrlOpener: Send + Sync {
    /// Returns a reader positioned at the first body byte.
    fn open(&self, url: &str, proxy: Option<&ProxySettings>) -> io::Result<Box<dyn Read + Send>>;
}

/// Minimal `http://` and `file://` opener.
#[derive(Debug, Clone, Default)]
pub struct HttpOpener {
    /// Socket read/write timeout.
    pub timeout: Option<Duration>,
}

impl HttpOpener {
    /// Opener with a socket timeout.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl UrlOpener for HttpOpener {
    fn open(&self, url: &str, proxy: Option<&ProxySettings>) -> io::Result<Box<dyn Read + Send>> {
        if let Some(path) = url.strip_prefix("file://") {
            return Ok(Box::new(File::open(path)?));
        }
        let target = HttpTarget::parse(url)?;
        let (connect_host, connect_port, request) = match proxy {
            Some(p) => (p.host.as_str(), p.port, url),
            None => (target.host.as_str(), target.port, target.path.as_str()),
        };
        debug!(url, via = connect_host, port = connect_port, "HTTP GET");

        let mut stream = TcpStream::connect((connect_host, connect_port))?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        write!(
            stream,
            "GET {request} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
            target.authority
        )?;
        stream.flush()?;

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        let status = parse_status(&line)?;
        if !(200..300).contains(&status) {
            return Err(io::Error::other(format!("HTTP {status} for {url}")));
        }
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 || line.trim_end().is_empty() {
                break;
            }
        }
        Ok(Box::new(reader))
    }
}

/// Host, port and path of an `http://` URL.
#[derive(Debug, PartialEq, Eq)]
struct HttpTarget {
    authority: String,
    host: String,
    port: u16,
    path: String,
}

impl HttpTarget {
    fn parse(url: &str) -> io::Result<Self> {
        let rest = url.strip_prefix("http://").ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, format!("unsupported URL scheme: {url}"))
        })?;
        let (authority, path) = match rest.find('/') {
            Some(i) => (&rest[..i], &rest[i..]),
            None => (rest, "/"),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port = p.parse().map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, format!("bad port in {url}"))
                })?;
                (h, port)
            }
            None => (authority, 80),
        };
        if host.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("no host in {url}")));
        }
        Ok(Self {
            authority: authority.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

fn parse_status(line: &str) -> io::Result<u16> {
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(proto), Some(code)) if proto.starts_with("HTTP/") => code
            .parse()
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad HTTP status code")),
        _ => Err(io::Error::new(io::ErrorKind::InvalidData, "bad HTTP status line")),
    }
}
