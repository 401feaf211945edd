//! Peer address parsing for direct connections.
//!
//! Peers are addressed by host name or IP literal, optionally with a port.

use std::fmt;
use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use crate::error::{Error, Result};

/// A host and port to dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerAddress {
    /// Host name or IP literal, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl PeerAddress {
    /// Create a peer address.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<SocketAddr> for PeerAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

/// Parse a peer string into a [`PeerAddress`].
///
/// Accepts formats:
/// - `HOST` (e.g., `192.168.1.100`, `laptop.local`) - uses `default_port`
/// - `HOST:PORT` (e.g., `192.168.1.100:9000`) - uses specified port
/// - `IPv6` or `[IPv6]` (e.g., `::1`, `[::1]`) - uses `default_port`
/// - `[IPv6]:PORT` (e.g., `[::1]:9000`) - uses specified port
///
/// # Examples
///
/// ```
/// use dropline_core::connection::parse_peer_address;
///
/// let peer = parse_peer_address("192.168.1.100", 8888).unwrap();
/// assert_eq!(peer.port, 8888);
///
/// let peer = parse_peer_address("laptop.local:9000", 8888).unwrap();
/// assert_eq!(peer.host, "laptop.local");
/// assert_eq!(peer.port, 9000);
/// ```
///
/// # Errors
///
/// Returns `Error::InvalidInput` if the string is empty, the port is not a
/// number, or the host contains characters no host name can have.
pub fn parse_peer_address(input: &str, default_port: u16) -> Result<PeerAddress> {
    let input = input.trim();
    if input.is_empty() {
        return Err(Error::InvalidInput("peer address is empty".to_string()));
    }

    if let Ok(addr) = input.parse::<SocketAddr>() {
        return Ok(addr.into());
    }

    if let Some(rest) = input.strip_prefix('[') {
        let (ip_str, tail) = rest.split_once(']').ok_or_else(|| invalid_format(input))?;
        let ip: Ipv6Addr = ip_str.parse().map_err(|_| invalid_format(input))?;
        let port = match tail {
            "" => default_port,
            _ => {
                let port_str = tail.strip_prefix(':').ok_or_else(|| invalid_format(input))?;
                parse_port(port_str)?
            }
        };
        return Ok(PeerAddress::new(ip.to_string(), port));
    }

    if let Ok(ip) = input.parse::<IpAddr>() {
        return Ok(PeerAddress::new(ip.to_string(), default_port));
    }

    let (host, port) = match input.rsplit_once(':') {
        Some((host, port_str)) if !host.contains(':') => (host, parse_port(port_str)?),
        Some(_) => return Err(invalid_format(input)),
        None => (input, default_port),
    };

    if host.is_empty() || !host.chars().all(is_host_char) {
        return Err(invalid_format(input));
    }

    Ok(PeerAddress::new(host, port))
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_'
}

fn parse_port(port_str: &str) -> Result<u16> {
    port_str.parse().map_err(|_| {
        Error::InvalidInput(format!(
            "Invalid port '{port_str}'. Port must be a number between 0 and 65535"
        ))
    })
}

fn invalid_format(input: &str) -> Error {
    Error::InvalidInput(format!(
        "Invalid peer address '{input}'. Use HOST, HOST:PORT or [IPv6]:PORT (e.g., 192.168.1.100:8888)"
    ))
}
