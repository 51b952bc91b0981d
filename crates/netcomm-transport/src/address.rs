use std::fmt;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use crate::error::{AddressParseError, Result, TransportError};

/// Transport protocol of a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    /// Connection-oriented stream socket.
    Tcp,
    /// Connectionless datagram socket.
    Udp,
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolKind::Tcp => f.write_str("TCP"),
            ProtocolKind::Udp => f.write_str("UDP"),
        }
    }
}

/// A host name or IP literal plus port.
///
/// Resolution is deferred until the address is used to connect, bind or send.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketAddress {
    host: String,
    port: u16,
}

impl SocketAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `0.0.0.0:0`, reported when no peer address is known.
    pub fn unspecified() -> Self {
        Self::new("0.0.0.0", 0)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Resolve to every matching socket address.
    pub(crate) fn resolve(&self) -> Result<Vec<SocketAddr>> {
        let addrs: Vec<SocketAddr> = self
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                address: self.clone(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::Resolve {
                address: self.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses found"),
            });
        }
        Ok(addrs)
    }
}

impl fmt::Display for SocketAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for SocketAddress {
    type Err = AddressParseError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddressParseError::MissingPort(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| AddressParseError::InvalidPort(s.to_string()))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        Ok(Self::new(host, port))
    }
}

impl From<SocketAddr> for SocketAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port())
    }
}

impl ToSocketAddrs for SocketAddress {
    type Iter = std::vec::IntoIter<SocketAddr>;

    fn to_socket_addrs(&self) -> io::Result<Self::Iter> {
        (self.host.as_str(), self.port).to_socket_addrs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_host_port() {
        assert_eq!(SocketAddress::new("127.0.0.1", 10010).to_string(), "127.0.0.1:10010");
        assert_eq!(SocketAddress::new("::1", 80).to_string(), "[::1]:80");
        assert_eq!(SocketAddress::unspecified().to_string(), "0.0.0.0:0");
    }

    #[test]
    fn parse_host_port() {
        let addr: SocketAddress = "localhost:8080".parse().unwrap();
        assert_eq!(addr.host(), "localhost");
        assert_eq!(addr.port(), 8080);

        let addr: SocketAddress = "[::1]:9000".parse().unwrap();
        assert_eq!(addr.host(), "::1");
        assert_eq!(addr.port(), 9000);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert_eq!(
            "localhost".parse::<SocketAddress>(),
            Err(AddressParseError::MissingPort("localhost".to_string()))
        );
        assert!(matches!(
            "host:99999".parse::<SocketAddress>(),
            Err(AddressParseError::InvalidPort(_))
        ));
    }

    #[test]
    fn from_std_socket_addr() {
        let std_addr: SocketAddr = "10.0.0.7:4242".parse().unwrap();
        let addr = SocketAddress::from(std_addr);
        assert_eq!(addr, SocketAddress::new("10.0.0.7", 4242));
    }

    #[test]
    fn resolves_ip_literal() {
        let addrs = SocketAddress::new("127.0.0.1", 7).resolve().unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:7".parse::<SocketAddr>().unwrap()]);
    }

    #[test]
    fn protocol_display() {
        assert_eq!(ProtocolKind::Tcp.to_string(), "TCP");
        assert_eq!(ProtocolKind::Udp.to_string(), "UDP");
    }
}
