//! Socket transport for netcomm frames.
//!
//! Wraps TCP and UDP sockets behind one [`NetSocket`] handle:
//! - blocking, serialized sends of encoded frames
//! - a background receive loop that reassembles frames from arbitrary
//!   read boundaries and reports them through a callback
//! - a stall watchdog for frames that stop arriving mid-way
//!
//! [`TcpServer`] accepts stream connections and hands each one over as a
//! [`NetSocket`].

pub mod address;
pub mod config;
pub mod error;
pub mod event;
mod receiver;
pub mod server;
pub mod socket;
mod watchdog;

pub use address::{ProtocolKind, SocketAddress};
pub use config::{
    ServerConfig, SocketConfig, DEFAULT_READ_BUFFER_SIZE, DEFAULT_STALL_TIMEOUT, MAX_DATAGRAM_SIZE,
};
pub use error::{AddressParseError, Result, TransportError};
pub use event::ReceivedEvent;
pub use server::TcpServer;
pub use socket::NetSocket;

/// Connect a stream socket to `address`.
pub fn tcp_connect(address: &SocketAddress) -> Result<NetSocket> {
    NetSocket::connect(address)
}

/// Bind a datagram socket to `address`.
pub fn udp_bind(address: &SocketAddress) -> Result<NetSocket> {
    NetSocket::bind(address)
}

/// Bind a listening stream socket to `address`.
pub fn tcp_listen(address: &SocketAddress) -> Result<TcpServer> {
    TcpServer::listen(address)
}
