use crate::address::SocketAddress;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The address could not be resolved to a socket address.
    #[error("failed to resolve {address}: {source}")]
    Resolve {
        address: SocketAddress,
        source: std::io::Error,
    },

    /// Failed to bind to the specified address.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: SocketAddress,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: SocketAddress,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport stopped accepting bytes before the whole frame was written.
    #[error("send stalled after {sent} of {total} bytes")]
    SendStalled { sent: usize, total: usize },

    /// A datagram socket was asked to send without a destination.
    #[error("datagram send requires a destination address")]
    DestinationRequired,

    /// A receive loop is already running on this socket.
    #[error("receive loop already running")]
    AlreadyReceiving,

    /// The socket has been closed.
    #[error("socket closed")]
    Closed,
}

/// Failure to parse a `host:port` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("missing port in address {0:?}")]
    MissingPort(String),

    #[error("invalid port in address {0:?}")]
    InvalidPort(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
