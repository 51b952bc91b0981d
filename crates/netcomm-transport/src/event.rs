use netcomm_frame::ArgumentList;

use crate::address::SocketAddress;

/// What a receive callback observes.
#[derive(Debug, Clone, PartialEq)]
pub enum ReceivedEvent {
    /// A frame was decoded.
    Completed {
        command: u8,
        args: ArgumentList,
        address: SocketAddress,
    },
    /// A partial frame made no progress within the stall timeout. Advisory:
    /// the connection stays open.
    Interrupted { address: SocketAddress },
    /// The byte stream violated the wire format. The receive loop has stopped.
    ParsingError { address: SocketAddress },
    /// The peer closed the connection, or the socket was closed locally.
    Closed { address: SocketAddress },
}

impl ReceivedEvent {
    /// Sender of the bytes this event was derived from.
    pub fn address(&self) -> &SocketAddress {
        match self {
            ReceivedEvent::Completed { address, .. }
            | ReceivedEvent::Interrupted { address }
            | ReceivedEvent::ParsingError { address }
            | ReceivedEvent::Closed { address } => address,
        }
    }

    /// Short lowercase name, for logs and output.
    pub fn name(&self) -> &'static str {
        match self {
            ReceivedEvent::Completed { .. } => "completed",
            ReceivedEvent::Interrupted { .. } => "interrupted",
            ReceivedEvent::ParsingError { .. } => "parsing_error",
            ReceivedEvent::Closed { .. } => "closed",
        }
    }

    /// True if no further events follow on the same socket.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReceivedEvent::ParsingError { .. } | ReceivedEvent::Closed { .. }
        )
    }
}
