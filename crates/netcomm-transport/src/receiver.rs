use netcomm_frame::{Advance, FrameParser};
use tracing::{debug, trace, warn};

use crate::address::{ProtocolKind, SocketAddress};
use crate::config::MAX_DATAGRAM_SIZE;
use crate::event::ReceivedEvent;
use crate::socket::{Callback, NetSocket, ReadOutcome};
use crate::watchdog::StallWatchdog;

/// Body of the receive thread started by [`NetSocket::on_receive`].
///
/// Reads until the socket closes or the parser rejects the stream, and
/// dispatches every decoded frame in arrival order.
pub(crate) fn run(socket: NetSocket, callback: Callback) {
    let config = socket.config().clone();
    let mut parser = FrameParser::with_max_body_len(config.max_body_len);
    let mut watchdog = StallWatchdog::new(socket.clone(), callback.clone(), config.stall_timeout);
    let mut buf = vec![0u8; read_buffer_len(socket.protocol(), config.read_buffer_size)];

    debug!(protocol = %socket.protocol(), local = %socket.local_address(), "receive loop started");

    loop {
        match socket.read_chunk(&mut buf) {
            ReadOutcome::Data(n, address) => {
                trace!(len = n, remote = %address, "read chunk");
                parser.append(&buf[..n]);
                if !drain(&mut parser, &socket, &callback, &mut watchdog, address) {
                    break;
                }
            }
            ReadOutcome::Idle => {}
            ReadOutcome::Closed(address) => {
                watchdog.disarm();
                callback(&socket, ReceivedEvent::Closed { address });
                break;
            }
        }
    }

    debug!(local = %socket.local_address(), "receive loop stopped");
}

/// A datagram read drops whatever does not fit the buffer, so datagram
/// sockets always read into room for the largest possible payload.
fn read_buffer_len(protocol: ProtocolKind, configured: usize) -> usize {
    match protocol {
        ProtocolKind::Tcp => configured.max(1),
        ProtocolKind::Udp => configured.max(MAX_DATAGRAM_SIZE),
    }
}

/// Dispatch every complete frame now buffered. Returns false once the stream
/// is unusable.
fn drain(
    parser: &mut FrameParser,
    socket: &NetSocket,
    callback: &Callback,
    watchdog: &mut StallWatchdog,
    address: SocketAddress,
) -> bool {
    loop {
        match parser.advance() {
            Advance::Completed(frame) => {
                watchdog.disarm();
                callback(
                    socket,
                    ReceivedEvent::Completed {
                        command: frame.command,
                        args: frame.args,
                        address: address.clone(),
                    },
                );
            }
            Advance::InProgress => {
                watchdog.arm(&address);
                return true;
            }
            Advance::NoData => return true,
            Advance::ParsingError(err) => {
                watchdog.disarm();
                warn!(error = %err, remote = %address, "frame parsing failed; stopping receive loop");
                callback(socket, ReceivedEvent::ParsingError { address });
                return false;
            }
        }
    }
}
