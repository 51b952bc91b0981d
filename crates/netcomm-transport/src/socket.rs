use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::address::{ProtocolKind, SocketAddress};
use crate::config::SocketConfig;
use crate::error::{Result, TransportError};
use crate::event::ReceivedEvent;
use crate::receiver;

/// Receive callback shared between the receive loop and its stall watchdog.
pub(crate) type Callback = Arc<dyn Fn(&NetSocket, ReceivedEvent) + Send + Sync>;

/// A connected stream socket or a bound datagram socket.
///
/// Handles are cheap to clone; every clone refers to the same socket. Sends
/// from any number of threads are serialized so that frames never interleave
/// on the wire.
#[derive(Clone)]
pub struct NetSocket {
    shared: Arc<Shared>,
}

struct Shared {
    inner: SocketInner,
    local_address: SocketAddress,
    remote_address: Option<SocketAddress>,
    config: SocketConfig,
    connected: AtomicBool,
    closed: AtomicBool,
    receiving: AtomicBool,
    send_lock: Mutex<()>,
}

enum SocketInner {
    Tcp(TcpStream),
    Udp(UdpSocket),
}

/// Result of one blocking read on behalf of the receive loop.
pub(crate) enum ReadOutcome {
    /// `n` bytes were read into the buffer from `address`.
    Data(usize, SocketAddress),
    /// Nothing arrived within the poll interval.
    Idle,
    /// No further reads are possible.
    Closed(SocketAddress),
}

impl NetSocket {
    /// Connect a stream socket to `address` (blocking).
    pub fn connect(address: &SocketAddress) -> Result<Self> {
        Self::connect_with_config(address, SocketConfig::default())
    }

    /// Connect a stream socket with explicit configuration.
    pub fn connect_with_config(address: &SocketAddress, config: SocketConfig) -> Result<Self> {
        let addrs = address.resolve()?;
        let stream = TcpStream::connect(&addrs[..]).map_err(|e| TransportError::Connect {
            address: address.clone(),
            source: e,
        })?;
        let socket = Self::from_tcp_stream(stream, config)?;
        info!(local = %socket.local_address(), remote = %address, "connected");
        Ok(socket)
    }

    /// Bind a datagram socket to `address`.
    pub fn bind(address: &SocketAddress) -> Result<Self> {
        Self::bind_with_config(address, SocketConfig::default())
    }

    /// Bind a datagram socket with explicit configuration.
    pub fn bind_with_config(address: &SocketAddress, config: SocketConfig) -> Result<Self> {
        let addrs = address.resolve()?;
        let socket = UdpSocket::bind(&addrs[..]).map_err(|e| TransportError::Bind {
            address: address.clone(),
            source: e,
        })?;
        // Bounded reads let the receive loop notice a local close.
        socket.set_read_timeout(Some(config.poll_interval.max(Duration::from_millis(1))))?;
        let local_address = SocketAddress::from(socket.local_addr()?);
        info!(local = %local_address, "bound datagram socket");

        Ok(Self {
            shared: Arc::new(Shared {
                inner: SocketInner::Udp(socket),
                local_address,
                remote_address: None,
                config,
                connected: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                receiving: AtomicBool::new(false),
                send_lock: Mutex::new(()),
            }),
        })
    }

    /// Wrap an already connected stream, as produced by connect or accept.
    pub(crate) fn from_tcp_stream(stream: TcpStream, config: SocketConfig) -> Result<Self> {
        stream.set_write_timeout(config.write_timeout)?;
        let local_address = SocketAddress::from(stream.local_addr()?);
        let remote_address = SocketAddress::from(stream.peer_addr()?);

        Ok(Self {
            shared: Arc::new(Shared {
                inner: SocketInner::Tcp(stream),
                local_address,
                remote_address: Some(remote_address),
                config,
                connected: AtomicBool::new(true),
                closed: AtomicBool::new(false),
                receiving: AtomicBool::new(false),
                send_lock: Mutex::new(()),
            }),
        })
    }

    pub fn protocol(&self) -> ProtocolKind {
        match self.shared.inner {
            SocketInner::Tcp(_) => ProtocolKind::Tcp,
            SocketInner::Udp(_) => ProtocolKind::Udp,
        }
    }

    pub fn local_address(&self) -> &SocketAddress {
        &self.shared.local_address
    }

    /// Peer of a stream socket. Datagram sockets have none.
    pub fn remote_address(&self) -> Option<&SocketAddress> {
        self.shared.remote_address.as_ref()
    }

    pub fn config(&self) -> &SocketConfig {
        &self.shared.config
    }

    /// Whether a stream socket is believed live.
    ///
    /// Becomes false once a read observes end of stream or an error, or after
    /// [`close`](Self::close). Always false for datagram sockets.
    pub fn is_connected(&self) -> bool {
        matches!(self.shared.inner, SocketInner::Tcp(_))
            && self.shared.connected.load(Ordering::Acquire)
            && !self.is_closed()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Send `data` over a stream socket, blocking until every byte is written.
    ///
    /// Datagram sockets need a destination; use [`send_to`](Self::send_to).
    pub fn send(&self, data: &[u8]) -> Result<()> {
        match &self.shared.inner {
            SocketInner::Tcp(stream) => self.send_stream(stream, data),
            SocketInner::Udp(_) => Err(TransportError::DestinationRequired),
        }
    }

    /// Send `data` to `destination`.
    ///
    /// On a stream socket the destination is implied by the connection and
    /// `destination` is ignored.
    pub fn send_to(&self, data: &[u8], destination: &SocketAddress) -> Result<()> {
        match &self.shared.inner {
            SocketInner::Tcp(stream) => self.send_stream(stream, data),
            SocketInner::Udp(socket) => {
                if self.is_closed() {
                    return Err(TransportError::Closed);
                }
                let local_is_v4 = socket.local_addr()?.is_ipv4();
                let candidates = destination.resolve()?;
                let target = candidates
                    .iter()
                    .find(|addr| addr.is_ipv4() == local_is_v4)
                    .unwrap_or(&candidates[0]);
                let _guard = self.lock_send();
                write_fully(data, |buf| socket.send_to(buf, *target))?;
                debug!(len = data.len(), to = %destination, "sent datagram");
                Ok(())
            }
        }
    }

    fn send_stream(&self, stream: &TcpStream, data: &[u8]) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let _guard = self.lock_send();
        let mut writer = stream;
        write_fully(data, |buf| writer.write(buf))?;
        self.shared.connected.store(true, Ordering::Release);
        debug!(len = data.len(), "sent frame");
        Ok(())
    }

    fn lock_send(&self) -> std::sync::MutexGuard<'_, ()> {
        self.shared
            .send_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the receive loop on a background thread.
    ///
    /// `callback` is invoked from the receive thread for decoded frames,
    /// parse failures and closure, and from the stall watchdog thread for
    /// interrupted frames. Only one loop may run per socket.
    pub fn on_receive<F>(&self, callback: F) -> Result<JoinHandle<()>>
    where
        F: Fn(&NetSocket, ReceivedEvent) + Send + Sync + 'static,
    {
        if self.shared.receiving.swap(true, Ordering::AcqRel) {
            return Err(TransportError::AlreadyReceiving);
        }

        let socket = self.clone();
        let callback: Callback = Arc::new(callback);
        thread::Builder::new()
            .name(format!("netcomm-recv-{}", self.local_address()))
            .spawn(move || receiver::run(socket, callback))
            .map_err(|e| {
                self.shared.receiving.store(false, Ordering::Release);
                TransportError::Io(e)
            })
    }

    /// Close the socket. Idempotent.
    ///
    /// A running receive loop reports [`ReceivedEvent::Closed`] and exits.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.connected.store(false, Ordering::Release);
        if let SocketInner::Tcp(stream) = &self.shared.inner {
            let _ = stream.shutdown(Shutdown::Both);
        }
        debug!(protocol = %self.protocol(), local = %self.local_address(), "socket closed");
    }

    /// Block for the next chunk of input.
    pub(crate) fn read_chunk(&self, buf: &mut [u8]) -> ReadOutcome {
        match &self.shared.inner {
            SocketInner::Tcp(stream) => {
                let peer = self
                    .remote_address()
                    .cloned()
                    .unwrap_or_else(SocketAddress::unspecified);
                if self.is_closed() {
                    return ReadOutcome::Closed(peer);
                }
                let mut reader = stream;
                loop {
                    match reader.read(buf) {
                        Ok(0) => break,
                        Ok(n) => return ReadOutcome::Data(n, peer),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            debug!(error = %e, remote = %peer, "stream read failed");
                            break;
                        }
                    }
                }
                self.shared.connected.store(false, Ordering::Release);
                ReadOutcome::Closed(peer)
            }
            SocketInner::Udp(socket) => {
                if self.is_closed() {
                    return ReadOutcome::Closed(SocketAddress::unspecified());
                }
                match socket.recv_from(buf) {
                    // An empty datagram carries nothing to parse.
                    Ok((0, _)) => ReadOutcome::Idle,
                    Ok((n, from)) => ReadOutcome::Data(n, SocketAddress::from(from)),
                    Err(e) if is_transient(&e) => ReadOutcome::Idle,
                    Err(e) => {
                        debug!(error = %e, local = %self.local_address(), "datagram read failed");
                        ReadOutcome::Closed(SocketAddress::unspecified())
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for NetSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetSocket")
            .field("protocol", &self.protocol())
            .field("local_address", self.local_address())
            .field("remote_address", &self.remote_address())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Datagram read errors that leave the socket usable: the poll timeout, a
/// signal, or an ICMP unreachable reported against an earlier send.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
            | io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

/// Drive `write` until all of `data` is accepted.
///
/// Interrupted writes are retried. A write that makes no progress, or that
/// times out, ends the send with [`TransportError::SendStalled`].
fn write_fully<F>(data: &[u8], mut write: F) -> Result<()>
where
    F: FnMut(&[u8]) -> io::Result<usize>,
{
    let mut sent = 0;
    while sent < data.len() {
        match write(&data[sent..]) {
            Ok(0) => {
                return Err(TransportError::SendStalled {
                    sent,
                    total: data.len(),
                })
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e)
                if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut =>
            {
                return Err(TransportError::SendStalled {
                    sent,
                    total: data.len(),
                })
            }
            Err(e) => return Err(TransportError::Io(e)),
        }
    }
    Ok(())
}
