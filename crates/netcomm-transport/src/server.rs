use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::address::SocketAddress;
use crate::config::{ServerConfig, SocketConfig};
use crate::error::{Result, TransportError};
use crate::socket::NetSocket;

/// How long `close` waits for its wake-up connection to be accepted.
const WAKE_TIMEOUT: Duration = Duration::from_secs(1);

/// A listening stream socket that hands accepted connections to a callback.
///
/// The accept loop blocks in `accept` until [`close`](Self::close) is called
/// or the server is dropped. Failed accepts are retried with exponential
/// backoff.
pub struct TcpServer {
    listener: Arc<TcpListener>,
    local_address: SocketAddress,
    wake_address: SocketAddr,
    config: ServerConfig,
    running: Arc<AtomicBool>,
}

impl TcpServer {
    /// Bind and listen on `address`.
    pub fn listen(address: &SocketAddress) -> Result<Self> {
        Self::listen_with_config(address, ServerConfig::default())
    }

    /// Bind and listen with explicit configuration.
    pub fn listen_with_config(address: &SocketAddress, config: ServerConfig) -> Result<Self> {
        let addrs = address.resolve()?;
        let listener = TcpListener::bind(&addrs[..]).map_err(|e| TransportError::Bind {
            address: address.clone(),
            source: e,
        })?;
        let bound = listener.local_addr()?;
        let local_address = SocketAddress::from(bound);

        info!(address = %local_address, "listening");

        Ok(Self {
            listener: Arc::new(listener),
            local_address,
            wake_address: wake_address(bound),
            config,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// The bound address, with the actual port when 0 was requested.
    pub fn local_address(&self) -> &SocketAddress {
        &self.local_address
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the accept loop on a background thread.
    ///
    /// `callback` receives each accepted connection, already configured with
    /// the server's socket settings.
    pub fn on_accept<F>(&self, callback: F) -> Result<JoinHandle<()>>
    where
        F: Fn(NetSocket) + Send + 'static,
    {
        if !self.is_running() {
            return Err(TransportError::Closed);
        }
        let listener = Arc::clone(&self.listener);
        let running = Arc::clone(&self.running);
        let config = self.config.clone();
        thread::Builder::new()
            .name(format!("netcomm-accept-{}", self.local_address))
            .spawn(move || {
                let mut backoff =
                    AcceptBackoff::new(config.accept_backoff_initial, config.accept_backoff_max);
                accept_loop(
                    || listener.accept(),
                    &running,
                    &config.socket,
                    &mut backoff,
                    callback,
                );
            })
            .map_err(TransportError::Io)
    }

    /// Stop accepting. Connections already handed out are unaffected.
    pub fn close(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        debug!(address = %self.local_address, "server closing");
        // Unblock a pending accept; the loop drops this connection on sight.
        if let Err(e) = TcpStream::connect_timeout(&self.wake_address, WAKE_TIMEOUT) {
            debug!(error = %e, "accept loop wake-up failed");
        }
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.close();
    }
}

/// Where `close` connects to reach its own listener.
fn wake_address(bound: SocketAddr) -> SocketAddr {
    let ip = match bound.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, bound.port())
}

/// Delay before retrying a failed accept: starts at `initial`, doubles per
/// consecutive failure up to `max`, and returns to `initial` on success.
#[derive(Debug, Clone)]
struct AcceptBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl AcceptBackoff {
    fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Delay for this failure; the next one waits twice as long.
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(2)
            .map_or(self.max, |doubled| doubled.min(self.max));
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}

fn accept_loop<A, F>(
    mut accept: A,
    running: &AtomicBool,
    config: &SocketConfig,
    backoff: &mut AcceptBackoff,
    callback: F,
) where
    A: FnMut() -> io::Result<(TcpStream, SocketAddr)>,
    F: Fn(NetSocket),
{
    while running.load(Ordering::Acquire) {
        match accept() {
            Ok((stream, peer)) => {
                if !running.load(Ordering::Acquire) {
                    break;
                }
                backoff.reset();
                match NetSocket::from_tcp_stream(stream, config.clone()) {
                    Ok(socket) => {
                        debug!(remote = %peer, "accepted connection");
                        callback(socket);
                    }
                    Err(e) => warn!(error = %e, remote = %peer, "dropping accepted connection"),
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => {
                let err = TransportError::Accept(e);
                let delay = backoff.next_delay();
                warn!(error = %err, retry_in = ?delay, "accept failed");
                thread::sleep(delay);
            }
        }
    }

    debug!("accept loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Instant;

    use netcomm_frame::{Frame, Value};

    use crate::address::ProtocolKind;
    use crate::ReceivedEvent;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config() -> ServerConfig {
        ServerConfig {
            socket: SocketConfig {
                poll_interval: Duration::from_millis(10),
                ..SocketConfig::default()
            },
            ..ServerConfig::default()
        }
    }

    fn loopback() -> SocketAddress {
        SocketAddress::new("127.0.0.1", 0)
    }

    #[test]
    fn reports_bound_port() {
        let server = TcpServer::listen(&loopback()).expect("listen");
        assert_ne!(server.local_address().port(), 0);
        assert!(server.is_running());
    }

    #[test]
    fn bind_conflict_is_reported() {
        let server = TcpServer::listen(&loopback()).expect("listen");
        let err = TcpServer::listen(server.local_address()).err().expect("second bind fails");
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[test]
    fn accepts_every_connection() {
        let server = TcpServer::listen_with_config(&loopback(), test_config()).expect("listen");
        let (tx, rx) = mpsc::channel();
        server
            .on_accept(move |socket| {
                let _ = tx.send(socket);
            })
            .expect("start accept loop");

        let clients: Vec<_> = (0..3)
            .map(|_| NetSocket::connect(server.local_address()).expect("connect"))
            .collect();

        for _ in &clients {
            let accepted = rx.recv_timeout(WAIT).expect("accepted socket");
            assert_eq!(accepted.protocol(), ProtocolKind::Tcp);
            assert!(accepted.is_connected());
            assert_eq!(accepted.local_address(), server.local_address());
        }
    }

    #[test]
    fn accepted_socket_receives_frames() {
        let server = TcpServer::listen_with_config(&loopback(), test_config()).expect("listen");
        let (tx, rx) = mpsc::channel();
        server
            .on_accept(move |socket| {
                let tx = tx.clone();
                socket
                    .on_receive(move |_, event| {
                        let _ = tx.send(event);
                    })
                    .expect("start receive loop");
            })
            .expect("start accept loop");

        let client = NetSocket::connect(server.local_address()).expect("connect");
        let frame = Frame::new(0x42, vec![Value::from("ping")]);
        client.send(&frame.encode().expect("encode")).expect("send");

        match rx.recv_timeout(WAIT).expect("event") {
            ReceivedEvent::Completed { command, args, address } => {
                assert_eq!(command, 0x42);
                assert_eq!(args, frame.args);
                assert_eq!(&address, client.local_address());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn close_stops_accept_loop() {
        let server = TcpServer::listen_with_config(&loopback(), test_config()).expect("listen");
        let handle = server.on_accept(|_| {}).expect("start accept loop");
        server.close();
        handle.join().expect("accept loop exits");
        assert!(!server.is_running());
        assert!(matches!(server.on_accept(|_| {}), Err(TransportError::Closed)));
    }

    #[test]
    fn close_unblocks_a_pending_accept() {
        let server = TcpServer::listen_with_config(&loopback(), test_config()).expect("listen");
        let (tx, rx) = mpsc::channel::<NetSocket>();
        let handle = server
            .on_accept(move |socket| {
                let _ = tx.send(socket);
            })
            .expect("start accept loop");

        thread::sleep(Duration::from_millis(50));
        let started = Instant::now();
        server.close();
        handle.join().expect("accept loop exits");
        assert!(started.elapsed() < WAIT);
        assert!(rx.try_recv().is_err(), "wake-up connection was handed out");
    }

    #[test]
    fn unspecified_bind_wakes_via_loopback() {
        let v4: SocketAddr = "0.0.0.0:4000".parse().expect("addr");
        assert_eq!(wake_address(v4), "127.0.0.1:4000".parse().expect("addr"));
        let v6: SocketAddr = "[::]:4000".parse().expect("addr");
        assert_eq!(wake_address(v6), "[::1]:4000".parse().expect("addr"));
        let bound: SocketAddr = "10.1.2.3:80".parse().expect("addr");
        assert_eq!(wake_address(bound), bound);
    }

    #[test]
    fn backoff_doubles_up_to_cap() {
        let mut backoff = AcceptBackoff::new(Duration::from_millis(10), Duration::from_secs(1));
        let delays: Vec<u64> = (0..9)
            .map(|_| backoff.next_delay().as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[test]
    fn backoff_resets_after_success() {
        let mut backoff = AcceptBackoff::new(Duration::from_millis(10), Duration::from_secs(1));
        backoff.next_delay();
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(10));
    }

    #[test]
    fn backoff_initial_above_cap_is_clamped() {
        let mut backoff = AcceptBackoff::new(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    fn fast_backoff() -> AcceptBackoff {
        AcceptBackoff::new(Duration::from_millis(1), Duration::from_millis(4))
    }

    fn accept_failure() -> io::Error {
        io::Error::new(io::ErrorKind::Other, "too many open files")
    }

    #[test]
    fn accept_loop_keeps_running_through_failures() {
        let running = AtomicBool::new(true);
        let mut backoff = fast_backoff();
        let mut attempts = 0;

        accept_loop(
            || {
                attempts += 1;
                if attempts == 6 {
                    running.store(false, Ordering::Release);
                    return Err(io::Error::from(io::ErrorKind::Interrupted));
                }
                Err(accept_failure())
            },
            &running,
            &SocketConfig::default(),
            &mut backoff,
            |_| panic!("nothing was accepted"),
        );

        assert_eq!(attempts, 6);
        // Five failures: 1, 2, 4, 4, 4 ms. The next delay stays at the cap.
        assert_eq!(backoff.next_delay(), Duration::from_millis(4));
    }

    #[test]
    fn accept_loop_resets_backoff_and_delivers_after_failures() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let _client = TcpStream::connect(listener.local_addr().expect("addr")).expect("connect");

        let running = AtomicBool::new(true);
        let accepted = AtomicUsize::new(0);
        let mut backoff = fast_backoff();
        let mut attempts = 0;

        accept_loop(
            || {
                attempts += 1;
                match attempts {
                    1..=3 => Err(accept_failure()),
                    4 => listener.accept(),
                    _ => {
                        running.store(false, Ordering::Release);
                        Err(io::Error::from(io::ErrorKind::Interrupted))
                    }
                }
            },
            &running,
            &SocketConfig::default(),
            &mut backoff,
            |socket| {
                assert!(socket.is_connected());
                accepted.fetch_add(1, Ordering::SeqCst);
            },
        );

        assert_eq!(accepted.load(Ordering::SeqCst), 1);
        assert_eq!(attempts, 5);
        assert_eq!(backoff.next_delay(), Duration::from_millis(1));
    }
}
