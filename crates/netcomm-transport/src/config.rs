use std::time::Duration;

use netcomm_frame::MAX_BODY_LEN;

/// How long a partial frame may sit without completing before the receive
/// loop reports it as interrupted.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(15);

/// Size of each socket read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// Largest UDP payload. Datagram reads always use at least this much buffer
/// so that a datagram is never truncated.
pub const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Per-socket configuration.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Stall watchdog timeout. Default: 15 s.
    pub stall_timeout: Duration,
    /// Bytes requested per stream read. Default: 4096. Datagram reads use
    /// at least [`MAX_DATAGRAM_SIZE`].
    pub read_buffer_size: usize,
    /// Frames declaring a longer body are rejected as parse errors.
    /// Default: the largest body the wire format can carry.
    pub max_body_len: usize,
    /// How often a blocked datagram read rechecks whether the socket was
    /// closed. Default: 100 ms.
    pub poll_interval: Duration,
    /// Write timeout for stream sends. A timed-out write is reported as a
    /// stalled send. Default: none.
    pub write_timeout: Option<Duration>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            stall_timeout: DEFAULT_STALL_TIMEOUT,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_body_len: MAX_BODY_LEN,
            poll_interval: Duration::from_millis(100),
            write_timeout: None,
        }
    }
}

/// Listening server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Applied to every accepted connection.
    pub socket: SocketConfig,
    /// First delay after a failed accept. Default: 10 ms.
    pub accept_backoff_initial: Duration,
    /// Ceiling for the doubling accept backoff. Default: 1 s.
    pub accept_backoff_max: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket: SocketConfig::default(),
            accept_backoff_initial: Duration::from_millis(10),
            accept_backoff_max: Duration::from_secs(1),
        }
    }
}
