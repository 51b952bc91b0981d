//! Stall detection for partially received frames.
//!
//! The receive loop arms the watchdog whenever the parser is left mid-frame
//! and disarms it when the frame completes or the stream ends. Each arming
//! replaces the previous deadline, so at most one `Interrupted` event is
//! produced per stall, measured from the most recent progress.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::address::SocketAddress;
use crate::event::ReceivedEvent;
use crate::socket::{Callback, NetSocket};

struct State {
    /// `Some` while a partial frame is in flight.
    deadline: Option<Instant>,
    address: SocketAddress,
    shutdown: bool,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One watchdog per receive loop, backed by a lazily started thread.
pub(crate) struct StallWatchdog {
    shared: Arc<Shared>,
    timeout: Duration,
    socket: NetSocket,
    callback: Callback,
    started: bool,
}

impl StallWatchdog {
    pub(crate) fn new(socket: NetSocket, callback: Callback, timeout: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    deadline: None,
                    address: SocketAddress::unspecified(),
                    shutdown: false,
                }),
                wake: Condvar::new(),
            }),
            timeout,
            socket,
            callback,
            started: false,
        }
    }

    /// Start (or restart) the stall timer for a frame from `address`.
    pub(crate) fn arm(&mut self, address: &SocketAddress) {
        if !self.started {
            self.spawn_worker();
        }
        let mut state = self.shared.lock();
        state.deadline = Some(Instant::now() + self.timeout);
        if state.address != *address {
            state.address = address.clone();
        }
        drop(state);
        self.shared.wake.notify_one();
    }

    /// Cancel any pending stall timer.
    pub(crate) fn disarm(&self) {
        let mut state = self.shared.lock();
        if state.deadline.take().is_some() {
            drop(state);
            self.shared.wake.notify_one();
        }
    }

    fn spawn_worker(&mut self) {
        let shared = Arc::clone(&self.shared);
        let socket = self.socket.clone();
        let callback = Arc::clone(&self.callback);
        let spawned = thread::Builder::new()
            .name(format!("netcomm-watchdog-{}", self.socket.local_address()))
            .spawn(move || watch(shared, socket, callback));
        match spawned {
            Ok(_) => self.started = true,
            Err(e) => warn!(error = %e, "failed to start stall watchdog"),
        }
    }
}

impl Drop for StallWatchdog {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        state.shutdown = true;
        state.deadline = None;
        drop(state);
        self.shared.wake.notify_one();
    }
}

fn watch(shared: Arc<Shared>, socket: NetSocket, callback: Callback) {
    let mut state = shared.lock();
    loop {
        if state.shutdown {
            return;
        }
        let Some(deadline) = state.deadline else {
            state = shared.wake.wait(state).unwrap_or_else(PoisonError::into_inner);
            continue;
        };
        let now = Instant::now();
        if now < deadline {
            state = shared
                .wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
            continue;
        }

        state.deadline = None;
        let address = state.address.clone();
        drop(state);
        debug!(remote = %address, "partial frame stalled");
        callback(&socket, ReceivedEvent::Interrupted { address });
        state = shared.lock();
    }
}
