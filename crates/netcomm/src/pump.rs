use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use netcomm_transport::{NetSocket, ProtocolKind, ReceivedEvent};

use crate::exit::{transport_error, CliResult};
use crate::output::{print_event, OutputFormat};

/// Upper bound on how long the pump blocks before rechecking the ctrl-c flag.
const TICK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Moves receive-loop events onto the main thread and prints them, so output
/// from several sockets never interleaves.
pub struct EventPump {
    events: Receiver<ReceivedEvent>,
    protocol: ProtocolKind,
    format: OutputFormat,
    received: usize,
    limit: Option<usize>,
    stop_on_terminal: bool,
}

impl EventPump {
    pub fn new(protocol: ProtocolKind, format: OutputFormat) -> (Self, Sender<ReceivedEvent>) {
        let (tx, rx) = mpsc::channel();
        let pump = Self {
            events: rx,
            protocol,
            format,
            received: 0,
            limit: None,
            stop_on_terminal: true,
        };
        (pump, tx)
    }

    /// Pump for a single socket's receive loop.
    pub fn attach(socket: &NetSocket, format: OutputFormat) -> CliResult<Self> {
        let (pump, tx) = Self::new(socket.protocol(), format);
        socket
            .on_receive(move |_, event| {
                let _ = tx.send(event);
            })
            .map_err(|err| transport_error("receive failed", err))?;
        Ok(pump)
    }

    /// Stop after `limit` completed frames.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Keep going when one connection closes (server mode).
    pub fn keep_after_terminal(mut self) -> Self {
        self.stop_on_terminal = false;
        self
    }

    /// Print events until `deadline`, ctrl-c, the frame limit, or a terminal
    /// event.
    pub fn run_until(&mut self, deadline: Instant, running: &AtomicBool) -> Flow {
        loop {
            if !running.load(Ordering::SeqCst) {
                return Flow::Stop;
            }
            let now = Instant::now();
            if now >= deadline {
                return Flow::Continue;
            }
            match self.events.recv_timeout((deadline - now).min(TICK)) {
                Ok(event) => {
                    if self.handle(&event) == Flow::Stop {
                        return Flow::Stop;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Flow::Stop,
            }
        }
    }

    /// Print events until told to stop.
    pub fn run(&mut self, running: &AtomicBool) {
        while self.run_until(Instant::now() + TICK, running) == Flow::Continue {}
    }

    fn handle(&mut self, event: &ReceivedEvent) -> Flow {
        print_event(self.protocol, event, self.format);
        if let ReceivedEvent::Completed { .. } = event {
            self.received = self.received.saturating_add(1);
            if self.limit.is_some_and(|limit| self.received >= limit) {
                return Flow::Stop;
            }
        }
        if self.stop_on_terminal && event.is_terminal() {
            return Flow::Stop;
        }
        Flow::Continue
    }
}
