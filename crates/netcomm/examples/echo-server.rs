//! Echo server: every frame a client sends comes straight back.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- client 127.0.0.1:10010 --interval 1s

use std::sync::mpsc;

use netcomm::frame::Frame;
use netcomm::transport::{ReceivedEvent, SocketAddress, TcpServer};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let server = TcpServer::listen(&SocketAddress::new("127.0.0.1", 10010))?;
    eprintln!("Listening on {}", server.local_address());

    let (done_tx, done_rx) = mpsc::channel::<()>();
    server.on_accept(move |socket| {
        eprintln!("Client connected: {:?}", socket.remote_address());
        let done_tx = done_tx.clone();
        let started = socket.on_receive(move |socket, event| match event {
            ReceivedEvent::Completed { command, args, address } => {
                eprintln!("{address} -> 0x{command:02X} ({args})");
                let reply = Frame::new(command, args);
                match reply.encode() {
                    Ok(wire) => {
                        if let Err(e) = socket.send(&wire) {
                            eprintln!("echo failed: {e}");
                        }
                    }
                    Err(e) => eprintln!("encode failed: {e}"),
                }
            }
            ReceivedEvent::Closed { address } => {
                eprintln!("{address} disconnected");
                socket.close();
                let _ = done_tx.send(());
            }
            other => eprintln!("{} {}", other.address(), other.name()),
        });
        if let Err(e) = started {
            eprintln!("receive loop failed to start: {e}");
        }
    })?;

    // Serve until the first client disconnects.
    let _ = done_rx.recv();
    Ok(())
}
