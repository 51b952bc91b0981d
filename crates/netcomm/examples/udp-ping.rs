//! Two UDP sockets on loopback exchanging one frame each way.
//!
//! Run with:
//!   cargo run --example udp-ping

use std::sync::mpsc;
use std::time::Duration;

use netcomm::frame::FrameBuilder;
use netcomm::transport::{NetSocket, ReceivedEvent, SocketAddress};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let loopback = SocketAddress::new("127.0.0.1", 0);
    let ping = NetSocket::bind(&loopback)?;
    let pong = NetSocket::bind(&loopback)?;

    let (tx, rx) = mpsc::channel();
    for socket in [&ping, &pong] {
        let tx = tx.clone();
        socket.on_receive(move |socket, event| {
            if let ReceivedEvent::Completed { command: 0x01, address, .. } = &event {
                let reply = FrameBuilder::new().command(0x02).arg("pong").build();
                if let Ok(wire) = reply {
                    let _ = socket.send_to(&wire, address);
                }
            }
            let _ = tx.send((socket.local_address().clone(), event));
        })?;
    }

    let wire = FrameBuilder::new()
        .command(0x01)
        .arg("ping")
        .arg(42)
        .arg(2.5)
        .build()?;
    ping.send_to(&wire, pong.local_address())?;

    for _ in 0..2 {
        let (receiver, event) = rx.recv_timeout(Duration::from_secs(5))?;
        if let ReceivedEvent::Completed { command, args, address } = event {
            println!("{receiver} <- {address}: 0x{command:02X} ({args})");
        }
    }

    ping.close();
    pong.close();
    Ok(())
}
