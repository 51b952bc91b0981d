use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use netcomm_transport::{ProtocolKind, ReceivedEvent, ServerConfig, TcpServer};
use tracing::warn;

use crate::cmd::{install_ctrlc_handler, ServerArgs};
use crate::exit::{transport_error, CliResult, SUCCESS};
use crate::output::OutputFormat;
use crate::pump::EventPump;

pub fn run(args: ServerArgs, format: OutputFormat) -> CliResult<i32> {
    let config = ServerConfig {
        socket: args.socket.to_config()?,
        ..ServerConfig::default()
    };
    let server = TcpServer::listen_with_config(&args.address, config)
        .map_err(|err| transport_error("bind failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (pump, tx) = EventPump::new(ProtocolKind::Tcp, format);
    let mut pump = pump.with_limit(args.count).keep_after_terminal();

    server
        .on_accept(move |socket| {
            let tx = tx.clone();
            let started = socket.on_receive(move |socket, event| {
                if let ReceivedEvent::Closed { .. } = event {
                    socket.close();
                }
                let _ = tx.send(event);
            });
            if let Err(err) = started {
                warn!(error = %err, "failed to start receive loop");
            }
        })
        .map_err(|err| transport_error("accept failed", err))?;

    pump.run(&running);
    server.close();
    Ok(SUCCESS)
}
