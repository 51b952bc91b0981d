use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use netcomm_transport::NetSocket;

use crate::cmd::{install_ctrlc_handler, parse_duration, ClientArgs};
use crate::exit::{build_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_sent, OutputFormat};
use crate::pump::{EventPump, Flow};

pub fn run(args: ClientArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.schedule.interval)?;
    let frame = args.frame.to_frame();
    let wire = frame
        .encode()
        .map_err(|err| build_error("encode failed", err))?;

    let socket = NetSocket::connect_with_config(&args.address, args.socket.to_config()?)
        .map_err(|err| transport_error("connect failed", err))?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut pump = EventPump::attach(&socket, format)?;
    let mut sent = 0usize;

    while running.load(Ordering::SeqCst) && socket.is_connected() {
        socket
            .send(&wire)
            .map_err(|err| transport_error("send failed", err))?;
        print_sent(socket.protocol(), &args.address, frame.command, wire.len(), format);
        sent = sent.saturating_add(1);

        if args.schedule.count.is_some_and(|count| sent >= count) {
            break;
        }
        if pump.run_until(Instant::now() + interval, &running) == Flow::Stop {
            break;
        }
    }

    socket.close();
    Ok(SUCCESS)
}
