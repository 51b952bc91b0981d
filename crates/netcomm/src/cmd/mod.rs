use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};
use netcomm_frame::{ArgumentList, Frame, Value};
use netcomm_transport::{SocketAddress, SocketConfig};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod client;
pub mod server;
pub mod udp;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Accept TCP connections and print every received frame.
    Server(ServerArgs),
    /// Connect over TCP and send a frame periodically.
    Client(ClientArgs),
    /// Bind a UDP socket, print received frames and optionally send to a target.
    Udp(UdpArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Server(args) => server::run(args, format),
        Command::Client(args) => client::run(args, format),
        Command::Udp(args) => udp::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServerArgs {
    /// Address to listen on (host:port).
    pub address: SocketAddress,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub socket: SocketArgs,
}

#[derive(Args, Debug)]
pub struct ClientArgs {
    /// Server address (host:port).
    pub address: SocketAddress,
    #[command(flatten)]
    pub frame: FrameArgs,
    #[command(flatten)]
    pub schedule: ScheduleArgs,
    #[command(flatten)]
    pub socket: SocketArgs,
}

#[derive(Args, Debug)]
pub struct UdpArgs {
    /// Local address to bind (host:port).
    pub bind: SocketAddress,
    /// Destination for outgoing frames. Without it nothing is sent.
    #[arg(long, value_name = "ADDRESS")]
    pub target: Option<SocketAddress>,
    #[command(flatten)]
    pub frame: FrameArgs,
    #[command(flatten)]
    pub schedule: ScheduleArgs,
    #[command(flatten)]
    pub socket: SocketArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// The frame to send.
#[derive(Args, Debug)]
pub struct FrameArgs {
    /// Command byte (decimal or 0x-prefixed hex).
    #[arg(long, value_parser = parse_command, default_value = "0x88")]
    pub command: u8,
    /// Argument as KIND:VALUE (int, float, bool, text, bytes). Repeatable.
    /// Without any, the demo argument list is sent.
    #[arg(long = "arg", value_name = "KIND:VALUE", value_parser = parse_arg)]
    pub args: Vec<Value>,
}

impl FrameArgs {
    pub fn to_frame(&self) -> Frame {
        if self.args.is_empty() {
            Frame::new(self.command, demo_args())
        } else {
            Frame::new(self.command, self.args.clone())
        }
    }
}

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Delay between sends (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub interval: String,
    /// Exit after sending N frames (UDP without --target: after receiving N).
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SocketArgs {
    /// How long a partial frame may stall before it is reported (e.g. 15s).
    #[arg(long, default_value = "15s")]
    pub stall_timeout: String,
}

impl SocketArgs {
    pub fn to_config(&self) -> CliResult<SocketConfig> {
        Ok(SocketConfig {
            stall_timeout: parse_duration(&self.stall_timeout)?,
            ..SocketConfig::default()
        })
    }
}

/// `(-256, true, "Hello", -1.1, [0x41, 0x42, 0x43])`
pub fn demo_args() -> ArgumentList {
    let mut args = ArgumentList::new();
    args.push(-256);
    args.push(true);
    args.push("Hello");
    args.push(-1.1);
    args.push(vec![0x41u8, 0x42, 0x43]);
    args
}

pub fn parse_command(input: &str) -> Result<u8, String> {
    let input = input.trim();
    let parsed = match input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
    {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => input.parse(),
    };
    parsed.map_err(|_| format!("command must be 0..=255, got {input:?}"))
}

pub fn parse_arg(input: &str) -> Result<Value, String> {
    let (kind, raw) = input
        .split_once(':')
        .ok_or_else(|| format!("expected KIND:VALUE, got {input:?}"))?;
    match kind {
        "int" | "integer" => raw
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .map_err(|_| format!("invalid integer {raw:?}")),
        "float" => raw
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| format!("invalid float {raw:?}")),
        "bool" | "boolean" => raw
            .trim()
            .parse::<bool>()
            .map(Value::Boolean)
            .map_err(|_| format!("invalid boolean {raw:?}")),
        "text" | "str" => Ok(Value::from(raw)),
        "bytes" => parse_hex_bytes(raw).map(Value::from),
        other => Err(format!(
            "unknown argument kind {other:?} (int, float, bool, text, bytes)"
        )),
    }
}

/// Accepts `414243`, `41,42,43` or `0x41,0x42,0x43`.
fn parse_hex_bytes(input: &str) -> Result<Vec<u8>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }
    let invalid = || format!("invalid hex bytes {input:?}");
    if input.contains(',') {
        return input
            .split(',')
            .map(|part| {
                let part = part.trim();
                let digits = part
                    .strip_prefix("0x")
                    .or_else(|| part.strip_prefix("0X"))
                    .unwrap_or(part);
                u8::from_str_radix(digits, 16).map_err(|_| invalid())
            })
            .collect();
    }
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input);
    if digits.len() % 2 != 0 || !digits.is_ascii() {
        return Err(invalid());
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| invalid()))
        .collect()
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
