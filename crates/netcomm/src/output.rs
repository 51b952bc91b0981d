use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use netcomm_frame::Value;
use netcomm_transport::{ProtocolKind, ReceivedEvent, SocketAddress};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Pretty
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct EventOutput<'a> {
    protocol: String,
    event: &'a str,
    address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<Vec<ArgOutput>>,
    timestamp: String,
}

#[derive(Serialize)]
struct ArgOutput {
    kind: String,
    value: serde_json::Value,
}

#[derive(Serialize)]
struct SentOutput<'a> {
    protocol: String,
    event: &'a str,
    address: String,
    command: u8,
    size: usize,
    timestamp: String,
}

pub fn print_event(protocol: ProtocolKind, event: &ReceivedEvent, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let (command, args) = match event {
                ReceivedEvent::Completed { command, args, .. } => {
                    (Some(*command), Some(args.iter().map(arg_output).collect()))
                }
                _ => (None, None),
            };
            let out = EventOutput {
                protocol: protocol.to_string(),
                event: event.name(),
                address: event.address().to_string(),
                command,
                args,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let (command, args) = match event {
                ReceivedEvent::Completed { command, args, .. } => {
                    (format!("0x{command:02X}"), args.to_string())
                }
                _ => (String::new(), String::new()),
            };
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROTOCOL", "EVENT", "ADDRESS", "COMMAND", "ARGS"])
                .add_row(vec![
                    protocol.to_string(),
                    event.name().to_string(),
                    event.address().to_string(),
                    command,
                    args,
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => println!("{}", pretty_line(protocol, event)),
    }
}

/// Report a frame this process sent. Pretty output stays quiet so that it
/// only shows what arrives.
pub fn print_sent(
    protocol: ProtocolKind,
    address: &SocketAddress,
    command: u8,
    size: usize,
    format: OutputFormat,
) {
    match format {
        OutputFormat::Json => {
            let out = SentOutput {
                protocol: protocol.to_string(),
                event: "sent",
                address: address.to_string(),
                command,
                size,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["PROTOCOL", "EVENT", "ADDRESS", "COMMAND", "SIZE"])
                .add_row(vec![
                    protocol.to_string(),
                    "sent".to_string(),
                    address.to_string(),
                    format!("0x{command:02X}"),
                    size.to_string(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {}
    }
}

/// `TCP 127.0.0.1:5000 (-256, true, Hello, -1.100000, [0x41,0x42,0x43])`
pub fn pretty_line(protocol: ProtocolKind, event: &ReceivedEvent) -> String {
    let address = event.address();
    match event {
        ReceivedEvent::Completed { args, .. } => format!("{protocol} {address} ({args})"),
        ReceivedEvent::Interrupted { .. } => format!("{protocol} {address} Interrupted"),
        ReceivedEvent::ParsingError { .. } => format!("{protocol} {address} Parsing-Error"),
        ReceivedEvent::Closed { .. } => format!("{protocol} {address} Close"),
    }
}

fn arg_output(value: &Value) -> ArgOutput {
    let json = match value {
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Bytes(_) => serde_json::Value::String(value.to_string()),
    };
    ArgOutput {
        kind: value.kind().to_string(),
        value: json,
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use netcomm_frame::ArgumentList;

    fn sample_args() -> ArgumentList {
        let mut args = ArgumentList::new();
        args.push(-256);
        args.push(true);
        args.push("Hello");
        args.push(-1.1f32);
        args.push(vec![0x41u8, 0x42, 0x43]);
        args
    }

    #[test]
    fn pretty_line_for_completed_frame() {
        let event = ReceivedEvent::Completed {
            command: 0x88,
            args: sample_args(),
            address: SocketAddress::new("127.0.0.1", 5000),
        };
        assert_eq!(
            pretty_line(ProtocolKind::Tcp, &event),
            "TCP 127.0.0.1:5000 (-256, true, Hello, -1.100000, [0x41,0x42,0x43])"
        );
    }

    #[test]
    fn pretty_line_for_status_events() {
        let address = SocketAddress::new("10.0.0.1", 9);
        assert_eq!(
            pretty_line(
                ProtocolKind::Udp,
                &ReceivedEvent::Interrupted {
                    address: address.clone()
                }
            ),
            "UDP 10.0.0.1:9 Interrupted"
        );
        assert_eq!(
            pretty_line(
                ProtocolKind::Tcp,
                &ReceivedEvent::ParsingError {
                    address: address.clone()
                }
            ),
            "TCP 10.0.0.1:9 Parsing-Error"
        );
        assert_eq!(
            pretty_line(ProtocolKind::Tcp, &ReceivedEvent::Closed { address }),
            "TCP 10.0.0.1:9 Close"
        );
    }

    #[test]
    fn json_args_keep_their_types() {
        let args: Vec<ArgOutput> = sample_args().iter().map(arg_output).collect();
        let json = serde_json::to_value(&args).expect("serialize");
        assert_eq!(json[0]["kind"], "integer");
        assert_eq!(json[0]["value"], -256);
        assert_eq!(json[1]["value"], true);
        assert_eq!(json[2]["value"], "Hello");
        assert_eq!(json[3]["kind"], "float");
        assert_eq!(json[4]["value"], "0x41,0x42,0x43");
    }
}
