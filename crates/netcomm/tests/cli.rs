#![cfg(feature = "cli")]

use std::io::Read;
use std::net::{TcpListener, UdpSocket};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use netcomm::frame::{FrameBuilder, Value};
use netcomm::transport::{NetSocket, ReceivedEvent, SocketAddress, TcpServer};

const WAIT: Duration = Duration::from_secs(10);

fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    listener.local_addr().expect("probe addr").port()
}

fn netcomm() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_netcomm"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn connect_with_retry(address: &SocketAddress, timeout: Duration) -> NetSocket {
    let start = Instant::now();
    loop {
        if let Ok(socket) = NetSocket::connect(address) {
            return socket;
        }
        if start.elapsed() >= timeout {
            panic!("connect timeout");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

/// Wait for the child to exit, killing it on timeout. Returns (exit code, stdout).
fn finish(mut child: Child, timeout: Duration) -> (Option<i32>, String) {
    let start = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait().expect("poll child") {
            break status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            panic!("child did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    };
    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        out.read_to_string(&mut stdout).expect("read stdout");
    }
    (status.code(), stdout)
}

#[test]
fn server_prints_received_frame_as_json() {
    let address = SocketAddress::new("127.0.0.1", free_port());
    let child = netcomm()
        .arg("--format")
        .arg("json")
        .arg("server")
        .arg(address.to_string())
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("server should start");

    let socket = connect_with_retry(&address, WAIT);
    let wire = FrameBuilder::new()
        .command(0x88)
        .arg(-256)
        .arg(true)
        .arg("Hello")
        .build()
        .expect("build frame");
    socket.send(&wire).expect("send frame");

    let (code, stdout) = finish(child, WAIT);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("\"protocol\":\"TCP\""), "stdout: {stdout}");
    assert!(stdout.contains("\"event\":\"completed\""), "stdout: {stdout}");
    assert!(stdout.contains("\"command\":136"), "stdout: {stdout}");
    assert!(stdout.contains("\"value\":-256"), "stdout: {stdout}");
    assert!(stdout.contains("\"value\":\"Hello\""), "stdout: {stdout}");
}

#[test]
fn client_sends_requested_frame() {
    let server = TcpServer::listen(&SocketAddress::new("127.0.0.1", 0)).expect("listen");
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

    let child = netcomm()
        .arg("client")
        .arg(server.local_address().to_string())
        .arg("--command")
        .arg("0x10")
        .arg("--arg")
        .arg("int:7")
        .arg("--arg")
        .arg("bytes:0x41,0x42")
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("client should start");

    match rx.recv_timeout(WAIT).expect("frame from client") {
        ReceivedEvent::Completed { command, args, .. } => {
            assert_eq!(command, 0x10);
            assert_eq!(args.get(0), Some(&Value::Integer(7)));
            assert_eq!(args.get(1), Some(&Value::from(vec![0x41u8, 0x42])));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let (code, _) = finish(child, WAIT);
    assert_eq!(code, Some(0));
}

#[test]
fn udp_sends_demo_frame_to_target() {
    let receiver = NetSocket::bind(&SocketAddress::new("127.0.0.1", 0)).expect("bind receiver");
    let (tx, rx) = mpsc::channel();
    receiver
        .on_receive(move |_, event| {
            let _ = tx.send(event);
        })
        .expect("start receive loop");

    let child = netcomm()
        .arg("--format")
        .arg("json")
        .arg("udp")
        .arg("127.0.0.1:0")
        .arg("--target")
        .arg(receiver.local_address().to_string())
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("udp should start");

    match rx.recv_timeout(WAIT).expect("datagram") {
        ReceivedEvent::Completed { command, args, .. } => {
            assert_eq!(command, 0x88);
            assert_eq!(args.len(), 5);
            assert_eq!(args.get(2), Some(&Value::Text("Hello".to_string())));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let (code, stdout) = finish(child, WAIT);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("\"event\":\"sent\""), "stdout: {stdout}");
    receiver.close();
}

#[test]
fn udp_receiver_exits_after_count() {
    let port = {
        let probe = UdpSocket::bind("127.0.0.1:0").expect("bind probe");
        probe.local_addr().expect("probe addr").port()
    };
    let target = SocketAddress::new("127.0.0.1", port);
    let mut child = netcomm()
        .arg("--format")
        .arg("pretty")
        .arg("udp")
        .arg(target.to_string())
        .arg("--count")
        .arg("1")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("udp should start");

    let sender = NetSocket::bind(&SocketAddress::new("127.0.0.1", 0)).expect("bind sender");
    let wire = FrameBuilder::new()
        .command(1)
        .arg("ping")
        .build()
        .expect("build frame");

    // Datagrams sent before the child has bound are lost, so keep sending.
    let start = Instant::now();
    loop {
        let _ = sender.send_to(&wire, &target);
        thread::sleep(Duration::from_millis(100));
        if child.try_wait().expect("poll child").is_some() || start.elapsed() >= WAIT {
            break;
        }
    }

    let (code, stdout) = finish(child, WAIT);
    assert_eq!(code, Some(0));
    assert!(stdout.contains("(ping)"), "stdout: {stdout}");
}

#[test]
fn connect_refused_exits_with_transport_code() {
    let port = free_port();
    let output = netcomm()
        .arg("client")
        .arg(format!("127.0.0.1:{port}"))
        .arg("--count")
        .arg("1")
        .output()
        .expect("client should run");

    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("connect failed"), "stderr: {stderr}");
}

#[test]
fn invalid_argument_kind_is_a_usage_error() {
    let output = netcomm()
        .arg("client")
        .arg("127.0.0.1:1")
        .arg("--arg")
        .arg("uuid:1")
        .output()
        .expect("client should run");

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn version_reports_package_version() {
    let output = netcomm().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.trim(), format!("netcomm {}", env!("CARGO_PKG_VERSION")));
}
