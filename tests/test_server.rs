//! End-to-end reactor tests over real loopback sockets.

use std::fs;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rustyserv::config::Config;
use rustyserv::net::server::Server;
use rustyserv::net::shutdown::ShutdownToken;

struct TempRoot {
    path: PathBuf,
}

impl TempRoot {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "rustyserv-server-{tag}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).unwrap();
        Self { path }
    }
}

impl Drop for TempRoot {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

/// Bind on an ephemeral port and run the reactor on its own thread.
/// Returns the token to stop it, the port, and the handle that yields the
/// server back after shutdown.
fn start(root: &TempRoot, extra: &str) -> (ShutdownToken, u16, JoinHandle<Server>) {
    let toml = format!(
        r#"
        [[server]]
        listen = 0
        root = "{}"
        autoindex = true
        {extra}
        "#,
        root.path.display()
    );
    let config = Config::from_toml(&toml).unwrap();

    let shutdown = ShutdownToken::new();
    let mut server = Server::new(config, shutdown.clone()).unwrap();
    server.bind().unwrap();
    let port = server.local_addrs()[0].port();

    let handle = thread::spawn(move || {
        server.run();
        server
    });
    (shutdown, port, handle)
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream
}

/// Read one response: headers up to the blank line, then Content-Length
/// bytes of body.
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed before headers arrived");
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8(buf[..header_end].to_vec()).unwrap();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).unwrap();
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);
    (head, body)
}

#[test]
fn serves_a_request_over_a_real_socket() {
    let root = TempRoot::new("real");
    fs::write(root.path.join("index.html"), b"netcontent").unwrap();
    let (shutdown, port, handle) = start(&root, "");

    let mut stream = connect(port);
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n")
        .unwrap();

    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(head.contains("Content-Length: 10"));
    assert_eq!(body, b"netcontent");

    // Connection: close means the server hangs up after the drain.
    let n = stream.read(&mut [0u8; 16]).unwrap();
    assert_eq!(n, 0);

    shutdown.request();
    let server = handle.join().unwrap();
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn keep_alive_serves_sequential_requests() {
    let root = TempRoot::new("keepalive");
    fs::write(root.path.join("a.txt"), b"first").unwrap();
    fs::write(root.path.join("b.txt"), b"second").unwrap();
    let (shutdown, port, handle) = start(&root, "");

    let mut stream = connect(port);

    stream
        .write_all(b"GET /a.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200"));
    assert!(head.contains("Connection: keep-alive"));
    assert_eq!(body, b"first");

    stream
        .write_all(b"GET /b.txt HTTP/1.1\r\nHost: x\r\n\r\n")
        .unwrap();
    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 200"));
    assert_eq!(body, b"second");

    shutdown.request();
    let server = handle.join().unwrap();
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn idle_connection_is_evicted_by_the_sweep() {
    let root = TempRoot::new("idle");
    let (shutdown, port, handle) = start(&root, "keepalive_timeout = 0.2");

    let mut stream = connect(port);

    // Send nothing; the next sweep after the timeout tears the record down
    // and the socket reads EOF.
    let n = stream.read(&mut [0u8; 16]).unwrap();
    assert_eq!(n, 0);

    shutdown.request();
    let server = handle.join().unwrap();
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn oversized_declared_body_gets_413() {
    let root = TempRoot::new("toolarge");
    let (shutdown, port, handle) = start(&root, "client_body_size = 8");

    let mut stream = connect(port);
    stream
        .write_all(b"POST /upload.bin HTTP/1.1\r\nHost: x\r\nContent-Length: 100\r\n\r\n")
        .unwrap();

    let (head, body) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 413 Payload Too Large"));
    assert!(String::from_utf8(body).unwrap().contains("413"));

    // Nothing was written under the document root.
    let leftovers: Vec<_> = fs::read_dir(&root.path).unwrap().collect();
    assert!(leftovers.is_empty());

    shutdown.request();
    let server = handle.join().unwrap();
    assert_eq!(server.connection_count(), 0);
}

#[test]
fn malformed_request_line_gets_400() {
    let root = TempRoot::new("bad");
    let (shutdown, port, handle) = start(&root, "");

    let mut stream = connect(port);
    stream.write_all(b"BOGUS / HTTP/1.1\r\n\r\n").unwrap();

    let (head, _) = read_response(&mut stream);
    assert!(head.starts_with("HTTP/1.1 400 Bad Request"));

    shutdown.request();
    handle.join().unwrap();
}

#[test]
fn shutdown_drains_open_connections() {
    let root = TempRoot::new("shutdown");
    let (shutdown, port, handle) = start(&root, "");

    let _idle_one = connect(port);
    let _idle_two = connect(port);
    // Give the reactor a pass to accept both.
    thread::sleep(Duration::from_millis(200));

    shutdown.request();
    let server = handle.join().unwrap();
    assert_eq!(server.connection_count(), 0);
}
