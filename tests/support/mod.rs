//! In-process mock broker used by the integration tests (SPEC_FULL.md §2.1's
//! ambient test tooling). Speaks just enough of the wire protocol to drive
//! the scenarios in SPEC_FULL.md §8: send `INFO`, accept `CONNECT`/`PING`,
//! reply `PONG`, and push scripted `MSG` frames or raw bytes on demand.
//!
//! Grounded on how `riverdb`'s own integration tests spin up a real
//! `TcpListener` and drive it from a background task rather than mocking the
//! transport trait — this crate's `Transport` isn't mockable either, so the
//! same approach applies.

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};

use wirebus::{Endpoint, Scheme};

/// Installs a `tracing` subscriber for the duration of the test binary, so
/// `debug!`/`warn!` events from the connection supervisor show up with
/// `--nocapture`. Safe to call from every test: the embedding crate never
/// installs one itself (SPEC_FULL.md §2.1), and a second `try_init` call
/// here is a harmless no-op.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().with_env_filter("wirebus=debug").try_init();
}

/// A listening mock server. Bound with `SO_REUSEADDR` so a test can drop one
/// instance and immediately rebind the same port to simulate a server
/// restart (SPEC_FULL.md §8 scenario 1).
pub struct MockServer {
    listener: TcpListener,
    port: u16,
}

impl MockServer {
    pub async fn bind() -> Self {
        Self::bind_port(0).await
    }

    pub async fn bind_port(port: u16) -> Self {
        let socket = TcpSocket::new_v4().expect("create ipv4 socket");
        socket.set_reuseaddr(true).expect("set SO_REUSEADDR");
        socket.bind(format!("127.0.0.1:{port}").parse().unwrap()).expect("bind mock listener");
        let listener = socket.listen(16).expect("listen");
        let port = listener.local_addr().unwrap().port();
        MockServer { listener, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(Scheme::Plain, "127.0.0.1", self.port)
    }

    pub async fn accept(&self) -> MockClient {
        let (stream, _) = self.listener.accept().await.expect("accept mock client");
        MockClient::new(stream)
    }
}

/// One accepted connection from the client under test.
pub struct MockClient {
    reader: BufReader<tokio::io::ReadHalf<TcpStream>>,
    writer: tokio::io::WriteHalf<TcpStream>,
}

impl MockClient {
    fn new(stream: TcpStream) -> Self {
        stream.set_nodelay(true).ok();
        let (r, w) = tokio::io::split(stream);
        MockClient { reader: BufReader::new(r), writer: w }
    }

    /// Sends a minimal `INFO` line. `extra_json_fields` is spliced into the
    /// object literal, e.g. `r#""connect_urls":["127.0.0.1:4333"]"#`.
    pub async fn send_info(&mut self, extra_json_fields: &str) {
        let body = if extra_json_fields.is_empty() {
            "{\"server_id\":\"mock\",\"max_payload\":1048576}".to_string()
        } else {
            format!("{{\"server_id\":\"mock\",\"max_payload\":1048576,{extra_json_fields}}}")
        };
        self.send_raw(&format!("INFO {body}\r\n")).await;
    }

    pub async fn send_raw(&mut self, data: &str) {
        self.writer.write_all(data.as_bytes()).await.expect("write to client socket");
    }

    async fn read_line(&mut self) -> String {
        use tokio::io::AsyncBufReadExt;
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await.expect("read line from client socket");
        assert!(n > 0, "client closed the connection unexpectedly");
        line
    }

    /// Performs the server side of the handshake: reads `CONNECT`, reads
    /// `PING`, replies `PONG`.
    pub async fn expect_handshake(&mut self) {
        let connect_line = self.read_line().await;
        assert!(connect_line.starts_with("CONNECT"), "expected CONNECT, got {connect_line:?}");
        let ping_line = self.read_line().await;
        assert!(ping_line.starts_with("PING"), "expected PING, got {ping_line:?}");
        self.send_raw("PONG\r\n").await;
    }

    /// Reads and discards client lines until one starting with `prefix` is
    /// seen, returning that line. Used to skip SUB/UNSUB replay traffic a
    /// scenario doesn't care about.
    pub async fn read_line_starting_with(&mut self, prefix: &str) -> String {
        loop {
            let line = self.read_line().await;
            if line.starts_with(prefix) {
                return line;
            }
        }
    }

    /// Reads one `PUB`/`HPUB` header line plus its declared payload, skipping
    /// any other control lines (`SUB`, `UNSUB`, `PING`) first.
    pub async fn expect_publish(&mut self) -> (String, Vec<u8>) {
        loop {
            let line = self.read_line().await;
            let trimmed = line.trim_end_matches(['\r', '\n']);
            let mut parts = trimmed.split(' ');
            match parts.next() {
                Some("PUB") => {
                    let subject = parts.next().unwrap().to_string();
                    let size: usize = parts.last().unwrap().parse().unwrap();
                    let payload = self.read_payload(size).await;
                    return (subject, payload);
                }
                Some("PING") => {
                    self.send_raw("PONG\r\n").await;
                }
                _ => continue,
            }
        }
    }

    async fn read_payload(&mut self, size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size + 2];
        self.reader.read_exact(&mut buf).await.expect("read payload");
        buf.truncate(size);
        buf
    }

    pub async fn send_msg(&mut self, subject: &str, sid: u64, payload: &[u8]) {
        let header = format!("MSG {subject} {sid} {}\r\n", payload.len());
        self.send_raw(&header).await;
        self.writer.write_all(payload).await.expect("write payload");
        self.writer.write_all(b"\r\n").await.expect("write trailing crlf");
    }

    pub async fn send_msg_with_reply(&mut self, subject: &str, sid: u64, reply_to: &str, payload: &[u8]) {
        let header = format!("MSG {subject} {sid} {reply_to} {}\r\n", payload.len());
        self.send_raw(&header).await;
        self.writer.write_all(payload).await.expect("write payload");
        self.writer.write_all(b"\r\n").await.expect("write trailing crlf");
    }

    pub async fn send_ping(&mut self) {
        self.send_raw("PING\r\n").await;
    }
}
