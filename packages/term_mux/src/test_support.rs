//! Shared fixtures for wire-level tests: a recording terminal sink, a
//! minimal in-process WebSocket server, and event helpers.

use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use crate::auth::StaticCredential;
use crate::config::MuxConfig;
use crate::keepalive::KeepaliveSchedule;
use crate::link::LinkTarget;
use crate::session::{SessionId, SessionOptions};
use crate::sink::{Geometry, TerminalSink};

// ── recording sink ───────────────────────────────────────────────────

/// Everything a [`RecordingSink`] saw, shared with the test body.
#[derive(Debug, Default)]
pub(crate) struct SinkRecord {
    pub(crate) writes: Vec<Vec<u8>>,
    pub(crate) notices: Vec<String>,
    pub(crate) clears: usize,
    pub(crate) refits: usize,
    pub(crate) font_size: u16,
    pub(crate) attached: bool,
    pub(crate) detached: bool,
}

/// Terminal sink that records every call; geometry is test-settable.
pub(crate) struct RecordingSink {
    record: Arc<Mutex<SinkRecord>>,
    geometry: Arc<Mutex<Geometry>>,
    accept_attach: bool,
}

impl RecordingSink {
    pub(crate) fn new() -> (Self, Arc<Mutex<SinkRecord>>, Arc<Mutex<Geometry>>) {
        let record = Arc::new(Mutex::new(SinkRecord::default()));
        let geometry = Arc::new(Mutex::new(Geometry::default()));
        let sink = Self {
            record: record.clone(),
            geometry: geometry.clone(),
            accept_attach: true,
        };
        (sink, record, geometry)
    }

    /// A sink whose render target is unavailable.
    pub(crate) fn refusing() -> (Self, Arc<Mutex<SinkRecord>>) {
        let record = Arc::new(Mutex::new(SinkRecord::default()));
        let sink = Self {
            record: record.clone(),
            geometry: Arc::new(Mutex::new(Geometry::default())),
            accept_attach: false,
        };
        (sink, record)
    }
}

impl TerminalSink for RecordingSink {
    fn attach(&mut self) -> bool {
        self.record.lock().unwrap().attached = self.accept_attach;
        self.accept_attach
    }

    fn write(&mut self, bytes: &[u8]) {
        self.record.lock().unwrap().writes.push(bytes.to_vec());
    }

    fn notice(&mut self, line: &str) {
        self.record.lock().unwrap().notices.push(line.to_string());
    }

    fn clear(&mut self) {
        self.record.lock().unwrap().clears += 1;
    }

    fn geometry(&self) -> Geometry {
        *self.geometry.lock().unwrap()
    }

    fn set_font_size(&mut self, px: u16) {
        self.record.lock().unwrap().font_size = px;
    }

    fn refit(&mut self) {
        self.record.lock().unwrap().refits += 1;
    }

    fn detach(&mut self) {
        self.record.lock().unwrap().detached = true;
    }
}

// ── in-process server ────────────────────────────────────────────────

/// Frames and lifecycle a test server observed.
#[derive(Debug, Default)]
pub(crate) struct ServerRecord {
    pub(crate) frames: Vec<Vec<u8>>,
    pub(crate) connections: usize,
    pub(crate) closed: usize,
}

/// Accept WebSocket connections on an ephemeral port, echo the requested
/// subprotocol, and record every inbound frame.
pub(crate) async fn spawn_recording_server() -> (SocketAddr, Arc<Mutex<ServerRecord>>) {
    spawn_server(None).await
}

/// Like [`spawn_recording_server`], but pushes `greeting` to the client
/// right after the handshake.
pub(crate) async fn spawn_greeting_server(
    greeting: &'static [u8],
) -> (SocketAddr, Arc<Mutex<ServerRecord>>) {
    spawn_server(Some(greeting.to_vec())).await
}

async fn spawn_server(greeting: Option<Vec<u8>>) -> (SocketAddr, Arc<Mutex<ServerRecord>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let record = Arc::new(Mutex::new(ServerRecord::default()));

    let server_record = record.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(run_connection(
                stream,
                greeting.clone(),
                server_record.clone(),
            ));
        }
    });

    (addr, record)
}

async fn run_connection(
    stream: TcpStream,
    greeting: Option<Vec<u8>>,
    record: Arc<Mutex<ServerRecord>>,
) {
    // tungstenite rejects the client handshake if a requested subprotocol
    // is not echoed back.
    let callback = |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
        if let Some(protocol) = request.headers().get("Sec-WebSocket-Protocol") {
            response
                .headers_mut()
                .insert("Sec-WebSocket-Protocol", protocol.clone());
        }
        Ok(response)
    };
    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    record.lock().unwrap().connections += 1;

    let (mut write, mut read) = ws.split();
    if let Some(greeting) = greeting {
        let _ = write
            .send(tungstenite::Message::Binary(greeting.into()))
            .await;
    }

    while let Some(message) = read.next().await {
        match message {
            Ok(tungstenite::Message::Binary(data)) => {
                record.lock().unwrap().frames.push(data.to_vec());
            }
            Ok(tungstenite::Message::Text(text)) => {
                record.lock().unwrap().frames.push(text.as_bytes().to_vec());
            }
            Ok(tungstenite::Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }
    record.lock().unwrap().closed += 1;
}

// ── fixtures and helpers ─────────────────────────────────────────────

pub(crate) fn test_options(id: u64, addr: SocketAddr) -> SessionOptions {
    SessionOptions {
        id: SessionId(id),
        target: LinkTarget {
            host: addr.ip().to_string(),
            port: Some(addr.port()),
            path: "/ws".to_string(),
            secure: false,
        },
        subprotocol: "muxtty".to_string(),
        credentials: Arc::new(StaticCredential::new("hunter2")),
        keepalive: KeepaliveSchedule::default(),
        font_size: 16,
    }
}

pub(crate) fn test_config(addr: SocketAddr) -> MuxConfig {
    let mut config = MuxConfig::default();
    config.endpoint.host = addr.ip().to_string();
    config.endpoint.port = Some(addr.port());
    config
}

pub(crate) async fn next_event<T: Clone>(rx: &mut broadcast::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event channel closed")
}

pub(crate) async fn assert_no_event<T: Clone + fmt::Debug>(rx: &mut broadcast::Receiver<T>) {
    match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
        Ok(Ok(event)) => panic!("unexpected event: {event:?}"),
        Ok(Err(_)) | Err(_) => {}
    }
}

pub(crate) async fn wait_until(mut predicate: impl FnMut() -> bool) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within 4s");
}
