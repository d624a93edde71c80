//! One terminal session: a single transport link bound to a single sink,
//! driven by an actor task.
//!
//! All session state is mutated from the actor's select loop, in reaction
//! to handle commands, inbound frames, keepalive ticks, and link lifecycle.
//! The handle is a thin cloneable command front: bounded mpsc in, oneshot
//! replies out, broadcast lifecycle events on the side.

use std::fmt;
use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio_tungstenite::tungstenite;
use tracing::{debug, warn};

use term_proto::{ControlMessage, frame_data};

use crate::auth::CredentialProvider;
use crate::error::MuxError;
use crate::keepalive::{KeepalivePulse, KeepaliveSchedule};
use crate::link::{self, LinkState, LinkStream, LinkTarget};
use crate::sink::{Geometry, TerminalSink};

/// Caller-assigned session identifier, unique within one registry.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "term-{}", self.0)
    }
}

/// Lifecycle signals a session emits, exactly two kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    Disconnected,
}

/// Snapshot of a session, readable even after its actor is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub state: LinkState,
    pub geometry: Geometry,
    pub created_at: String,
}

impl SessionInfo {
    pub fn connected(&self) -> bool {
        self.state == LinkState::Open
    }
}

/// Options for opening a new session.
pub struct SessionOptions {
    pub id: SessionId,
    pub target: LinkTarget,
    pub subprotocol: String,
    pub credentials: Arc<dyn CredentialProvider>,
    pub keepalive: KeepaliveSchedule,
    pub font_size: u16,
}

/// Commands that can be sent to a session actor
#[derive(Debug)]
enum SessionCommand {
    NotifyResize {
        geometry: Geometry,
        respond_to: oneshot::Sender<Result<(), MuxError>>,
    },
    SendInput {
        data: Vec<u8>,
        respond_to: oneshot::Sender<Result<(), MuxError>>,
    },
    SetFontSize {
        px: u16,
        respond_to: oneshot::Sender<Result<(), MuxError>>,
    },
    GetInfo {
        respond_to: oneshot::Sender<SessionInfo>,
    },
    Close {
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to communicate with a session actor
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    info: Arc<RwLock<SessionInfo>>,
}

impl SessionHandle {
    /// Report a sink geometry change. Sent to the far end as a resize
    /// control message while the link is open; noted and dropped otherwise.
    pub async fn notify_resize(&self, geometry: Geometry) -> Result<(), MuxError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::NotifyResize {
                geometry,
                respond_to: tx,
            })
            .await
            .map_err(|_| MuxError::SessionGone)?;
        rx.await.map_err(|_| MuxError::NoResponse)?
    }

    /// Forward terminal input to the far end under the raw-data tag.
    pub async fn send_input(&self, data: &[u8]) -> Result<(), MuxError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::SendInput {
                data: data.to_vec(),
                respond_to: tx,
            })
            .await
            .map_err(|_| MuxError::SessionGone)?;
        rx.await.map_err(|_| MuxError::NoResponse)?
    }

    /// Apply a font size to the sink and re-negotiate geometry with the
    /// far end when the link is open.
    pub async fn set_font_size(&self, px: u16) -> Result<(), MuxError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::SetFontSize { px, respond_to: tx })
            .await
            .map_err(|_| MuxError::SessionGone)?;
        rx.await.map_err(|_| MuxError::NoResponse)?
    }

    pub async fn info(&self) -> SessionInfo {
        let (tx, rx) = oneshot::channel();
        let _ = self
            .sender
            .send(SessionCommand::GetInfo { respond_to: tx })
            .await;
        match rx.await {
            Ok(info) => info,
            Err(_) => self.info.read().await.clone(),
        }
    }

    pub async fn connected(&self) -> bool {
        self.info().await.connected()
    }

    /// Subscribe to this session's lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Tear the session down: close the link, cancel the keepalive timer,
    /// clear and detach the sink. Safe to call repeatedly and on a session
    /// that never finished opening; returns after teardown is complete.
    pub async fn close(&self) {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SessionCommand::Close { respond_to: tx })
            .await
            .is_err()
        {
            // Actor already gone, nothing left to close.
            return;
        }
        let _ = rx.await;
    }
}

/// The session actor that owns one transport link and one terminal sink
pub(crate) struct SessionActor {
    info: Arc<RwLock<SessionInfo>>,
    sink: Box<dyn TerminalSink>,
    credentials: Arc<dyn CredentialProvider>,
    target: LinkTarget,
    subprotocol: String,
    schedule: KeepaliveSchedule,
    pulse: KeepalivePulse,
    receiver: mpsc::Receiver<SessionCommand>,
    event_tx: broadcast::Sender<SessionEvent>,
    ws_write: Option<SplitSink<LinkStream, tungstenite::Message>>,
    ws_read: Option<SplitStream<LinkStream>>,
}

impl SessionActor {
    /// Build the handle/actor pair without spawning, so callers can
    /// subscribe to events before the actor runs. Returns no actor when
    /// the sink refuses to attach: the session is born Closed, no link is
    /// attempted, and the handle's operations degrade to no-ops.
    pub(crate) fn build(
        opts: SessionOptions,
        mut sink: Box<dyn TerminalSink>,
    ) -> (SessionHandle, Option<SessionActor>) {
        let SessionOptions {
            id,
            target,
            subprotocol,
            credentials,
            keepalive,
            font_size,
        } = opts;

        sink.set_font_size(font_size);
        let attached = sink.attach();

        let info = Arc::new(RwLock::new(SessionInfo {
            id,
            state: if attached {
                LinkState::Connecting
            } else {
                LinkState::Closed
            },
            geometry: sink.geometry(),
            created_at: chrono::Utc::now().to_rfc3339(),
        }));

        let (sender, receiver) = mpsc::channel(32);
        let (event_tx, _) = broadcast::channel(16);

        let handle = SessionHandle {
            sender,
            event_tx: event_tx.clone(),
            info: info.clone(),
        };

        if !attached {
            warn!(session_id = %id, "terminal sink refused to attach, session not opened");
            return (handle, None);
        }

        sink.notice("Connecting to terminal server...");

        let actor = SessionActor {
            info,
            sink,
            credentials,
            target,
            subprotocol,
            schedule: keepalive,
            pulse: KeepalivePulse::default(),
            receiver,
            event_tx,
            ws_write: None,
            ws_read: None,
        };
        (handle, Some(actor))
    }

    pub(crate) async fn run(mut self) {
        let id = self.info.read().await.id;
        debug!(session_id = %id, "session actor started");
        self.drive(id).await;
        debug!(session_id = %id, "session actor stopped");
    }

    async fn drive(&mut self, id: SessionId) {
        // 1. Dial the link, staying responsive to close() the whole time.
        //    Abandoning the dial raises no events.
        let dial = link::connect(self.target.clone(), self.subprotocol.clone());
        tokio::pin!(dial);

        let stream = loop {
            tokio::select! {
                result = &mut dial => break result,
                cmd = self.receiver.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_offline_command(cmd).await {
                            return;
                        }
                    }
                    None => {
                        self.shutdown_link().await;
                        return;
                    }
                },
            }
        };

        let stream = match stream {
            Ok(stream) => stream,
            Err(err) => {
                debug!(session_id = %id, "link dial failed: {err:#}");
                self.on_link_closed().await;
                self.linger().await;
                return;
            }
        };

        // 2. Handshake: drop the placeholder, authenticate with the
        //    provider's current credential, refit, arm the keepalive.
        let (ws_write, ws_read) = stream.split();
        self.ws_write = Some(ws_write);
        self.ws_read = Some(ws_read);

        self.sink.clear();
        self.sink.notice("Connecting to session...");

        let secret = self.credentials.credential();
        if let Err(err) = self
            .send_control(&ControlMessage::Authenticate { secret })
            .await
        {
            debug!(session_id = %id, "authenticate failed: {err}");
            self.on_link_closed().await;
            self.linger().await;
            return;
        }

        self.sink.refit();
        self.pulse.start(self.schedule);
        {
            let mut info = self.info.write().await;
            info.geometry = self.sink.geometry();
            info.state = LinkState::Open;
        }
        let _ = self.event_tx.send(SessionEvent::Connected);

        // 3. Main select loop: commands, inbound frames, keepalive ticks.
        loop {
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(SessionCommand::NotifyResize { geometry, respond_to }) => {
                        self.info.write().await.geometry = geometry;
                        let result = self
                            .send_control(&ControlMessage::Resize {
                                cols: geometry.cols,
                                rows: geometry.rows,
                            })
                            .await;
                        let _ = respond_to.send(result);
                    }
                    Some(SessionCommand::SendInput { data, respond_to }) => {
                        let result = self.send_frame(frame_data(&data)).await;
                        let _ = respond_to.send(result);
                    }
                    Some(SessionCommand::SetFontSize { px, respond_to }) => {
                        let geometry = self.apply_font_size(px).await;
                        let result = self
                            .send_control(&ControlMessage::Resize {
                                cols: geometry.cols,
                                rows: geometry.rows,
                            })
                            .await;
                        let _ = respond_to.send(result);
                    }
                    Some(SessionCommand::GetInfo { respond_to }) => {
                        let _ = respond_to.send(self.info.read().await.clone());
                    }
                    Some(SessionCommand::Close { respond_to }) => {
                        self.shutdown_link().await;
                        let _ = respond_to.send(());
                        return;
                    }
                    None => {
                        self.shutdown_link().await;
                        return;
                    }
                },

                frame = Self::next_frame(&mut self.ws_read) => match frame {
                    Some(Ok(tungstenite::Message::Binary(data))) => {
                        self.sink.write(&data);
                    }
                    Some(Ok(tungstenite::Message::Text(text))) => {
                        self.sink.write(text.as_bytes());
                    }
                    Some(Ok(tungstenite::Message::Close(_))) | None => {
                        self.on_link_closed().await;
                        self.linger().await;
                        return;
                    }
                    Some(Err(err)) => {
                        debug!(session_id = %id, "link read failed: {err}");
                        self.on_link_closed().await;
                        self.linger().await;
                        return;
                    }
                    Some(Ok(_)) => {}
                },

                () = self.pulse.tick() => {
                    if let Err(err) = self.send_control(&ControlMessage::Keepalive).await {
                        debug!(session_id = %id, "keepalive send failed: {err}");
                        self.on_link_closed().await;
                        self.linger().await;
                        return;
                    }
                }
            }
        }
    }

    /// Commands arriving while no link is open (dial still in flight, or
    /// link already gone). Returns true when the command closed the session.
    async fn handle_offline_command(&mut self, cmd: SessionCommand) -> bool {
        match cmd {
            SessionCommand::NotifyResize {
                geometry,
                respond_to,
            } => {
                self.info.write().await.geometry = geometry;
                let _ = respond_to.send(Ok(()));
                false
            }
            SessionCommand::SendInput { respond_to, .. } => {
                let _ = respond_to.send(Err(MuxError::Transport("link not open".to_string())));
                false
            }
            SessionCommand::SetFontSize { px, respond_to } => {
                self.apply_font_size(px).await;
                let _ = respond_to.send(Ok(()));
                false
            }
            SessionCommand::GetInfo { respond_to } => {
                let _ = respond_to.send(self.info.read().await.clone());
                false
            }
            SessionCommand::Close { respond_to } => {
                self.shutdown_link().await;
                let _ = respond_to.send(());
                true
            }
        }
    }

    /// Keep serving handle commands after the link is gone, so a later
    /// close() can still release the sink.
    async fn linger(&mut self) {
        while let Some(cmd) = self.receiver.recv().await {
            if self.handle_offline_command(cmd).await {
                return;
            }
        }
        self.shutdown_link().await;
    }

    /// Apply a font size to the sink and recompute its geometry.
    async fn apply_font_size(&mut self, px: u16) -> Geometry {
        self.sink.set_font_size(px);
        self.sink.refit();
        let geometry = self.sink.geometry();
        self.info.write().await.geometry = geometry;
        geometry
    }

    /// The link dropped out from under us: park the keepalive, mark the
    /// session closed, signal once, and leave a notice in the sink. The
    /// sink itself stays attached until an explicit close().
    async fn on_link_closed(&mut self) {
        self.pulse.stop();
        self.ws_write = None;
        self.ws_read = None;
        self.info.write().await.state = LinkState::Closed;
        let _ = self.event_tx.send(SessionEvent::Disconnected);
        self.sink.notice("Terminal disconnected.");
    }

    /// Explicit teardown: close the link if one is open, park the
    /// keepalive, signal disconnected iff the session was open, then
    /// clear and detach the sink.
    async fn shutdown_link(&mut self) {
        if let Some(mut write) = self.ws_write.take() {
            let _ = write.close().await;
        }
        self.ws_read = None;
        self.pulse.stop();

        let was_open = {
            let mut info = self.info.write().await;
            let was_open = info.state == LinkState::Open;
            info.state = LinkState::Closed;
            was_open
        };
        if was_open {
            let _ = self.event_tx.send(SessionEvent::Disconnected);
        }

        self.sink.clear();
        self.sink.detach();
    }

    async fn send_control(&mut self, message: &ControlMessage) -> Result<(), MuxError> {
        let frame = message.encode()?;
        self.send_frame(frame).await
    }

    async fn send_frame(&mut self, frame: Vec<u8>) -> Result<(), MuxError> {
        let write = self
            .ws_write
            .as_mut()
            .ok_or_else(|| MuxError::Transport("link not open".to_string()))?;
        write
            .send(tungstenite::Message::Binary(frame.into()))
            .await
            .map_err(|err| MuxError::Transport(err.to_string()))
    }

    async fn next_frame(
        ws_read: &mut Option<SplitStream<LinkStream>>,
    ) -> Option<Result<tungstenite::Message, tungstenite::Error>> {
        match ws_read.as_mut() {
            Some(stream) => stream.next().await,
            None => std::future::pending().await,
        }
    }
}

/// Open a new session and return its handle.
///
/// The sink is bound first; if it refuses to attach the session stays
/// Closed and no link is dialed. Otherwise the actor task dials the
/// target and drives the session until `close()`.
pub fn open_session(opts: SessionOptions, sink: Box<dyn TerminalSink>) -> SessionHandle {
    let (handle, actor) = SessionActor::build(opts, sink);
    if let Some(actor) = actor {
        tokio::spawn(async move {
            actor.run().await;
        });
    }
    handle
}
