//! The multiplexer: owns every live session, keyed by caller-assigned id,
//! and aggregates their lifecycle into an any-active signal.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::sync::{RwLock, broadcast};
use tracing::{debug, warn};

use crate::auth::CredentialProvider;
use crate::config::MuxConfig;
use crate::error::MuxError;
use crate::keepalive::KeepaliveSchedule;
use crate::link::LinkTarget;
use crate::session::{
    SessionActor, SessionEvent, SessionHandle, SessionId, SessionInfo, SessionOptions,
};
use crate::sink::{Geometry, TerminalSink};

/// Events emitted by the registry across all sessions
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MuxEvent {
    /// A session's link came up.
    Connected { id: SessionId },
    /// A session's link went down.
    Disconnected { id: SessionId },
    /// The any-session-connected aggregate flipped.
    Active { active: bool },
}

/// Connected-session counter behind the any-active aggregate.
///
/// Tolerates duplicate or out-of-order disconnects: the count clamps at
/// zero instead of going negative.
#[derive(Debug, Default)]
pub struct ActiveGauge {
    connected: AtomicU32,
}

impl ActiveGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connect. True when this flipped any-active on.
    pub fn connect(&self) -> bool {
        self.connected.fetch_add(1, Ordering::Relaxed) == 0
    }

    /// Record a disconnect, clamped at zero. True when this flipped
    /// any-active off.
    pub fn disconnect(&self) -> bool {
        self.connected
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            == Ok(1)
    }

    pub fn count(&self) -> u32 {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn any_active(&self) -> bool {
        self.count() > 0
    }
}

/// Registry of live sessions
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
    gauge: Arc<ActiveGauge>,
    event_tx: broadcast::Sender<MuxEvent>,
    credentials: Arc<dyn CredentialProvider>,
    target: LinkTarget,
    subprotocol: String,
    keepalive: KeepaliveSchedule,
    font_size: RwLock<u16>,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(config: &MuxConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            sessions: RwLock::new(HashMap::new()),
            gauge: Arc::new(ActiveGauge::new()),
            event_tx,
            credentials,
            target: config.target(),
            subprotocol: config.endpoint.subprotocol.clone(),
            keepalive: config.keepalive(),
            font_size: RwLock::new(config.terminal.font_size),
            max_sessions: config.terminal.max_sessions,
        }
    }

    /// Open a session for `id`, replacing any existing one.
    ///
    /// The old session is fully closed before the new link dials, so one
    /// id never has two concurrently open links. The map lock is held
    /// across the swap to keep concurrent `create` calls for the same id
    /// from interleaving.
    pub async fn create(&self, id: SessionId, sink: Box<dyn TerminalSink>) -> SessionHandle {
        let mut sessions = self.sessions.write().await;

        if let Some(old) = sessions.remove(&id) {
            debug!(session_id = %id, "replacing existing session");
            old.close().await;
        }

        let opts = SessionOptions {
            id,
            target: self.target.clone(),
            subprotocol: self.subprotocol.clone(),
            credentials: self.credentials.clone(),
            keepalive: self.keepalive,
            font_size: *self.font_size.read().await,
        };

        // Subscribe before the actor runs so no event slips past the
        // forwarder.
        let (handle, actor) = SessionActor::build(opts, sink);
        self.spawn_forwarder(id, handle.subscribe());
        if let Some(actor) = actor {
            tokio::spawn(async move {
                actor.run().await;
            });
        }

        sessions.insert(id, handle.clone());
        handle
    }

    /// Close and drop the session for `id`. False when absent.
    pub async fn remove(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(&id) {
            Some(handle) => {
                handle.close().await;
                true
            }
            None => false,
        }
    }

    /// Store `px` as the default for future sessions and apply it to
    /// every live one, re-negotiating geometry with each far end.
    pub async fn set_font_size(&self, px: u16) {
        *self.font_size.write().await = px;

        let sessions: Vec<(SessionId, SessionHandle)> = {
            let sessions = self.sessions.read().await;
            sessions
                .iter()
                .map(|(id, handle)| (*id, handle.clone()))
                .collect()
        };
        for (id, handle) in sessions {
            if let Err(err) = handle.set_font_size(px).await {
                debug!(session_id = %id, "font size not applied: {err}");
            }
        }
    }

    /// Re-apply the current default font size to one session. False when
    /// absent.
    pub async fn refresh(&self, id: SessionId) -> bool {
        let handle = { self.sessions.read().await.get(&id).cloned() };
        match handle {
            Some(handle) => {
                let px = *self.font_size.read().await;
                if let Err(err) = handle.set_font_size(px).await {
                    debug!(session_id = %id, "refresh not applied: {err}");
                }
                true
            }
            None => false,
        }
    }

    pub async fn send_input(&self, id: SessionId, data: &[u8]) -> Result<(), MuxError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(&id).ok_or(MuxError::NotFound(id))?;
        handle.send_input(data).await
    }

    pub async fn notify_resize(&self, id: SessionId, geometry: Geometry) -> Result<(), MuxError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(&id).ok_or(MuxError::NotFound(id))?;
        handle.notify_resize(geometry).await
    }

    pub async fn info(&self, id: SessionId) -> Result<SessionInfo, MuxError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(&id).ok_or(MuxError::NotFound(id))?;
        Ok(handle.info().await)
    }

    /// Subscribe to one session's lifecycle events.
    pub async fn subscribe_session(
        &self,
        id: SessionId,
    ) -> Result<broadcast::Receiver<SessionEvent>, MuxError> {
        let sessions = self.sessions.read().await;
        let handle = sessions.get(&id).ok_or(MuxError::NotFound(id))?;
        Ok(handle.subscribe())
    }

    pub async fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// List all live session ids
    pub async fn list(&self) -> Vec<SessionId> {
        self.sessions.read().await.keys().copied().collect()
    }

    pub async fn exists(&self, id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    pub fn connected_count(&self) -> u32 {
        self.gauge.count()
    }

    pub fn any_active(&self) -> bool {
        self.gauge.any_active()
    }

    /// Subscribe to events from all sessions plus the aggregate.
    pub fn subscribe(&self) -> broadcast::Receiver<MuxEvent> {
        self.event_tx.subscribe()
    }

    /// The current default font size for new sessions.
    pub async fn font_size(&self) -> u16 {
        *self.font_size.read().await
    }

    /// The configured session cap. The registry itself does not enforce
    /// it; callers check before `create`.
    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    /// Registry teardown: close every session.
    pub async fn close_all(&self) {
        let mut sessions = self.sessions.write().await;
        for (_, handle) in sessions.drain() {
            handle.close().await;
        }
    }

    /// Forward one session's events into the registry stream, folding
    /// them through the gauge.
    fn spawn_forwarder(&self, id: SessionId, mut events: broadcast::Receiver<SessionEvent>) {
        let gauge = self.gauge.clone();
        let event_tx = self.event_tx.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::Connected) => {
                        let flipped = gauge.connect();
                        let _ = event_tx.send(MuxEvent::Connected { id });
                        if flipped {
                            let _ = event_tx.send(MuxEvent::Active { active: true });
                        }
                    }
                    Ok(SessionEvent::Disconnected) => {
                        let flipped = gauge.disconnect();
                        let _ = event_tx.send(MuxEvent::Disconnected { id });
                        if flipped {
                            let _ = event_tx.send(MuxEvent::Active { active: false });
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(session_id = %id, skipped, "session event stream lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
