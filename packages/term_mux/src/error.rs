use thiserror::Error;

use crate::session::SessionId;

/// Errors surfaced by the multiplexer.
#[derive(Debug, Error)]
pub enum MuxError {
    /// The session actor has already shut down; the handle is stale.
    #[error("session actor is gone")]
    SessionGone,

    /// The session actor dropped a command without replying.
    #[error("session actor didn't respond")]
    NoResponse,

    /// No session is registered under this identifier.
    #[error("session not found: {0}")]
    NotFound(SessionId),

    /// The transport link failed to dial, or a frame could not be sent.
    #[error("transport: {0}")]
    Transport(String),

    /// A control frame could not be encoded.
    #[error(transparent)]
    Codec(#[from] term_proto::CodecError),

    /// Configuration could not be loaded or deserialized.
    #[error("config: {0}")]
    Config(#[from] figment::Error),
}

impl From<anyhow::Error> for MuxError {
    fn from(err: anyhow::Error) -> Self {
        MuxError::Transport(format!("{:#}", err))
    }
}
