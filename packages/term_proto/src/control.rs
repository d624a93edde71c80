//! Tagged control frames over the shared terminal byte stream.
//!
//! Wire format: `[ASCII tag digit][JSON body]` for Authenticate and Resize,
//! the bare tag digit for Keepalive, and `[data tag][raw bytes]` for terminal
//! input. The far end dispatches on the first byte of every client frame, so
//! even plain keyboard input must travel under the data tag. Tags `2` and `3`
//! belong to the far end's pause/resume machinery and are never sent from
//! this side.

use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Raw terminal data (keyboard input and any other non-control payload).
pub const TAG_DATA: u8 = b'0';
/// Resize control frame; body `{"cols": N, "rows": N}`.
pub const TAG_RESIZE: u8 = b'1';
/// Authenticate control frame; body `{"secret": "..."}`.
pub const TAG_AUTHENTICATE: u8 = b'4';
/// Keepalive control frame; no body.
pub const TAG_KEEPALIVE: u8 = b'5';

/// JSON body of a resize frame. Field order is the wire order.
#[derive(Debug, Serialize, Deserialize)]
struct ResizeBody {
    cols: u16,
    rows: u16,
}

/// JSON body of an authenticate frame.
#[derive(Debug, Serialize, Deserialize)]
struct AuthBody {
    secret: String,
}

/// A control message multiplexed onto the terminal byte stream.
///
/// The protocol is asymmetric: the client emits control frames, the far end
/// replies with raw terminal output only. Nothing received from the far end
/// is ever decoded as a control message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// Present the session credential; sent once, right after link-open.
    Authenticate { secret: String },
    /// Report the terminal's new geometry to the far end.
    Resize { cols: u16, rows: u16 },
    /// Periodic no-op that keeps idle links from being reaped.
    Keepalive,
}

impl ControlMessage {
    /// Encode this message into a wire frame.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut frame = Vec::new();
        match self {
            ControlMessage::Authenticate { secret } => {
                frame.push(TAG_AUTHENTICATE);
                frame.extend_from_slice(&serde_json::to_vec(&AuthBody {
                    secret: secret.clone(),
                })?);
            }
            ControlMessage::Resize { cols, rows } => {
                frame.push(TAG_RESIZE);
                frame.extend_from_slice(&serde_json::to_vec(&ResizeBody {
                    cols: *cols,
                    rows: *rows,
                })?);
            }
            ControlMessage::Keepalive => {
                frame.push(TAG_KEEPALIVE);
            }
        }
        Ok(frame)
    }

    /// Decode a wire frame back into a message.
    ///
    /// Exact inverse of [`encode`](Self::encode) for frames this codec
    /// produces; bodies with reordered or extra JSON fields still decode.
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        let (&tag, body) = frame.split_first().ok_or(CodecError::EmptyFrame)?;
        match tag {
            TAG_RESIZE => {
                let body: ResizeBody = serde_json::from_slice(body)?;
                Ok(ControlMessage::Resize {
                    cols: body.cols,
                    rows: body.rows,
                })
            }
            TAG_AUTHENTICATE => {
                let body: AuthBody = serde_json::from_slice(body)?;
                Ok(ControlMessage::Authenticate {
                    secret: body.secret,
                })
            }
            TAG_KEEPALIVE => {
                if !body.is_empty() {
                    return Err(CodecError::KeepalivePayload(body.len()));
                }
                Ok(ControlMessage::Keepalive)
            }
            other => Err(CodecError::UnknownTag(other)),
        }
    }
}

/// Frame an outbound terminal chunk under the raw-data tag.
pub fn frame_data(chunk: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + chunk.len());
    frame.push(TAG_DATA);
    frame.extend_from_slice(chunk);
    frame
}
