use thiserror::Error;

/// Errors produced by the control codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame had no bytes at all, not even a tag.
    #[error("empty control frame")]
    EmptyFrame,

    /// The leading byte is not a tag this codec knows.
    #[error("unknown control tag: {0:#04x}")]
    UnknownTag(u8),

    /// The tag requires a JSON body and the body failed to serialize or parse.
    #[error("control body JSON: {0}")]
    Body(#[from] serde_json::Error),

    /// A keepalive frame carried payload bytes; keepalive is the bare tag.
    #[error("unexpected payload after keepalive tag ({0} bytes)")]
    KeepalivePayload(usize),
}
