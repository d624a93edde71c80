//! Wire codec for the in-band terminal control channel.
//!
//! A terminal session's transport carries two kinds of client traffic on one
//! byte stream: raw terminal data and small control frames (authenticate,
//! resize, keepalive). Every client frame starts with an ASCII tag digit so
//! the far end can dispatch on the first byte; the far end itself only ever
//! sends raw terminal output back. This crate owns the tags, the frame
//! encoding, and its exact inverse. It does no I/O.
//!
//! # Example
//!
//! ```
//! use term_proto::ControlMessage;
//!
//! let frame = ControlMessage::Resize { cols: 120, rows: 40 }.encode().unwrap();
//! assert_eq!(frame, b"1{\"cols\":120,\"rows\":40}");
//!
//! let msg = ControlMessage::decode(&frame).unwrap();
//! assert_eq!(msg, ControlMessage::Resize { cols: 120, rows: 40 });
//! ```

mod control;
mod error;

pub use control::{
    ControlMessage, TAG_AUTHENTICATE, TAG_DATA, TAG_KEEPALIVE, TAG_RESIZE, frame_data,
};
pub use error::CodecError;
