//! Terminal session multiplexer over WebSocket transport links.
//!
//! This crate owns a set of concurrent interactive terminal sessions, each
//! backed by its own WebSocket link to the terminal server, with the small
//! in-band control protocol (authenticate, resize, keepalive) from
//! [`term_proto`] layered on top of the raw byte stream. Rendering is left
//! to an embedder-supplied [`TerminalSink`]; the credential presented at
//! link-open comes from an injected [`CredentialProvider`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use term_mux::{MuxConfig, SessionId, SessionRegistry, StaticCredential};
//! # use term_mux::{Geometry, TerminalSink};
//! # struct MySink;
//! # impl TerminalSink for MySink {
//! #     fn attach(&mut self) -> bool { true }
//! #     fn write(&mut self, _bytes: &[u8]) {}
//! #     fn notice(&mut self, _line: &str) {}
//! #     fn clear(&mut self) {}
//! #     fn geometry(&self) -> Geometry { Geometry::default() }
//! #     fn set_font_size(&mut self, _px: u16) {}
//! #     fn refit(&mut self) {}
//! #     fn detach(&mut self) {}
//! # }
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = MuxConfig::default();
//!     let registry = SessionRegistry::new(&config, Arc::new(StaticCredential::new("secret")));
//!
//!     let handle = registry.create(SessionId(1), Box::new(MySink)).await;
//!     handle.send_input(b"ls\n").await.ok();
//!
//!     registry.close_all().await;
//! }
//! ```

mod auth;
mod config;
mod error;
mod keepalive;
mod link;
mod registry;
mod session;
mod sink;
#[cfg(test)]
pub(crate) mod test_support;

pub use auth::{CredentialProvider, StaticCredential};
pub use config::{EndpointConfig, MuxConfig, TerminalConfig, load_config};
pub use error::MuxError;
pub use keepalive::{DEFAULT_KEEPALIVE_SECS, KeepaliveSchedule, MIN_KEEPALIVE_SECS};
pub use link::{LinkState, LinkTarget};
pub use registry::{ActiveGauge, MuxEvent, SessionRegistry};
pub use session::{
    SessionEvent, SessionHandle, SessionId, SessionInfo, SessionOptions, open_session,
};
pub use sink::{Geometry, TerminalSink};
