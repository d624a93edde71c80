//! Transport link dialing and addressing.
//!
//! A link is one WebSocket connection to the terminal server. Dialing
//! lives here; everything after the handshake (framing, keepalive, the
//! control channel) belongs to the session that owns the link.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

pub(crate) type LinkStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of a session's transport link.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    /// Dial in flight; nothing sent or received yet.
    Connecting,
    /// Handshake done, control channel live.
    Open,
    /// Link torn down. Terminal state; sessions never redial.
    Closed,
}

/// Where a link dials: host, optional port, URL path, and TLS choice.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkTarget {
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub secure: bool,
}

impl LinkTarget {
    /// Render the WebSocket URL this target dials.
    ///
    /// The scheme follows `secure` (`ws` or `wss`); the path is joined
    /// with a `/` when it doesn't carry its own.
    pub fn url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = match self.port {
            Some(port) => format!("{scheme}://{}:{port}", self.host),
            None => format!("{scheme}://{}", self.host),
        };
        if !self.path.starts_with('/') {
            url.push('/');
        }
        url.push_str(&self.path);
        url
    }
}

/// Dial the target and complete the WebSocket handshake, requesting the
/// given subprotocol.
pub(crate) async fn connect(
    target: LinkTarget,
    subprotocol: String,
) -> anyhow::Result<LinkStream> {
    let url = target.url();
    debug!(%url, %subprotocol, "dialing transport link");

    let mut request = url
        .as_str()
        .into_client_request()
        .with_context(|| format!("invalid link URL: {url}"))?;
    request.headers_mut().insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_str(&subprotocol).context("subprotocol is not a valid header value")?,
    );

    let (stream, response) = tokio_tungstenite::connect_async(request)
        .await
        .with_context(|| format!("connecting to {url}"))?;
    debug!(status = %response.status(), "transport link open");
    Ok(stream)
}
