use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::MuxError;
use crate::keepalive::{DEFAULT_KEEPALIVE_SECS, KeepaliveSchedule};
use crate::link::LinkTarget;

// =============================================================================
// Unified config (figment-deserialized from defaults / termmux.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   termmux.toml:    [endpoint]
//                    host = "10.0.0.2"
//
//   env var:         TERMMUX_ENDPOINT__HOST=10.0.0.2   (double underscore = nesting)
//
//   (single underscore stays within field names: TERMMUX_TERMINAL__FONT_SIZE)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MuxConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
}

/// Where sessions dial (lives under `[endpoint]` in termmux.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: Option<u16>,
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_subprotocol")]
    pub subprotocol: String,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            path: default_path(),
            secure: false,
            subprotocol: default_subprotocol(),
        }
    }
}

/// Per-session terminal tunables (lives under `[terminal]` in termmux.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TerminalConfig {
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
    #[serde(default = "default_font_size")]
    pub font_size: u16,
    /// Upper bound on concurrent sessions. The registry exposes it but
    /// leaves enforcement to the embedder.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: default_keepalive_secs(),
            font_size: default_font_size(),
            max_sessions: default_max_sessions(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> Option<u16> {
    Some(7171)
}
fn default_path() -> String {
    "/ws".to_string()
}
fn default_subprotocol() -> String {
    "muxtty".to_string()
}
fn default_keepalive_secs() -> u64 {
    DEFAULT_KEEPALIVE_SECS
}
fn default_font_size() -> u16 {
    16
}
fn default_max_sessions() -> usize {
    5
}

/// Build a figment that layers: defaults → termmux.toml → TERMMUX_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `TERMMUX_ENDPOINT__HOST=10.0.0.2`  →  `endpoint.host = "10.0.0.2"`
///   `TERMMUX_TERMINAL__FONT_SIZE=14`   →  `terminal.font_size = 14`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(MuxConfig::default()))
        .merge(Toml::file(data_dir.join("termmux.toml")))
        .merge(Env::prefixed("TERMMUX_").split("__"))
}

impl MuxConfig {
    /// Extract a full config from the layered sources under `data_dir`.
    pub fn load(data_dir: &Path) -> Result<Self, MuxError> {
        Ok(load_config(data_dir).extract()?)
    }

    /// The link target every new session dials.
    pub fn target(&self) -> LinkTarget {
        LinkTarget {
            host: self.endpoint.host.clone(),
            port: self.endpoint.port,
            path: self.endpoint.path.clone(),
            secure: self.endpoint.secure,
        }
    }

    /// The keepalive cadence for new sessions, floored.
    pub fn keepalive(&self) -> KeepaliveSchedule {
        KeepaliveSchedule::new(self.terminal.keepalive_secs)
    }
}
