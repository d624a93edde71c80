//! Contract between the multiplexer core and the terminal renderer.
//!
//! The core never renders glyphs itself. It treats the emulator as an opaque
//! sink/source of raw bytes plus a preferred geometry, and calls it only from
//! the owning session's actor task.

use serde::{Deserialize, Serialize};

/// Terminal geometry in character cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

impl Geometry {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

impl std::fmt::Display for Geometry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.cols, self.rows)
    }
}

/// Rendering endpoint for one session.
///
/// Implementations live with the embedder; the session actor owns the boxed
/// sink exclusively, so no call here ever races another.
pub trait TerminalSink: Send + 'static {
    /// Bind the render target. Returns false when the target is unavailable,
    /// in which case the session settles into closed without ever dialing.
    fn attach(&mut self) -> bool;

    /// Inject raw bytes from the far end.
    fn write(&mut self, bytes: &[u8]);

    /// Append a user-visible status line.
    fn notice(&mut self, line: &str);

    /// Drop buffered placeholder content.
    fn clear(&mut self);

    /// Current preferred geometry.
    fn geometry(&self) -> Geometry;

    /// Apply a font size in pixels.
    fn set_font_size(&mut self, px: u16);

    /// Recompute the preferred geometry after a display change.
    fn refit(&mut self);

    /// Release render resources, including any accelerated backend.
    fn detach(&mut self);
}
