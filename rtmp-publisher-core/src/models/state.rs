use std::fmt;

/// Publish session state machine.
///
/// State transitions:
/// ```text
/// idle ─configure→ configured ─connect→ connecting ─opened→ connected ⇄ paused
///                      ↑                     │ failed          │          │
///                      └─────────────────────┴──── disconnect ─┴──────────┘
/// any ─close→ closed (terminal)
/// ```
///
/// Preview is orthogonal to this machine: it only attaches the display
/// surface and never touches the publish link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Configured,
    Connecting,
    Connected,
    Paused,
    Closed,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Whether a capture configuration has been applied.
    pub fn is_configured(&self) -> bool {
        !matches!(self, Self::Idle | Self::Closed)
    }

    /// Whether the publish link is open or being opened.
    pub fn has_link(&self) -> bool {
        matches!(self, Self::Connecting | Self::Connected | Self::Paused)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Configured => "configured",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Paused => "paused",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
