use thiserror::Error;

use super::handle::SessionHandle;
use super::state::SessionState;

/// Errors surfaced by session, registry, and dispatcher operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublisherError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no session for handle {0}")]
    NotFound(SessionHandle),

    #[error("session has been closed")]
    InvalidInstance,

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Not raised here: `initCaptureConfig` answers a denied prompt with
    /// `false`. Reserved for hosts that turn that answer into an error.
    #[error("permission denied")]
    PermissionDenied,

    #[error("a permission request is already outstanding")]
    PermissionRequestPending,

    #[error("failed to connect: {0}")]
    ConnectFailure(String),

    #[error("{component} error: {message}")]
    Capture { component: String, message: String },

    #[error("method not implemented: {0}")]
    NotImplemented(String),

    #[error("backend error: {0}")]
    Backend(String),
}

impl PublisherError {
    /// Stable code reported to the host alongside the message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::NotFound(_) => "NotFound",
            Self::InvalidInstance => "InvalidInstance",
            Self::InvalidState { .. } => "InvalidState",
            Self::PermissionDenied => "PermissionDenied",
            Self::PermissionRequestPending => "PermissionRequestPending",
            Self::ConnectFailure(_) => "ConnectFailure",
            Self::Capture { .. } => "CaptureError",
            Self::NotImplemented(_) => "NotImplemented",
            Self::Backend(_) => "BackendError",
        }
    }

    pub(crate) fn invalid_state(operation: &'static str, state: SessionState) -> Self {
        Self::InvalidState { operation, state }
    }
}
