use serde_json::{json, Value};

use super::config::CameraFacing;

/// Lifecycle notification pushed to a session's subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected,
    FailedToConnect,
    Paused,
    Resumed,
    Disconnected,
    CameraSize { width: u32, height: u32 },
    Camera { facing: CameraFacing },
    Error { component: String, message: String },
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::FailedToConnect => "failedToConnect",
            Self::Paused => "paused",
            Self::Resumed => "resumed",
            Self::Disconnected => "disconnected",
            Self::CameraSize { .. } => "cameraSize",
            Self::Camera { .. } => "camera",
            Self::Error { .. } => "error",
        }
    }

    /// Wire form sent over the event channel.
    ///
    /// Plain lifecycle events are bare strings; events with a payload are
    /// maps keyed by `name`.
    pub fn to_wire(&self) -> Value {
        match self {
            Self::CameraSize { width, height } => json!({
                "name": self.name(),
                "width": width,
                "height": height,
            }),
            Self::Camera { facing } => json!({
                "name": self.name(),
                "camera": facing.as_str(),
            }),
            Self::Error { component, message } => json!({
                "name": self.name(),
                "component": component,
                "error": message,
            }),
            _ => Value::String(self.name().to_string()),
        }
    }
}
