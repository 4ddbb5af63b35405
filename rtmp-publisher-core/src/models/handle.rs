use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of the per-session event channel name.
pub const EVENT_CHANNEL_PREFIX: &str = "rtmp_publisher/instance-";

/// Opaque identifier of one streaming session (the host's texture id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionHandle(u64);

impl SessionHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }

    /// Name of the push channel carrying this session's events.
    pub fn event_channel_name(&self) -> String {
        format!("{}{}", EVENT_CHANNEL_PREFIX, self.0)
    }
}

impl fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
