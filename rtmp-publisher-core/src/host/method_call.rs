use serde::Deserialize;
use serde_json::Value;

use crate::models::config::CameraFacing;
use crate::models::error::PublisherError;
use crate::models::handle::SessionHandle;

/// A named command with structured arguments, as received from the host.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    pub fn has_argument(&self, key: &str) -> bool {
        self.arguments.get(key).is_some_and(|v| !v.is_null())
    }

    fn argument(&self, key: &str) -> Result<&Value, PublisherError> {
        self.arguments
            .get(key)
            .filter(|v| !v.is_null())
            .ok_or_else(|| PublisherError::InvalidArgument(format!("missing argument {:?}", key)))
    }

    /// The `tex` argument: a non-negative integer.
    pub fn handle(&self) -> Result<SessionHandle, PublisherError> {
        let value = self.argument("tex")?;
        value.as_u64().map(SessionHandle::new).ok_or_else(|| {
            PublisherError::InvalidArgument(format!(
                "tex must be a non-negative integer, got {}",
                value
            ))
        })
    }

    pub fn u32_argument(&self, key: &str) -> Result<u32, PublisherError> {
        let value = self.argument(key)?;
        value
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                PublisherError::InvalidArgument(format!(
                    "{} must be a non-negative integer, got {}",
                    key, value
                ))
            })
    }

    pub fn str_argument(&self, key: &str) -> Result<&str, PublisherError> {
        let value = self.argument(key)?;
        value.as_str().ok_or_else(|| {
            PublisherError::InvalidArgument(format!("{} must be a string, got {}", key, value))
        })
    }

    pub fn facing_argument(&self, key: &str) -> Result<CameraFacing, PublisherError> {
        CameraFacing::parse(self.str_argument(key)?)
    }
}
