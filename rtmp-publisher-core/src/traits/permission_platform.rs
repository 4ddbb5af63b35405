use crate::models::config::Capability;
use crate::models::error::PublisherError;
use crate::permissions::gate::PermissionResponder;

/// OS permission prompt backend.
pub trait PermissionPlatform: Send {
    /// Whether `capability` is already granted to the process.
    fn is_granted(&self, capability: Capability) -> bool;

    /// Show one batched prompt for `capabilities`.
    ///
    /// The outcome is delivered later, from any thread, via `responder`.
    fn request(
        &mut self,
        capabilities: &[Capability],
        responder: PermissionResponder,
    ) -> Result<(), PublisherError>;
}
