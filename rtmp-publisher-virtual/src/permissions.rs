//! Desktop permission model.
//!
//! Desktop processes have camera and microphone access unless the user has
//! switched it off system-wide, so there is no prompt to show. Capabilities
//! on the deny list model that switch.

use std::collections::BTreeSet;

use rtmp_publisher_core::{Capability, PermissionPlatform, PermissionResponder, PublisherError};

#[derive(Debug, Clone, Default)]
pub struct DesktopPermissions {
    denied: BTreeSet<Capability>,
}

impl DesktopPermissions {
    /// Everything granted.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying(capabilities: &[Capability]) -> Self {
        Self {
            denied: capabilities.iter().copied().collect(),
        }
    }
}

impl PermissionPlatform for DesktopPermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        !self.denied.contains(&capability)
    }

    fn request(
        &mut self,
        capabilities: &[Capability],
        responder: PermissionResponder,
    ) -> Result<(), PublisherError> {
        let results: Vec<(Capability, bool)> = capabilities
            .iter()
            .map(|c| (*c, self.is_granted(*c)))
            .collect();
        log::info!(
            "desktop permissions for request {}: {:?}",
            responder.request_id(),
            results
        );
        responder.respond(results);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use rtmp_publisher_core::PermissionGate;

    use super::*;

    fn outcome() -> (Arc<Mutex<Option<bool>>>, rtmp_publisher_core::PermissionCallback) {
        let slot = Arc::new(Mutex::new(None));
        let s = Arc::clone(&slot);
        (slot, Box::new(move |granted| *s.lock() = Some(granted)))
    }

    #[test]
    fn grants_without_prompting() {
        let mut gate = PermissionGate::new(DesktopPermissions::new());
        let (slot, callback) = outcome();

        gate.request(&[Capability::Camera, Capability::Microphone], callback)
            .unwrap();
        assert_eq!(*slot.lock(), Some(true));
    }

    #[test]
    fn denied_capability_resolves_false_on_pump() {
        let mut gate = PermissionGate::new(DesktopPermissions::denying(&[Capability::Microphone]));
        let (slot, callback) = outcome();

        gate.request(&[Capability::Camera, Capability::Microphone], callback)
            .unwrap();
        assert_eq!(*slot.lock(), None);

        gate.pump();
        assert_eq!(*slot.lock(), Some(false));
        assert!(!gate.is_pending());
    }
}
