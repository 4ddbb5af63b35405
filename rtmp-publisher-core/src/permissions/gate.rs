//! Serialized OS permission prompts.
//!
//! One `PermissionGate` exists per process and is handed to whoever needs
//! it. It holds at most one outstanding prompt; the platform answers
//! through a `PermissionResponder` from any thread and the gate resolves
//! the request on the owner thread in `pump`.

use crossbeam_channel::{Receiver, Sender};

use crate::models::config::Capability;
use crate::models::error::PublisherError;
use crate::traits::permission_platform::PermissionPlatform;

/// Invoked exactly once with whether every requested capability was granted.
pub type PermissionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

#[derive(Debug)]
struct PermissionResponse {
    request_id: u64,
    results: Vec<(Capability, bool)>,
}

/// One-shot answer channel for a single prompt.
pub struct PermissionResponder {
    request_id: u64,
    tx: Sender<PermissionResponse>,
}

impl PermissionResponder {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Deliver per-capability results. Capabilities missing from `results`
    /// count as denied.
    pub fn respond(self, results: Vec<(Capability, bool)>) {
        let response = PermissionResponse {
            request_id: self.request_id,
            results,
        };
        if self.tx.send(response).is_err() {
            log::debug!("permission gate gone, response {} dropped", self.request_id);
        }
    }
}

struct PendingRequest {
    id: u64,
    missing: Vec<Capability>,
    callback: PermissionCallback,
}

pub struct PermissionGate<P: PermissionPlatform> {
    platform: P,
    pending: Option<PendingRequest>,
    next_request_id: u64,
    tx: Sender<PermissionResponse>,
    rx: Receiver<PermissionResponse>,
}

impl<P: PermissionPlatform> PermissionGate<P> {
    pub fn new(platform: P) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            platform,
            pending: None,
            next_request_id: 1,
            tx,
            rx,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Ask for `capabilities`.
    ///
    /// If all are already granted, `callback` runs before this returns.
    /// Otherwise one prompt is issued for the missing ones and `callback`
    /// runs from a later `pump`. A request made while another is pending
    /// is rejected and its callback is never called.
    pub fn request(
        &mut self,
        capabilities: &[Capability],
        callback: PermissionCallback,
    ) -> Result<(), PublisherError> {
        let mut missing: Vec<Capability> = capabilities
            .iter()
            .copied()
            .filter(|c| !self.platform.is_granted(*c))
            .collect();
        missing.sort();
        missing.dedup();

        if missing.is_empty() {
            callback(true);
            return Ok(());
        }
        if self.pending.is_some() {
            log::warn!("permission request rejected: another prompt is outstanding");
            return Err(PublisherError::PermissionRequestPending);
        }

        let id = self.next_request_id;
        self.next_request_id += 1;
        let responder = PermissionResponder {
            request_id: id,
            tx: self.tx.clone(),
        };

        log::info!("requesting permissions {:?} (request {})", missing, id);
        self.platform.request(&missing, responder)?;
        self.pending = Some(PendingRequest {
            id,
            missing,
            callback,
        });
        Ok(())
    }

    /// Resolve the outstanding request if its answer has arrived.
    /// Returns the number of responses consumed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(response) = self.rx.try_recv() {
            processed += 1;
            let matches = self
                .pending
                .as_ref()
                .is_some_and(|p| p.id == response.request_id);
            if !matches {
                log::debug!("ignoring stale permission response {}", response.request_id);
                continue;
            }
            let Some(pending) = self.pending.take() else {
                continue;
            };

            let granted = pending.missing.iter().all(|c| {
                response
                    .results
                    .iter()
                    .any(|(rc, ok)| rc == c && *ok)
            });
            if !granted {
                log::warn!("permissions denied: {:?}", response.results);
            }
            (pending.callback)(granted);
        }
        processed
    }

    /// Forget the outstanding request without calling its callback.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending.take() {
            log::debug!("permission request {} cancelled", pending.id);
        }
    }
}
