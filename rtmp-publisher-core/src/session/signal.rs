//! Cross-thread handoff from backend callbacks to the session owner thread.
//!
//! Capture and link callbacks run on backend threads. They never touch
//! session state directly: each callback posts a `Signal` tagged with the
//! session handle and the epoch it was issued under, and the registry
//! applies it later from `SessionRegistry::pump`. A single FIFO channel
//! keeps per-session ordering.

use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::models::frame::VideoFrame;
use crate::models::handle::SessionHandle;
use crate::session::router::FrameRouter;
use crate::traits::capture_pipeline::CaptureListener;
use crate::traits::publish_link::{LinkListener, PublishLink};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Signal {
    CameraSize { width: u32, height: u32 },
    CaptureFailed { message: String },
    LinkOpened,
    LinkFailed { reason: String },
    LinkClosed { reason: String },
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub handle: SessionHandle,
    pub epoch: u64,
    pub signal: Signal,
}

/// Posts signals for one session.
#[derive(Clone)]
pub(crate) struct SignalSender {
    handle: SessionHandle,
    tx: Sender<Envelope>,
}

impl SignalSender {
    pub fn new(handle: SessionHandle, tx: Sender<Envelope>) -> Self {
        Self { handle, tx }
    }

    pub fn post(&self, epoch: u64, signal: Signal) {
        let envelope = Envelope {
            handle: self.handle,
            epoch,
            signal,
        };
        if self.tx.send(envelope).is_err() {
            log::debug!("session {}: registry gone, signal dropped", self.handle);
        }
    }
}

/// `CaptureListener` handed to the capture pipeline.
pub(crate) struct CaptureBridge<L: PublishLink> {
    pub router: Arc<FrameRouter<L>>,
    pub signals: SignalSender,
    pub epoch: u64,
}

impl<L: PublishLink> CaptureListener for CaptureBridge<L> {
    fn on_frame(&self, frame: &VideoFrame) {
        self.router.route(frame);
    }

    fn on_camera_size(&self, width: u32, height: u32) {
        self.signals
            .post(self.epoch, Signal::CameraSize { width, height });
    }

    fn on_error(&self, message: &str) {
        self.signals.post(
            self.epoch,
            Signal::CaptureFailed {
                message: message.to_string(),
            },
        );
    }
}

/// `LinkListener` handed to the publish link for one connection attempt.
pub(crate) struct LinkBridge {
    pub signals: SignalSender,
    pub epoch: u64,
}

impl LinkListener for LinkBridge {
    fn on_opened(&self) {
        self.signals.post(self.epoch, Signal::LinkOpened);
    }

    fn on_failed(&self, reason: &str) {
        self.signals.post(
            self.epoch,
            Signal::LinkFailed {
                reason: reason.to_string(),
            },
        );
    }

    fn on_closed(&self, reason: &str) {
        self.signals.post(
            self.epoch,
            Signal::LinkClosed {
                reason: reason.to_string(),
            },
        );
    }
}
