use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::models::frame::VideoFrame;
use crate::traits::frame_sink::FrameSink;
use crate::traits::publish_link::PublishLink;

/// Frame counters kept by the router, read through session diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameCounters {
    pub captured: u64,
    pub displayed: u64,
    pub published: u64,
    /// Captured while the link was not publishing (not connected or paused).
    pub dropped: u64,
}

/// Fans captured frames out to the display surface and the publish link.
///
/// Shared between the session owner (which flips the switches) and the
/// capture thread (which calls `route`).
pub struct FrameRouter<L: PublishLink> {
    link: Arc<L>,
    display: Mutex<Option<Arc<dyn FrameSink>>>,
    publishing: AtomicBool,
    alive: AtomicBool,
    counters: Mutex<FrameCounters>,
}

impl<L: PublishLink> FrameRouter<L> {
    pub fn new(link: Arc<L>) -> Self {
        Self {
            link,
            display: Mutex::new(None),
            publishing: AtomicBool::new(false),
            alive: AtomicBool::new(true),
            counters: Mutex::new(FrameCounters::default()),
        }
    }

    pub fn route(&self, frame: &VideoFrame) {
        if !self.alive.load(Ordering::SeqCst) {
            return;
        }

        let display = self.display.lock().clone();
        if let Some(ref display) = display {
            display.on_frame(frame);
        }

        let publishing = self.publishing.load(Ordering::SeqCst);
        if publishing {
            self.link.send_frame(frame);
        }

        let mut c = self.counters.lock();
        c.captured += 1;
        if display.is_some() {
            c.displayed += 1;
        }
        if publishing {
            c.published += 1;
        } else {
            c.dropped += 1;
        }
    }

    pub fn attach_display(&self, display: Arc<dyn FrameSink>) {
        *self.display.lock() = Some(display);
    }

    pub fn detach_display(&self) {
        *self.display.lock() = None;
    }

    pub fn set_publishing(&self, publishing: bool) {
        self.publishing.store(publishing, Ordering::SeqCst);
    }

    pub fn is_publishing(&self) -> bool {
        self.publishing.load(Ordering::SeqCst)
    }

    /// Stop routing for good. Frames arriving afterwards are ignored.
    pub fn shutdown(&self) {
        self.alive.store(false, Ordering::SeqCst);
        self.publishing.store(false, Ordering::SeqCst);
        self.detach_display();
    }

    pub fn counters(&self) -> FrameCounters {
        *self.counters.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{LinkControl, RecordingDisplay};

    fn frame() -> VideoFrame {
        VideoFrame::new(2, 2, 0, vec![0; 4])
    }

    #[test]
    fn frames_reach_display_only_when_attached() {
        let (link, _control) = LinkControl::link();
        let router = FrameRouter::new(Arc::new(link));
        let display = RecordingDisplay::new();

        router.route(&frame());
        router.attach_display(display.clone());
        router.route(&frame());
        router.detach_display();
        router.route(&frame());

        assert_eq!(display.frames(), 1);
        let c = router.counters();
        assert_eq!(c.captured, 3);
        assert_eq!(c.displayed, 1);
        assert_eq!(c.dropped, 3);
    }

    #[test]
    fn frames_reach_link_only_while_publishing() {
        let (link, control) = LinkControl::link();
        control.force_open();
        let router = FrameRouter::new(Arc::new(link));

        router.route(&frame());
        assert!(!router.is_publishing());
        router.set_publishing(true);
        assert!(router.is_publishing());
        router.route(&frame());
        router.route(&frame());

        assert_eq!(control.frames_sent(), 2);
        assert_eq!(router.counters().published, 2);
        assert_eq!(router.counters().dropped, 1);
    }

    #[test]
    fn shutdown_ignores_late_frames() {
        let (link, control) = LinkControl::link();
        control.force_open();
        let router = FrameRouter::new(Arc::new(link));
        let display = RecordingDisplay::new();
        router.attach_display(display.clone());
        router.set_publishing(true);

        router.shutdown();
        assert!(!router.is_publishing());
        router.route(&frame());

        assert_eq!(display.frames(), 0);
        assert_eq!(control.frames_sent(), 0);
        assert_eq!(router.counters().captured, 0);
    }
}
