use std::sync::Arc;

use crate::models::event::SessionEvent;
use crate::models::handle::SessionHandle;
use crate::traits::event_sink::EventSink;

/// Per-session push channel with at most one subscriber.
///
/// A new subscriber replaces the old one. Events emitted while nobody is
/// listening are dropped; only the last camera geometry is kept so a late
/// subscriber can be brought up to date.
pub struct EventNotifier {
    handle: SessionHandle,
    sink: Option<Arc<dyn EventSink>>,
    last_camera_size: Option<SessionEvent>,
    last_camera: Option<SessionEvent>,
}

impl EventNotifier {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            sink: None,
            last_camera_size: None,
            last_camera: None,
        }
    }

    /// Replace the current subscriber and replay `cameraSize` then `camera`.
    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) {
        if self.sink.is_some() {
            log::debug!("session {}: replacing event listener", self.handle);
        }
        for event in [&self.last_camera_size, &self.last_camera]
            .into_iter()
            .flatten()
        {
            sink.on_event(event);
        }
        self.sink = Some(sink);
    }

    pub fn unsubscribe(&mut self) {
        self.sink = None;
    }

    pub fn has_listener(&self) -> bool {
        self.sink.is_some()
    }

    pub fn emit(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::CameraSize { .. } => self.last_camera_size = Some(event.clone()),
            SessionEvent::Camera { .. } => self.last_camera = Some(event.clone()),
            _ => {}
        }
        match &self.sink {
            Some(sink) => sink.on_event(&event),
            None => log::debug!(
                "session {}: no listener, dropped {}",
                self.handle,
                event.name()
            ),
        }
    }
}
