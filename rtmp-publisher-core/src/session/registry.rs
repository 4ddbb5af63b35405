use std::collections::BTreeMap;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

use crate::models::config::PublisherSettings;
use crate::models::error::PublisherError;
use crate::models::handle::SessionHandle;
use crate::session::publish_session::PublishSession;
use crate::session::signal::{Envelope, SignalSender};
use crate::traits::factory::PipelineFactory;

/// Session type produced by a given factory.
pub type SessionOf<F> =
    PublishSession<<F as PipelineFactory>::Capture, <F as PipelineFactory>::Link>;

/// Owns every live session, keyed by handle.
///
/// The registry is the only component that creates or destroys sessions.
/// It also owns the signal channel shared by all of its sessions' backend
/// callbacks; `pump` applies those signals on the calling (owner) thread.
pub struct SessionRegistry<F: PipelineFactory> {
    factory: F,
    settings: PublisherSettings,
    sessions: BTreeMap<SessionHandle, SessionOf<F>>,
    next_id: u64,
    signal_tx: Sender<Envelope>,
    signal_rx: Receiver<Envelope>,
}

impl<F: PipelineFactory> SessionRegistry<F> {
    pub fn new(factory: F, settings: PublisherSettings) -> Self {
        let (signal_tx, signal_rx) = crossbeam_channel::unbounded();
        Self {
            factory,
            settings,
            sessions: BTreeMap::new(),
            next_id: 0,
            signal_tx,
            signal_rx,
        }
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn settings(&self) -> &PublisherSettings {
        &self.settings
    }

    /// Create a session and return its handle. Handles are never reused.
    pub fn allocate(&mut self) -> Result<SessionHandle, PublisherError> {
        let handle = SessionHandle::new(self.next_id);

        let capture = self.factory.create_capture(handle)?;
        let link = self.factory.create_link(handle)?;
        let display = self.factory.create_display(handle)?;
        let signals = SignalSender::new(handle, self.signal_tx.clone());

        let session = PublishSession::new(
            handle,
            capture,
            link,
            display,
            signals,
            self.settings.clone(),
        );
        self.next_id += 1;
        self.sessions.insert(handle, session);

        log::info!("session {}: allocated", handle);
        Ok(handle)
    }

    pub fn get(&self, handle: SessionHandle) -> Result<&SessionOf<F>, PublisherError> {
        self.sessions
            .get(&handle)
            .ok_or(PublisherError::NotFound(handle))
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Result<&mut SessionOf<F>, PublisherError> {
        self.sessions
            .get_mut(&handle)
            .ok_or(PublisherError::NotFound(handle))
    }

    /// Close and forget a session. A second release reports `NotFound`.
    pub fn release(&mut self, handle: SessionHandle) -> Result<(), PublisherError> {
        let mut session = self
            .sessions
            .remove(&handle)
            .ok_or(PublisherError::NotFound(handle))?;
        session.close();
        log::info!("session {}: released", handle);
        Ok(())
    }

    pub fn handles(&self) -> Vec<SessionHandle> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Apply every queued backend signal. Returns how many were processed.
    pub fn pump(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(envelope) = self.signal_rx.try_recv() {
            self.deliver(envelope);
            processed += 1;
        }
        processed
    }

    /// Wait up to `timeout` for a signal, then drain the queue.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        match self.signal_rx.recv_timeout(timeout) {
            Ok(envelope) => {
                self.deliver(envelope);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    fn deliver(&mut self, envelope: Envelope) {
        match self.sessions.get_mut(&envelope.handle) {
            Some(session) => session.apply_signal(envelope.epoch, envelope.signal),
            None => log::debug!(
                "session {}: released, dropping {:?}",
                envelope.handle,
                envelope.signal
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::config::{CameraFacing, CaptureConfiguration};
    use crate::models::event::SessionEvent;
    use crate::models::state::SessionState;
    use crate::testing::{FakeFactory, LinkMode, RecordingSink};

    fn registry() -> (SessionRegistry<FakeFactory>, FakeFactory) {
        let factory = FakeFactory::new();
        (
            SessionRegistry::new(factory.clone(), PublisherSettings::default()),
            factory,
        )
    }

    fn vga() -> CaptureConfiguration {
        CaptureConfiguration::new(640, 480, 30, CameraFacing::Back)
    }

    #[test]
    fn handles_are_unique_and_not_reused() {
        let (mut reg, _) = registry();
        let a = reg.allocate().unwrap();
        let b = reg.allocate().unwrap();
        assert_ne!(a, b);

        reg.release(a).unwrap();
        let c = reg.allocate().unwrap();
        assert_ne!(c, a);
        assert_ne!(c, b);
        assert_eq!(reg.handles(), vec![b, c]);
    }

    #[test]
    fn release_twice_reports_not_found() {
        let (mut reg, _) = registry();
        let h = reg.allocate().unwrap();

        assert!(reg.release(h).is_ok());
        assert_eq!(reg.release(h), Err(PublisherError::NotFound(h)));
        assert!(reg.is_empty());
    }

    #[test]
    fn operations_after_release_report_not_found() {
        let (mut reg, _) = registry();
        let h = reg.allocate().unwrap();
        reg.release(h).unwrap();

        assert!(matches!(reg.get(h), Err(PublisherError::NotFound(_))));
        assert!(matches!(reg.get_mut(h), Err(PublisherError::NotFound(_))));
    }

    #[test]
    fn release_tears_down_backends() {
        let (mut reg, factory) = registry();
        let h = reg.allocate().unwrap();
        let session = reg.get_mut(h).unwrap();
        session.configure(vga()).unwrap();
        session.connect("rtmp://host/app", "s1").unwrap();
        reg.pump();

        reg.release(h).unwrap();
        assert!(!factory.capture(h).is_running());
        assert_eq!(factory.link(h).closes(), 1);
    }

    #[test]
    fn late_signals_for_released_session_are_dropped() {
        let (mut reg, factory) = registry();
        let h = reg.allocate().unwrap();
        factory.link(h).set_mode(LinkMode::Manual);
        let session = reg.get_mut(h).unwrap();
        session.configure(vga()).unwrap();
        session.connect("rtmp://host/app", "s1").unwrap();
        reg.release(h).unwrap();

        factory.link(h).complete_open();
        reg.pump();
        assert!(reg.get(h).is_err());
    }

    #[test]
    fn pump_preserves_per_session_order() {
        let (mut reg, factory) = registry();
        let h = reg.allocate().unwrap();
        let sink = RecordingSink::new();
        let session = reg.get_mut(h).unwrap();
        session.subscribe(sink.clone()).unwrap();
        session.configure(vga()).unwrap();

        let control = factory.capture(h);
        control.emit_size(800, 600);
        control.emit_size(1024, 768);
        reg.pump();

        let sizes: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, SessionEvent::CameraSize { .. }))
            .collect();
        assert_eq!(
            sizes,
            vec![
                SessionEvent::CameraSize {
                    width: 640,
                    height: 480
                },
                SessionEvent::CameraSize {
                    width: 800,
                    height: 600
                },
                SessionEvent::CameraSize {
                    width: 1024,
                    height: 768
                },
            ]
        );
    }

    #[test]
    fn pump_timeout_waits_for_background_signal() {
        let (mut reg, factory) = registry();
        let h = reg.allocate().unwrap();
        factory.link(h).set_mode(LinkMode::Manual);
        let session = reg.get_mut(h).unwrap();
        session.configure(vga()).unwrap();
        reg.pump();
        reg.get_mut(h).unwrap().connect("rtmp://host/app", "s1").unwrap();

        let link = factory.link(h);
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            link.complete_open();
        });

        let processed = reg.pump_timeout(Duration::from_secs(5));
        worker.join().unwrap();
        assert_eq!(processed, 1);
        assert_eq!(reg.get(h).unwrap().state(), SessionState::Connected);
    }
}
