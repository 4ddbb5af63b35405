use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::config::{CameraFacing, CaptureConfiguration, PublisherSettings};
use crate::models::error::PublisherError;
use crate::models::event::SessionEvent;
use crate::models::handle::SessionHandle;
use crate::models::state::SessionState;
use crate::session::notifier::EventNotifier;
use crate::session::router::{FrameCounters, FrameRouter};
use crate::session::signal::{CaptureBridge, LinkBridge, Signal, SignalSender};
use crate::session::url::compose_publish_url;
use crate::traits::capture_pipeline::CapturePipeline;
use crate::traits::event_sink::EventSink;
use crate::traits::frame_sink::FrameSink;
use crate::traits::publish_link::PublishLink;

/// Component name reported in `error` events raised by the capture pipeline.
const CAPTURE_COMPONENT: &str = "camera";

/// Snapshot of a session's counters for debugging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDiagnostics {
    pub frames: FrameCounters,
    pub connect_attempts: u32,
    pub connected_at: Option<DateTime<Utc>>,
    pub camera_size: Option<(u32, u32)>,
}

/// One capture + publish pipeline and its state machine.
///
/// Generic over the camera and network backends via `CapturePipeline` and
/// `PublishLink`. All methods run on the owner thread; asynchronous
/// backend results arrive through `apply_signal`, which the registry calls
/// while pumping.
///
/// ```text
/// [CapturePipeline] → [FrameRouter] ─┬→ [FrameSink]   (preview)
///                                    └→ [PublishLink] (when connected)
/// ```
pub struct PublishSession<C: CapturePipeline, L: PublishLink + 'static> {
    handle: SessionHandle,
    capture: C,
    link: Arc<L>,
    display: Arc<dyn FrameSink>,
    router: Arc<FrameRouter<L>>,
    notifier: EventNotifier,
    signals: SignalSender,
    settings: PublisherSettings,

    state: SessionState,
    config: Option<CaptureConfiguration>,
    previewing: bool,
    fault: Option<String>,

    // Camera geometry as last reported by the pipeline
    camera_size: Option<(u32, u32)>,
    size_pending: bool,
    facing_pending: bool,
    // Link opened before the geometry was announced; `connected` follows it
    connected_pending: bool,
    // Reopened link must come back paused
    repause_on_open: bool,

    // Bumped whenever callbacks from the previous capture run or link
    // attempt must be ignored
    capture_epoch: u64,
    link_epoch: u64,

    publish_url: Option<String>,
    connect_attempts: u32,
    connected_at: Option<DateTime<Utc>>,
}

impl<C: CapturePipeline, L: PublishLink + 'static> PublishSession<C, L> {
    pub(crate) fn new(
        handle: SessionHandle,
        capture: C,
        link: L,
        display: Arc<dyn FrameSink>,
        signals: SignalSender,
        settings: PublisherSettings,
    ) -> Self {
        let link = Arc::new(link);
        Self {
            handle,
            capture,
            router: Arc::new(FrameRouter::new(Arc::clone(&link))),
            link,
            display,
            notifier: EventNotifier::new(handle),
            signals,
            settings,
            state: SessionState::Idle,
            config: None,
            previewing: false,
            fault: None,
            camera_size: None,
            size_pending: false,
            facing_pending: false,
            connected_pending: false,
            repause_on_open: false,
            capture_epoch: 0,
            link_epoch: 0,
            publish_url: None,
            connect_attempts: 0,
            connected_at: None,
        }
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> Option<&CaptureConfiguration> {
        self.config.as_ref()
    }

    pub fn is_previewing(&self) -> bool {
        self.previewing
    }

    /// Message of the last capture failure, until the session is reconfigured.
    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    pub fn camera_size(&self) -> Option<(u32, u32)> {
        self.camera_size
    }

    /// Composed target of the current or most recent connection.
    pub fn publish_url(&self) -> Option<&str> {
        self.publish_url.as_deref()
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        SessionDiagnostics {
            frames: self.router.counters(),
            connect_attempts: self.connect_attempts,
            connected_at: self.connected_at,
            camera_size: self.camera_size,
        }
    }

    pub fn subscribe(&mut self, sink: Arc<dyn EventSink>) -> Result<(), PublisherError> {
        self.ensure_open()?;
        self.notifier.subscribe(sink);
        Ok(())
    }

    pub fn unsubscribe(&mut self) {
        self.notifier.unsubscribe();
    }

    /// Apply a capture configuration. Transitions: idle → configured.
    ///
    /// On a configured session the running pipeline is updated in place.
    /// On a live session, a pipeline that cannot resize while streaming gets
    /// its publish link restarted against the same URL; a paused session
    /// stays paused. A failed reopen is reported as `failedToConnect` and
    /// leaves the session configured with the new capture settings.
    pub fn configure(&mut self, config: CaptureConfiguration) -> Result<(), PublisherError> {
        self.ensure_open()?;
        config.validate()?;

        let restart_capture = self.fault.is_some() || !self.capture.is_running();
        let (changed, relink) = match self.state {
            SessionState::Idle => {
                self.start_capture(&config)?;
                (true, false)
            }
            SessionState::Configured => {
                if restart_capture {
                    self.restart_capture(&config)?;
                    (true, false)
                } else {
                    (self.apply_capture_changes(&config)?, false)
                }
            }
            SessionState::Connected | SessionState::Paused => {
                let live = self.capture.supports_live_reconfigure();
                let differs = self.config.as_ref() != Some(&config);
                if restart_capture || (!live && differs) {
                    self.restart_capture(&config)?;
                    (true, !live)
                } else {
                    (self.apply_capture_changes(&config)?, false)
                }
            }
            state @ (SessionState::Connecting | SessionState::Closed) => {
                return Err(PublisherError::invalid_state("configure", state));
            }
        };

        self.display.set_buffer_size(config.width, config.height);
        self.config = Some(config);
        self.fault = None;
        if changed {
            self.size_pending = true;
            self.facing_pending = true;
        }
        if self.state.is_idle() {
            self.set_state(SessionState::Configured);
        }

        if relink {
            let was_paused = self.state == SessionState::Paused;
            match self.restart_link(&config) {
                Ok(()) => self.repause_on_open = was_paused,
                Err(e) => {
                    log::warn!("session {}: link not restored: {}", self.handle, e);
                }
            }
        }

        log::info!(
            "session {}: configured {}x{}@{} {} ({} bps video)",
            self.handle,
            config.width,
            config.height,
            config.fps,
            config.facing.as_str(),
            config.stream_parameters(&self.settings).video_bitrate
        );
        Ok(())
    }

    /// Attach the display surface. Idempotent.
    pub fn start_preview(&mut self) -> Result<(), PublisherError> {
        self.ensure_open()?;
        if !self.state.is_configured() {
            return Err(PublisherError::invalid_state("start preview", self.state));
        }
        self.ensure_healthy()?;
        if !self.previewing {
            self.router.attach_display(Arc::clone(&self.display));
            self.previewing = true;
            log::debug!("session {}: preview started", self.handle);
        }
        Ok(())
    }

    /// Detach the display surface. Idempotent; the link is untouched.
    pub fn stop_preview(&mut self) -> Result<(), PublisherError> {
        self.ensure_open()?;
        if self.previewing {
            self.router.detach_display();
            self.previewing = false;
            log::debug!("session {}: preview stopped", self.handle);
        }
        Ok(())
    }

    /// Start publishing to `url` + `/` + `stream_name`. Transitions:
    /// configured → connecting, then connected or back to configured once
    /// the link reports.
    pub fn connect(&mut self, url: &str, stream_name: &str) -> Result<(), PublisherError> {
        self.ensure_open()?;
        if self.state != SessionState::Configured {
            return Err(PublisherError::invalid_state("connect", self.state));
        }
        self.ensure_healthy()?;
        if url.is_empty() {
            return Err(PublisherError::InvalidArgument("url must not be empty".into()));
        }

        let target = compose_publish_url(url, stream_name);
        self.open_link(target)
    }

    /// Suspend the outbound stream. Transitions: connected → paused.
    pub fn pause(&mut self) -> Result<(), PublisherError> {
        self.ensure_open()?;
        if self.state != SessionState::Connected {
            return Err(PublisherError::invalid_state("pause", self.state));
        }
        self.link.pause()?;
        if self.connected_pending {
            self.announce_connected();
        }
        self.router.set_publishing(false);
        self.set_state(SessionState::Paused);
        self.notifier.emit(SessionEvent::Paused);
        Ok(())
    }

    /// Resume the outbound stream. Transitions: paused → connected.
    pub fn resume(&mut self) -> Result<(), PublisherError> {
        self.ensure_open()?;
        if self.state != SessionState::Paused {
            return Err(PublisherError::invalid_state("resume", self.state));
        }
        self.ensure_healthy()?;
        self.link.resume()?;
        if self.connected_pending {
            self.announce_connected();
        }
        self.router.set_publishing(true);
        self.set_state(SessionState::Connected);
        self.notifier.emit(SessionEvent::Resumed);
        Ok(())
    }

    /// Switch the physical camera without touching the publish link.
    pub fn set_camera_facing(&mut self, facing: CameraFacing) -> Result<(), PublisherError> {
        self.ensure_open()?;
        let Some(mut config) = self.config else {
            return Err(PublisherError::invalid_state("switch camera", self.state));
        };
        self.ensure_healthy()?;

        if config.facing != facing {
            self.capture.set_facing(facing)?;
            config.facing = facing;
            self.config = Some(config);
            log::info!("session {}: switched to {} camera", self.handle, facing.as_str());
        }

        if self.camera_size.is_some() {
            self.facing_pending = false;
            self.notifier.emit(SessionEvent::Camera { facing });
        } else {
            self.facing_pending = true;
        }
        Ok(())
    }

    /// Close the publish link. Transitions: connecting/connected/paused → configured.
    pub fn disconnect(&mut self) -> Result<(), PublisherError> {
        self.ensure_open()?;
        if !self.state.has_link() {
            return Err(PublisherError::invalid_state("disconnect", self.state));
        }
        self.teardown_link();
        Ok(())
    }

    /// Tear down link, capture, and display. Terminal and idempotent.
    pub fn close(&mut self) {
        if self.state.is_closed() {
            return;
        }
        if self.state.has_link() {
            self.teardown_link();
        }
        self.router.shutdown();
        self.capture.stop();
        self.capture_epoch += 1;
        self.previewing = false;
        self.set_state(SessionState::Closed);
        self.notifier.unsubscribe();
        log::info!("session {}: closed", self.handle);
    }

    /// Apply a signal posted by a backend callback. Runs on the owner thread.
    pub(crate) fn apply_signal(&mut self, epoch: u64, signal: Signal) {
        if self.state.is_closed() {
            log::debug!("session {}: closed, ignoring {:?}", self.handle, signal);
            return;
        }

        match signal {
            Signal::CameraSize { width, height } if epoch == self.capture_epoch => {
                self.on_camera_size(width, height);
            }
            Signal::CaptureFailed { message } if epoch == self.capture_epoch => {
                log::error!("session {}: capture failed: {}", self.handle, message);
                self.fault = Some(message.clone());
                self.notifier.emit(SessionEvent::Error {
                    component: CAPTURE_COMPONENT.to_string(),
                    message,
                });
            }
            Signal::LinkOpened
                if epoch == self.link_epoch && self.state == SessionState::Connecting =>
            {
                log::info!("session {}: connected", self.handle);
                self.connected_at = Some(Utc::now());
                if std::mem::take(&mut self.repause_on_open) && self.restore_pause() {
                    self.set_state(SessionState::Paused);
                } else {
                    self.router.set_publishing(true);
                    self.set_state(SessionState::Connected);
                }
                if self.size_pending || self.facing_pending {
                    self.connected_pending = true;
                } else {
                    self.announce_connected();
                }
            }
            Signal::LinkFailed { reason } | Signal::LinkClosed { reason }
                if epoch == self.link_epoch && self.state == SessionState::Connecting =>
            {
                log::warn!("session {}: failed to connect: {}", self.handle, reason);
                self.repause_on_open = false;
                self.link.close();
                self.link_epoch += 1;
                self.set_state(SessionState::Configured);
                self.notifier.emit(SessionEvent::FailedToConnect);
            }
            Signal::LinkClosed { reason }
                if epoch == self.link_epoch
                    && matches!(self.state, SessionState::Connected | SessionState::Paused) =>
            {
                log::warn!("session {}: link dropped: {}", self.handle, reason);
                self.teardown_link();
            }
            other => {
                log::debug!("session {}: ignoring stale {:?}", self.handle, other);
            }
        }
    }

    // --- Internal helpers ---

    fn ensure_open(&self) -> Result<(), PublisherError> {
        if self.state.is_closed() {
            return Err(PublisherError::InvalidInstance);
        }
        Ok(())
    }

    fn ensure_healthy(&self) -> Result<(), PublisherError> {
        match &self.fault {
            Some(message) => Err(PublisherError::Capture {
                component: CAPTURE_COMPONENT.to_string(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    fn set_state(&mut self, state: SessionState) {
        log::debug!("session {}: {} → {}", self.handle, self.state, state);
        self.state = state;
    }

    fn start_capture(&mut self, config: &CaptureConfiguration) -> Result<(), PublisherError> {
        let bridge = Arc::new(CaptureBridge {
            router: Arc::clone(&self.router),
            signals: self.signals.clone(),
            epoch: self.capture_epoch,
        });
        self.capture.start(config, bridge)
    }

    fn restart_capture(&mut self, config: &CaptureConfiguration) -> Result<(), PublisherError> {
        self.capture.stop();
        self.capture_epoch += 1;
        self.start_capture(config)
    }

    /// Push facing/geometry differences to the running pipeline.
    /// Returns whether anything changed.
    fn apply_capture_changes(
        &mut self,
        config: &CaptureConfiguration,
    ) -> Result<bool, PublisherError> {
        let Some(current) = self.config else {
            self.start_capture(config)?;
            return Ok(true);
        };

        let mut changed = false;
        if current.facing != config.facing {
            self.capture.set_facing(config.facing)?;
            changed = true;
        }
        if current.geometry_differs(config) {
            self.capture.reconfigure(config)?;
            changed = true;
        }
        Ok(changed)
    }

    fn open_link(&mut self, url: String) -> Result<(), PublisherError> {
        let Some(config) = self.config else {
            return Err(PublisherError::invalid_state("connect", self.state));
        };

        self.link_epoch += 1;
        self.connect_attempts += 1;
        self.publish_url = Some(url.clone());
        self.set_state(SessionState::Connecting);

        let params = config.stream_parameters(&self.settings);
        let listener = Arc::new(LinkBridge {
            signals: self.signals.clone(),
            epoch: self.link_epoch,
        });

        log::info!("session {}: connecting to {}", self.handle, url);
        if let Err(e) = self.link.open(&url, &params, listener) {
            log::error!("session {}: link rejected {}: {}", self.handle, url, e);
            self.link_epoch += 1;
            self.set_state(SessionState::Configured);
            self.notifier.emit(SessionEvent::FailedToConnect);
            return Err(match e {
                PublisherError::ConnectFailure(_) => e,
                other => PublisherError::ConnectFailure(other.to_string()),
            });
        }
        Ok(())
    }

    /// Drop the current link and reopen the same target.
    fn restart_link(&mut self, config: &CaptureConfiguration) -> Result<(), PublisherError> {
        let Some(url) = self.publish_url.clone() else {
            return Ok(());
        };
        log::info!(
            "session {}: restarting link for {}x{}",
            self.handle,
            config.width,
            config.height
        );
        self.teardown_link();
        self.open_link(url)
    }

    /// Pause a freshly reopened link. Returns whether it took.
    fn restore_pause(&mut self) -> bool {
        match self.link.pause() {
            Ok(()) => true,
            Err(e) => {
                log::warn!("session {}: could not restore pause: {}", self.handle, e);
                false
            }
        }
    }

    /// Emit the held `connected`, followed by `paused` when the link came
    /// back paused.
    fn announce_connected(&mut self) {
        self.connected_pending = false;
        self.notifier.emit(SessionEvent::Connected);
        if self.state == SessionState::Paused {
            self.notifier.emit(SessionEvent::Paused);
        }
    }

    fn teardown_link(&mut self) {
        if self.connected_pending {
            self.announce_connected();
        }
        self.repause_on_open = false;
        self.router.set_publishing(false);
        self.link.close();
        self.link_epoch += 1;
        self.connected_at = None;
        self.set_state(SessionState::Configured);
        self.notifier.emit(SessionEvent::Disconnected);
    }

    fn on_camera_size(&mut self, width: u32, height: u32) {
        let changed = self.camera_size != Some((width, height));
        self.camera_size = Some((width, height));
        if changed || self.size_pending {
            self.notifier.emit(SessionEvent::CameraSize { width, height });
        }
        self.size_pending = false;

        if self.facing_pending {
            self.facing_pending = false;
            if let Some(config) = self.config {
                self.notifier.emit(SessionEvent::Camera {
                    facing: config.facing,
                });
            }
        }

        if self.connected_pending && !self.size_pending && !self.facing_pending {
            self.announce_connected();
        }
    }
}

impl<C: CapturePipeline, L: PublishLink + 'static> Drop for PublishSession<C, L> {
    fn drop(&mut self) {
        self.close();
    }
}
