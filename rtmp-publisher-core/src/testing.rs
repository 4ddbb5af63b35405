//! In-memory backends for exercising sessions without a camera or network.
//!
//! Each fake shares its state with a control (`CaptureControl`, `LinkControl`)
//! so a test can inspect calls and fire callbacks the way a real backend
//! thread would.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::config::{
    CameraFacing, Capability, CaptureConfiguration, StreamParameters,
};
use crate::models::error::PublisherError;
use crate::models::event::SessionEvent;
use crate::models::frame::VideoFrame;
use crate::models::handle::SessionHandle;
use crate::permissions::gate::PermissionResponder;
use crate::traits::capture_pipeline::{CaptureListener, CapturePipeline};
use crate::traits::event_sink::EventSink;
use crate::traits::factory::PipelineFactory;
use crate::traits::frame_sink::FrameSink;
use crate::traits::permission_platform::PermissionPlatform;
use crate::traits::publish_link::{LinkListener, PublishLink};

// -- Event sink --

/// Records every delivered event.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SessionEvent>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<SessionEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: &SessionEvent) {
        self.events.lock().push(event.clone());
    }
}

// -- Display --

/// Counts presented frames and remembers the last buffer size.
#[derive(Default)]
pub struct RecordingDisplay {
    frames: Mutex<u64>,
    buffer_size: Mutex<Option<(u32, u32)>>,
}

impl RecordingDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> u64 {
        *self.frames.lock()
    }

    pub fn buffer_size(&self) -> Option<(u32, u32)> {
        *self.buffer_size.lock()
    }
}

impl FrameSink for RecordingDisplay {
    fn set_buffer_size(&self, width: u32, height: u32) {
        *self.buffer_size.lock() = Some((width, height));
    }

    fn on_frame(&self, _frame: &VideoFrame) {
        *self.frames.lock() += 1;
    }
}

// -- Capture --

#[derive(Default)]
struct CaptureControlState {
    running: bool,
    starts: u32,
    stops: u32,
    reconfigures: u32,
    facings: Vec<CameraFacing>,
    config: Option<CaptureConfiguration>,
    listener: Option<Arc<dyn CaptureListener>>,
    native_sizes: BTreeMap<CameraFacing, (u32, u32)>,
    fixed_geometry: bool,
    silent: bool,
}

/// Control and inspection handle for a `FakeCapture`.
#[derive(Default)]
pub struct CaptureControl {
    state: Mutex<CaptureControlState>,
}

impl CaptureControl {
    pub fn capture() -> (FakeCapture, Arc<CaptureControl>) {
        let control = Arc::new(CaptureControl::default());
        (
            FakeCapture {
                control: Arc::clone(&control),
            },
            control,
        )
    }

    /// Report `size` instead of the requested geometry for `facing`.
    pub fn set_native_size(&self, facing: CameraFacing, width: u32, height: u32) {
        self.state
            .lock()
            .native_sizes
            .insert(facing, (width, height));
    }

    /// Make the pipeline refuse live resizing.
    pub fn set_fixed_geometry(&self, fixed: bool) {
        self.state.lock().fixed_geometry = fixed;
    }

    /// Stop reporting camera sizes automatically.
    pub fn set_silent(&self, silent: bool) {
        self.state.lock().silent = silent;
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn starts(&self) -> u32 {
        self.state.lock().starts
    }

    pub fn stops(&self) -> u32 {
        self.state.lock().stops
    }

    pub fn reconfigures(&self) -> u32 {
        self.state.lock().reconfigures
    }

    pub fn facings(&self) -> Vec<CameraFacing> {
        self.state.lock().facings.clone()
    }

    pub fn emit_frame(&self, frame: &VideoFrame) {
        if let Some(listener) = self.listener() {
            listener.on_frame(frame);
        }
    }

    pub fn emit_size(&self, width: u32, height: u32) {
        if let Some(listener) = self.listener() {
            listener.on_camera_size(width, height);
        }
    }

    pub fn emit_error(&self, message: &str) {
        if let Some(listener) = self.listener() {
            listener.on_error(message);
        }
    }

    fn listener(&self) -> Option<Arc<dyn CaptureListener>> {
        self.state.lock().listener.clone()
    }

    fn report_size(&self) {
        let (listener, size) = {
            let s = self.state.lock();
            if s.silent {
                return;
            }
            let Some(config) = s.config else {
                return;
            };
            let size = s
                .native_sizes
                .get(&config.facing)
                .copied()
                .unwrap_or((config.width, config.height));
            (s.listener.clone(), size)
        };
        if let Some(listener) = listener {
            listener.on_camera_size(size.0, size.1);
        }
    }
}

/// `CapturePipeline` that reports the camera size synchronously.
pub struct FakeCapture {
    control: Arc<CaptureControl>,
}

impl CapturePipeline for FakeCapture {
    fn start(
        &mut self,
        config: &CaptureConfiguration,
        listener: Arc<dyn CaptureListener>,
    ) -> Result<(), PublisherError> {
        {
            let mut s = self.control.state.lock();
            s.running = true;
            s.starts += 1;
            s.config = Some(*config);
            s.listener = Some(listener);
        }
        self.control.report_size();
        Ok(())
    }

    fn reconfigure(&mut self, config: &CaptureConfiguration) -> Result<(), PublisherError> {
        {
            let mut s = self.control.state.lock();
            s.reconfigures += 1;
            s.config = Some(*config);
        }
        self.control.report_size();
        Ok(())
    }

    fn set_facing(&mut self, facing: CameraFacing) -> Result<(), PublisherError> {
        {
            let mut s = self.control.state.lock();
            s.facings.push(facing);
            if let Some(ref mut config) = s.config {
                config.facing = facing;
            }
        }
        self.control.report_size();
        Ok(())
    }

    fn stop(&mut self) {
        let mut s = self.control.state.lock();
        if s.running {
            s.running = false;
            s.stops += 1;
        }
    }

    fn is_running(&self) -> bool {
        self.control.state.lock().running
    }

    fn supports_live_reconfigure(&self) -> bool {
        !self.control.state.lock().fixed_geometry
    }
}

// -- Link --

/// How a `FakeLink` answers `open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Report `on_opened` synchronously.
    #[default]
    AutoOpen,
    /// Report `on_failed` synchronously.
    AutoFail,
    /// Wait for `LinkControl::complete_open` / `fail_open`.
    Manual,
    /// Return an error from `open`.
    Reject,
}

#[derive(Default)]
struct LinkControlState {
    mode: LinkMode,
    urls: Vec<String>,
    params: Vec<StreamParameters>,
    open: bool,
    paused: bool,
    frames: u64,
    pauses: u32,
    resumes: u32,
    closes: u32,
    listener: Option<Arc<dyn LinkListener>>,
}

/// Control and inspection handle for a `FakeLink`.
#[derive(Default)]
pub struct LinkControl {
    state: Mutex<LinkControlState>,
}

impl LinkControl {
    pub fn link() -> (FakeLink, Arc<LinkControl>) {
        let control = Arc::new(LinkControl::default());
        (
            FakeLink {
                control: Arc::clone(&control),
            },
            control,
        )
    }

    pub fn set_mode(&self, mode: LinkMode) {
        self.state.lock().mode = mode;
    }

    /// Mark the link open without going through `open`.
    pub fn force_open(&self) {
        self.state.lock().open = true;
    }

    pub fn complete_open(&self) {
        let listener = {
            let mut s = self.state.lock();
            s.open = true;
            s.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_opened();
        }
    }

    pub fn fail_open(&self, reason: &str) {
        if let Some(listener) = self.listener() {
            listener.on_failed(reason);
        }
    }

    /// Simulate the server dropping an established connection.
    pub fn drop_remote(&self, reason: &str) {
        let listener = {
            let mut s = self.state.lock();
            s.open = false;
            s.listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_closed(reason);
        }
    }

    pub fn urls(&self) -> Vec<String> {
        self.state.lock().urls.clone()
    }

    pub fn params(&self) -> Vec<StreamParameters> {
        self.state.lock().params.clone()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn frames_sent(&self) -> u64 {
        self.state.lock().frames
    }

    pub fn pauses(&self) -> u32 {
        self.state.lock().pauses
    }

    pub fn resumes(&self) -> u32 {
        self.state.lock().resumes
    }

    pub fn closes(&self) -> u32 {
        self.state.lock().closes
    }

    fn listener(&self) -> Option<Arc<dyn LinkListener>> {
        self.state.lock().listener.clone()
    }
}

/// `PublishLink` driven by its `LinkControl`.
pub struct FakeLink {
    control: Arc<LinkControl>,
}

impl PublishLink for FakeLink {
    fn open(
        &self,
        url: &str,
        params: &StreamParameters,
        listener: Arc<dyn LinkListener>,
    ) -> Result<(), PublisherError> {
        let mode = {
            let mut s = self.control.state.lock();
            s.urls.push(url.to_string());
            s.params.push(*params);
            s.listener = Some(Arc::clone(&listener));
            s.paused = false;
            s.mode
        };
        match mode {
            LinkMode::AutoOpen => {
                self.control.state.lock().open = true;
                listener.on_opened();
            }
            LinkMode::AutoFail => listener.on_failed("connection refused"),
            LinkMode::Manual => {}
            LinkMode::Reject => {
                return Err(PublisherError::ConnectFailure("rejected".into()));
            }
        }
        Ok(())
    }

    fn send_frame(&self, _frame: &VideoFrame) {
        let mut s = self.control.state.lock();
        if s.open && !s.paused {
            s.frames += 1;
        }
    }

    fn pause(&self) -> Result<(), PublisherError> {
        let mut s = self.control.state.lock();
        s.paused = true;
        s.pauses += 1;
        Ok(())
    }

    fn resume(&self) -> Result<(), PublisherError> {
        let mut s = self.control.state.lock();
        s.paused = false;
        s.resumes += 1;
        Ok(())
    }

    fn close(&self) {
        let mut s = self.control.state.lock();
        s.open = false;
        s.closes += 1;
    }
}

// -- Factory --

#[derive(Default)]
struct FakeFactoryState {
    captures: BTreeMap<SessionHandle, Arc<CaptureControl>>,
    links: BTreeMap<SessionHandle, Arc<LinkControl>>,
    displays: BTreeMap<SessionHandle, Arc<RecordingDisplay>>,
    link_mode: LinkMode,
}

/// Builds fakes per handle and keeps their controls reachable.
#[derive(Clone, Default)]
pub struct FakeFactory {
    state: Arc<Mutex<FakeFactoryState>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode given to links created from now on.
    pub fn set_link_mode(&self, mode: LinkMode) {
        self.state.lock().link_mode = mode;
    }

    pub fn capture(&self, handle: SessionHandle) -> Arc<CaptureControl> {
        Arc::clone(&self.state.lock().captures[&handle])
    }

    pub fn link(&self, handle: SessionHandle) -> Arc<LinkControl> {
        Arc::clone(&self.state.lock().links[&handle])
    }

    pub fn display(&self, handle: SessionHandle) -> Arc<RecordingDisplay> {
        Arc::clone(&self.state.lock().displays[&handle])
    }
}

impl PipelineFactory for FakeFactory {
    type Capture = FakeCapture;
    type Link = FakeLink;

    fn create_capture(&self, handle: SessionHandle) -> Result<FakeCapture, PublisherError> {
        let (capture, control) = CaptureControl::capture();
        self.state.lock().captures.insert(handle, control);
        Ok(capture)
    }

    fn create_link(&self, handle: SessionHandle) -> Result<FakeLink, PublisherError> {
        let (link, control) = LinkControl::link();
        let mut s = self.state.lock();
        control.set_mode(s.link_mode);
        s.links.insert(handle, control);
        Ok(link)
    }

    fn create_display(&self, handle: SessionHandle) -> Result<Arc<dyn FrameSink>, PublisherError> {
        let display = RecordingDisplay::new();
        self.state
            .lock()
            .displays
            .insert(handle, Arc::clone(&display));
        Ok(display)
    }
}

// -- Permissions --

#[derive(Default)]
struct FakePermissionsState {
    granted: Vec<Capability>,
    prompts: Vec<Vec<Capability>>,
    responder: Option<PermissionResponder>,
}

/// Permission platform whose prompts are answered by the test.
#[derive(Clone, Default)]
pub struct FakePermissions {
    state: Arc<Mutex<FakePermissionsState>>,
}

impl FakePermissions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn granting(capabilities: &[Capability]) -> Self {
        let permissions = Self::default();
        permissions.state.lock().granted = capabilities.to_vec();
        permissions
    }

    /// Capability sets shown in prompts so far.
    pub fn prompts(&self) -> Vec<Vec<Capability>> {
        self.state.lock().prompts.clone()
    }

    /// Answer the outstanding prompt, granting or denying everything it asked for.
    pub fn answer(&self, granted: bool) {
        let (responder, asked) = {
            let mut s = self.state.lock();
            let asked = s.prompts.last().cloned().unwrap_or_default();
            (s.responder.take(), asked)
        };
        if let Some(responder) = responder {
            responder.respond(asked.into_iter().map(|c| (c, granted)).collect());
        }
    }

    /// Answer the outstanding prompt with explicit per-capability results.
    pub fn answer_with(&self, results: Vec<(Capability, bool)>) {
        let responder = self.state.lock().responder.take();
        if let Some(responder) = responder {
            responder.respond(results);
        }
    }
}

impl PermissionPlatform for FakePermissions {
    fn is_granted(&self, capability: Capability) -> bool {
        self.state.lock().granted.contains(&capability)
    }

    fn request(
        &mut self,
        capabilities: &[Capability],
        responder: PermissionResponder,
    ) -> Result<(), PublisherError> {
        let mut s = self.state.lock();
        s.prompts.push(capabilities.to_vec());
        s.responder = Some(responder);
        Ok(())
    }
}
