use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;

use crate::host::method_call::MethodCall;
use crate::models::config::{CaptureConfiguration, PublisherSettings};
use crate::models::error::PublisherError;
use crate::models::handle::SessionHandle;
use crate::models::state::SessionState;
use crate::permissions::gate::{PermissionCallback, PermissionGate};
use crate::session::registry::{SessionOf, SessionRegistry};
use crate::traits::event_sink::EventSink;
use crate::traits::factory::PipelineFactory;
use crate::traits::permission_platform::PermissionPlatform;

/// One-shot result callback for a method call.
pub type Reply = Box<dyn FnOnce(Result<Value, PublisherError>) + Send + 'static>;

/// Longest single wait in `pump_timeout` before permission answers are checked again.
const POLL_SLICE: Duration = Duration::from_millis(10);

/// A configuration waiting on the permission gate's verdict.
struct DeferredConfigure {
    handle: SessionHandle,
    config: CaptureConfiguration,
    granted: bool,
    reply: Reply,
}

/// Routes host method calls to sessions.
///
/// Owns the session registry and the process permission gate. Everything
/// runs on the thread that calls `handle` and `pump`.
///
/// | method | arguments | result |
/// |---|---|---|
/// | `alloc` | | handle |
/// | `release`, `close` | `tex` | `true` |
/// | `initCaptureConfig` | `tex`, `width`, `height`, `fps`, `camera` | `true`, or `false` if permissions are denied |
/// | `initFramework` | (`tex`, ... as above) | `true` |
/// | `startPreview`, `stopPreview` | `tex` | `true` |
/// | `connect` | `tex`, `url`, `name` | `true` |
/// | `disconnect`, `pause`, `resume` | `tex` | `true` |
/// | `setCamera` | `tex`, `camera` | `true` |
pub struct CommandDispatcher<F: PipelineFactory, P: PermissionPlatform> {
    registry: SessionRegistry<F>,
    gate: PermissionGate<P>,
    deferred_tx: Sender<DeferredConfigure>,
    deferred_rx: Receiver<DeferredConfigure>,
}

impl<F, P> CommandDispatcher<F, P>
where
    F: PipelineFactory,
    P: PermissionPlatform,
{
    pub fn new(factory: F, platform: P, settings: PublisherSettings) -> Self {
        let (deferred_tx, deferred_rx) = crossbeam_channel::unbounded();
        Self {
            registry: SessionRegistry::new(factory, settings),
            gate: PermissionGate::new(platform),
            deferred_tx,
            deferred_rx,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<F> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SessionRegistry<F> {
        &mut self.registry
    }

    pub fn gate(&self) -> &PermissionGate<P> {
        &self.gate
    }

    /// Handle one method call. `reply` runs before this returns, except for
    /// `initCaptureConfig` waiting on a permission prompt, which replies
    /// from a later `pump`.
    pub fn handle<R>(&mut self, call: &MethodCall, reply: R)
    where
        R: FnOnce(Result<Value, PublisherError>) + Send + 'static,
    {
        log::debug!("dispatch {} {}", call.method, call.arguments);
        match call.method.as_str() {
            "initCaptureConfig" => self.init_capture_config(call, Box::new(reply)),
            "initFramework" if call.has_argument("tex") => {
                self.init_capture_config(call, Box::new(reply))
            }
            _ => {
                let result = self.dispatch(call);
                if let Err(ref e) = result {
                    log::warn!("{} failed: {}", call.method, e);
                }
                reply(result);
            }
        }
    }

    /// Handle a call and return its result if it completed synchronously.
    pub fn invoke(&mut self, call: &MethodCall) -> Option<Result<Value, PublisherError>> {
        let slot = Arc::new(Mutex::new(None));
        let result_slot = Arc::clone(&slot);
        self.handle(call, move |result| *result_slot.lock() = Some(result));
        let result = slot.lock().take();
        result
    }

    /// Attach the event channel listener for `handle`.
    pub fn subscribe(
        &mut self,
        handle: SessionHandle,
        sink: Arc<dyn EventSink>,
    ) -> Result<(), PublisherError> {
        self.registry.get_mut(handle)?.subscribe(sink)
    }

    pub fn unsubscribe(&mut self, handle: SessionHandle) -> Result<(), PublisherError> {
        self.registry.get_mut(handle)?.unsubscribe();
        Ok(())
    }

    pub fn session_state(&self, handle: SessionHandle) -> Result<SessionState, PublisherError> {
        Ok(self.registry.get(handle)?.state())
    }

    /// Apply permission answers, deferred configurations, and backend
    /// signals. Returns how many items were processed.
    pub fn pump(&mut self) -> usize {
        self.gate.pump() + self.drain_deferred() + self.registry.pump()
    }

    /// Wait up to `timeout` for anything to process, then pump.
    pub fn pump_timeout(&mut self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        loop {
            let processed = self.pump();
            if processed > 0 {
                return processed;
            }
            let now = Instant::now();
            if now >= deadline {
                return 0;
            }
            let processed = self.registry.pump_timeout((deadline - now).min(POLL_SLICE));
            if processed > 0 {
                return processed + self.pump();
            }
        }
    }

    // --- Internal helpers ---

    fn dispatch(&mut self, call: &MethodCall) -> Result<Value, PublisherError> {
        match call.method.as_str() {
            "alloc" => Ok(Value::from(self.registry.allocate()?.id())),
            "release" | "close" => {
                self.registry.release(call.handle()?)?;
                Ok(Value::Bool(true))
            }
            // Nothing to set up process-wide.
            "initFramework" => Ok(Value::Bool(true)),
            "startPreview" => self.with_session(call, |s| s.start_preview()),
            "stopPreview" => self.with_session(call, |s| s.stop_preview()),
            "connect" => {
                let url = call.str_argument("url")?.to_string();
                let name = call.str_argument("name")?.to_string();
                self.with_session(call, |s| s.connect(&url, &name))
            }
            "disconnect" => self.with_session(call, |s| s.disconnect()),
            "pause" => self.with_session(call, |s| s.pause()),
            "resume" => self.with_session(call, |s| s.resume()),
            "setCamera" => {
                let facing = call.facing_argument("camera")?;
                self.with_session(call, |s| s.set_camera_facing(facing))
            }
            other => Err(PublisherError::NotImplemented(other.to_string())),
        }
    }

    fn with_session<Op>(&mut self, call: &MethodCall, op: Op) -> Result<Value, PublisherError>
    where
        Op: FnOnce(&mut SessionOf<F>) -> Result<(), PublisherError>,
    {
        let handle = call.handle()?;
        op(self.registry.get_mut(handle)?)?;
        Ok(Value::Bool(true))
    }

    fn init_capture_config(&mut self, call: &MethodCall, reply: Reply) {
        let (handle, config) = match self.parse_capture_config(call) {
            Ok(parsed) => parsed,
            Err(e) => {
                log::warn!("{} rejected: {}", call.method, e);
                return reply(Err(e));
            }
        };

        let slot = Arc::new(Mutex::new(Some(reply)));
        let pending_reply = Arc::clone(&slot);
        let deferred = self.deferred_tx.clone();
        let callback: PermissionCallback = Box::new(move |granted| {
            if let Some(reply) = pending_reply.lock().take() {
                let _ = deferred.send(DeferredConfigure {
                    handle,
                    config,
                    granted,
                    reply,
                });
            }
        });

        let capabilities = self.registry.settings().required_capabilities.clone();
        match self.gate.request(&capabilities, callback) {
            Ok(()) => {
                self.drain_deferred();
            }
            Err(e) => {
                log::warn!("session {}: permission request failed: {}", handle, e);
                if let Some(reply) = slot.lock().take() {
                    reply(Err(e));
                }
            }
        }
    }

    fn parse_capture_config(
        &self,
        call: &MethodCall,
    ) -> Result<(SessionHandle, CaptureConfiguration), PublisherError> {
        let handle = call.handle()?;
        let config = CaptureConfiguration::new(
            call.u32_argument("width")?,
            call.u32_argument("height")?,
            call.u32_argument("fps")?,
            call.facing_argument("camera")?,
        );
        config.validate()?;
        if self.registry.get(handle)?.state().is_closed() {
            return Err(PublisherError::InvalidInstance);
        }
        Ok((handle, config))
    }

    fn drain_deferred(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(deferred) = self.deferred_rx.try_recv() {
            processed += 1;
            let result = if deferred.granted {
                self.registry
                    .get_mut(deferred.handle)
                    .and_then(|s| s.configure(deferred.config))
                    .map(|_| Value::Bool(true))
            } else {
                log::warn!(
                    "session {}: capture permissions denied, staying idle",
                    deferred.handle
                );
                Ok(Value::Bool(false))
            };
            (deferred.reply)(result);
        }
        processed
    }
}
