//! # rtmp-publisher-core
//!
//! Platform-agnostic session manager for camera-to-RTMP publishing.
//!
//! Hosts address sessions by integer handle through a small command
//! surface. Each session owns a capture pipeline, a display surface, and a
//! publish link; platform backends implement `CapturePipeline`,
//! `PublishLink`, and `PermissionPlatform` and plug into the generic
//! `PublishSession` through a `PipelineFactory`.
//!
//! ## Architecture
//!
//! ```text
//! rtmp-publisher-core (this crate)
//! ├── traits/       ← CapturePipeline, PublishLink, FrameSink, EventSink, PermissionPlatform, PipelineFactory
//! ├── models/       ← PublisherError, SessionState, CaptureConfiguration, SessionEvent, SessionHandle
//! ├── session/      ← PublishSession, SessionRegistry, EventNotifier, FrameRouter, URL composition
//! ├── permissions/  ← PermissionGate (one outstanding prompt per process)
//! ├── host/         ← CommandDispatcher, MethodCall
//! └── testing       ← in-memory fakes (tests and the `testing` feature)
//! ```
//!
//! Backend callbacks may fire on any thread. They are queued and applied
//! on the owner thread by `SessionRegistry::pump` (or
//! `CommandDispatcher::pump`), so session state is only ever touched from
//! one place.

pub mod host;
pub mod models;
pub mod permissions;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use host::dispatcher::{CommandDispatcher, Reply};
pub use host::method_call::MethodCall;
pub use models::config::{
    BitratePolicy, CameraFacing, Capability, CaptureConfiguration, PublisherSettings,
    StreamParameters, AUDIO_BITRATE, BITRATE_DIVISOR,
};
pub use models::error::PublisherError;
pub use models::event::SessionEvent;
pub use models::frame::VideoFrame;
pub use models::handle::{SessionHandle, EVENT_CHANNEL_PREFIX};
pub use models::state::SessionState;
pub use permissions::gate::{PermissionCallback, PermissionGate, PermissionResponder};
pub use session::publish_session::{PublishSession, SessionDiagnostics};
pub use session::registry::{SessionOf, SessionRegistry};
pub use session::router::FrameCounters;
pub use session::url::compose_publish_url;
pub use traits::capture_pipeline::{CaptureListener, CapturePipeline};
pub use traits::event_sink::EventSink;
pub use traits::factory::PipelineFactory;
pub use traits::frame_sink::FrameSink;
pub use traits::permission_platform::PermissionPlatform;
pub use traits::publish_link::{LinkListener, PublishLink};
