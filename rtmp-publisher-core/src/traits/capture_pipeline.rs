use std::sync::Arc;

use crate::models::config::{CameraFacing, CaptureConfiguration};
use crate::models::error::PublisherError;
use crate::models::frame::VideoFrame;

/// Receives asynchronous output from a capture pipeline.
///
/// All methods may be called from the pipeline's own threads, never from
/// the session owner thread. Keep work minimal.
pub trait CaptureListener: Send + Sync {
    /// A new frame is available.
    fn on_frame(&self, frame: &VideoFrame);

    /// The active camera settled on its native output size.
    fn on_camera_size(&self, width: u32, height: u32);

    /// Capture or encoding failed; the pipeline is no longer producing frames.
    fn on_error(&self, message: &str);
}

/// Camera + encoder pipeline feeding one session.
///
/// Implemented by:
/// - `TestPatternCamera` (virtual backend)
/// - Future: Camera2/MediaCodec and AVFoundation bridges
pub trait CapturePipeline: Send {
    /// Open the camera at `config.facing` and start delivering to `listener`.
    fn start(
        &mut self,
        config: &CaptureConfiguration,
        listener: Arc<dyn CaptureListener>,
    ) -> Result<(), PublisherError>;

    /// Apply new geometry to a running pipeline.
    fn reconfigure(&mut self, config: &CaptureConfiguration) -> Result<(), PublisherError>;

    /// Switch to the other physical camera. The new camera size is reported
    /// through `CaptureListener::on_camera_size` once known.
    fn set_facing(&mut self, facing: CameraFacing) -> Result<(), PublisherError>;

    /// Stop capturing and release the camera.
    fn stop(&mut self);

    fn is_running(&self) -> bool;

    /// Whether `reconfigure` can resize the output while a stream is live.
    fn supports_live_reconfigure(&self) -> bool {
        true
    }
}
