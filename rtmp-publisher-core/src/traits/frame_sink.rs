use crate::models::frame::VideoFrame;

/// Display surface owned by the host (a registered texture).
pub trait FrameSink: Send + Sync {
    /// Resize the surface's backing buffer.
    fn set_buffer_size(&self, width: u32, height: u32);

    /// Present one frame. Called from capture threads.
    fn on_frame(&self, frame: &VideoFrame);
}
