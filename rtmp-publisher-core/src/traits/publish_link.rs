use std::sync::Arc;

use crate::models::config::StreamParameters;
use crate::models::error::PublisherError;
use crate::models::frame::VideoFrame;

/// Status callbacks from a publish link, fired on the link's own threads.
pub trait LinkListener: Send + Sync {
    /// The link is established and publishing.
    fn on_opened(&self);

    /// The link could not be established.
    fn on_failed(&self, reason: &str);

    /// An established link went away without `close` being called.
    fn on_closed(&self, reason: &str);
}

/// Network connection carrying the encoded stream to a media server.
///
/// Methods take `&self` because frames are pushed from capture threads
/// while the session owner drives the lifecycle.
pub trait PublishLink: Send + Sync {
    /// Start opening a link to `url`. Completion is reported through `listener`.
    fn open(
        &self,
        url: &str,
        params: &StreamParameters,
        listener: Arc<dyn LinkListener>,
    ) -> Result<(), PublisherError>;

    /// Queue one frame for sending. Frames sent while paused or not open are dropped.
    fn send_frame(&self, frame: &VideoFrame);

    /// Suspend the outbound stream without closing the connection.
    fn pause(&self) -> Result<(), PublisherError>;

    fn resume(&self) -> Result<(), PublisherError>;

    /// Tear down the connection. No listener callbacks fire afterwards.
    fn close(&self);
}
