use std::sync::Arc;

use crate::models::error::PublisherError;
use crate::models::handle::SessionHandle;
use crate::traits::capture_pipeline::CapturePipeline;
use crate::traits::frame_sink::FrameSink;
use crate::traits::publish_link::PublishLink;

/// Builds the per-session resources when a handle is allocated.
///
/// Stands in for the host's texture registry: each handle gets its own
/// display surface, camera pipeline, and publish link, never shared.
pub trait PipelineFactory {
    type Capture: CapturePipeline + 'static;
    type Link: PublishLink + 'static;

    fn create_capture(&self, handle: SessionHandle) -> Result<Self::Capture, PublisherError>;

    fn create_link(&self, handle: SessionHandle) -> Result<Self::Link, PublisherError>;

    fn create_display(&self, handle: SessionHandle) -> Result<Arc<dyn FrameSink>, PublisherError>;
}
