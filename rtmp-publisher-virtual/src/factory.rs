use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use rtmp_publisher_core::{FrameSink, PipelineFactory, PublisherError, SessionHandle, VideoFrame};

use crate::tcp_link::{TcpLinkConfig, TcpPublishLink};
use crate::test_pattern::{TestPatternCamera, TestPatternConfig};

/// Display surface that only counts what it is shown.
#[derive(Debug, Default)]
pub struct NullDisplay {
    frames: AtomicU64,
    buffer_size: Mutex<Option<(u32, u32)>>,
}

impl NullDisplay {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    pub fn buffer_size(&self) -> Option<(u32, u32)> {
        *self.buffer_size.lock()
    }
}

impl FrameSink for NullDisplay {
    fn set_buffer_size(&self, width: u32, height: u32) {
        *self.buffer_size.lock() = Some((width, height));
    }

    fn on_frame(&self, _frame: &VideoFrame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}

/// Builds a test-pattern camera, TCP relay link, and null display per session.
#[derive(Debug, Clone, Default)]
pub struct VirtualFactory {
    pub camera: TestPatternConfig,
    pub link: TcpLinkConfig,
}

impl PipelineFactory for VirtualFactory {
    type Capture = TestPatternCamera;
    type Link = TcpPublishLink;

    fn create_capture(&self, handle: SessionHandle) -> Result<TestPatternCamera, PublisherError> {
        log::debug!("session {}: creating test pattern camera", handle);
        Ok(TestPatternCamera::new(self.camera.clone()))
    }

    fn create_link(&self, _handle: SessionHandle) -> Result<TcpPublishLink, PublisherError> {
        Ok(TcpPublishLink::new(self.link.clone()))
    }

    fn create_display(&self, _handle: SessionHandle) -> Result<Arc<dyn FrameSink>, PublisherError> {
        Ok(Arc::new(NullDisplay::default()))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;
    use std::time::{Duration, Instant};

    use serde_json::{json, Value};

    use rtmp_publisher_core::testing::RecordingSink;
    use rtmp_publisher_core::{
        CameraFacing, CommandDispatcher, MethodCall, PublisherSettings, SessionEvent,
        SessionState,
    };

    use super::*;
    use crate::permissions::DesktopPermissions;

    type Dispatcher = CommandDispatcher<VirtualFactory, DesktopPermissions>;

    fn call(dispatcher: &mut Dispatcher, method: &str, arguments: Value) -> Value {
        dispatcher
            .invoke(&MethodCall::new(method, arguments))
            .expect("synchronous reply")
            .unwrap_or_else(|e| panic!("{} failed: {}", method, e))
    }

    fn pump_until(
        dispatcher: &mut Dispatcher,
        sink: &RecordingSink,
        wanted: &SessionEvent,
    ) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !sink.events().contains(wanted) {
            assert!(Instant::now() < deadline, "timed out waiting for {:?}", wanted);
            dispatcher.pump_timeout(Duration::from_millis(20));
        }
    }

    #[test]
    fn publishes_test_pattern_over_tcp() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("rtmp://{}/live", server.local_addr().unwrap());

        let mut dispatcher = CommandDispatcher::new(
            VirtualFactory::default(),
            DesktopPermissions::new(),
            PublisherSettings::default(),
        );
        let id = call(&mut dispatcher, "alloc", Value::Null)
            .as_u64()
            .unwrap();
        let handle = SessionHandle::new(id);
        let sink = RecordingSink::new();
        dispatcher.subscribe(handle, sink.clone()).unwrap();

        call(
            &mut dispatcher,
            "initCaptureConfig",
            json!({"tex": id, "width": 16, "height": 8, "fps": 30, "camera": "front"}),
        );
        call(&mut dispatcher, "startPreview", json!({"tex": id}));
        call(
            &mut dispatcher,
            "connect",
            json!({"tex": id, "url": base, "name": "cam"}),
        );
        let (mut peer, _) = server.accept().unwrap();
        pump_until(&mut dispatcher, &sink, &SessionEvent::Connected);
        assert_eq!(
            sink.events()[..3],
            [
                SessionEvent::CameraSize {
                    width: 16,
                    height: 8
                },
                SessionEvent::Camera {
                    facing: CameraFacing::Front
                },
                SessionEvent::Connected,
            ]
        );
        assert_eq!(
            dispatcher.session_state(handle).unwrap(),
            SessionState::Connected
        );

        let mut len = [0u8; 4];
        peer.read_exact(&mut len).unwrap();
        let mut path = vec![0u8; u32::from_be_bytes(len) as usize];
        peer.read_exact(&mut path).unwrap();
        assert_eq!(path, b"/live/cam");

        peer.read_exact(&mut len).unwrap();
        let mut body = vec![0u8; u32::from_be_bytes(len) as usize];
        peer.read_exact(&mut body).unwrap();
        assert_eq!(body.len(), 16 + 16 * 8);

        call(&mut dispatcher, "disconnect", json!({"tex": id}));
        call(&mut dispatcher, "release", json!({"tex": id}));
        assert!(sink.events().contains(&SessionEvent::Disconnected));
        assert!(dispatcher.registry().is_empty());
    }

    #[test]
    fn null_display_counts_frames() {
        let display = NullDisplay::default();
        display.set_buffer_size(4, 2);
        display.on_frame(&VideoFrame::new(4, 2, 0, vec![0; 8]));
        assert_eq!(display.frames(), 1);
        assert_eq!(display.buffer_size(), Some((4, 2)));
    }
}
