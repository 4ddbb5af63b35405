//! Synthetic camera for desktop runs and tests.
//!
//! Produces 8-bit luma frames with a diagonal ramp that shifts by one step
//! per frame, paced to the configured frame rate on a dedicated thread.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rtmp_publisher_core::{
    CameraFacing, CaptureConfiguration, CaptureListener, CapturePipeline, PublisherError,
    VideoFrame,
};

use crate::error::VirtualBackendError;

const THREAD_NAME: &str = "test-pattern-capture";

/// Longest uninterrupted sleep on the capture thread, so `stop` is prompt.
const SLEEP_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct TestPatternConfig {
    /// Delay between (re)starting the camera and reporting its size.
    pub size_report_delay: Duration,
    /// Output size per facing. The requested size is used when absent.
    pub native_sizes: BTreeMap<CameraFacing, (u32, u32)>,
    /// Largest output size accepted, width by height.
    pub max_size: (u32, u32),
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            size_report_delay: Duration::from_millis(30),
            native_sizes: BTreeMap::new(),
            max_size: (4096, 4096),
        }
    }
}

impl TestPatternConfig {
    pub fn with_native_size(mut self, facing: CameraFacing, width: u32, height: u32) -> Self {
        self.native_sizes.insert(facing, (width, height));
        self
    }
}

/// `CapturePipeline` backed by a generated test pattern.
///
/// Every start, resize, or camera switch restarts the capture thread,
/// which reports the camera size once `size_report_delay` has passed and
/// then streams frames until stopped.
pub struct TestPatternCamera {
    config: TestPatternConfig,
    current: Option<CaptureConfiguration>,
    listener: Option<Arc<dyn CaptureListener>>,
    running: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TestPatternCamera {
    pub fn new(config: TestPatternConfig) -> Self {
        Self {
            config,
            current: None,
            listener: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn output_size(&self, config: &CaptureConfiguration) -> (u32, u32) {
        self.config
            .native_sizes
            .get(&config.facing)
            .copied()
            .unwrap_or((config.width, config.height))
    }

    fn check_size(&self, config: &CaptureConfiguration) -> Result<(), VirtualBackendError> {
        let (width, height) = self.output_size(config);
        let (max_width, max_height) = self.config.max_size;
        if width > max_width || height > max_height {
            return Err(VirtualBackendError::FrameTooLarge {
                width,
                height,
                max_width,
                max_height,
            });
        }
        Ok(())
    }

    fn spawn(&mut self) -> Result<(), PublisherError> {
        let (Some(config), Some(listener)) = (self.current, self.listener.clone()) else {
            return Err(PublisherError::Backend("test pattern camera not started".into()));
        };
        let (width, height) = self.output_size(&config);
        let delay = self.config.size_report_delay;

        // A fresh flag per run, so a thread still winding down never sees the next run's state.
        let running = Arc::new(AtomicBool::new(true));
        self.running = Arc::clone(&running);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.into())
            .spawn(move || {
                pattern_loop(&running, listener.as_ref(), width, height, config.fps, delay);
                running.store(false, Ordering::SeqCst);
            })
            .map_err(|source| VirtualBackendError::Spawn {
                name: THREAD_NAME,
                source,
            })?;
        self.worker = Some(handle);

        log::debug!(
            "test pattern {} camera running at {}x{}@{}",
            config.facing.as_str(),
            width,
            height,
            config.fps
        );
        Ok(())
    }

    fn halt(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("{} thread panicked", THREAD_NAME);
            }
        }
    }
}

impl CapturePipeline for TestPatternCamera {
    fn start(
        &mut self,
        config: &CaptureConfiguration,
        listener: Arc<dyn CaptureListener>,
    ) -> Result<(), PublisherError> {
        if self.is_running() {
            return Err(PublisherError::Capture {
                component: "camera".into(),
                message: "test pattern already running".into(),
            });
        }
        self.check_size(config)?;
        self.current = Some(*config);
        self.listener = Some(listener);
        self.spawn()
    }

    fn reconfigure(&mut self, config: &CaptureConfiguration) -> Result<(), PublisherError> {
        self.check_size(config)?;
        self.halt();
        self.current = Some(*config);
        self.spawn()
    }

    fn set_facing(&mut self, facing: CameraFacing) -> Result<(), PublisherError> {
        let Some(mut config) = self.current else {
            return Err(PublisherError::Backend("test pattern camera not started".into()));
        };
        config.facing = facing;
        self.check_size(&config)?;
        self.halt();
        self.current = Some(config);
        self.spawn()
    }

    fn stop(&mut self) {
        self.halt();
        self.listener = None;
    }

    fn is_running(&self) -> bool {
        self.worker.is_some() && self.running.load(Ordering::SeqCst)
    }
}

impl Drop for TestPatternCamera {
    fn drop(&mut self) {
        self.halt();
    }
}

/// Fill a `width * height` luma plane for frame `index`.
///
/// Callers bound the size; `TestPatternCamera` enforces `max_size`.
pub fn luma_ramp(width: u32, height: u32, index: u64) -> Vec<u8> {
    let (w, h) = (width as usize, height as usize);
    let mut data = Vec::with_capacity(w.saturating_mul(h));
    for y in 0..h {
        for x in 0..w {
            data.push((x as u64 + y as u64 + index) as u8);
        }
    }
    data
}

fn pattern_loop(
    running: &AtomicBool,
    listener: &dyn CaptureListener,
    width: u32,
    height: u32,
    fps: u32,
    size_report_delay: Duration,
) {
    let started = Instant::now();
    sleep_while_running(running, size_report_delay);
    if !running.load(Ordering::SeqCst) {
        return;
    }
    listener.on_camera_size(width, height);

    let interval = Duration::from_secs(1) / fps.max(1);
    let mut next = Instant::now();
    let mut index: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let timestamp_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
        let frame = VideoFrame::new(width, height, timestamp_us, luma_ramp(width, height, index));
        listener.on_frame(&frame);
        index += 1;

        next += interval;
        let now = Instant::now();
        if next > now {
            sleep_while_running(running, next - now);
        } else {
            // Fell behind; don't try to catch up with a burst.
            next = now;
        }
    }
}

fn sleep_while_running(running: &AtomicBool, duration: Duration) {
    let deadline = Instant::now() + duration;
    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU64;

    use crossbeam_channel::{Receiver, Sender};

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    struct Recorder {
        sizes: Sender<(u32, u32)>,
        frames: AtomicU64,
        last_frame: parking_lot::Mutex<Option<VideoFrame>>,
    }

    impl Recorder {
        fn new() -> (Arc<Self>, Receiver<(u32, u32)>) {
            let (tx, rx) = crossbeam_channel::unbounded();
            let recorder = Arc::new(Self {
                sizes: tx,
                frames: AtomicU64::new(0),
                last_frame: parking_lot::Mutex::new(None),
            });
            (recorder, rx)
        }

        fn frames(&self) -> u64 {
            self.frames.load(Ordering::SeqCst)
        }
    }

    impl CaptureListener for Recorder {
        fn on_frame(&self, frame: &VideoFrame) {
            self.frames.fetch_add(1, Ordering::SeqCst);
            *self.last_frame.lock() = Some(frame.clone());
        }

        fn on_camera_size(&self, width: u32, height: u32) {
            let _ = self.sizes.send((width, height));
        }

        fn on_error(&self, _message: &str) {}
    }

    fn quick() -> TestPatternConfig {
        TestPatternConfig {
            size_report_delay: Duration::from_millis(5),
            ..TestPatternConfig::default()
        }
    }

    fn wait_for_frames(recorder: &Recorder, count: u64) {
        let deadline = Instant::now() + WAIT;
        while recorder.frames() < count {
            assert!(Instant::now() < deadline, "timed out waiting for frames");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn ramp_shifts_each_frame() {
        let first = luma_ramp(4, 2, 0);
        let second = luma_ramp(4, 2, 1);
        assert_eq!(first, vec![0, 1, 2, 3, 1, 2, 3, 4]);
        assert_eq!(second[0], 1);
        assert_eq!(luma_ramp(300, 1, 0)[256], 0);
    }

    #[test]
    fn reports_requested_size_then_streams() {
        let mut camera = TestPatternCamera::new(quick());
        let (recorder, sizes) = Recorder::new();
        let config = CaptureConfiguration::new(32, 16, 60, CameraFacing::Back);

        camera.start(&config, recorder.clone()).unwrap();
        assert_eq!(sizes.recv_timeout(WAIT).unwrap(), (32, 16));
        wait_for_frames(&recorder, 2);

        let frame = recorder.last_frame.lock().clone().unwrap();
        assert_eq!((frame.width, frame.height), (32, 16));
        assert_eq!(frame.data.len(), 32 * 16);

        camera.stop();
        assert!(!camera.is_running());
    }

    #[test]
    fn native_size_overrides_request_per_facing() {
        let config = quick().with_native_size(CameraFacing::Front, 24, 24);
        let mut camera = TestPatternCamera::new(config);
        let (recorder, sizes) = Recorder::new();

        camera
            .start(
                &CaptureConfiguration::new(32, 16, 30, CameraFacing::Back),
                recorder.clone(),
            )
            .unwrap();
        assert_eq!(sizes.recv_timeout(WAIT).unwrap(), (32, 16));

        camera.set_facing(CameraFacing::Front).unwrap();
        assert_eq!(sizes.recv_timeout(WAIT).unwrap(), (24, 24));
        assert!(camera.is_running());
    }

    #[test]
    fn reconfigure_reports_new_size() {
        let mut camera = TestPatternCamera::new(quick());
        let (recorder, sizes) = Recorder::new();
        camera
            .start(
                &CaptureConfiguration::new(32, 16, 30, CameraFacing::Back),
                recorder.clone(),
            )
            .unwrap();
        sizes.recv_timeout(WAIT).unwrap();

        camera
            .reconfigure(&CaptureConfiguration::new(64, 32, 30, CameraFacing::Back))
            .unwrap();
        assert_eq!(sizes.recv_timeout(WAIT).unwrap(), (64, 32));
    }

    #[test]
    fn stop_halts_frames() {
        let mut camera = TestPatternCamera::new(quick());
        let (recorder, _sizes) = Recorder::new();
        camera
            .start(
                &CaptureConfiguration::new(8, 8, 100, CameraFacing::Back),
                recorder.clone(),
            )
            .unwrap();
        wait_for_frames(&recorder, 1);

        camera.stop();
        let after_stop = recorder.frames();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(recorder.frames(), after_stop);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut camera = TestPatternCamera::new(quick());
        let (recorder, _sizes) = Recorder::new();
        let config = CaptureConfiguration::new(8, 8, 30, CameraFacing::Back);

        camera.start(&config, recorder.clone()).unwrap();
        assert!(matches!(
            camera.start(&config, recorder),
            Err(PublisherError::Capture { .. })
        ));
    }

    #[test]
    fn oversized_frames_are_rejected_before_spawning() {
        let config = TestPatternConfig {
            max_size: (64, 64),
            ..quick()
        }
        .with_native_size(CameraFacing::Front, 128, 32);
        let mut camera = TestPatternCamera::new(config);
        let (recorder, _sizes) = Recorder::new();

        let huge = CaptureConfiguration::new(65535, 65535, 30, CameraFacing::Back);
        assert!(matches!(
            camera.start(&huge, recorder.clone()),
            Err(PublisherError::InvalidArgument(_))
        ));
        assert!(!camera.is_running());

        camera
            .start(
                &CaptureConfiguration::new(32, 16, 30, CameraFacing::Back),
                recorder.clone(),
            )
            .unwrap();
        assert!(matches!(
            camera.reconfigure(&huge),
            Err(PublisherError::InvalidArgument(_))
        ));
        assert!(matches!(
            camera.set_facing(CameraFacing::Front),
            Err(PublisherError::InvalidArgument(_))
        ));
        assert!(camera.is_running());
    }

    #[test]
    fn set_facing_before_start_fails() {
        let mut camera = TestPatternCamera::new(quick());
        assert!(camera.set_facing(CameraFacing::Front).is_err());
    }
}
