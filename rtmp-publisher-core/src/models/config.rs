use serde::{Deserialize, Serialize};

use super::error::PublisherError;

/// Audio bitrate used for every stream, in bits per second.
pub const AUDIO_BITRATE: u32 = 128 * 1024;

/// Empirical divisor turning `width * height * fps` into a video bitrate.
/// 720p@30fps comes out at roughly 2 Mbps.
pub const BITRATE_DIVISOR: u32 = 13;

/// Which physical camera feeds the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraFacing {
    Front,
    Back,
}

impl CameraFacing {
    pub fn parse(value: &str) -> Result<Self, PublisherError> {
        match value {
            "front" => Ok(Self::Front),
            "back" => Ok(Self::Back),
            other => Err(PublisherError::InvalidArgument(format!(
                "camera must be \"front\" or \"back\", got {:?}",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::Back => "back",
        }
    }
}

/// How the video bitrate is derived from a capture configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BitratePolicy {
    /// `width * height * fps / divisor`, integer division.
    Divisor(u32),
    /// A constant bitrate in bits per second.
    Fixed(u32),
}

impl Default for BitratePolicy {
    fn default() -> Self {
        Self::Divisor(BITRATE_DIVISOR)
    }
}

impl BitratePolicy {
    pub fn video_bitrate(&self, width: u32, height: u32, fps: u32) -> u64 {
        match *self {
            Self::Divisor(divisor) => {
                let pixels_per_sec = u64::from(width) * u64::from(height) * u64::from(fps);
                pixels_per_sec / u64::from(divisor.max(1))
            }
            Self::Fixed(bps) => u64::from(bps),
        }
    }
}

/// Requested capture geometry and camera.
///
/// Immutable until the session is reconfigured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfiguration {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub facing: CameraFacing,
}

impl CaptureConfiguration {
    pub fn new(width: u32, height: u32, fps: u32, facing: CameraFacing) -> Self {
        Self {
            width,
            height,
            fps,
            facing,
        }
    }

    pub fn validate(&self) -> Result<(), PublisherError> {
        if self.width == 0 || self.height == 0 {
            return Err(PublisherError::InvalidArgument(format!(
                "capture size must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.fps == 0 {
            return Err(PublisherError::InvalidArgument("fps must be positive".into()));
        }
        Ok(())
    }

    /// Whether switching to `other` changes anything but the camera facing.
    pub fn geometry_differs(&self, other: &CaptureConfiguration) -> bool {
        self.width != other.width || self.height != other.height || self.fps != other.fps
    }

    pub fn stream_parameters(&self, settings: &PublisherSettings) -> StreamParameters {
        StreamParameters {
            width: self.width,
            height: self.height,
            fps: self.fps,
            video_bitrate: settings
                .bitrate_policy
                .video_bitrate(self.width, self.height, self.fps),
            audio_bitrate: settings.audio_bitrate,
        }
    }
}

impl Default for CaptureConfiguration {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            facing: CameraFacing::Back,
        }
    }
}

/// Encoder parameters handed to the publish link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParameters {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub video_bitrate: u64,
    pub audio_bitrate: u32,
}

/// Hardware capabilities that need an OS grant before capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Camera,
    Microphone,
}

/// Process-wide publisher policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublisherSettings {
    pub audio_bitrate: u32,
    pub bitrate_policy: BitratePolicy,
    /// Capabilities requested before a session may be configured.
    pub required_capabilities: Vec<Capability>,
}

impl PublisherSettings {
    pub fn from_json(json: &str) -> Result<Self, PublisherError> {
        serde_json::from_str(json)
            .map_err(|e| PublisherError::InvalidArgument(format!("invalid settings: {}", e)))
    }
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            audio_bitrate: AUDIO_BITRATE,
            bitrate_policy: BitratePolicy::default(),
            required_capabilities: vec![Capability::Camera, Capability::Microphone],
        }
    }
}
