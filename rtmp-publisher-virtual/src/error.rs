use thiserror::Error;

use rtmp_publisher_core::PublisherError;

/// Failures inside the virtual backend before they reach a session.
#[derive(Debug, Error)]
pub enum VirtualBackendError {
    #[error("invalid publish url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("frame size {width}x{height} exceeds the {max_width}x{max_height} limit")]
    FrameTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("link is not open")]
    NotOpen,

    #[error("link is already open")]
    AlreadyOpen,
}

impl From<VirtualBackendError> for PublisherError {
    fn from(e: VirtualBackendError) -> Self {
        match e {
            VirtualBackendError::InvalidUrl { .. } | VirtualBackendError::FrameTooLarge { .. } => {
                PublisherError::InvalidArgument(e.to_string())
            }
            VirtualBackendError::Spawn { .. } => PublisherError::Backend(e.to_string()),
            VirtualBackendError::NotOpen | VirtualBackendError::AlreadyOpen => {
                PublisherError::Backend(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_errors_become_invalid_arguments() {
        let e: PublisherError = VirtualBackendError::InvalidUrl {
            url: "http://x".into(),
            reason: "unsupported scheme".into(),
        }
        .into();
        assert_eq!(e.code(), "InvalidArgument");
    }

    #[test]
    fn link_errors_become_backend_errors() {
        let e: PublisherError = VirtualBackendError::NotOpen.into();
        assert_eq!(e, PublisherError::Backend("link is not open".into()));
    }
}
