//! # rtmp-publisher-virtual
//!
//! Desktop backend for rtmp-publisher, usable without a camera or media
//! server.
//!
//! Provides:
//! - `TestPatternCamera`: generated luma-ramp frames at the requested rate
//! - `TcpPublishLink`: relays frames as length-prefixed records over TCP
//! - `DesktopPermissions`: grant-by-default permission platform
//! - `VirtualFactory`: builds all of the above per session
//!
//! ## Usage
//! ```ignore
//! use rtmp_publisher_core::{CommandDispatcher, PublisherSettings};
//! use rtmp_publisher_virtual::{DesktopPermissions, VirtualFactory};
//!
//! let mut dispatcher = CommandDispatcher::new(
//!     VirtualFactory::default(),
//!     DesktopPermissions::new(),
//!     PublisherSettings::default(),
//! );
//! ```

pub mod error;
pub mod factory;
pub mod permissions;
pub mod tcp_link;
pub mod test_pattern;

pub use error::VirtualBackendError;
pub use factory::{NullDisplay, VirtualFactory};
pub use permissions::DesktopPermissions;
pub use tcp_link::{encode_frame, LinkTarget, TcpLinkConfig, TcpPublishLink, DEFAULT_RTMP_PORT};
pub use test_pattern::{luma_ramp, TestPatternCamera, TestPatternConfig};
