pub mod capture_pipeline;
pub mod event_sink;
pub mod factory;
pub mod frame_sink;
pub mod permission_platform;
pub mod publish_link;
