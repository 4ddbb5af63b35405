pub mod notifier;
pub mod publish_session;
pub mod registry;
pub mod router;
pub(crate) mod signal;
pub mod url;
