pub mod config;
pub mod error;
pub mod event;
pub mod frame;
pub mod handle;
pub mod state;
