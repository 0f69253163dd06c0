//! Shared domain types for the FrameScope workspace.

pub mod config;
pub mod events;
pub mod telemetry;

mod errors;

pub use errors::{FrameScopeError, Result};
