//! Frame-rate and jank collection for an Android app over a device shell.
//!
//! A [`FrameCollector`] runs two tasks: acquisition samples the device with
//! the richest strategy that works and demotes it after repeated failure;
//! computation turns each sample into an `(fps, jank)` pair and publishes it.

pub mod acquisition;
pub mod collector;
pub mod computation;
pub mod events;
pub mod failure;
pub mod jank;
pub mod sample;
pub mod source;
pub mod strategy;

use std::time::Duration;

use framescope_types::FrameScopeError;
use tokio_util::sync::CancellationToken;

pub use collector::FrameCollector;
pub use computation::{FrameCalculator, FrameReader};
pub use events::EventBus;
pub use failure::SampleFailure;
pub use sample::{FrameSample, FrameTarget, FrameTiming};
pub use source::focus::foreground_package;
pub use strategy::{FailureVerdict, StrategyMachine};

/// Generate an error aligned with collector lifecycle semantics.
pub fn collector_error(message: impl Into<String>) -> FrameScopeError {
    FrameScopeError::Collector(message.into())
}

/// Sleep for `duration` unless cancelled first. Returns `true` on cancel.
pub(crate) async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return cancel.is_cancelled();
    }
    tokio::select! {
        _ = cancel.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}
