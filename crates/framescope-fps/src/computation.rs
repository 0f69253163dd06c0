//! Turns raw samples into the published `(fps, jank)` pair.

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use framescope_types::{
    events::EventPayload,
    telemetry::{FrameMetrics, FramePair, Strategy},
};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    events::EventBus,
    jank::{latency_pair, whole_rate},
    pause,
    sample::{FrameSample, GfxInfoSample, LegacySample},
};

/// Counter-based strategies never report more than this.
pub const MAX_COUNTER_FPS: u32 = 60;

fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    (later - earlier)
        .num_microseconds()
        .map_or(0.0, |micros| micros as f64 / 1e6)
}

/// Cloneable read handle on a collector's published state.
#[derive(Clone, Default)]
pub struct FrameReader {
    inner: Arc<Mutex<FrameMetrics>>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent `(fps, jank)`; stale by at most one computation cycle.
    pub fn latest(&self) -> FramePair {
        self.inner.lock().map(|m| m.latest).unwrap_or_default()
    }

    pub fn snapshot(&self) -> FrameMetrics {
        self.inner.lock().map(|m| m.clone()).unwrap_or_default()
    }

    /// Clear published state for a new session.
    pub(crate) fn reset(&self, strategy: Strategy) {
        if let Ok(mut guard) = self.inner.lock() {
            *guard = FrameMetrics {
                strategy: Some(strategy),
                ..FrameMetrics::default()
            };
        }
    }

    pub(crate) fn publish(&self, pair: FramePair, strategy: Strategy) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.latest = pair;
            guard.strategy = Some(strategy);
            guard.published_at = Some(Utc::now());
            guard.computations += 1;
        }
    }

    pub(crate) fn set_strategy(&self, strategy: Strategy) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.strategy = Some(strategy);
        }
    }

    pub(crate) fn record_failure(&self) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.failed_samples += 1;
        }
    }
}

/// Per-strategy delta state for the computation loop.
///
/// Counter baselines are dropped whenever the incoming strategy differs
/// from the previous sample's, so deltas never span a transition.
#[derive(Debug)]
pub struct FrameCalculator {
    jank_threshold_secs: f64,
    current: Option<Strategy>,
    previous_legacy: Option<LegacySample>,
    previous_gfx: Option<GfxInfoSample>,
}

impl FrameCalculator {
    pub fn new(jank_threshold_secs: f64) -> Self {
        Self {
            jank_threshold_secs,
            current: None,
            previous_legacy: None,
            previous_gfx: None,
        }
    }

    pub fn compute(&mut self, sample: &FrameSample) -> FramePair {
        let strategy = sample.strategy();
        if self.current != Some(strategy) {
            self.current = Some(strategy);
            self.previous_legacy = None;
            self.previous_gfx = None;
        }

        match sample {
            FrameSample::Latency(latency) => latency_pair(latency, self.jank_threshold_secs),
            FrameSample::Legacy(legacy) => self.legacy_pair(legacy),
            FrameSample::GfxInfo(gfx) => self.gfx_pair(gfx),
        }
    }

    fn legacy_pair(&mut self, sample: &LegacySample) -> FramePair {
        let pair = match self.previous_legacy.replace(sample.clone()) {
            Some(previous) => {
                let seconds = seconds_between(previous.timestamp, sample.timestamp);
                let flips = sample
                    .page_flip_count
                    .saturating_sub(previous.page_flip_count);
                FramePair::new(whole_rate(flips as f64, seconds).min(MAX_COUNTER_FPS), 0)
            }
            None => FramePair::default(),
        };
        debug!(fps = pair.fps, "legacy page-flip rate");
        pair
    }

    fn gfx_pair(&mut self, sample: &GfxInfoSample) -> FramePair {
        let Some(previous) = self.previous_gfx.replace(sample.clone()) else {
            debug!("gfxinfo baseline established");
            return FramePair::default();
        };

        let seconds = seconds_between(previous.timestamp, sample.timestamp);
        let pair = match sample.total_frames.checked_sub(previous.total_frames) {
            Some(frames) if seconds > 0.0 => {
                let fps = whole_rate(frames as f64, seconds).min(MAX_COUNTER_FPS);
                let jank = sample
                    .janky_frames
                    .saturating_sub(previous.janky_frames)
                    .min(u32::MAX as u64) as u32;
                FramePair::new(fps, jank)
            }
            _ => FramePair::default(),
        };
        debug!(fps = pair.fps, jank = pair.jank, seconds, "gfxinfo delta");
        pair
    }
}

/// Consume samples until cancelled or the channel closes, publishing each
/// result and then holding the configured cadence.
pub async fn run_computation(
    mut rx: UnboundedReceiver<FrameSample>,
    mut calculator: FrameCalculator,
    reader: FrameReader,
    bus: EventBus,
    period: Duration,
    cancel: CancellationToken,
) {
    loop {
        let sample = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sample = rx.recv() => match sample {
                Some(sample) => sample,
                None => break,
            },
        };

        let started = Instant::now();
        let strategy = sample.strategy();
        let pair = calculator.compute(&sample);
        reader.publish(pair, strategy);
        bus.publish(EventPayload::Published { pair, strategy });

        if pause(period.saturating_sub(started.elapsed()), &cancel).await {
            break;
        }
    }
    debug!("computation loop stopped");
}
