use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Frame acquisition strategies, richest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Per-frame `(intended vsync, vsync, completed)` triples from SurfaceFlinger.
    SurfaceFlingerLatency,
    /// Raw page-flip counter read through `service call SurfaceFlinger 1013`.
    LegacyPageFlip,
    /// Cumulative counters from `dumpsys gfxinfo`.
    GfxInfoAggregate,
}

impl Strategy {
    /// Strategies that may replace `self` after sustained failure, in the
    /// order they should be probed.
    pub fn fallbacks(self) -> &'static [Strategy] {
        match self {
            Strategy::SurfaceFlingerLatency => {
                &[Strategy::LegacyPageFlip, Strategy::GfxInfoAggregate]
            }
            Strategy::LegacyPageFlip => &[Strategy::GfxInfoAggregate],
            Strategy::GfxInfoAggregate => &[],
        }
    }

    pub fn is_least_capable(self) -> bool {
        self.fallbacks().is_empty()
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::SurfaceFlingerLatency => "surfaceflinger-latency",
            Strategy::LegacyPageFlip => "legacy-page-flip",
            Strategy::GfxInfoAggregate => "gfxinfo-aggregate",
        };
        f.write_str(name)
    }
}

/// The derived scalar pair published to readers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FramePair {
    pub fps: u32,
    pub jank: u32,
}

impl FramePair {
    pub fn new(fps: u32, jank: u32) -> Self {
        Self { fps, jank }
    }
}

/// Latest published state of a frame collector.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrameMetrics {
    pub latest: FramePair,
    pub strategy: Option<Strategy>,
    pub published_at: Option<DateTime<Utc>>,
    pub computations: u64,
    pub failed_samples: u64,
}
