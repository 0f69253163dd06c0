use chrono::{DateTime, Utc};
use framescope_types::{config::WindowMode, telemetry::Strategy};

/// What is being measured.
#[derive(Debug, Clone)]
pub struct FrameTarget {
    pub device_id: String,
    pub package: String,
    pub window_mode: WindowMode,
}

/// One frame's timestamps, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    pub intended_vsync: f64,
    pub vsync: f64,
    pub completed: f64,
}

impl FrameTiming {
    pub fn new(intended_vsync: f64, vsync: f64, completed: f64) -> Self {
        Self {
            intended_vsync,
            vsync,
            completed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LatencySample {
    pub refresh_period_secs: f64,
    pub timestamps: Vec<FrameTiming>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacySample {
    pub page_flip_count: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GfxInfoSample {
    pub total_frames: u64,
    pub janky_frames: u64,
    pub timestamp: DateTime<Utc>,
}

/// Raw output of one acquisition tick.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameSample {
    Latency(LatencySample),
    Legacy(LegacySample),
    GfxInfo(GfxInfoSample),
}

impl FrameSample {
    pub fn strategy(&self) -> Strategy {
        match self {
            FrameSample::Latency(_) => Strategy::SurfaceFlingerLatency,
            FrameSample::Legacy(_) => Strategy::LegacyPageFlip,
            FrameSample::GfxInfo(_) => Strategy::GfxInfoAggregate,
        }
    }
}

impl From<LatencySample> for FrameSample {
    fn from(sample: LatencySample) -> Self {
        FrameSample::Latency(sample)
    }
}

impl From<LegacySample> for FrameSample {
    fn from(sample: LegacySample) -> Self {
        FrameSample::Legacy(sample)
    }
}

impl From<GfxInfoSample> for FrameSample {
    fn from(sample: GfxInfoSample) -> Self {
        FrameSample::GfxInfo(sample)
    }
}
