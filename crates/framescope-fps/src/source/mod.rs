//! Frame acquisition strategies.
//!
//! Each strategy turns shell output into one [`FrameSample`] per tick or a
//! [`SampleFailure`]. They share nothing but the transport.

pub mod focus;
pub mod gfxinfo;
pub mod latency;
pub mod legacy;

use framescope_device::ShellTransport;
use framescope_types::telemetry::Strategy;

use crate::{
    failure::SampleFailure,
    sample::{FrameSample, FrameTarget},
};

pub use latency::LatencySource;

/// Live acquisition state of the active strategy.
#[derive(Debug)]
pub enum FrameSource {
    Latency(LatencySource),
    LegacyPageFlip,
    GfxInfoAggregate,
}

impl FrameSource {
    pub fn strategy(&self) -> Strategy {
        match self {
            FrameSource::Latency(_) => Strategy::SurfaceFlingerLatency,
            FrameSource::LegacyPageFlip => Strategy::LegacyPageFlip,
            FrameSource::GfxInfoAggregate => Strategy::GfxInfoAggregate,
        }
    }

    /// Check that `strategy` works on this device right now.
    ///
    /// Counter-based strategies return their first reading, which becomes
    /// the baseline for the next delta.
    pub async fn probe<S>(
        strategy: Strategy,
        shell: &S,
        target: &FrameTarget,
    ) -> Result<(FrameSource, Option<FrameSample>), SampleFailure>
    where
        S: ShellTransport + ?Sized,
    {
        match strategy {
            Strategy::SurfaceFlingerLatency => {
                let source = LatencySource::probe(shell, target).await?;
                Ok((FrameSource::Latency(source), None))
            }
            Strategy::LegacyPageFlip => {
                let baseline = legacy::sample_page_flips(shell, target).await?;
                Ok((FrameSource::LegacyPageFlip, Some(baseline.into())))
            }
            Strategy::GfxInfoAggregate => {
                let baseline = gfxinfo::sample_gfxinfo(shell, target).await?;
                Ok((FrameSource::GfxInfoAggregate, Some(baseline.into())))
            }
        }
    }

    pub async fn sample<S>(&mut self, shell: &S, target: &FrameTarget) -> Result<FrameSample, SampleFailure>
    where
        S: ShellTransport + ?Sized,
    {
        match self {
            FrameSource::Latency(source) => source.sample(shell, target).await.map(Into::into),
            FrameSource::LegacyPageFlip => legacy::sample_page_flips(shell, target)
                .await
                .map(Into::into),
            FrameSource::GfxInfoAggregate => gfxinfo::sample_gfxinfo(shell, target)
                .await
                .map(Into::into),
        }
    }
}
