//! Cumulative frame counters from `dumpsys gfxinfo <package>`.

use chrono::Utc;
use framescope_device::ShellTransport;
use tracing::debug;

use crate::{
    failure::{require_output, SampleFailure},
    sample::{FrameTarget, GfxInfoSample},
};

fn counter_after(line: &str, label: &str) -> Option<Result<u64, SampleFailure>> {
    let rest = line.trim().strip_prefix(label)?;
    let token = rest.split_whitespace().next().unwrap_or_default();
    Some(
        token
            .parse()
            .map_err(|err| SampleFailure::Parse(format!("{label} `{token}`: {err}"))),
    )
}

/// Extract `(total frames, janky frames)` from a gfxinfo dump.
///
/// ```text
/// Total frames rendered: 110
/// Janky frames: 7 (6.36%)
/// ```
pub fn parse_gfxinfo_counters(dump: &str) -> Result<(u64, u64), SampleFailure> {
    if dump.contains("No process found") {
        return Err(SampleFailure::Semantic("no process found".into()));
    }

    let mut total = None;
    let mut janky = None;
    for line in dump.lines() {
        if total.is_none() {
            if let Some(value) = counter_after(line, "Total frames rendered:") {
                total = Some(value?);
                continue;
            }
        }
        if janky.is_none() {
            if let Some(value) = counter_after(line, "Janky frames:") {
                janky = Some(value?);
            }
        }
    }

    match (total, janky) {
        (Some(total), Some(janky)) => Ok((total, janky)),
        _ => Err(SampleFailure::Parse(
            "frame counters missing from gfxinfo output".into(),
        )),
    }
}

/// Read the cumulative counters for the target package.
pub async fn sample_gfxinfo<S>(shell: &S, target: &FrameTarget) -> Result<GfxInfoSample, SampleFailure>
where
    S: ShellTransport + ?Sized,
{
    let command = format!("dumpsys gfxinfo {}", target.package);
    let dump = require_output(shell.shell(&command, &target.device_id).await?, "gfxinfo")?;
    let timestamp = Utc::now();
    let (total_frames, janky_frames) = parse_gfxinfo_counters(&dump)?;
    debug!(total_frames, janky_frames, "gfxinfo counters read");
    Ok(GfxInfoSample {
        total_frames,
        janky_frames,
        timestamp,
    })
}
