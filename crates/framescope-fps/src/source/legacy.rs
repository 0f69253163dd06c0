//! Page-flip counter read through the SurfaceFlinger binder service.

use std::sync::OnceLock;

use chrono::Utc;
use framescope_device::ShellTransport;
use regex::Regex;
use tracing::debug;

use crate::{
    failure::{require_output, SampleFailure},
    sample::{FrameTarget, LegacySample},
};

const PAGE_FLIP_CALL: &str = "service call SurfaceFlinger 1013";
const ERROR_MARKERS: [&str; 3] = ["Error:", "Permission denied", "Operation not permitted"];

fn parcel_pattern() -> &'static Regex {
    static PARCEL: OnceLock<Regex> = OnceLock::new();
    PARCEL.get_or_init(|| Regex::new(r"^Result: Parcel\((\w+)").expect("valid parcel pattern"))
}

/// Parse `Result: Parcel(000a1b2c ...)` into the page-flip counter.
///
/// The payload must be strictly hexadecimal; anything else, including
/// error text embedded in the reply, is rejected.
pub fn parse_page_flip_count(reply: &str) -> Result<u64, SampleFailure> {
    let reply = reply.trim();
    if reply.is_empty() {
        return Err(SampleFailure::Transport(
            "no response from SurfaceFlinger service".into(),
        ));
    }
    if let Some(marker) = ERROR_MARKERS.iter().find(|marker| reply.contains(*marker)) {
        return Err(SampleFailure::Semantic(format!(
            "service call rejected ({marker}): {reply}"
        )));
    }

    let payload = parcel_pattern()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| SampleFailure::Parse(format!("unexpected service reply: {reply}")))?;

    if !payload.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(SampleFailure::Parse(format!(
            "invalid hex payload `{payload}`"
        )));
    }
    u64::from_str_radix(payload, 16)
        .map_err(|err| SampleFailure::Parse(format!("hex payload `{payload}`: {err}")))
}

/// Read the current page-flip counter and stamp it locally.
pub async fn sample_page_flips<S>(shell: &S, target: &FrameTarget) -> Result<LegacySample, SampleFailure>
where
    S: ShellTransport + ?Sized,
{
    let reply = require_output(
        shell.shell(PAGE_FLIP_CALL, &target.device_id).await?,
        "SurfaceFlinger service call",
    )?;
    let timestamp = Utc::now();
    let page_flip_count = parse_page_flip_count(&reply)?;
    debug!(page_flip_count, "page-flip counter read");
    Ok(LegacySample {
        page_flip_count,
        timestamp,
    })
}
