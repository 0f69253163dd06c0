//! Operational helpers: logging, report directory, metric persistence.

use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use framescope_types::{
    config::OpsConfig,
    telemetry::{FrameMetrics, FramePair},
    FrameScopeError, Result,
};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub const FPS_LOG: &str = "fps.log";
pub const JANK_LOG: &str = "jank.log";
pub const SUMMARY_FILE: &str = "summary.json";

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| FrameScopeError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| FrameScopeError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ensure_report_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    fs::create_dir_all(&dir)
        .map_err(|err| FrameScopeError::Ops(format!("failed to create report dir: {err}")))?;
    info!("Report directory ready at {:?}", dir);
    Ok(dir)
}

/// Format one metric log line: `HH:MM:SS.ffffff=value`.
pub fn metric_line(at: DateTime<Local>, value: u32) -> String {
    format!("{}={value}", at.format("%H:%M:%S%.6f"))
}

/// Appends the published pair to `fps.log` and `jank.log`.
#[derive(Debug, Clone)]
pub struct MetricLog {
    fps_path: PathBuf,
    jank_path: PathBuf,
}

impl MetricLog {
    pub fn new(dir: &Path) -> Self {
        Self {
            fps_path: dir.join(FPS_LOG),
            jank_path: dir.join(JANK_LOG),
        }
    }

    pub fn fps_path(&self) -> &Path {
        &self.fps_path
    }

    pub fn jank_path(&self) -> &Path {
        &self.jank_path
    }

    pub fn record(&self, at: DateTime<Local>, pair: FramePair) -> Result<()> {
        append_line(&self.fps_path, &metric_line(at, pair.fps))?;
        append_line(&self.jank_path, &metric_line(at, pair.jank))
    }
}

fn append_line(path: &Path, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| FrameScopeError::Ops(format!("failed to open {path:?}: {err}")))?;
    writeln!(file, "{line}")
        .map_err(|err| FrameScopeError::Ops(format!("failed to write {path:?}: {err}")))
}

/// Persist the collector's final metrics next to the metric logs.
pub fn write_summary(dir: &Path, metrics: &FrameMetrics) -> Result<PathBuf> {
    let path = dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(metrics)
        .map_err(|err| FrameScopeError::Ops(format!("failed to encode summary: {err}")))?;
    fs::write(&path, json)
        .map_err(|err| FrameScopeError::Ops(format!("failed to write {path:?}: {err}")))?;
    Ok(path)
}
