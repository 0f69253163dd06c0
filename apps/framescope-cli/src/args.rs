use std::{env, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use framescope_types::config::{
    DeviceConfig, FrameConfig, FrameScopeConfig, OpsConfig, WindowMode,
};

pub const CONFIG_ENV: &str = "FRAMESCOPE_CONFIG";

#[derive(Parser, Debug)]
#[command(name = "framescope", about = "Frame rate and jank monitor for Android apps")]
pub struct Args {
    /// TOML config file (falls back to $FRAMESCOPE_CONFIG)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// adb serial of the device
    #[arg(short, long)]
    pub device: Option<String>,
    /// Package to measure; defaults to the app in the foreground
    #[arg(short, long)]
    pub package: Option<String>,
    /// Sampling period in seconds
    #[arg(long)]
    pub period: Option<f64>,
    /// Fixed jank threshold in milliseconds
    #[arg(long)]
    pub jank_threshold: Option<f64>,
    /// Skip SurfaceFlinger latency and count page flips
    #[arg(long)]
    pub legacy: bool,
    /// Measure the focused window instead of the SurfaceView layer
    #[arg(long)]
    pub full_screen: bool,
    /// Stop after this many seconds (0 runs until Ctrl-C)
    #[arg(long, default_value = "0")]
    pub duration: u64,
    /// Path to the adb binary
    #[arg(long)]
    pub adb: Option<String>,
    /// Report directory for fps.log, jank.log and summary.json
    #[arg(long)]
    pub report_dir: Option<String>,
    /// Print events as JSON lines
    #[arg(long)]
    pub json: bool,
}

impl Args {
    fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| env::var(CONFIG_ENV).ok().map(PathBuf::from))
    }

    /// Load the config file, if any, and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<FrameScopeConfig> {
        let mut config = match self.config_path() {
            Some(path) => FrameScopeConfig::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => default_config(),
        };

        if let Some(serial) = &self.device {
            config.device.serial = serial.clone();
        }
        if let Some(package) = &self.package {
            config.device.package = Some(package.clone());
        }
        if let Some(adb) = &self.adb {
            config.device.adb_path = Some(adb.clone());
        }
        if let Some(period) = self.period {
            config.frames.period_secs = period;
        }
        if let Some(threshold) = self.jank_threshold {
            config.frames.jank_threshold_ms = threshold;
        }
        if self.legacy {
            config.frames.force_legacy = true;
        }
        if self.full_screen {
            config.frames.window_mode = WindowMode::FullScreen;
        }
        if let Some(dir) = &self.report_dir {
            config.ops.report_dir = dir.clone();
        }

        config
            .validate()
            .context("invalid configuration (pass --device or set device.serial)")?;
        Ok(config)
    }
}

fn default_config() -> FrameScopeConfig {
    FrameScopeConfig {
        device: DeviceConfig {
            serial: String::new(),
            package: None,
            adb_path: None,
        },
        frames: FrameConfig::default(),
        ops: OpsConfig::default(),
    }
}
