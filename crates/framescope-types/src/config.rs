use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{FrameScopeError, Result};

/// Which SurfaceFlinger layer the latency strategy reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Focused activity window; frames come from `gfxinfo framestats`.
    FullScreen,
    /// The app's `SurfaceView` layer; frames come from `--latency`.
    #[default]
    SurfaceView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub serial: String,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub adb_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    pub period_secs: f64,
    pub jank_threshold_ms: f64,
    pub force_legacy: bool,
    pub window_mode: WindowMode,
    pub max_failures: u32,
    pub failure_backoff_ms: u64,
    pub exception_backoff_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            period_secs: 1.0,
            jank_threshold_ms: 166.0,
            force_legacy: false,
            window_mode: WindowMode::default(),
            max_failures: 5,
            failure_backoff_ms: 2_000,
            exception_backoff_ms: 5_000,
            stop_timeout_ms: 3_000,
        }
    }
}

impl FrameConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period_secs.max(0.0))
    }

    pub fn jank_threshold_secs(&self) -> f64 {
        self.jank_threshold_ms / 1000.0
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_millis(self.failure_backoff_ms)
    }

    pub fn exception_backoff(&self) -> Duration {
        Duration::from_millis(self.exception_backoff_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.period_secs > 0.0) {
            return Err(FrameScopeError::Configuration(
                "frames.period_secs must be greater than zero".into(),
            ));
        }
        if !(self.jank_threshold_ms > 0.0) {
            return Err(FrameScopeError::Configuration(
                "frames.jank_threshold_ms must be greater than zero".into(),
            ));
        }
        if self.max_failures == 0 {
            return Err(FrameScopeError::Configuration(
                "frames.max_failures must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    pub report_dir: String,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            report_dir: "report".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameScopeConfig {
    pub device: DeviceConfig,
    #[serde(default)]
    pub frames: FrameConfig,
    #[serde(default)]
    pub ops: OpsConfig,
}

impl FrameScopeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            FrameScopeError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            FrameScopeError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.serial.trim().is_empty() {
            return Err(FrameScopeError::Configuration(
                "device.serial must not be empty".into(),
            ));
        }
        self.frames.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn sample_config() -> FrameScopeConfig {
        FrameScopeConfig {
            device: DeviceConfig {
                serial: "emulator-5554".into(),
                package: Some("com.example.game".into()),
                adb_path: None,
            },
            frames: FrameConfig {
                period_secs: 0.5,
                window_mode: WindowMode::FullScreen,
                ..FrameConfig::default()
            },
            ops: OpsConfig::default(),
        }
    }

    #[test]
    fn load_config_from_file() {
        let temp_path = std::env::temp_dir().join("framescope-config-test.toml");
        let config = sample_config();

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = FrameScopeConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.device.serial, config.device.serial);
        assert_eq!(loaded.device.package, config.device.package);
        assert_eq!(loaded.frames.window_mode, WindowMode::FullScreen);
        assert_eq!(loaded.frames.period_secs, 0.5);
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn missing_sections_use_defaults() {
        let config: FrameScopeConfig =
            toml::from_str("[device]\nserial = \"abc\"\n").expect("parse minimal config");
        assert_eq!(config.frames.max_failures, 5);
        assert_eq!(config.frames.jank_threshold_ms, 166.0);
        assert_eq!(config.frames.window_mode, WindowMode::SurfaceView);
        assert!(!config.frames.force_legacy);
        assert_eq!(config.ops.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = sample_config();
        assert!(config.validate().is_ok());

        config.frames.period_secs = 0.0;
        assert!(config.validate().is_err());
        config.frames.period_secs = 1.0;
        config.frames.jank_threshold_ms = -1.0;
        assert!(config.validate().is_err());
        config.frames.jank_threshold_ms = 166.0;
        config.frames.max_failures = 0;
        assert!(config.validate().is_err());
        config.frames.max_failures = 5;
        config.device.serial = "  ".into();
        assert!(config.validate().is_err());
        config.device.serial = "device".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn durations_follow_fields() {
        let frames = FrameConfig::default();
        assert_eq!(frames.period(), Duration::from_secs(1));
        assert_eq!(frames.failure_backoff(), Duration::from_secs(2));
        assert_eq!(frames.exception_backoff(), Duration::from_secs(5));
        assert!((frames.jank_threshold_secs() - 0.166).abs() < 1e-9);
    }
}
