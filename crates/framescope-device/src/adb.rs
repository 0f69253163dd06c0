use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Instant,
};

use async_trait::async_trait;
use framescope_types::{config::DeviceConfig, Result};
use tokio::process::Command;

use crate::{transport_error, ShellTransport, TransportMetrics};

const DEFAULT_ADB: &str = "adb";

/// Shell transport backed by the host `adb` binary.
pub struct AdbShell {
    adb_path: PathBuf,
    metrics: Arc<Mutex<TransportMetrics>>,
}

impl AdbShell {
    pub fn new(config: &DeviceConfig) -> Self {
        let adb_path = config
            .adb_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ADB));

        Self {
            adb_path,
            metrics: Arc::new(Mutex::new(TransportMetrics::default())),
        }
    }

    async fn run_adb(&self, args: &[&str]) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.adb_path);
        command.args(args);
        let output = command.output().await.map_err(|err| {
            transport_error(format!("failed to spawn adb ({}): {err}", args.join(" ")))
        })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(transport_error(format!(
                "adb exited with {} ({}): {}",
                output.status,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    fn record(&self, start: Instant, ok: bool) {
        if let Ok(mut guard) = self.metrics.lock() {
            guard.last_call_ms = Some(start.elapsed().as_millis() as u64);
            if ok {
                guard.successful_calls += 1;
            } else {
                guard.failed_calls += 1;
            }
        }
    }
}

#[async_trait]
impl ShellTransport for AdbShell {
    async fn shell(&self, command: &str, device_id: &str) -> Result<String> {
        let start = Instant::now();
        let mut args = Vec::with_capacity(4);
        if !device_id.is_empty() {
            args.extend(["-s", device_id]);
        }
        args.extend(["shell", command]);

        let result = self.run_adb(&args).await;
        self.record(start, result.is_ok());
        let raw = result?;
        let text = String::from_utf8_lossy(&raw).replace("\r\n", "\n");
        tracing::trace!(command, bytes = raw.len(), "adb shell completed");
        Ok(text)
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}
