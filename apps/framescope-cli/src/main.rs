mod args;

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use framescope_device::{AdbShell, ShellTransport};
use framescope_fps::{foreground_package, FrameCollector, FrameTarget};
use framescope_ops::{ensure_report_dir, init_tracing, write_summary, MetricLog};
use framescope_types::events::{EventPayload, FrameEvent};
use futures::StreamExt;
use tracing::{info, warn};

use crate::args::Args;

const POLL_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = args.resolve_config()?;
    init_tracing(&config.ops)?;
    let report_dir = ensure_report_dir(&config.ops.report_dir)?;

    let shell = Arc::new(AdbShell::new(&config.device));
    let serial = config.device.serial.clone();
    let package = match config.device.package.clone() {
        Some(package) => package,
        None => foreground_package(shell.as_ref(), &serial)
            .await?
            .context("no app holds focus on the device; pass --package")?,
    };
    info!(%serial, %package, "monitoring");

    let target = FrameTarget {
        device_id: serial,
        package,
        window_mode: config.frames.window_mode,
    };
    let mut collector = FrameCollector::new(Arc::clone(&shell), target, config.frames.clone());

    let json = args.json;
    let mut events = collector.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            report_event(&event, json);
        }
    });

    collector.start(Local::now()).await?;

    let metric_log = MetricLog::new(&report_dir);
    let deadline = (args.duration > 0).then(|| Duration::from_secs(args.duration));
    let run = async {
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = metric_log.record(Local::now(), collector.latest()) {
                warn!(%err, "failed to record metrics");
            }
        }
    };
    let limit = async {
        match deadline {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = run => {}
        _ = limit => info!("duration elapsed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            info!("interrupted");
        }
    }

    let pair = collector.stop().await;
    let summary = write_summary(&report_dir, &collector.metrics())?;
    printer.abort();

    let transport = shell.metrics();
    info!(
        ok = transport.successful_calls,
        failed = transport.failed_calls,
        "adb calls"
    );
    println!("fps={} jank={}", pair.fps, pair.jank);
    println!("summary written to {}", summary.display());
    Ok(())
}

fn report_event(event: &FrameEvent, json: bool) {
    if json {
        match serde_json::to_string(event) {
            Ok(line) => println!("{line}"),
            Err(err) => warn!(%err, "failed to encode event"),
        }
        return;
    }
    match &event.payload {
        EventPayload::Started {
            strategy,
            reference_time,
        } => info!(%strategy, reference = %reference_time, "collector started"),
        EventPayload::Published { pair, strategy } => {
            info!(fps = pair.fps, jank = pair.jank, %strategy, "frame metrics")
        }
        EventPayload::StrategyChanged(transition) => warn!(
            from = %transition.from,
            to = %transition.to,
            reason = ?transition.reason,
            "frame strategy changed"
        ),
        EventPayload::Stopped { pair } => {
            info!(fps = pair.fps, jank = pair.jank, "collector stopped")
        }
    }
}
