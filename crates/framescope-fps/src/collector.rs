//! Collector facade: owns the acquisition and computation tasks of one
//! measurement session.

use std::sync::Arc;

use chrono::{DateTime, Local};
use framescope_device::ShellTransport;
use framescope_types::{
    config::FrameConfig,
    events::{EventPayload, FrameEvent},
    telemetry::{FrameMetrics, FramePair, Strategy},
    Result,
};
use futures::stream::BoxStream;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    acquisition::{run_acquisition, Acquirer},
    collector_error,
    computation::{run_computation, FrameCalculator, FrameReader},
    events::EventBus,
    sample::FrameTarget,
};

struct RunningLoops {
    cancel: CancellationToken,
    acquisition: JoinHandle<()>,
    computation: JoinHandle<()>,
}

/// Start/stop handle around the two collector loops.
///
/// The latest `(fps, jank)` pair stays readable through [`FrameReader`]
/// while the session runs and after it stops.
pub struct FrameCollector<S: ShellTransport + ?Sized + 'static> {
    shell: Arc<S>,
    target: FrameTarget,
    config: FrameConfig,
    reader: FrameReader,
    bus: EventBus,
    running: Option<RunningLoops>,
}

impl<S> FrameCollector<S>
where
    S: ShellTransport + ?Sized + 'static,
{
    pub fn new(shell: Arc<S>, target: FrameTarget, config: FrameConfig) -> Self {
        Self {
            shell,
            target,
            config,
            reader: FrameReader::new(),
            bus: EventBus::default(),
            running: None,
        }
    }

    pub fn target(&self) -> &FrameTarget {
        &self.target
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn reader(&self) -> FrameReader {
        self.reader.clone()
    }

    pub fn latest(&self) -> FramePair {
        self.reader.latest()
    }

    pub fn metrics(&self) -> FrameMetrics {
        self.reader.snapshot()
    }

    pub fn subscribe(&self) -> BoxStream<'static, FrameEvent> {
        self.bus.subscribe()
    }

    /// Choose a strategy and spawn both loops.
    ///
    /// Returns the strategy the session starts on. Fails when the
    /// collector is already running or the frame settings are invalid.
    pub async fn start(&mut self, reference_time: DateTime<Local>) -> Result<Strategy> {
        if self.running.is_some() {
            return Err(collector_error("collector is already running"));
        }
        self.config.validate()?;

        let (acquirer, baseline) =
            Acquirer::initialize(Arc::clone(&self.shell), self.target.clone(), self.config.clone())
                .await;
        let strategy = acquirer.strategy();
        self.reader.reset(strategy);

        let (tx, rx) = mpsc::unbounded_channel();
        if let Some(sample) = baseline {
            tx.send(sample)
                .map_err(|_| collector_error("sample channel closed before start"))?;
        }

        info!(
            %strategy,
            package = %self.target.package,
            device = %self.target.device_id,
            reference = %reference_time.format("%H:%M:%S"),
            "frame collector started"
        );
        self.bus.publish(EventPayload::Started {
            strategy,
            reference_time,
        });

        let cancel = CancellationToken::new();
        let period = self.config.period();
        let computation = tokio::spawn(run_computation(
            rx,
            FrameCalculator::new(self.config.jank_threshold_secs()),
            self.reader.clone(),
            self.bus.clone(),
            period,
            cancel.clone(),
        ));
        let acquisition = tokio::spawn(run_acquisition(
            acquirer,
            tx,
            self.reader.clone(),
            self.bus.clone(),
            period,
            cancel.clone(),
        ));
        self.running = Some(RunningLoops {
            cancel,
            acquisition,
            computation,
        });
        Ok(strategy)
    }

    /// Signal both loops, wait for them within the stop timeout and return
    /// the last published pair. Stopping an idle collector only returns it.
    pub async fn stop(&mut self) -> FramePair {
        let Some(loops) = self.running.take() else {
            return self.reader.latest();
        };
        loops.cancel.cancel();

        let timeout = self.config.stop_timeout();
        for (name, mut handle) in [
            ("acquisition", loops.acquisition),
            ("computation", loops.computation),
        ] {
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(task = name, %err, "collector task ended abnormally"),
                Err(_) => {
                    warn!(task = name, ?timeout, "collector task did not stop in time; aborting");
                    handle.abort();
                }
            }
        }

        let pair = self.reader.latest();
        info!(fps = pair.fps, jank = pair.jank, "frame collector stopped");
        self.bus.publish(EventPayload::Stopped { pair });
        pair
    }
}

impl<S> Drop for FrameCollector<S>
where
    S: ShellTransport + ?Sized + 'static,
{
    fn drop(&mut self) {
        if let Some(loops) = self.running.take() {
            loops.cancel.cancel();
        }
    }
}
