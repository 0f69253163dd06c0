//! Acquisition loop: drives the active strategy on a fixed cadence and
//! demotes it after sustained failure.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use chrono::Utc;
use framescope_device::ShellTransport;
use framescope_types::{
    config::FrameConfig,
    events::{EventPayload, StrategyTransition, TransitionReason},
    telemetry::Strategy,
};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Level};

use crate::{
    computation::FrameReader,
    events::EventBus,
    failure::SampleFailure,
    pause,
    sample::{FrameSample, FrameTarget, LegacySample},
    source::FrameSource,
    strategy::{FailureVerdict, StrategyMachine},
};

/// Outcome of one acquisition tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Sample to hand to the computation loop.
    pub sample: Option<FrameSample>,
    pub failure: Option<SampleFailure>,
    pub transition: Option<StrategyTransition>,
    /// Extra delay on top of the cadence sleep.
    pub backoff: Option<Duration>,
}

fn zero_legacy_baseline() -> FrameSample {
    FrameSample::Legacy(LegacySample {
        page_flip_count: 0,
        timestamp: Utc::now(),
    })
}

/// Acquisition state: the active source and its failure bookkeeping.
pub struct Acquirer<S: ShellTransport + ?Sized> {
    shell: Arc<S>,
    target: FrameTarget,
    config: FrameConfig,
    machine: StrategyMachine,
    source: FrameSource,
}

impl<S> Acquirer<S>
where
    S: ShellTransport + ?Sized,
{
    /// Pick the richest strategy the device supports right now.
    ///
    /// Tries the focus window (unless legacy is forced), then a legacy
    /// baseline, then a gfxinfo baseline. When all fail the loop still runs
    /// on a zero legacy baseline. Returns the baseline sample, if any, that
    /// must reach the computation loop before the first tick.
    pub async fn initialize(
        shell: Arc<S>,
        target: FrameTarget,
        config: FrameConfig,
    ) -> (Self, Option<FrameSample>) {
        let mut candidates = Vec::with_capacity(3);
        if config.force_legacy {
            info!("legacy frame counting forced by configuration");
        } else {
            candidates.push(Strategy::SurfaceFlingerLatency);
        }
        candidates.extend([Strategy::LegacyPageFlip, Strategy::GfxInfoAggregate]);

        for strategy in candidates {
            match FrameSource::probe(strategy, shell.as_ref(), &target).await {
                Ok((source, baseline)) => {
                    info!(%strategy, package = %target.package, "frame strategy selected");
                    let machine = StrategyMachine::new(strategy, config.max_failures);
                    let acquirer = Self {
                        shell,
                        target,
                        config,
                        machine,
                        source,
                    };
                    return (acquirer, baseline);
                }
                Err(failure) => warn!(%strategy, %failure, "frame strategy unavailable"),
            }
        }

        error!(
            package = %target.package,
            "no frame strategy available; reporting from a zero legacy baseline"
        );
        let machine = StrategyMachine::exhausted(config.max_failures);
        let acquirer = Self {
            shell,
            target,
            config,
            machine,
            source: FrameSource::LegacyPageFlip,
        };
        (acquirer, Some(zero_legacy_baseline()))
    }

    pub fn strategy(&self) -> Strategy {
        self.machine.active()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.machine.consecutive_failures()
    }

    pub fn is_exhausted(&self) -> bool {
        self.machine.is_exhausted()
    }

    /// Sample the active strategy once and apply the failure policy.
    pub async fn tick(&mut self) -> TickReport {
        let strategy = self.machine.active();
        match self.source.sample(self.shell.as_ref(), &self.target).await {
            Ok(sample) => {
                self.machine.record_success();
                TickReport {
                    sample: Some(sample),
                    ..TickReport::default()
                }
            }
            Err(failure) => self.handle_failure(strategy, failure).await,
        }
    }

    async fn handle_failure(&mut self, strategy: Strategy, failure: SampleFailure) -> TickReport {
        let verdict = self.machine.record_failure();
        let attempt = verdict.attempt();
        let level = self.machine.severity(attempt);
        if level == Level::ERROR {
            error!(%strategy, attempt, %failure, "frame strategy keeps failing");
        } else if level == Level::WARN {
            warn!(%strategy, attempt, %failure, "frame sample failed");
        } else {
            debug!(%strategy, attempt, %failure, "frame sample failed");
        }

        let mut report = TickReport::default();
        if verdict.threshold_reached() {
            report.backoff = Some(if failure.is_transport() {
                self.config.exception_backoff()
            } else {
                self.config.failure_backoff()
            });
        }
        if let FailureVerdict::Demote { .. } = verdict {
            let (transition, baseline) = self.demote().await;
            report.transition = transition;
            report.sample = baseline;
        }
        report.failure = Some(failure);
        report
    }

    /// Probe lower strategies in order and switch to the first that works.
    async fn demote(&mut self) -> (Option<StrategyTransition>, Option<FrameSample>) {
        let from = self.machine.active();
        for &candidate in from.fallbacks() {
            match FrameSource::probe(candidate, self.shell.as_ref(), &self.target).await {
                Ok((source, baseline)) => {
                    if self.machine.demote_to(candidate).is_none() {
                        continue;
                    }
                    self.source = source;
                    warn!(%from, to = %candidate, "demoted frame strategy after repeated failures");
                    let transition = StrategyTransition {
                        from,
                        to: candidate,
                        reason: TransitionReason::RepeatedFailures,
                    };
                    return (Some(transition), baseline);
                }
                Err(failure) => {
                    warn!(%from, candidate = %candidate, %failure, "fallback strategy unavailable")
                }
            }
        }

        self.machine.exhaust();
        if from == Strategy::LegacyPageFlip {
            error!("all frame strategies exhausted; staying on legacy");
            return (None, None);
        }
        error!(%from, "all frame strategies exhausted; pinned to a zero legacy baseline");
        self.source = FrameSource::LegacyPageFlip;
        let transition = StrategyTransition {
            from,
            to: Strategy::LegacyPageFlip,
            reason: TransitionReason::Exhausted,
        };
        (Some(transition), Some(zero_legacy_baseline()))
    }
}

/// Drive `acquirer` until cancelled. Each tick holds the cadence
/// `period - elapsed`, plus any backoff the failure policy asked for.
/// Dropping the sender on exit closes the computation loop's channel.
pub async fn run_acquisition<S>(
    mut acquirer: Acquirer<S>,
    tx: UnboundedSender<FrameSample>,
    reader: FrameReader,
    bus: EventBus,
    period: Duration,
    cancel: CancellationToken,
) where
    S: ShellTransport + ?Sized,
{
    while !cancel.is_cancelled() {
        let started = Instant::now();
        let report = acquirer.tick().await;

        if report.failure.is_some() {
            reader.record_failure();
        }
        if let Some(transition) = report.transition {
            reader.set_strategy(transition.to);
            bus.publish(EventPayload::StrategyChanged(transition));
        }
        if let Some(sample) = report.sample {
            if tx.send(sample).is_err() {
                debug!("computation loop gone; stopping acquisition");
                break;
            }
        }

        let wait = period.saturating_sub(started.elapsed()) + report.backoff.unwrap_or_default();
        if pause(wait, &cancel).await {
            break;
        }
    }
    debug!(strategy = %acquirer.strategy(), "acquisition loop stopped");
}
