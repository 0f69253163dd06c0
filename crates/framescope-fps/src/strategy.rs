//! Failure counting and one-way strategy demotion.

use framescope_types::telemetry::Strategy;
use tracing::Level;

/// What the acquisition loop should do after a failed tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureVerdict {
    /// Below the threshold; try the same strategy again next tick.
    Retry { attempt: u32 },
    /// Threshold reached and a lower strategy is available.
    Demote { attempt: u32 },
    /// Threshold reached with nowhere left to go.
    Saturated { attempt: u32 },
}

impl FailureVerdict {
    pub fn attempt(self) -> u32 {
        match self {
            FailureVerdict::Retry { attempt }
            | FailureVerdict::Demote { attempt }
            | FailureVerdict::Saturated { attempt } => attempt,
        }
    }

    pub fn threshold_reached(self) -> bool {
        !matches!(self, FailureVerdict::Retry { .. })
    }
}

/// Active strategy plus the consecutive-failure counter that drives
/// demotion. Promotion back to a richer strategy never happens.
#[derive(Debug, Clone)]
pub struct StrategyMachine {
    active: Strategy,
    consecutive_failures: u32,
    max_failures: u32,
    exhausted: bool,
}

impl StrategyMachine {
    pub fn new(initial: Strategy, max_failures: u32) -> Self {
        Self {
            active: initial,
            consecutive_failures: 0,
            max_failures: max_failures.max(1),
            exhausted: false,
        }
    }

    /// Machine for a session where no strategy could be probed.
    pub fn exhausted(max_failures: u32) -> Self {
        Self {
            exhausted: true,
            ..Self::new(Strategy::LegacyPageFlip, max_failures)
        }
    }

    pub fn active(&self) -> Strategy {
        self.active
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn record_failure(&mut self) -> FailureVerdict {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        let attempt = self.consecutive_failures;
        if attempt < self.max_failures {
            FailureVerdict::Retry { attempt }
        } else if self.exhausted || self.active.is_least_capable() {
            FailureVerdict::Saturated { attempt }
        } else {
            FailureVerdict::Demote { attempt }
        }
    }

    /// Move to a lower strategy. Returns the strategy left behind, or
    /// `None` when `to` would not be a demotion.
    pub fn demote_to(&mut self, to: Strategy) -> Option<Strategy> {
        let from = self.active;
        if !from.fallbacks().contains(&to) {
            return None;
        }
        self.active = to;
        self.consecutive_failures = 0;
        Some(from)
    }

    /// No fallback probed cleanly: pin to legacy and stop demoting.
    pub fn exhaust(&mut self) -> Strategy {
        let from = self.active;
        self.active = Strategy::LegacyPageFlip;
        self.consecutive_failures = 0;
        self.exhausted = true;
        from
    }

    /// Log level for the given failure attempt: the first few are warnings,
    /// the threshold crossing is an error, the rest are debug noise.
    pub fn severity(&self, attempt: u32) -> Level {
        if attempt == self.max_failures {
            Level::ERROR
        } else if attempt <= 3 {
            Level::WARN
        } else {
            Level::DEBUG
        }
    }
}
