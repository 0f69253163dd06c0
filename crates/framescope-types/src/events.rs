use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::telemetry::{FramePair, Strategy};

/// Event kinds emitted by a frame collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Published,
    Transition,
}

/// Immutable event envelope for logging and downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    Started {
        strategy: Strategy,
        reference_time: DateTime<Local>,
    },
    Published {
        pair: FramePair,
        strategy: Strategy,
    },
    StrategyChanged(StrategyTransition),
    Stopped {
        pair: FramePair,
    },
}

/// Why the acquisition loop left a strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    /// `max_failures` consecutive ticks failed and a lower strategy probed cleanly.
    RepeatedFailures,
    /// No lower strategy could be probed; running on a zero legacy baseline.
    Exhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyTransition {
    pub from: Strategy,
    pub to: Strategy,
    pub reason: TransitionReason,
}

impl FrameEvent {
    pub fn new(payload: EventPayload) -> Self {
        let kind = match &payload {
            EventPayload::Started { .. } | EventPayload::Stopped { .. } => EventKind::Lifecycle,
            EventPayload::Published { .. } => EventKind::Published,
            EventPayload::StrategyChanged(_) => EventKind::Transition,
        };
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_payload() {
        let event = FrameEvent::new(EventPayload::StrategyChanged(StrategyTransition {
            from: Strategy::SurfaceFlingerLatency,
            to: Strategy::LegacyPageFlip,
            reason: TransitionReason::RepeatedFailures,
        }));
        assert_eq!(event.kind, EventKind::Transition);

        let event = FrameEvent::new(EventPayload::Stopped {
            pair: FramePair::new(60, 0),
        });
        assert_eq!(event.kind, EventKind::Lifecycle);
    }
}
