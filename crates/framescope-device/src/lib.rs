//! Device shell transport abstraction layer.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use framescope_types::{FrameScopeError, Result};
use tracing::debug;

mod adb;

pub use adb::AdbShell;

/// Aggregated transport counters.
#[derive(Debug, Default, Clone)]
pub struct TransportMetrics {
    pub last_call_ms: Option<u64>,
    pub successful_calls: u64,
    pub failed_calls: u64,
}

/// Runs a shell command on a device and returns its text output.
///
/// A successful call may still carry error text in its output; callers
/// parse that themselves.
#[async_trait]
pub trait ShellTransport: Send + Sync {
    async fn shell(&self, command: &str, device_id: &str) -> Result<String>;
    fn metrics(&self) -> TransportMetrics;
}

#[async_trait]
impl<T: ShellTransport + ?Sized> ShellTransport for Arc<T> {
    async fn shell(&self, command: &str, device_id: &str) -> Result<String> {
        (**self).shell(command, device_id).await
    }

    fn metrics(&self) -> TransportMetrics {
        (**self).metrics()
    }
}

/// One canned reply of a [`ScriptedShell`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Output(String),
    Fail(String),
}

impl ScriptedReply {
    pub fn output(text: impl Into<String>) -> Self {
        ScriptedReply::Output(text.into())
    }

    pub fn fail(message: impl Into<String>) -> Self {
        ScriptedReply::Fail(message.into())
    }
}

struct Rule {
    needle: String,
    replies: VecDeque<ScriptedReply>,
}

/// Transport that replays canned output keyed by command substring.
///
/// The longest registered needle contained in a command wins. Replies
/// are consumed in order and the last one repeats forever. Commands
/// with no matching rule fail as a transport error.
#[derive(Default)]
pub struct ScriptedShell {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<String>>,
    metrics: Mutex<TransportMetrics>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always answer commands containing `needle` with `reply`.
    pub fn on(&self, needle: impl Into<String>, reply: ScriptedReply) -> &Self {
        self.on_sequence(needle, vec![reply])
    }

    /// Answer commands containing `needle` with `replies` in order.
    pub fn on_sequence(&self, needle: impl Into<String>, replies: Vec<ScriptedReply>) -> &Self {
        let needle = needle.into();
        if let Ok(mut rules) = self.rules.lock() {
            rules.retain(|rule| rule.needle != needle);
            rules.push(Rule {
                needle,
                replies: replies.into(),
            });
        }
        self
    }

    /// Every command issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count_calls(&self, needle: &str) -> usize {
        self.calls()
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }

    fn next_reply(&self, command: &str) -> Option<ScriptedReply> {
        let mut rules = self.rules.lock().ok()?;
        let rule = rules
            .iter_mut()
            .filter(|rule| command.contains(rule.needle.as_str()))
            .max_by_key(|rule| rule.needle.len())?;
        if rule.replies.len() > 1 {
            rule.replies.pop_front()
        } else {
            rule.replies.front().cloned()
        }
    }
}

#[async_trait]
impl ShellTransport for ScriptedShell {
    async fn shell(&self, command: &str, device_id: &str) -> Result<String> {
        debug!(command, device_id, "scripted shell call");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.to_string());
        }
        let reply = self.next_reply(command);
        let ok = matches!(reply, Some(ScriptedReply::Output(_)));
        if let Ok(mut metrics) = self.metrics.lock() {
            if ok {
                metrics.successful_calls += 1;
            } else {
                metrics.failed_calls += 1;
            }
        }
        match reply {
            Some(ScriptedReply::Output(text)) => Ok(text),
            Some(ScriptedReply::Fail(message)) => Err(transport_error(message)),
            None => Err(transport_error(format!("no scripted reply for `{command}`"))),
        }
    }

    fn metrics(&self) -> TransportMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// Generate an error aligned with transport semantics.
pub fn transport_error(message: impl Into<String>) -> FrameScopeError {
    FrameScopeError::Transport(message.into())
}
