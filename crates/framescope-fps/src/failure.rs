use framescope_types::FrameScopeError;
use thiserror::Error;

/// Why a strategy produced no sample this tick.
///
/// The acquisition loop folds every variant into the same failure counter;
/// the distinction only matters for logging and backoff length.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SampleFailure {
    /// The shell call errored or returned nothing.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Output arrived but was not in the expected shape.
    #[error("parse failure: {0}")]
    Parse(String),
    /// Output was well formed but describes an unusable state.
    #[error("unusable output: {0}")]
    Semantic(String),
}

impl SampleFailure {
    pub fn is_transport(&self) -> bool {
        matches!(self, SampleFailure::Transport(_))
    }
}

impl From<FrameScopeError> for SampleFailure {
    fn from(err: FrameScopeError) -> Self {
        match err {
            FrameScopeError::Transport(message) => SampleFailure::Transport(message),
            other => SampleFailure::Transport(other.to_string()),
        }
    }
}

/// Reject empty output as a transport failure.
pub(crate) fn require_output(output: String, what: &str) -> Result<String, SampleFailure> {
    if output.trim().is_empty() {
        Err(SampleFailure::Transport(format!("{what} returned no output")))
    } else {
        Ok(output)
    }
}
