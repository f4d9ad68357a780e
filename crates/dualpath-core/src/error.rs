//! Error types for dualpath
//!
//! Three families of failure flow through an experiment run:
//! - Behavior errors, captured inside an [`Observation`](crate::Observation)
//! - Operation errors, accumulated on the result and handed to the reporter
//! - Caller-visible errors, returned from [`Experiment::run`](crate::Experiment::run)

use crate::result::ExperimentResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Caller error shared between observations and operation error lists
pub type SharedError = Arc<anyhow::Error>;

/// Failure captured while observing a single behavior
#[derive(Debug, Clone, thiserror::Error)]
pub enum BehaviorError {
    /// The behavior returned an error
    #[error("{0}")]
    Failed(SharedError),

    /// The behavior panicked
    #[error("behavior panicked: {0}")]
    Panicked(String),

    /// No behavior registered under the requested name
    #[error("behavior {behavior:?} not found for experiment {experiment:?}")]
    NotFound {
        /// Requested behavior name
        behavior: String,
        /// Experiment that was asked for it
        experiment: String,
    },

    /// The shared deadline elapsed before the behavior finished
    #[error("behavior timed out after {0:?}")]
    TimedOut(Duration),
}

impl BehaviorError {
    /// Wrap an error returned by a behavior
    #[inline]
    #[must_use]
    pub fn failed(error: anyhow::Error) -> Self {
        Self::Failed(Arc::new(error))
    }

    /// Check if this is a timeout-class error
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }
}

/// Run step that produced an [`OperationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// `before_run` hook
    BeforeRun,
    /// `run_if` gate
    RunIf,
    /// Comparator
    Compare,
    /// Ignore predicate
    Ignore,
    /// Publish sink
    Publish,
    /// Behavior exceeded the configured timeout
    Timeout,
}

impl Operation {
    /// Stable snake_case name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeRun => "before_run",
            Self::RunIf => "run_if",
            Self::Compare => "compare",
            Self::Ignore => "ignore",
            Self::Publish => "publish",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Non-fatal failure of one run step
///
/// Displays as the wrapped error's message so reporters see the caller's text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{error}")]
pub struct OperationError {
    /// Step that failed
    pub operation: Operation,
    /// Name of the experiment
    pub experiment: String,
    /// Underlying error
    pub error: SharedError,
}

impl OperationError {
    /// Create a new operation error
    #[must_use]
    pub fn new(operation: Operation, experiment: impl Into<String>, error: anyhow::Error) -> Self {
        Self {
            operation,
            experiment: experiment.into(),
            error: Arc::new(error),
        }
    }
}

/// Raised to the caller when mismatches are configured to surface as errors
pub struct MismatchError<T> {
    result: Box<ExperimentResult<T>>,
}

impl<T> MismatchError<T> {
    pub(crate) fn new(result: ExperimentResult<T>) -> Self {
        Self {
            result: Box::new(result),
        }
    }

    /// The run that mismatched
    #[inline]
    #[must_use]
    pub fn result(&self) -> &ExperimentResult<T> {
        &self.result
    }

    /// Take ownership of the mismatched run
    #[must_use]
    pub fn into_result(self) -> ExperimentResult<T> {
        *self.result
    }
}

impl<T> fmt::Display for MismatchError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[dualpath] experiment {:?} observations mismatched",
            self.result.experiment()
        )
    }
}

impl<T: fmt::Debug> fmt::Debug for MismatchError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MismatchError")
            .field("result", &self.result)
            .finish()
    }
}

impl<T: fmt::Debug> std::error::Error for MismatchError<T> {}

/// Error returned from [`Experiment::run`](crate::Experiment::run)
///
/// Displays transparently as the wrapped error.
pub enum ExperimentError<T> {
    /// The control behavior's own error
    Behavior(BehaviorError),

    /// A candidate mismatched and `error_on_mismatch` is enabled
    Mismatch(MismatchError<T>),

    /// The `run_if` gate failed, nothing was executed
    RunIf(OperationError),
}

impl<T> ExperimentError<T> {
    /// Check if this is a mismatch error
    #[inline]
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::Mismatch(_))
    }

    /// Access the mismatched result, if any
    #[must_use]
    pub fn as_mismatch(&self) -> Option<&MismatchError<T>> {
        match self {
            Self::Mismatch(m) => Some(m),
            _ => None,
        }
    }

    /// Access the control's behavior error, if any
    #[must_use]
    pub fn as_behavior(&self) -> Option<&BehaviorError> {
        match self {
            Self::Behavior(e) => Some(e),
            _ => None,
        }
    }
}

impl<T> fmt::Display for ExperimentError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Behavior(e) => fmt::Display::fmt(e, f),
            Self::Mismatch(e) => fmt::Display::fmt(e, f),
            Self::RunIf(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ExperimentError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Behavior(e) => f.debug_tuple("Behavior").field(e).finish(),
            Self::Mismatch(e) => f.debug_tuple("Mismatch").field(e).finish(),
            Self::RunIf(e) => f.debug_tuple("RunIf").field(e).finish(),
        }
    }
}

impl<T: fmt::Debug> std::error::Error for ExperimentError<T> {}

/// Configuration and registration errors, raised by `build()` and the loaders
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Experiment name is empty
    #[error("experiment name must not be empty")]
    EmptyName,

    /// Control behavior was never registered
    #[error("control behavior {0:?} is not registered")]
    MissingControl(String),

    /// Two behaviors share a name
    #[error("behavior {0:?} is already registered")]
    DuplicateBehavior(String),

    /// Timeout of zero
    #[error("timeout must be greater than zero")]
    InvalidTimeout,

    /// Timeout configured for sequential execution
    #[error("timeout requires concurrent execution")]
    TimeoutRequiresConcurrency,

    /// Malformed TOML
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("io error reading {}: {source}", path.display())]
    Io {
        /// File that failed to load
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
