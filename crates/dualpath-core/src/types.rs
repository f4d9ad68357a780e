//! Core types for dualpath
//!
//! Run identity and the callback signatures an experiment is assembled from.

use crate::error::OperationError;
use crate::result::ExperimentResult;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use ulid::Ulid;

/// Unique run identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Zero-argument computation under test
pub type BehaviorFn<T> = Arc<dyn Fn() -> anyhow::Result<T> + Send + Sync>;

/// Decides whether a candidate value matches the control value
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> anyhow::Result<bool> + Send + Sync>;

/// Suppresses a mismatch; receives `None` for a side that errored
pub type IgnorePredicate<T> =
    Arc<dyn Fn(Option<&T>, Option<&T>) -> anyhow::Result<bool> + Send + Sync>;

/// Normalises a value for display
pub type Cleaner<T> = Arc<dyn Fn(&T) -> anyhow::Result<String> + Send + Sync>;

/// Called once before any behavior runs
pub type BeforeRunHook = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Gate deciding whether the experiment runs at all
pub type RunIfHook = Arc<dyn Fn() -> anyhow::Result<bool> + Send + Sync>;

/// Receives every finished run
pub type PublishSink<T> = Arc<dyn Fn(&ExperimentResult<T>) -> anyhow::Result<()> + Send + Sync>;

/// Receives accumulated operation errors
pub type ErrorReporter = Arc<dyn Fn(&[OperationError]) + Send + Sync>;
