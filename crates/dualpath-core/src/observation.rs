//! Observations
//!
//! An [`Observation`] is the immutable record of one behavior execution. The
//! [`Observer`] produces them and never fails: returned errors, panics and
//! missing behaviors all land in the observation's outcome.

use crate::error::BehaviorError;
use crate::types::BehaviorFn;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Captured outcome of one behavior execution
#[derive(Debug)]
pub struct Observation<T> {
    experiment: Arc<str>,
    name: String,
    started_at: DateTime<Utc>,
    runtime: Duration,
    outcome: Result<T, BehaviorError>,
}

impl<T> Observation<T> {
    /// Observation for a behavior abandoned at the deadline
    pub(crate) fn timed_out(
        experiment: Arc<str>,
        name: impl Into<String>,
        started_at: DateTime<Utc>,
        waited: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            experiment,
            name: name.into(),
            started_at,
            runtime: waited,
            outcome: Err(BehaviorError::TimedOut(timeout)),
        }
    }

    /// Observation for a behavior whose execution unit was lost
    pub(crate) fn lost(experiment: Arc<str>, name: impl Into<String>, reason: String) -> Self {
        Self {
            experiment,
            name: name.into(),
            started_at: Utc::now(),
            runtime: Duration::ZERO,
            outcome: Err(BehaviorError::Panicked(reason)),
        }
    }

    /// Experiment that produced this observation
    #[inline]
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Behavior name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock start time
    #[inline]
    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time spent inside the behavior
    #[inline]
    #[must_use]
    pub fn runtime(&self) -> Duration {
        self.runtime
    }

    /// Value or error
    #[inline]
    #[must_use]
    pub fn outcome(&self) -> &Result<T, BehaviorError> {
        &self.outcome
    }

    /// Returned value, if the behavior succeeded
    #[inline]
    #[must_use]
    pub fn value(&self) -> Option<&T> {
        self.outcome.as_ref().ok()
    }

    /// Captured error, if the behavior failed
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&BehaviorError> {
        self.outcome.as_ref().err()
    }

    /// Check if the behavior was abandoned at the deadline
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.error().is_some_and(BehaviorError::is_timeout)
    }

    /// Consume into the outcome
    #[must_use]
    pub fn into_outcome(self) -> Result<T, BehaviorError> {
        self.outcome
    }
}

/// Executes behaviors and records observations
#[derive(Debug, Clone)]
pub struct Observer {
    experiment: Arc<str>,
}

impl Observer {
    /// Create an observer for the named experiment
    #[inline]
    #[must_use]
    pub fn new(experiment: Arc<str>) -> Self {
        Self { experiment }
    }

    /// Experiment name
    #[inline]
    #[must_use]
    pub fn experiment(&self) -> &Arc<str> {
        &self.experiment
    }

    /// Run `behavior` once and capture its outcome
    ///
    /// `None` means the name was not found in the registry.
    #[must_use]
    pub fn observe<T>(&self, name: &str, behavior: Option<&BehaviorFn<T>>) -> Observation<T> {
        let started_at = Utc::now();
        let start = Instant::now();

        let outcome = match behavior {
            None => Err(BehaviorError::NotFound {
                behavior: name.to_string(),
                experiment: self.experiment.to_string(),
            }),
            Some(behavior) => match catch_panic(|| behavior()) {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(BehaviorError::failed(e)),
                Err(message) => Err(BehaviorError::Panicked(message)),
            },
        };
        let runtime = start.elapsed();

        tracing::debug!(
            experiment = %self.experiment,
            behavior = name,
            runtime_us = u64::try_from(runtime.as_micros()).unwrap_or(u64::MAX),
            failed = outcome.is_err(),
            "observed behavior"
        );

        Observation {
            experiment: Arc::clone(&self.experiment),
            name: name.to_string(),
            started_at,
            runtime,
            outcome,
        }
    }
}

/// Run `f`, turning a panic into its message
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| panic_message(payload.as_ref()))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observer() -> Observer {
        Observer::new(Arc::from("observe"))
    }

    fn behavior<T>(f: impl Fn() -> anyhow::Result<T> + Send + Sync + 'static) -> BehaviorFn<T> {
        Arc::new(f)
    }

    #[test]
    fn captures_value() {
        let b = behavior(|| Ok(42));
        let obs = observer().observe("control", Some(&b));

        assert_eq!(obs.value(), Some(&42));
        assert!(obs.error().is_none());
        assert_eq!(obs.name(), "control");
        assert_eq!(obs.experiment(), "observe");
    }

    #[test]
    fn captures_error() {
        let b = behavior::<i32>(|| Err(anyhow::anyhow!("nope")));
        let obs = observer().observe("candidate", Some(&b));

        assert!(obs.value().is_none());
        assert_eq!(obs.error().unwrap().to_string(), "nope");
    }

    #[test]
    fn captures_panic() {
        let b = behavior::<i32>(|| panic!("kaboom"));
        let obs = observer().observe("candidate", Some(&b));

        match obs.error() {
            Some(BehaviorError::Panicked(message)) => assert_eq!(message, "kaboom"),
            other => panic!("expected panic capture, got {:?}", other),
        }
    }

    #[test]
    fn missing_behavior_is_not_found() {
        let obs = observer().observe::<i32>("ghost", None);

        assert!(matches!(
            obs.error(),
            Some(BehaviorError::NotFound { behavior, experiment })
                if behavior == "ghost" && experiment == "observe"
        ));
        assert!(obs.runtime() < Duration::from_millis(50));
    }

    #[test]
    fn measures_runtime() {
        let b = behavior(|| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(())
        });
        let obs = observer().observe("slow", Some(&b));

        assert!(obs.runtime() >= Duration::from_millis(20));
    }

    #[test]
    fn timed_out_observation() {
        let obs = Observation::<i32>::timed_out(
            Arc::from("exp"),
            "late",
            Utc::now(),
            Duration::from_millis(10),
            Duration::from_millis(10),
        );

        assert!(obs.is_timeout());
        assert!(obs.value().is_none());
    }
}
