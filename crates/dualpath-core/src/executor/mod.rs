//! Execution phase
//!
//! The executor runs the control and every candidate of one experiment and
//! feeds their observations to the classifier.
//!
//! # Modes
//!
//! - **Sequential**: behaviors run inline on the caller's task, control first,
//!   then each candidate in registration order. Each candidate is classified
//!   as soon as it completes. Wall time is the sum of all runtimes.
//! - **Concurrent**: every behavior (control included) runs on its own
//!   blocking-pool thread. All of them race a single deadline fixed when the
//!   run starts. Wall time is the slowest behavior, capped by the timeout.
//!
//! # Timeouts do not cancel
//!
//! A behavior that misses the deadline is abandoned, not stopped. Its thread
//! keeps running until the computation returns and the value is dropped.
//! Blocking work cannot be interrupted from outside, so these threads are an
//! unreclaimed resource until they finish. A tokio runtime also waits for
//! them on shutdown.

use crate::classifier::Classifier;
use crate::config::{Concurrency, ExperimentConfig};
use crate::error::{Operation, OperationError};
use crate::observation::{Observation, Observer};
use crate::registry::BehaviorRegistry;
use crate::result::ResultAggregator;
use crate::types::RunId;
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Runs the behaviors of one experiment
pub(crate) struct Executor<'a, T> {
    observer: Observer,
    registry: &'a BehaviorRegistry<T>,
    concurrency: Concurrency,
    timeout: Option<Duration>,
}

impl<'a, T: Send + 'static> Executor<'a, T> {
    /// Create an executor for `registry` using the mode in `config`
    pub(crate) fn new(
        observer: Observer,
        registry: &'a BehaviorRegistry<T>,
        config: &ExperimentConfig,
    ) -> Self {
        Self {
            observer,
            registry,
            concurrency: config.concurrency,
            timeout: config.timeout(),
        }
    }

    /// Execute every behavior and classify every candidate
    ///
    /// `errors` carries operation errors recorded before execution started.
    pub(crate) async fn execute(
        &self,
        classifier: &Classifier<'_, T>,
        run_id: RunId,
        errors: Vec<OperationError>,
    ) -> ResultAggregator<T> {
        match self.concurrency {
            Concurrency::Sequential => self.execute_sequential(classifier, run_id, errors),
            Concurrency::Concurrent => self.execute_concurrent(classifier, run_id, errors).await,
        }
    }

    fn execute_sequential(
        &self,
        classifier: &Classifier<'_, T>,
        run_id: RunId,
        errors: Vec<OperationError>,
    ) -> ResultAggregator<T> {
        let control = self
            .observer
            .observe(self.registry.control_name(), self.registry.control());

        let mut aggregator = self.aggregator(run_id, control, errors);
        for (name, behavior) in self.registry.candidates() {
            let candidate = self.observer.observe(name, Some(behavior));
            aggregator.classify(classifier, candidate);
        }
        aggregator
    }

    async fn execute_concurrent(
        &self,
        classifier: &Classifier<'_, T>,
        run_id: RunId,
        mut errors: Vec<OperationError>,
    ) -> ResultAggregator<T> {
        let started = Instant::now();
        let started_at = Utc::now();
        let deadline = self.timeout.map(|t| started + t);

        let mut pending: FuturesUnordered<_> = self
            .registry
            .iter()
            .enumerate()
            .map(|(slot, (name, behavior))| {
                let observer = self.observer.clone();
                let behavior = Arc::clone(behavior);
                let name = name.to_string();
                async move {
                    let task_name = name.clone();
                    let handle = tokio::task::spawn_blocking(move || {
                        observer.observe(&task_name, Some(&behavior))
                    });
                    // Dropping the handle detaches the task, it is not aborted.
                    let joined = match deadline {
                        Some(deadline) => tokio::time::timeout_at(deadline, handle).await.ok(),
                        None => Some(handle.await),
                    };
                    (slot, name, joined)
                }
            })
            .collect();

        let mut slots: Vec<Option<Observation<T>>> = Vec::with_capacity(self.registry.len());
        slots.resize_with(self.registry.len(), || None);

        while let Some((slot, name, joined)) = pending.next().await {
            let observation = match joined {
                Some(Ok(observation)) => observation,
                Some(Err(join_error)) => {
                    tracing::error!(behavior = %name, error = %join_error, "behavior task failed");
                    Observation::lost(Arc::clone(self.observer.experiment()), name, join_error.to_string())
                }
                None => {
                    let timeout = self.timeout.unwrap_or_default();
                    tracing::warn!(behavior = %name, ?timeout, "behavior timed out, abandoning");
                    errors.push(OperationError::new(
                        Operation::Timeout,
                        &**self.observer.experiment(),
                        anyhow::anyhow!("behavior {name:?} timed out after {timeout:?}"),
                    ));
                    Observation::timed_out(
                        Arc::clone(self.observer.experiment()),
                        name,
                        started_at,
                        started.elapsed(),
                        timeout,
                    )
                }
            };
            slots[slot] = Some(observation);
        }

        let mut control = None;
        let mut candidates = Vec::with_capacity(self.registry.candidate_count());
        for observation in slots.into_iter().flatten() {
            if control.is_none() && self.registry.is_control(observation.name()) {
                control = Some(observation);
            } else {
                candidates.push(observation);
            }
        }
        let control = control.unwrap_or_else(|| {
            self.observer
                .observe(self.registry.control_name(), self.registry.control())
        });

        let mut aggregator = self.aggregator(run_id, control, errors);
        for candidate in candidates {
            aggregator.classify(classifier, candidate);
        }
        aggregator
    }

    fn aggregator(
        &self,
        run_id: RunId,
        control: Observation<T>,
        errors: Vec<OperationError>,
    ) -> ResultAggregator<T> {
        ResultAggregator::new(Arc::clone(self.observer.experiment()), run_id, control, errors)
    }
}
