//! Experiment front-end
//!
//! [`ExperimentBuilder`] collects behaviors, policies and hooks; `build()`
//! validates them into an immutable [`Experiment`].
//!
//! [`Experiment::run`] is the caller-facing entry point. It applies the
//! `run_if` gate, conducts the run and returns the control's outcome.
//! [`Experiment::conduct`] skips the gate and returns the full
//! [`ExperimentResult`] instead.

use crate::classifier::Classifier;
use crate::config::{Concurrency, ExperimentConfig};
use crate::error::{ConfigError, ExperimentError, MismatchError, Operation, OperationError};
use crate::executor::Executor;
use crate::observation::{catch_panic, Observation, Observer};
use crate::registry::{BehaviorRegistry, CANDIDATE_BEHAVIOR, CONTROL_BEHAVIOR};
use crate::result::{ExperimentResult, ResultSummary};
use crate::types::{
    BeforeRunHook, Cleaner, Comparator, ErrorReporter, IgnorePredicate, PublishSink, RunId,
    RunIfHook,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

struct Hooks<T> {
    before_run: Option<BeforeRunHook>,
    run_if: Option<RunIfHook>,
    publish: Option<PublishSink<T>>,
    report_errors: Option<ErrorReporter>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            before_run: None,
            run_if: None,
            publish: None,
            report_errors: None,
        }
    }
}

/// Builder for [`Experiment`]
pub struct ExperimentBuilder<T> {
    name: String,
    registry: BehaviorRegistry<T>,
    comparator: Comparator<T>,
    ignores: Vec<IgnorePredicate<T>>,
    cleaner: Option<Cleaner<T>>,
    hooks: Hooks<T>,
    config: ExperimentConfig,
    registration_error: Option<ConfigError>,
}

impl<T: PartialEq + 'static> ExperimentBuilder<T> {
    /// Create a builder that compares values with `==`
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_comparator(name, |control: &T, candidate: &T| Ok(control == candidate))
    }
}

impl<T> ExperimentBuilder<T> {
    /// Create a builder with a custom comparator
    #[must_use]
    pub fn with_comparator<F>(name: impl Into<String>, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            registry: BehaviorRegistry::new(),
            comparator: Arc::new(comparator),
            ignores: Vec::new(),
            cleaner: None,
            hooks: Hooks::default(),
            config: ExperimentConfig::default(),
            registration_error: None,
        }
    }

    /// Register the control behavior
    #[must_use]
    pub fn use_control<F>(self, behavior: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.behavior(CONTROL_BEHAVIOR, behavior)
    }

    /// Register a single candidate named `"candidate"`
    #[must_use]
    pub fn try_candidate<F>(self, behavior: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        self.behavior(CANDIDATE_BEHAVIOR, behavior)
    }

    /// Register a named behavior
    ///
    /// Registering under `"control"` sets the control. A duplicate name is
    /// reported by [`ExperimentBuilder::build`].
    #[must_use]
    pub fn behavior<F>(mut self, name: impl Into<String>, behavior: F) -> Self
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        if let Err(e) = self.registry.register(name, behavior) {
            self.registration_error.get_or_insert(e);
        }
        self
    }

    /// Replace the comparator
    #[must_use]
    pub fn compare<F>(mut self, comparator: F) -> Self
    where
        F: Fn(&T, &T) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.comparator = Arc::new(comparator);
        self
    }

    /// Append an ignore predicate
    #[must_use]
    pub fn ignore<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&T>, Option<&T>) -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.ignores.push(Arc::new(predicate));
        self
    }

    /// Set the display cleaner
    #[must_use]
    pub fn clean<F>(mut self, cleaner: F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.cleaner = Some(Arc::new(cleaner));
        self
    }

    /// Set the hook called before any behavior runs
    #[must_use]
    pub fn before_run<F>(mut self, hook: F) -> Self
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.before_run = Some(Arc::new(hook));
        self
    }

    /// Set the gate deciding whether candidates run at all
    #[must_use]
    pub fn run_if<F>(mut self, gate: F) -> Self
    where
        F: Fn() -> anyhow::Result<bool> + Send + Sync + 'static,
    {
        self.hooks.run_if = Some(Arc::new(gate));
        self
    }

    /// Set the publish sink
    #[must_use]
    pub fn publish<F>(mut self, sink: F) -> Self
    where
        F: Fn(&ExperimentResult<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.hooks.publish = Some(Arc::new(sink));
        self
    }

    /// Set the operation error reporter
    #[must_use]
    pub fn report_errors<F>(mut self, reporter: F) -> Self
    where
        F: Fn(&[OperationError]) + Send + Sync + 'static,
    {
        self.hooks.report_errors = Some(Arc::new(reporter));
        self
    }

    /// Run behaviors concurrently, optionally bounded by `timeout`
    ///
    /// The timeout is rounded up to whole milliseconds.
    #[must_use]
    pub fn concurrency(mut self, timeout: Option<Duration>) -> Self {
        self.config = self
            .config
            .with_concurrency(Concurrency::Concurrent)
            .with_timeout(timeout);
        self
    }

    /// Run behaviors one at a time
    #[must_use]
    pub fn sequential(mut self) -> Self {
        self.config = self
            .config
            .with_concurrency(Concurrency::Sequential)
            .with_timeout(None);
        self
    }

    /// Surface mismatches as errors instead of the control's value
    #[must_use]
    pub fn error_on_mismatch(mut self, enabled: bool) -> Self {
        self.config.error_on_mismatch = enabled;
        self
    }

    /// Replace the whole run configuration
    #[must_use]
    pub fn config(mut self, config: ExperimentConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build
    ///
    /// # Errors
    /// - `ConfigError::EmptyName` if the name is empty
    /// - `ConfigError::DuplicateBehavior` for the first duplicate registration
    /// - `ConfigError::MissingControl` if no control was registered
    /// - any error from [`ExperimentConfig::validate`]
    pub fn build(self) -> Result<Experiment<T>, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if let Some(e) = self.registration_error {
            return Err(e);
        }
        self.registry.validate()?;
        self.config.validate()?;

        Ok(Experiment {
            name: Arc::from(self.name),
            registry: self.registry,
            comparator: self.comparator,
            ignores: self.ignores,
            cleaner: self.cleaner,
            hooks: self.hooks,
            config: self.config,
        })
    }
}

/// A validated control/candidate experiment
pub struct Experiment<T> {
    name: Arc<str>,
    registry: BehaviorRegistry<T>,
    comparator: Comparator<T>,
    ignores: Vec<IgnorePredicate<T>>,
    cleaner: Option<Cleaner<T>>,
    hooks: Hooks<T>,
    config: ExperimentConfig,
}

impl<T> Experiment<T> {
    /// Experiment name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    /// Registered behaviors
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &BehaviorRegistry<T> {
        &self.registry
    }

    fn observer(&self) -> Observer {
        Observer::new(Arc::clone(&self.name))
    }

    fn operation_error(&self, operation: Operation, error: anyhow::Error) -> OperationError {
        OperationError::new(operation, &*self.name, error)
    }

    fn control_only(&self) -> Result<T, ExperimentError<T>> {
        self.observer()
            .observe(self.registry.control_name(), self.registry.control())
            .into_outcome()
            .map_err(ExperimentError::Behavior)
    }

    fn gate(&self) -> Result<bool, OperationError> {
        let Some(run_if) = &self.hooks.run_if else {
            return Ok(true);
        };
        catch_panic(|| run_if())
            .unwrap_or_else(|message| Err(anyhow::anyhow!("run_if panicked: {message}")))
            .map_err(|e| self.operation_error(Operation::RunIf, e))
    }

    fn before_run(&self) -> Option<OperationError> {
        let before_run = self.hooks.before_run.as_ref()?;
        catch_panic(|| before_run())
            .unwrap_or_else(|message| Err(anyhow::anyhow!("before_run panicked: {message}")))
            .err()
            .map(|e| self.operation_error(Operation::BeforeRun, e))
    }

    fn settle(&self, result: ExperimentResult<T>) -> Result<T, ExperimentError<T>> {
        if self.config.error_on_mismatch && result.is_mismatched() {
            return Err(ExperimentError::Mismatch(MismatchError::new(result)));
        }
        result
            .into_control()
            .into_outcome()
            .map_err(ExperimentError::Behavior)
    }
}

impl<T: Send + 'static> Experiment<T> {
    /// Run the experiment and return the control's outcome
    ///
    /// The `run_if` gate is always consulted first. A failing gate is
    /// reported and returned without running anything. Without candidates,
    /// or when the gate says no, only the control runs and no other hook
    /// fires.
    ///
    /// # Errors
    /// - `ExperimentError::Behavior` with the control's own error
    /// - `ExperimentError::Mismatch` if `error_on_mismatch` is set and a
    ///   candidate mismatched
    /// - `ExperimentError::RunIf` if the gate failed
    pub async fn run(&self) -> Result<T, ExperimentError<T>> {
        match self.gate() {
            Ok(true) if self.registry.candidate_count() == 0 => return self.control_only(),
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(experiment = %self.name, "run_if disabled experiment");
                return self.control_only();
            }
            Err(e) => {
                tracing::warn!(experiment = %self.name, error = %e, "run_if failed");
                if let Some(report) = &self.hooks.report_errors {
                    report(std::slice::from_ref(&e));
                }
                return Err(ExperimentError::RunIf(e));
            }
        }

        let result = self.conduct().await;
        self.settle(result)
    }

    /// Run every behavior, classify, publish and report
    ///
    /// Ignores the `run_if` gate. The returned result is the one handed to
    /// the publish sink, plus any `publish` error.
    pub async fn conduct(&self) -> ExperimentResult<T> {
        let run_id = RunId::new();
        let span = tracing::info_span!("experiment", experiment = %self.name, %run_id);

        async move {
            tracing::info!(
                candidates = self.registry.candidate_count(),
                concurrency = ?self.config.concurrency,
                "experiment started"
            );

            let errors: Vec<OperationError> = self.before_run().into_iter().collect();

            let classifier = Classifier::new(&self.name, &self.comparator, &self.ignores);
            let executor = Executor::new(self.observer(), &self.registry, &self.config);
            let result = executor
                .execute(&classifier, run_id, errors)
                .await
                .finish(self.hooks.publish.as_ref(), self.hooks.report_errors.as_ref());

            tracing::info!(
                matched = result.is_matched(),
                mismatched = result.mismatched().count(),
                ignored = result.ignored().count(),
                errors = result.errors().len(),
                "experiment finished"
            );
            result
        }
        .instrument(span)
        .await
    }
}

impl<T: fmt::Debug> Experiment<T> {
    /// Render an observation's value with the configured cleaner
    ///
    /// Falls back to `Debug` formatting without a cleaner. `Ok(None)` when the
    /// behavior failed.
    ///
    /// # Errors
    /// Returns the cleaner's error.
    pub fn cleaned_value(&self, observation: &Observation<T>) -> anyhow::Result<Option<String>> {
        observation.value().map(|v| self.clean(v)).transpose()
    }

    /// Serialisable view of `result` using the configured cleaner
    #[must_use]
    pub fn summarize(&self, result: &ExperimentResult<T>) -> ResultSummary {
        result.summarize(|v| self.clean(v))
    }

    fn clean(&self, value: &T) -> anyhow::Result<String> {
        match &self.cleaner {
            Some(cleaner) => cleaner(value),
            None => Ok(format!("{value:?}")),
        }
    }
}

impl<T> fmt::Debug for Experiment<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("name", &self.name)
            .field("registry", &self.registry)
            .field("ignores", &self.ignores.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
