//! Run results and aggregation
//!
//! [`ExperimentResult`] is the per-run aggregate handed to the publish sink.
//! Ignored and mismatched candidates are stored as positions into
//! `candidates`, so the two subsets are disjoint by construction and always
//! reflect registration order.

use crate::classifier::{Classification, Classifier};
use crate::error::{Operation, OperationError};
use crate::observation::{catch_panic, Observation};
use crate::types::{ErrorReporter, PublishSink, RunId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one experiment run
#[derive(Debug)]
pub struct ExperimentResult<T> {
    experiment: Arc<str>,
    run_id: RunId,
    control: Observation<T>,
    candidates: Vec<Observation<T>>,
    ignored: Vec<usize>,
    mismatched: Vec<usize>,
    errors: Vec<OperationError>,
}

impl<T> ExperimentResult<T> {
    /// Experiment name
    #[inline]
    #[must_use]
    pub fn experiment(&self) -> &str {
        &self.experiment
    }

    /// Run identifier
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Control observation
    #[inline]
    #[must_use]
    pub fn control(&self) -> &Observation<T> {
        &self.control
    }

    /// Candidate observations in registration order
    #[inline]
    #[must_use]
    pub fn candidates(&self) -> &[Observation<T>] {
        &self.candidates
    }

    /// Look up a candidate by behavior name
    #[must_use]
    pub fn candidate(&self, name: &str) -> Option<&Observation<T>> {
        self.candidates.iter().find(|c| c.name() == name)
    }

    /// Control followed by every candidate
    pub fn observations(&self) -> impl Iterator<Item = &Observation<T>> {
        std::iter::once(&self.control).chain(self.candidates.iter())
    }

    /// Candidates suppressed by an ignore predicate
    pub fn ignored(&self) -> impl Iterator<Item = &Observation<T>> {
        self.ignored.iter().map(|&i| &self.candidates[i])
    }

    /// Candidates that neither matched nor were ignored
    pub fn mismatched(&self) -> impl Iterator<Item = &Observation<T>> {
        self.mismatched.iter().map(|&i| &self.candidates[i])
    }

    /// Operation errors in the order they occurred
    #[inline]
    #[must_use]
    pub fn errors(&self) -> &[OperationError] {
        &self.errors
    }

    /// Check if any candidate mismatched
    #[inline]
    #[must_use]
    pub fn is_mismatched(&self) -> bool {
        !self.mismatched.is_empty()
    }

    /// Check if any candidate was ignored
    #[inline]
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        !self.ignored.is_empty()
    }

    /// Check if every candidate matched exactly
    #[inline]
    #[must_use]
    pub fn is_matched(&self) -> bool {
        !self.is_mismatched() && !self.is_ignored()
    }

    /// Classification of the candidate at `index`
    #[must_use]
    pub fn classification_at(&self, index: usize) -> Option<Classification> {
        if index >= self.candidates.len() {
            None
        } else if self.mismatched.contains(&index) {
            Some(Classification::Mismatched)
        } else if self.ignored.contains(&index) {
            Some(Classification::Ignored)
        } else {
            Some(Classification::Matched)
        }
    }

    /// Classification of the named candidate
    #[must_use]
    pub fn classification(&self, name: &str) -> Option<Classification> {
        let index = self.candidates.iter().position(|c| c.name() == name)?;
        self.classification_at(index)
    }

    /// Consume into the control observation
    #[must_use]
    pub fn into_control(self) -> Observation<T> {
        self.control
    }

    /// Serialisable view of this run, rendering values with `clean`
    pub fn summarize<F>(&self, clean: F) -> ResultSummary
    where
        F: Fn(&T) -> anyhow::Result<String>,
    {
        let candidates = self
            .candidates
            .iter()
            .enumerate()
            .map(|(i, c)| ObservationSummary::new(c, self.classification_at(i), &clean))
            .collect();

        ResultSummary {
            experiment: self.experiment.to_string(),
            run_id: self.run_id.to_string(),
            matched: self.is_matched(),
            control: ObservationSummary::new(&self.control, None, &clean),
            candidates,
            errors: self
                .errors
                .iter()
                .map(|e| ErrorSummary {
                    operation: e.operation,
                    message: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Assembles an [`ExperimentResult`] as candidates are classified
pub(crate) struct ResultAggregator<T> {
    result: ExperimentResult<T>,
}

impl<T> ResultAggregator<T> {
    /// Start a result from the control observation and errors seen so far
    pub(crate) fn new(
        experiment: Arc<str>,
        run_id: RunId,
        control: Observation<T>,
        errors: Vec<OperationError>,
    ) -> Self {
        Self {
            result: ExperimentResult {
                experiment,
                run_id,
                control,
                candidates: Vec::new(),
                ignored: Vec::new(),
                mismatched: Vec::new(),
                errors,
            },
        }
    }

    /// Classify `candidate` against the control and append it
    pub(crate) fn classify(&mut self, classifier: &Classifier<'_, T>, candidate: Observation<T>) {
        let result = &mut self.result;
        let classification = classifier.classify(&result.control, &candidate, &mut result.errors);

        let index = result.candidates.len();
        match classification {
            Classification::Matched => {}
            Classification::Ignored => result.ignored.push(index),
            Classification::Mismatched => result.mismatched.push(index),
        }
        result.candidates.push(candidate);
    }

    /// Publish the finished result and report accumulated errors
    ///
    /// The publish sink runs exactly once; its failure is recorded as a
    /// `publish` operation error. The reporter runs only if errors exist.
    pub(crate) fn finish(
        self,
        publish: Option<&PublishSink<T>>,
        report: Option<&ErrorReporter>,
    ) -> ExperimentResult<T> {
        let mut result = self.result;

        if let Some(publish) = publish {
            let outcome = catch_panic(|| publish(&result)).unwrap_or_else(|message| {
                Err(anyhow::anyhow!("publish sink panicked: {message}"))
            });
            if let Err(e) = outcome {
                tracing::warn!(experiment = %result.experiment, error = %e, "publish failed");
                result
                    .errors
                    .push(OperationError::new(Operation::Publish, &*result.experiment, e));
            }
        }

        if !result.errors.is_empty() {
            tracing::warn!(
                experiment = %result.experiment,
                run_id = %result.run_id,
                errors = result.errors.len(),
                "experiment run recorded operation errors"
            );
            if let Some(report) = report {
                if let Err(message) = catch_panic(|| report(&result.errors)) {
                    tracing::error!(experiment = %result.experiment, %message, "error reporter panicked");
                }
            }
        }

        result
    }
}

/// Serialisable view of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSummary {
    /// Experiment name
    pub experiment: String,
    /// Run identifier
    pub run_id: String,
    /// Every candidate matched exactly
    pub matched: bool,
    /// Control observation
    pub control: ObservationSummary,
    /// Candidates in registration order
    pub candidates: Vec<ObservationSummary>,
    /// Operation errors
    pub errors: Vec<ErrorSummary>,
}

/// Serialisable view of one observation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationSummary {
    /// Behavior name
    pub name: String,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// Runtime in milliseconds
    pub runtime_ms: f64,
    /// Bucket, absent for the control
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    /// Cleaned value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Behavior error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cleaner failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clean_error: Option<String>,
}

impl ObservationSummary {
    fn new<T, F>(obs: &Observation<T>, classification: Option<Classification>, clean: &F) -> Self
    where
        F: Fn(&T) -> anyhow::Result<String>,
    {
        let (value, clean_error) = match obs.value().map(clean) {
            Some(Ok(v)) => (Some(v), None),
            Some(Err(e)) => (None, Some(e.to_string())),
            None => (None, None),
        };

        Self {
            name: obs.name().to_string(),
            started_at: obs.started_at(),
            runtime_ms: obs.runtime().as_secs_f64() * 1000.0,
            classification,
            value,
            error: obs.error().map(ToString::to_string),
            clean_error,
        }
    }
}

/// Serialisable view of an operation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorSummary {
    /// Failed step
    pub operation: Operation,
    /// Error message
    pub message: String,
}
