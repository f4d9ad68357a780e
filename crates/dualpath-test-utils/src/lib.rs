//! Testing utilities for the dualpath workspace
//!
//! Behavior fixtures, recording hooks and canned experiments.

#![allow(missing_docs)]

use dualpath_core::{
    Classification, ExperimentBuilder, ExperimentResult, Operation, OperationError,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

pub fn returning<T>(value: T) -> impl Fn() -> anyhow::Result<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    move || Ok(value.clone())
}

pub fn sleeping<T>(ms: u64, value: T) -> impl Fn() -> anyhow::Result<T> + Send + Sync + 'static
where
    T: Clone + Send + Sync + 'static,
{
    move || {
        std::thread::sleep(Duration::from_millis(ms));
        Ok(value.clone())
    }
}

pub fn failing<T: 'static>(message: &'static str) -> impl Fn() -> anyhow::Result<T> + Send + Sync + 'static {
    move || Err(anyhow::anyhow!(message))
}

pub fn panicking<T: 'static>(message: &'static str) -> impl Fn() -> anyhow::Result<T> + Send + Sync + 'static {
    move || panic!("{message}")
}

/// What a publish sink saw for one run
#[derive(Debug, Clone, PartialEq)]
pub struct PublishedRun {
    pub experiment: String,
    pub control: Option<String>,
    pub candidates: Vec<(String, Classification)>,
    pub operations: Vec<Operation>,
}

impl PublishedRun {
    fn capture<T: std::fmt::Debug>(result: &ExperimentResult<T>) -> Self {
        let candidates = result
            .candidates()
            .iter()
            .enumerate()
            .filter_map(|(i, c)| Some((c.name().to_string(), result.classification_at(i)?)))
            .collect();

        Self {
            experiment: result.experiment().to_string(),
            control: result.control().value().map(|v| format!("{v:?}")),
            candidates,
            operations: result.errors().iter().map(|e| e.operation).collect(),
        }
    }

    pub fn names_in(&self, classification: Classification) -> Vec<&str> {
        self.candidates
            .iter()
            .filter(|(_, c)| *c == classification)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

/// Publish sink that records every run
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    runs: Arc<Mutex<Vec<PublishedRun>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sink<T: std::fmt::Debug + 'static>(
        &self,
    ) -> impl Fn(&ExperimentResult<T>) -> anyhow::Result<()> + Send + Sync + 'static {
        let runs = Arc::clone(&self.runs);
        move |result| {
            runs.lock().push(PublishedRun::capture(result));
            Ok(())
        }
    }

    pub fn runs(&self) -> Vec<PublishedRun> {
        self.runs.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.runs.lock().len()
    }

    pub fn last(&self) -> Option<PublishedRun> {
        self.runs.lock().last().cloned()
    }
}

/// Error reporter that records every batch
#[derive(Debug, Clone, Default)]
pub struct RecordingReporter {
    batches: Arc<Mutex<Vec<Vec<OperationError>>>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reporter(&self) -> impl Fn(&[OperationError]) + Send + Sync + 'static {
        let batches = Arc::clone(&self.batches);
        move |errors| batches.lock().push(errors.to_vec())
    }

    pub fn batches(&self) -> Vec<Vec<OperationError>> {
        self.batches.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().len()
    }

    /// `(operation, message)` pairs across every batch
    pub fn messages(&self) -> Vec<(Operation, String)> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .map(|e| (e.operation, e.to_string()))
            .collect()
    }
}

/// Control sleeps 200ms, candidate sleeps 800ms, both return 1
pub fn long_running_experiment(name: &str) -> ExperimentBuilder<i32> {
    ExperimentBuilder::new(name)
        .use_control(sleeping(200, 1))
        .try_candidate(sleeping(800, 1))
}
