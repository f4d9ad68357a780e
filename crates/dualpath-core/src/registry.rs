//! Behavior registry
//!
//! Provides [`BehaviorRegistry`], an insertion-ordered map from behavior name
//! to computation. Iteration order is registration order, which fixes the
//! order of candidates in every result.

use crate::error::ConfigError;
use crate::types::BehaviorFn;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Name under which the control behavior is registered by default
pub const CONTROL_BEHAVIOR: &str = "control";

/// Name used for a single unnamed candidate
pub const CANDIDATE_BEHAVIOR: &str = "candidate";

/// Named behaviors of one experiment
///
/// Exactly one entry is the control, every other entry is a candidate.
pub struct BehaviorRegistry<T> {
    control: String,
    behaviors: IndexMap<String, BehaviorFn<T>>,
}

impl<T> BehaviorRegistry<T> {
    /// Create empty registry with the default control name
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::with_control_name(CONTROL_BEHAVIOR)
    }

    /// Create empty registry with a custom control name
    #[must_use]
    pub fn with_control_name(control: impl Into<String>) -> Self {
        Self {
            control: control.into(),
            behaviors: IndexMap::new(),
        }
    }

    /// Register a behavior
    ///
    /// # Errors
    /// - `ConfigError::DuplicateBehavior` if the name is taken
    pub fn register<F>(&mut self, name: impl Into<String>, behavior: F) -> Result<(), ConfigError>
    where
        F: Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.behaviors.contains_key(&name) {
            return Err(ConfigError::DuplicateBehavior(name));
        }
        self.behaviors.insert(name, Arc::new(behavior));
        Ok(())
    }

    /// Name of the control behavior
    #[inline]
    #[must_use]
    pub fn control_name(&self) -> &str {
        &self.control
    }

    /// The control behavior, if registered
    #[inline]
    #[must_use]
    pub fn control(&self) -> Option<&BehaviorFn<T>> {
        self.behaviors.get(&self.control)
    }

    /// Look up a behavior by name
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BehaviorFn<T>> {
        self.behaviors.get(name)
    }

    /// Check if a behavior is registered
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.behaviors.contains_key(name)
    }

    /// Check if `name` is the control
    #[inline]
    #[must_use]
    pub fn is_control(&self, name: &str) -> bool {
        self.control == name
    }

    /// All behaviors in registration order, control included
    pub fn iter(&self) -> impl Iterator<Item = (&str, &BehaviorFn<T>)> {
        self.behaviors.iter().map(|(name, b)| (name.as_str(), b))
    }

    /// Candidates in registration order
    pub fn candidates(&self) -> impl Iterator<Item = (&str, &BehaviorFn<T>)> {
        self.iter().filter(move |(name, _)| !self.is_control(name))
    }

    /// Candidate names in registration order
    #[must_use]
    pub fn candidate_names(&self) -> Vec<&str> {
        self.candidates().map(|(name, _)| name).collect()
    }

    /// Number of candidates
    #[inline]
    #[must_use]
    pub fn candidate_count(&self) -> usize {
        self.len() - usize::from(self.control().is_some())
    }

    /// Number of registered behaviors
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Ensure the control is registered
    ///
    /// # Errors
    /// - `ConfigError::MissingControl` if no behavior carries the control name
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.control().is_none() {
            return Err(ConfigError::MissingControl(self.control.clone()));
        }
        Ok(())
    }
}

impl<T> Default for BehaviorRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BehaviorRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("control", &self.control)
            .field("behaviors", &self.behaviors.keys().collect::<Vec<_>>())
            .finish()
    }
}
