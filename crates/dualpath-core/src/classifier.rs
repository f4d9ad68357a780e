//! Candidate classification
//!
//! Each candidate is compared with the control and lands in exactly one of
//! three buckets:
//! - **Matched**: comparator accepted the pair, or both sides failed with the
//!   same error text
//! - **Ignored**: not matched, but an ignore predicate accepted the pair
//! - **Mismatched**: everything else
//!
//! Comparator and predicate failures (errors or panics) never abort a run.
//! They are recorded as operation errors and treated as "not matched" and
//! "not ignored" respectively.

use crate::error::{Operation, OperationError};
use crate::observation::{catch_panic, Observation};
use crate::types::{Comparator, IgnorePredicate};
use serde::{Deserialize, Serialize};

/// Bucket a candidate falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Equivalent to the control
    Matched,
    /// Divergent, suppressed by an ignore predicate
    Ignored,
    /// Divergent and surfaced
    Mismatched,
}

impl Classification {
    /// Lowercase label
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Ignored => "ignored",
            Self::Mismatched => "mismatched",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies the comparator and ignore predicates of one experiment
pub struct Classifier<'a, T> {
    experiment: &'a str,
    comparator: &'a Comparator<T>,
    ignores: &'a [IgnorePredicate<T>],
}

impl<'a, T> Classifier<'a, T> {
    /// Create a classifier
    #[inline]
    #[must_use]
    pub fn new(
        experiment: &'a str,
        comparator: &'a Comparator<T>,
        ignores: &'a [IgnorePredicate<T>],
    ) -> Self {
        Self {
            experiment,
            comparator,
            ignores,
        }
    }

    /// Classify `candidate` against `control`
    ///
    /// Comparator and predicate failures are appended to `errors`. Both may be
    /// recorded for the same candidate.
    pub fn classify(
        &self,
        control: &Observation<T>,
        candidate: &Observation<T>,
        errors: &mut Vec<OperationError>,
    ) -> Classification {
        let matched = self.matching(control, candidate).unwrap_or_else(|e| {
            tracing::warn!(experiment = self.experiment, candidate = candidate.name(), error = %e, "comparator failed");
            errors.push(OperationError::new(Operation::Compare, self.experiment, e));
            false
        });

        let classification = if matched {
            Classification::Matched
        } else {
            let ignored = self.ignoring(control, candidate).unwrap_or_else(|e| {
                tracing::warn!(experiment = self.experiment, candidate = candidate.name(), error = %e, "ignore predicate failed");
                errors.push(OperationError::new(Operation::Ignore, self.experiment, e));
                false
            });

            if ignored {
                Classification::Ignored
            } else {
                Classification::Mismatched
            }
        };

        tracing::debug!(
            experiment = self.experiment,
            candidate = candidate.name(),
            ?classification,
            "classified candidate"
        );
        classification
    }

    /// Decide whether the two observations match
    ///
    /// # Errors
    /// Returns the comparator's error, or a panic converted to an error.
    pub fn matching(
        &self,
        control: &Observation<T>,
        candidate: &Observation<T>,
    ) -> anyhow::Result<bool> {
        match (control.outcome(), candidate.outcome()) {
            (Ok(expected), Ok(actual)) => guarded("comparator", || {
                (self.comparator)(expected, actual)
            }),
            (Err(expected), Err(actual)) => Ok(expected.to_string() == actual.to_string()),
            _ => Ok(false),
        }
    }

    /// Evaluate ignore predicates in registration order, first `true` wins
    ///
    /// # Errors
    /// Returns the first predicate error; later predicates are not evaluated.
    pub fn ignoring(
        &self,
        control: &Observation<T>,
        candidate: &Observation<T>,
    ) -> anyhow::Result<bool> {
        for predicate in self.ignores {
            if guarded("ignore predicate", || {
                predicate(control.value(), candidate.value())
            })? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

fn guarded(what: &str, f: impl FnOnce() -> anyhow::Result<bool>) -> anyhow::Result<bool> {
    catch_panic(f).unwrap_or_else(|message| Err(anyhow::anyhow!("{what} panicked: {message}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observer;
    use crate::types::BehaviorFn;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn observe<T>(
        name: &str,
        f: impl Fn() -> anyhow::Result<T> + Send + Sync + 'static,
    ) -> Observation<T> {
        let behavior: BehaviorFn<T> = Arc::new(f);
        Observer::new(Arc::from("classify")).observe(name, Some(&behavior))
    }

    fn comparator(
        f: impl Fn(&i32, &i32) -> anyhow::Result<bool> + Send + Sync + 'static,
    ) -> Comparator<i32> {
        Arc::new(f)
    }

    fn predicate(
        f: impl Fn(Option<&i32>, Option<&i32>) -> anyhow::Result<bool> + Send + Sync + 'static,
    ) -> IgnorePredicate<i32> {
        Arc::new(f)
    }

    fn equality() -> Comparator<i32> {
        comparator(|a, b| Ok(a == b))
    }

    fn failing(message: &'static str) -> Observation<i32> {
        observe("failing", move || Err(anyhow::anyhow!(message)))
    }

    #[test]
    fn equal_values_match() {
        let cmp = equality();
        let classifier = Classifier::new("classify", &cmp, &[]);
        let mut errors = Vec::new();

        let class = classifier.classify(
            &observe("control", || Ok(1)),
            &observe("candidate", || Ok(1)),
            &mut errors,
        );

        assert_eq!(class, Classification::Matched);
        assert!(errors.is_empty());
    }

    #[test]
    fn different_values_mismatch() {
        let cmp = equality();
        let classifier = Classifier::new("classify", &cmp, &[]);
        let mut errors = Vec::new();

        let class = classifier.classify(
            &observe("control", || Ok(1)),
            &observe("candidate", || Ok(2)),
            &mut errors,
        );

        assert_eq!(class, Classification::Mismatched);
    }

    #[test]
    fn equal_error_text_matches_without_comparator() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cmp = comparator(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        });
        let classifier = Classifier::new("classify", &cmp, &[]);
        let mut errors = Vec::new();

        let class = classifier.classify(&failing("ok"), &failing("ok"), &mut errors);

        assert_eq!(class, Classification::Matched);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn different_error_text_mismatches() {
        let cmp = equality();
        let classifier = Classifier::new("classify", &cmp, &[]);
        let mut errors = Vec::new();

        let class = classifier.classify(&failing("a"), &failing("b"), &mut errors);

        assert_eq!(class, Classification::Mismatched);
    }

    #[test]
    fn one_sided_error_never_matches() {
        let cmp = comparator(|_, _| Ok(true));
        let classifier = Classifier::new("classify", &cmp, &[]);
        let mut errors = Vec::new();

        let control = observe("control", || Ok(1));
        let candidate = failing("try");

        assert_eq!(
            classifier.classify(&control, &candidate, &mut errors),
            Classification::Mismatched
        );
        assert_eq!(
            classifier.classify(&candidate, &control, &mut errors),
            Classification::Mismatched
        );
    }

    #[test]
    fn first_true_predicate_wins() {
        let evaluated = Arc::new(AtomicUsize::new(0));
        let third = Arc::clone(&evaluated);
        let cmp = equality();
        let ignores = vec![
            predicate(|_, _| Ok(false)),
            predicate(|_, _| Ok(true)),
            predicate(move |_, _| {
                third.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }),
        ];
        let classifier = Classifier::new("classify", &cmp, &ignores);
        let mut errors = Vec::new();

        let class = classifier.classify(
            &observe("control", || Ok(1)),
            &observe("candidate", || Ok(2)),
            &mut errors,
        );

        assert_eq!(class, Classification::Ignored);
        assert_eq!(evaluated.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn predicates_skipped_when_matched() {
        let cmp = equality();
        let ignores = vec![predicate(|_, _| panic!("must not run"))];
        let classifier = Classifier::new("classify", &cmp, &ignores);
        let mut errors = Vec::new();

        let class = classifier.classify(
            &observe("control", || Ok(7)),
            &observe("candidate", || Ok(7)),
            &mut errors,
        );

        assert_eq!(class, Classification::Matched);
        assert!(errors.is_empty());
    }

    #[test]
    fn predicate_error_stops_evaluation_and_mismatches() {
        let cmp = equality();
        let ignores = vec![
            predicate(|_, _| Err(anyhow::anyhow!("ignore broke"))),
            predicate(|_, _| Ok(true)),
        ];
        let classifier = Classifier::new("classify", &cmp, &ignores);
        let mut errors = Vec::new();

        let class = classifier.classify(
            &observe("control", || Ok(1)),
            &observe("candidate", || Ok(2)),
            &mut errors,
        );

        assert_eq!(class, Classification::Mismatched);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].operation, Operation::Ignore);
        assert_eq!(errors[0].to_string(), "ignore broke");
    }

    #[test]
    fn compare_and_ignore_errors_compound() {
        let cmp = comparator(|_, _| Err(anyhow::anyhow!("compare broke")));
        let ignores = vec![predicate(|_, _| Err(anyhow::anyhow!("ignore broke")))];
        let classifier = Classifier::new("classify", &cmp, &ignores);
        let mut errors = Vec::new();

        let class = classifier.classify(
            &observe("control", || Ok(1)),
            &observe("candidate", || Ok(1)),
            &mut errors,
        );

        assert_eq!(class, Classification::Mismatched);
        let ops: Vec<_> = errors.iter().map(|e| e.operation).collect();
        assert_eq!(ops, vec![Operation::Compare, Operation::Ignore]);
        assert!(errors.iter().all(|e| e.experiment == "classify"));
    }

    #[test]
    fn comparator_panic_is_downgraded() {
        let cmp = comparator(|_, _| panic!("comparator exploded"));
        let classifier = Classifier::new("classify", &cmp, &[]);
        let mut errors = Vec::new();

        let class = classifier.classify(
            &observe("control", || Ok(1)),
            &observe("candidate", || Ok(1)),
            &mut errors,
        );

        assert_eq!(class, Classification::Mismatched);
        assert_eq!(errors[0].operation, Operation::Compare);
        assert!(errors[0].to_string().contains("comparator exploded"));
    }

    #[test]
    fn predicates_see_missing_values_as_none() {
        let cmp = equality();
        let ignores = vec![predicate(|control, candidate| {
            Ok(control == Some(&1) && candidate.is_none())
        })];
        let classifier = Classifier::new("classify", &cmp, &ignores);
        let mut errors = Vec::new();

        let class = classifier.classify(&observe("control", || Ok(1)), &failing("down"), &mut errors);

        assert_eq!(class, Classification::Ignored);
    }

    proptest! {
        #[test]
        fn equality_classification_agrees_with_values(a in any::<i32>(), b in any::<i32>()) {
            let cmp = equality();
            let classifier = Classifier::new("classify", &cmp, &[]);
            let mut errors = Vec::new();

            let class = classifier.classify(
                &observe("control", move || Ok(a)),
                &observe("candidate", move || Ok(b)),
                &mut errors,
            );

            let expected = if a == b { Classification::Matched } else { Classification::Mismatched };
            prop_assert_eq!(class, expected);
            prop_assert!(errors.is_empty());
        }

        #[test]
        fn error_text_equality_decides_match(a in "[a-z]{1,8}", b in "[a-z]{1,8}") {
            let cmp = comparator(|_, _| Ok(false));
            let classifier = Classifier::new("classify", &cmp, &[]);
            let mut errors = Vec::new();

            let (ea, eb) = (a.clone(), b.clone());
            let control = observe::<i32>("control", move || Err(anyhow::anyhow!(ea.clone())));
            let candidate = observe::<i32>("candidate", move || Err(anyhow::anyhow!(eb.clone())));

            let matched = classifier.classify(&control, &candidate, &mut errors) == Classification::Matched;
            prop_assert_eq!(matched, a == b);
        }

        #[test]
        fn first_accepting_predicate_decides(accepts in proptest::collection::vec(any::<bool>(), 0..6)) {
            let cmp = equality();
            let hits = Arc::new(AtomicUsize::new(0));
            let ignores: Vec<IgnorePredicate<i32>> = accepts
                .iter()
                .map(|&accept| {
                    let hits = Arc::clone(&hits);
                    predicate(move |_, _| {
                        hits.fetch_add(1, Ordering::SeqCst);
                        Ok(accept)
                    })
                })
                .collect();
            let classifier = Classifier::new("classify", &cmp, &ignores);
            let mut errors = Vec::new();

            let class = classifier.classify(
                &observe("control", || Ok(1)),
                &observe("candidate", || Ok(2)),
                &mut errors,
            );

            let first = accepts.iter().position(|&a| a);
            let expected_hits = first.map_or(accepts.len(), |i| i + 1);
            prop_assert_eq!(hits.load(Ordering::SeqCst), expected_hits);
            prop_assert_eq!(class == Classification::Ignored, first.is_some());
        }
    }
}
