//! dualpath - control/candidate experiments
//!
//! Runs a trusted control computation alongside one or more candidate
//! rewrites, records every outcome and reports whether the candidates agree,
//! without letting a candidate's failure or divergence reach the caller:
//! - Sequential or concurrent execution with a shared deadline
//! - Pluggable comparison, ignore rules and value cleaning
//! - Publish sink and operation error reporting per run
//!
//! # Example
//!
//! ```rust,ignore
//! use dualpath_core::ExperimentBuilder;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let experiment = ExperimentBuilder::new("widget-permissions")
//!     .use_control(|| Ok(legacy_permissions()))
//!     .try_candidate(|| Ok(new_permissions()))
//!     .publish(|result| {
//!         println!("mismatched: {}", result.is_mismatched());
//!         Ok(())
//!     })
//!     .build()?;
//!
//! let permissions = experiment.run().await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod classifier;
pub mod config;
pub mod error;
mod executor;
pub mod experiment;
pub mod logging;
pub mod observation;
pub mod registry;
pub mod result;
pub mod types;

pub use classifier::{Classification, Classifier};
pub use config::{Concurrency, ExperimentConfig};
pub use error::{
    BehaviorError, ConfigError, ExperimentError, MismatchError, Operation, OperationError,
    SharedError,
};
pub use experiment::{Experiment, ExperimentBuilder};
pub use observation::{Observation, Observer};
pub use registry::{BehaviorRegistry, CANDIDATE_BEHAVIOR, CONTROL_BEHAVIOR};
pub use result::{ErrorSummary, ExperimentResult, ObservationSummary, ResultSummary};
pub use types::{
    BeforeRunHook, BehaviorFn, Cleaner, Comparator, ErrorReporter, IgnorePredicate, PublishSink,
    RunId, RunIfHook,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for defining and running experiments
    pub use crate::{
        Classification, Concurrency, Experiment, ExperimentBuilder, ExperimentConfig,
        ExperimentError, ExperimentResult, Observation, OperationError,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
