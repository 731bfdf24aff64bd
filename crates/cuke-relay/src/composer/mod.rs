//! Test composition: from a parsed document and its pickles to a suite tree
//! the host runner executes, plus the tasks describing that execution.
//!
//! # Module Structure
//!
//! - `compose` - filtering, spec envelopes and the suite tree
//! - `context` - per-spec state shared by composition and execution
//! - `execute` - running tests and cleaning up after each attempt
//! - `suite` - the suite / test tree handed to the runner

mod compose;
mod context;
mod execute;
mod suite;

pub use compose::{compose, should_skip, tag_filter, ComposeOptions, Composition, SpecInput};
pub use context::{CompositionContext, CurrentStep, IncludedPickle, StepRef, TestProperties};
pub use execute::{AttemptOutcome, StepFailure};
pub use suite::{Suite, SuiteChild, Test};

use crate::error::CucumberError;
use crate::registry::HookKeyword;
use crate::tags::TagExpressionError;
use crate::tasks::SinkError;

/// Title of a feature without a name.
pub const UNNAMED_FEATURE: &str = "<unamed feature>";
/// Title of a rule without a name.
pub const UNNAMED_RULE: &str = "<unamed rule>";
/// Title of a scenario without a name.
pub const UNNAMED_SCENARIO: &str = "<unamed scenario>";

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Assertion(#[from] CucumberError),

    #[error(transparent)]
    TagExpression(#[from] TagExpressionError),

    #[error(
        "The `{0}` configuration can only be overridden from a suite-level override (in Cucumber-terms this means on a Feature or Rule)."
    )]
    SuiteOnlyOption(String),

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error("{keyword} hook failed: {message}")]
    RunHook { keyword: HookKeyword, message: String },
}
