//! A small mocha-like host runner.
//!
//! Drives a [`Composition`]: BeforeAll hooks, every test depth first with
//! its retry budget, then AfterAll hooks. The results it returns are what
//! the reconciler inspects at the end of a spec.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::composer::{AttemptOutcome, ComposeError, Composition, Test};
use crate::tasks::EventSink;

/// Marker appended to the display error of tests failed by a before/after
/// all hook.
pub fn all_hook_failure_message(hook: &str, error: &str, suite: &str) -> String {
    format!(
        "{error}\n\nBecause this error occurred during a `{hook}` hook we are skipping the remaining tests in the current suite: `{suite}`"
    )
}

/// Marker appended to the display error of a test whose before/after each
/// hook failed.
pub fn each_hook_failure_message(hook: &str, error: &str) -> String {
    format!(
        "{error}\n\nBecause this error occurred during a `{hook}` hook we are skipping all of the remaining tests."
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    Passed,
    Failed,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub title: String,
    pub state: TestState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_error: Option<String>,
    pub attempts: u32,
}

impl TestResult {
    fn pending(title: &str) -> Self {
        Self {
            title: title.to_string(),
            state: TestState::Pending,
            display_error: None,
            attempts: 0,
        }
    }

    fn failed(title: &str, display_error: String, attempts: u32) -> Self {
        Self {
            title: title.to_string(),
            state: TestState::Failed,
            display_error: Some(display_error),
            attempts,
        }
    }
}

/// Outcome of one spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpecResults {
    /// Set when the host itself failed, e.g. a crashed browser.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub tests: Vec<TestResult>,
}

impl SpecResults {
    pub fn failures(&self) -> usize {
        self.tests
            .iter()
            .filter(|test| test.state == TestState::Failed)
            .count()
    }

    pub fn success(&self) -> bool {
        self.error.is_none() && self.failures() == 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunnerOptions {
    /// Retries of tests that do not configure their own.
    pub retries: u32,
}

/// Run every test of `composition`, a fresh world per attempt.
pub fn run_suite<W: Default>(
    composition: &mut Composition<W>,
    options: &RunnerOptions,
    sink: &mut dyn EventSink,
) -> Result<SpecResults, ComposeError> {
    let Composition { suite, context } = composition;
    let tests: Vec<&Test> = suite.tests();
    let mut results = SpecResults::default();

    match context.before_all(sink) {
        Ok(()) => {}
        Err(ComposeError::RunHook { message, .. }) => {
            warn!(suite = %suite.title, "before all hook failed, skipping the suite");
            let display_error = all_hook_failure_message("before all", &message, &suite.title);
            results.tests = tests
                .iter()
                .map(|test| {
                    if test.pending {
                        TestResult::pending(&test.title)
                    } else {
                        TestResult::failed(&test.title, display_error.clone(), 0)
                    }
                })
                .collect();
            return Ok(results);
        }
        Err(err) => return Err(err),
    }

    let mut remaining = tests.iter();
    while let Some(test) = remaining.next() {
        if test.pending {
            results.tests.push(TestResult::pending(&test.title));
            continue;
        }

        let retries = test.options.retries().unwrap_or(options.retries);
        let mut result = None;
        let mut hook_failed = false;

        for current_retry in 0..=retries {
            let mut world = W::default();
            debug!(test = %test.title, current_retry, "running attempt");

            let outcome = match context.run_test(&mut world, &test.pickle_id, sink) {
                Ok(outcome) => outcome,
                Err(err @ ComposeError::Sink(_)) => return Err(err),
                Err(err) => {
                    let display_error = each_hook_failure_message("before each", &err.to_string());
                    context.after_each(
                        &test.pickle_id,
                        &AttemptOutcome::HookFailure(display_error.clone()),
                        current_retry,
                        retries,
                        sink,
                    )?;
                    result = Some(TestResult::failed(
                        &test.title,
                        display_error,
                        current_retry + 1,
                    ));
                    hook_failed = true;
                    break;
                }
            };

            match context.after_each(&test.pickle_id, &outcome, current_retry, retries, sink) {
                Ok(true) => continue,
                Ok(false) => {
                    result = Some(attempt_result(&test.title, &outcome, current_retry + 1));
                    break;
                }
                Err(err @ ComposeError::Sink(_)) => return Err(err),
                Err(err) => {
                    let display_error = each_hook_failure_message("after each", &err.to_string());
                    result = Some(TestResult::failed(
                        &test.title,
                        display_error,
                        current_retry + 1,
                    ));
                    hook_failed = true;
                    break;
                }
            }
        }

        results.tests.extend(result);

        if hook_failed {
            for test in remaining.by_ref() {
                results.tests.push(TestResult::pending(&test.title));
            }
            return Ok(results);
        }
    }

    match context.after_all(sink) {
        Ok(()) => {}
        Err(ComposeError::RunHook { message, .. }) => {
            let last = tests.last().map_or(suite.title.as_str(), |test| test.title.as_str());
            results.tests.push(TestResult::failed(
                &format!("\"after all\" hook for \"{last}\""),
                all_hook_failure_message("after all", &message, &suite.title),
                1,
            ));
        }
        Err(err) => return Err(err),
    }

    Ok(results)
}

fn attempt_result(title: &str, outcome: &AttemptOutcome, attempts: u32) -> TestResult {
    match outcome {
        AttemptOutcome::Passed => TestResult {
            title: title.to_string(),
            state: TestState::Passed,
            display_error: None,
            attempts,
        },
        AttemptOutcome::Skipped => TestResult {
            attempts,
            ..TestResult::pending(title)
        },
        AttemptOutcome::Failed(failure) => {
            TestResult::failed(title, failure.message().to_string(), attempts)
        }
        AttemptOutcome::HookFailure(message) => {
            TestResult::failed(title, message.clone(), attempts)
        }
    }
}
