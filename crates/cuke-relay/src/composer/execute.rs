//! Running composed tests and reporting what happened.
//!
//! [`CompositionContext::run_test`] runs one attempt and leaves the failing
//! step (if any) open; [`CompositionContext::after_each`] closes it, reports
//! every step that never ran and decides whether the test is retried.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::attachments::Attachments;
use crate::error::{assert_that, Ensure};
use crate::messages::{
    Duration, Exception, Pickle, PickleStep, Suggestion, TestCaseFinished, TestCaseStarted,
    TestRunHookFinished, TestRunHookStarted, TestStepFinished, TestStepResult,
    TestStepResultStatus, TestStepStarted, Timestamp,
};
use crate::registry::{
    CaseHookCall, DataTable, HandlerResult, HookKeyword, RunHookCall, StepArgument, StepCall,
    StepHookCall, StepMatchError, StepOutcome,
};
use crate::snippets::{missing_step_definition_message, suggestion_snippets};
use crate::tasks::{EventSink, SinkError, Task};
use crate::time::duration;

use super::context::{CompositionContext, CurrentStep, StepRef, TestProperties};
use super::ComposeError;

/// Why a step failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepFailure {
    /// No step definition matched. `message` is the remediation text.
    Undefined { message: String },
    Ambiguous { message: String },
    /// The handler returned an error or panicked.
    Error { error_type: String, message: String },
}

impl StepFailure {
    pub fn message(&self) -> &str {
        match self {
            StepFailure::Undefined { message }
            | StepFailure::Ambiguous { message }
            | StepFailure::Error { message, .. } => message,
        }
    }

    fn from_error(error: &anyhow::Error) -> Self {
        StepFailure::Error {
            error_type: "Error".to_string(),
            message: format!("{error:#}"),
        }
    }

    fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "handler panicked".to_string()
        };
        StepFailure::Error {
            error_type: "Panic".to_string(),
            message,
        }
    }
}

/// How one attempt of a test ended, as seen by the runner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Passed,
    /// A step asked to skip the rest of the test.
    Skipped,
    Failed(StepFailure),
    /// The test never ran because a runner hook failed. `message` carries
    /// the hook-failure marker.
    HookFailure(String),
}

enum StepRun {
    Status(TestStepResultStatus),
    Failed(StepFailure),
}

fn status_of(outcome: StepOutcome) -> TestStepResultStatus {
    match outcome {
        StepOutcome::Passed => TestStepResultStatus::Passed,
        StepOutcome::Pending => TestStepResultStatus::Pending,
        StepOutcome::Skipped => TestStepResultStatus::Skipped,
    }
}

/// Run a handler, turning errors and panics into a [`StepFailure`].
fn invoke<F>(handler: F) -> Result<StepOutcome, StepFailure>
where
    F: FnOnce() -> HandlerResult,
{
    match panic::catch_unwind(AssertUnwindSafe(handler)) {
        Ok(Ok(outcome)) => Ok(outcome),
        Ok(Err(error)) => Err(StepFailure::from_error(&error)),
        Err(payload) => Err(StepFailure::from_panic(payload.as_ref())),
    }
}

fn send_attachments(sink: &mut dyn EventSink, attachments: Attachments) -> Result<(), SinkError> {
    for attachment in attachments.into_vec() {
        sink.send(Task::CreateStringAttachment(attachment))?;
    }
    Ok(())
}

fn step_argument(pickle_step: &PickleStep) -> Option<StepArgument> {
    let argument = pickle_step.argument.as_ref()?;
    if let Some(table) = &argument.data_table {
        Some(StepArgument::DataTable(DataTable::from(table)))
    } else {
        argument
            .doc_string
            .as_ref()
            .map(|doc_string| StepArgument::DocString(doc_string.content.clone()))
    }
}

const ZERO: Duration = Duration {
    seconds: 0,
    nanos: 0,
};

impl<W> CompositionContext<W> {
    /// Send the spec envelopes, run BeforeAll hooks and report pickles at
    /// the head of the queue that will be skipped.
    pub fn before_all(&mut self, sink: &mut dyn EventSink) -> Result<(), ComposeError> {
        sink.send(Task::SpecEnvelopes(self.spec_envelopes.clone()))?;
        self.run_hooks(HookKeyword::BeforeAll, sink)?;
        self.emit_skipped_head(sink)
    }

    pub fn after_all(&mut self, sink: &mut dyn EventSink) -> Result<(), ComposeError> {
        self.run_hooks(HookKeyword::AfterAll, sink)
    }

    /// Run one attempt of the test backed by `pickle_id`.
    ///
    /// Errors are reserved for tracking problems; a failing step is an
    /// [`AttemptOutcome::Failed`].
    pub fn run_test(
        &mut self,
        world: &mut W,
        pickle_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<AttemptOutcome, ComposeError> {
        let head = self.included.front().map(|included| included.pickle_id.as_str());
        assert_that(head == Some(pickle_id), "Included pickle stack is unsynchronized")?;

        let pickle = self.pickle(pickle_id)?;
        let mut properties = self.take_properties(pickle_id)?;
        let outcome = self.run_attempt(world, &pickle, &mut properties, sink);
        self.tests.insert(pickle_id.to_string(), properties);
        outcome
    }

    fn run_attempt(
        &mut self,
        world: &mut W,
        pickle: &Pickle,
        properties: &mut TestProperties,
        sink: &mut dyn EventSink,
    ) -> Result<AttemptOutcome, ComposeError> {
        let attempt = properties.attempt;
        properties.attempt += 1;
        properties.current_step = None;

        debug!(pickle = %pickle.id, attempt, "running test");

        sink.send(Task::TestCaseStarted(TestCaseStarted {
            attempt,
            id: properties.test_case_started_id.clone(),
            test_case_id: pickle.id.clone(),
            worker_id: None,
            timestamp: self.now(),
        }))?;

        while let Some(step) = properties.remaining_steps.front().cloned() {
            let test_step_id = self.test_step_id(&pickle.id, &step)?;
            let started = self.now();
            properties.current_step = Some(CurrentStep {
                step: step.clone(),
                started,
            });
            sink.send(Task::TestStepStarted(TestStepStarted {
                test_case_started_id: properties.test_case_started_id.clone(),
                test_step_id: test_step_id.clone(),
                timestamp: started,
            }))?;

            let run = match &step {
                StepRef::Hook(hook_id) => {
                    self.run_case_hook(
                        world,
                        pickle,
                        hook_id,
                        &properties.test_case_started_id,
                        sink,
                    )?
                }
                StepRef::PickleStep(pickle_step_id) => self.run_pickle_step(
                    world,
                    pickle,
                    pickle_step_id,
                    &properties.test_case_started_id,
                    &test_step_id,
                    sink,
                )?,
            };

            match run {
                StepRun::Failed(failure) => return Ok(AttemptOutcome::Failed(failure)),
                StepRun::Status(status)
                    if status == TestStepResultStatus::Pending
                        || status == TestStepResultStatus::Skipped =>
                {
                    let end = self.now();
                    self.finish_step(
                        sink,
                        properties,
                        test_step_id,
                        TestStepResult::new(status, duration(started, end)),
                        end,
                    )?;
                    properties.remaining_steps.pop_front();
                    self.report_remaining(sink, pickle, properties, TestStepResultStatus::Skipped)?;
                    return Ok(AttemptOutcome::Skipped);
                }
                StepRun::Status(_) => {
                    let end = self.now();
                    self.finish_step(
                        sink,
                        properties,
                        test_step_id,
                        TestStepResult::new(TestStepResultStatus::Passed, duration(started, end)),
                        end,
                    )?;
                    properties.remaining_steps.pop_front();
                }
            }
        }

        Ok(AttemptOutcome::Passed)
    }

    fn run_case_hook(
        &mut self,
        world: &mut W,
        pickle: &Pickle,
        hook_id: &str,
        test_case_started_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<StepRun, ComposeError> {
        if self.dry_run {
            return Ok(StepRun::Status(TestStepResultStatus::Passed));
        }

        let registry = Arc::clone(&self.registry);
        let document = Arc::clone(&self.document);
        let hook = registry
            .case_hooks()
            .iter()
            .find(|hook| hook.id() == hook_id)
            .ensure_with(|| format!("Expected to find a hook with id = {hook_id}"))?;

        let mut call = CaseHookCall::new(pickle, &document, test_case_started_id);
        let result = invoke(|| hook.run(world, &mut call));
        send_attachments(sink, call.into_attachments())?;

        Ok(match result {
            Ok(outcome) => StepRun::Status(status_of(outcome)),
            Err(failure) => StepRun::Failed(failure),
        })
    }

    fn run_pickle_step(
        &mut self,
        world: &mut W,
        pickle: &Pickle,
        pickle_step_id: &str,
        test_case_started_id: &str,
        test_step_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<StepRun, ComposeError> {
        let registry = Arc::clone(&self.registry);
        let document = Arc::clone(&self.document);
        let pickle_step = pickle
            .steps
            .iter()
            .find(|step| step.id == pickle_step_id)
            .ensure_with(|| format!("Expected to find a pickle step with id = {pickle_step_id}"))?;
        let tags = pickle.tag_names();
        let mut statuses = Vec::new();

        for hook in registry.resolve_before_step_hooks(&tags) {
            if self.dry_run {
                continue;
            }
            let mut call = StepHookCall::new(
                pickle,
                pickle_step,
                &document,
                test_case_started_id,
                test_step_id,
            );
            let result = invoke(|| hook.run(world, &mut call));
            send_attachments(sink, call.into_attachments())?;
            match result {
                Ok(outcome) => statuses.push(status_of(outcome)),
                Err(failure) => return Ok(StepRun::Failed(failure)),
            }
        }

        let step_match = match registry.resolve_step_definition(&pickle_step.text) {
            Ok(step_match) => step_match,
            Err(StepMatchError::Missing { .. }) => {
                return Ok(StepRun::Failed(StepFailure::Undefined {
                    message: missing_step_definition_message(
                        pickle_step,
                        &self.hints,
                        registry.parameter_types(),
                        false,
                    ),
                }));
            }
            Err(error @ StepMatchError::Ambiguous { .. }) => {
                return Ok(StepRun::Failed(StepFailure::Ambiguous {
                    message: error.to_string(),
                }));
            }
        };

        if self.dry_run {
            statuses.push(TestStepResultStatus::Passed);
        } else {
            let args = match step_match
                .arguments
                .iter()
                .map(|argument| argument.value())
                .collect::<anyhow::Result<Vec<_>>>()
            {
                Ok(args) => args,
                Err(error) => return Ok(StepRun::Failed(StepFailure::from_error(&error))),
            };
            let mut call =
                StepCall::new(pickle_step.text.clone(), args, step_argument(pickle_step));
            let result = invoke(|| step_match.definition.run(world, &mut call));
            send_attachments(sink, call.into_attachments())?;
            match result {
                Ok(outcome) => statuses.push(status_of(outcome)),
                Err(failure) => return Ok(StepRun::Failed(failure)),
            }
        }

        for hook in registry.resolve_after_step_hooks(&tags) {
            if self.dry_run {
                continue;
            }
            let mut call = StepHookCall::new(
                pickle,
                pickle_step,
                &document,
                test_case_started_id,
                test_step_id,
            );
            let result = invoke(|| hook.run(world, &mut call));
            send_attachments(sink, call.into_attachments())?;
            match result {
                Ok(outcome) => statuses.push(status_of(outcome)),
                Err(failure) => return Ok(StepRun::Failed(failure)),
            }
        }

        Ok(StepRun::Status(TestStepResultStatus::worst_of(statuses)))
    }

    fn finish_step(
        &self,
        sink: &mut dyn EventSink,
        properties: &mut TestProperties,
        test_step_id: String,
        result: TestStepResult,
        timestamp: Timestamp,
    ) -> Result<(), SinkError> {
        properties.current_step = None;
        sink.send(Task::TestStepFinished(TestStepFinished {
            test_case_started_id: properties.test_case_started_id.clone(),
            test_step_id,
            test_step_result: result,
            timestamp,
        }))
    }

    /// Start and finish every remaining step with `status` and zero
    /// duration, emptying the queue.
    fn report_remaining(
        &self,
        sink: &mut dyn EventSink,
        pickle: &Pickle,
        properties: &mut TestProperties,
        status: TestStepResultStatus,
    ) -> Result<(), ComposeError> {
        while let Some(step) = properties.remaining_steps.pop_front() {
            let test_step_id = self.test_step_id(&pickle.id, &step)?;
            let timestamp = self.now();
            sink.send(Task::TestStepStarted(TestStepStarted {
                test_case_started_id: properties.test_case_started_id.clone(),
                test_step_id: test_step_id.clone(),
                timestamp,
            }))?;
            self.finish_step(
                sink,
                properties,
                test_step_id,
                TestStepResult::new(status, ZERO),
                timestamp,
            )?;
        }
        Ok(())
    }

    /// Clean up after an attempt. Returns whether the test will be retried.
    ///
    /// `current_retry` counts from zero; `retries` is the test's budget.
    pub fn after_each(
        &mut self,
        pickle_id: &str,
        outcome: &AttemptOutcome,
        current_retry: u32,
        retries: u32,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ComposeError> {
        if let AttemptOutcome::HookFailure(_) = outcome {
            return Ok(false);
        }

        let pickle = self.pickle(pickle_id)?;
        let mut properties = self.take_properties(pickle_id)?;
        let finished =
            self.finish_attempt(&pickle, &mut properties, outcome, current_retry, retries, sink);
        self.tests.insert(pickle_id.to_string(), properties);

        let will_be_retried = match finished {
            Ok(will_be_retried) => will_be_retried,
            Err(ComposeError::Assertion(error)) if self.is_tracking && self.soft_errors => {
                warn!(error = %error, "lost track of the test, reporting a tracking error");
                sink.send(Task::FrontendTrackingError(error.to_string()))?;
                self.included.retain(|included| included.pickle_id != pickle_id);
                return Ok(false);
            }
            Err(error) => return Err(error),
        };

        if !will_be_retried {
            let head = self.included.pop_front();
            assert_that(
                head.as_ref().map(|included| included.pickle_id.as_str()) == Some(pickle_id),
                "Included pickle stack is unsynchronized",
            )?;
            self.emit_skipped_head(sink)?;
        }

        Ok(will_be_retried)
    }

    fn finish_attempt(
        &mut self,
        pickle: &Pickle,
        properties: &mut TestProperties,
        outcome: &AttemptOutcome,
        current_retry: u32,
        retries: u32,
        sink: &mut dyn EventSink,
    ) -> Result<bool, ComposeError> {
        let end = self.now();
        let mut retries_enabled = true;

        if !properties.remaining_steps.is_empty() {
            match outcome {
                AttemptOutcome::Failed(failure) => {
                    let failed_step = properties
                        .remaining_steps
                        .pop_front()
                        .ensure("Expected there to be a remaining step")?;
                    let test_step_id = self.test_step_id(&pickle.id, &failed_step)?;

                    let result = match failure {
                        StepFailure::Undefined { .. } => {
                            retries_enabled = false;
                            if let StepRef::PickleStep(pickle_step_id) = &failed_step {
                                self.suggest(pickle, pickle_step_id, sink)?;
                            }
                            TestStepResult::new(TestStepResultStatus::Undefined, ZERO)
                        }
                        StepFailure::Ambiguous { message } => TestStepResult {
                            duration: ZERO,
                            message: Some(message.clone()),
                            status: TestStepResultStatus::Ambiguous,
                            exception: None,
                        },
                        StepFailure::Error {
                            error_type,
                            message,
                        } => {
                            let started = properties
                                .current_step
                                .as_ref()
                                .map(|current| current.started)
                                .ensure("Expected there to be a timestamp for current step")?;
                            TestStepResult {
                                duration: duration(started, end),
                                message: Some(message.clone()),
                                status: TestStepResultStatus::Failed,
                                exception: Some(Exception {
                                    exception_type: error_type.clone(),
                                    message: Some(message.clone()),
                                    stack_trace: None,
                                }),
                            }
                        }
                    };

                    self.finish_step(sink, properties, test_step_id, result, end)?;
                    self.report_remaining(sink, pickle, properties, TestStepResultStatus::Skipped)?;
                }
                AttemptOutcome::Skipped => {
                    if let Some(current) = properties.current_step.clone() {
                        let skipped_step = properties
                            .remaining_steps
                            .pop_front()
                            .ensure("Expected there to be a remaining step")?;
                        let test_step_id = self.test_step_id(&pickle.id, &skipped_step)?;
                        self.finish_step(
                            sink,
                            properties,
                            test_step_id,
                            TestStepResult::new(
                                TestStepResultStatus::Skipped,
                                duration(current.started, end),
                            ),
                            end,
                        )?;
                    }
                    self.report_remaining(sink, pickle, properties, TestStepResultStatus::Skipped)?;
                }
                AttemptOutcome::Passed | AttemptOutcome::HookFailure(_) => {
                    self.report_remaining(sink, pickle, properties, TestStepResultStatus::Unknown)?;
                }
            }
        }

        let failed = matches!(outcome, AttemptOutcome::Failed(_));
        let will_be_retried = failed && retries_enabled && current_retry < retries;

        sink.send(Task::TestCaseFinished(TestCaseFinished {
            test_case_started_id: properties.test_case_started_id.clone(),
            timestamp: end,
            will_be_retried,
        }))?;

        if will_be_retried {
            properties.test_case_started_id = self.new_id();
            properties.remaining_steps = properties.all_steps.iter().cloned().collect();
            properties.current_step = None;
        }

        Ok(will_be_retried)
    }

    fn suggest(
        &mut self,
        pickle: &Pickle,
        pickle_step_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<(), ComposeError> {
        let pickle_step = pickle
            .steps
            .iter()
            .find(|step| step.id == pickle_step_id)
            .ensure_with(|| format!("Expected to find a pickle step with id = {pickle_step_id}"))?;
        let snippets = suggestion_snippets(pickle_step, self.registry.parameter_types());
        let id = self.new_id();
        sink.send(Task::Suggestion(Suggestion {
            id,
            pickle_step_id: pickle_step_id.to_string(),
            snippets,
        }))?;
        Ok(())
    }

    fn emit_skipped_head(&mut self, sink: &mut dyn EventSink) -> Result<(), ComposeError> {
        while self
            .included
            .front()
            .is_some_and(|included| included.will_be_skipped)
        {
            if let Some(included) = self.included.pop_front() {
                self.emit_skipped_pickle(&included.pickle_id, sink)?;
            }
        }
        Ok(())
    }

    /// Report a filtered-out pickle as a test case whose steps were all
    /// skipped.
    fn emit_skipped_pickle(
        &mut self,
        pickle_id: &str,
        sink: &mut dyn EventSink,
    ) -> Result<(), ComposeError> {
        let steps = self
            .case_steps
            .get(pickle_id)
            .cloned()
            .ensure_with(|| format!("Expected to find case steps for pickle = {pickle_id}"))?;
        let test_case_started_id = self.new_id();
        let timestamp = self.now();

        debug!(pickle = %pickle_id, "reporting skipped pickle");

        sink.send(Task::TestCaseStarted(TestCaseStarted {
            attempt: 0,
            id: test_case_started_id.clone(),
            test_case_id: pickle_id.to_string(),
            worker_id: None,
            timestamp,
        }))?;

        for step in &steps {
            let test_step_id = self.test_step_id(pickle_id, step)?;
            sink.send(Task::TestStepStarted(TestStepStarted {
                test_case_started_id: test_case_started_id.clone(),
                test_step_id: test_step_id.clone(),
                timestamp,
            }))?;
            sink.send(Task::TestStepFinished(TestStepFinished {
                test_case_started_id: test_case_started_id.clone(),
                test_step_id,
                test_step_result: TestStepResult::new(TestStepResultStatus::Skipped, ZERO),
                timestamp,
            }))?;
        }

        sink.send(Task::TestCaseFinished(TestCaseFinished {
            test_case_started_id,
            timestamp,
            will_be_retried: false,
        }))?;
        Ok(())
    }

    fn run_hooks(
        &mut self,
        keyword: HookKeyword,
        sink: &mut dyn EventSink,
    ) -> Result<(), ComposeError> {
        let registry = Arc::clone(&self.registry);
        let hooks = match keyword {
            HookKeyword::BeforeAll => registry.resolve_before_all_hooks(),
            _ => registry.resolve_after_all_hooks(),
        };

        for hook in hooks {
            let id = self.new_id();
            let started = self.now();
            sink.send(Task::TestRunHookStarted(TestRunHookStarted {
                id: id.clone(),
                test_run_started_id: self.test_run_started_id.clone(),
                hook_id: hook.id().to_string(),
                timestamp: started,
            }))?;

            let outcome = if self.dry_run {
                Ok(StepOutcome::Passed)
            } else {
                let mut call = RunHookCall::new();
                let outcome = invoke(|| hook.run(&mut call));
                send_attachments(sink, call.into_attachments())?;
                outcome
            };

            let end = self.now();
            let result = match &outcome {
                Ok(outcome) => TestStepResult::new(status_of(*outcome), duration(started, end)),
                Err(failure) => TestStepResult {
                    duration: duration(started, end),
                    message: Some(failure.message().to_string()),
                    status: TestStepResultStatus::Failed,
                    exception: match failure {
                        StepFailure::Error { error_type, message } => Some(Exception {
                            exception_type: error_type.clone(),
                            message: Some(message.clone()),
                            stack_trace: None,
                        }),
                        _ => None,
                    },
                },
            };

            sink.send(Task::TestRunHookFinished(TestRunHookFinished {
                test_run_hook_started_id: id,
                result,
                timestamp: end,
            }))?;

            if let Err(failure) = outcome {
                return Err(ComposeError::RunHook {
                    keyword,
                    message: failure.message().to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::Attach;
    use crate::composer::{ComposeOptions, Composition};
    use crate::registry::{HookOptions, Registry};
    use crate::tasks::RecordingSink;
    use crate::testing::{self, document, scenario, World};

    fn two_steps() -> crate::messages::GherkinDocument {
        document(
            "feature",
            &[],
            vec![scenario(
                "s1",
                "first",
                &[],
                &[("st1", "a failing step"), ("st2", "a passing step")],
            )],
        )
    }

    fn steps_registry() -> Arc<Registry<World>> {
        testing::registry(|registry| {
            registry.given("a passing step", |world, _| {
                world.log.push("passing".to_string());
                Ok(StepOutcome::Passed)
            });
            registry.given("a failing step", |world, _| {
                world.log.push("failing".to_string());
                anyhow::bail!("it broke")
            });
            registry.given("a pending step", |_, _| Ok(StepOutcome::Pending));
            registry.given("a panicking step", |_, _| panic!("kaboom"));
        })
    }

    fn first_pickle(composition: &Composition<World>) -> String {
        composition.suite.tests()[0].pickle_id.clone()
    }

    fn step_results(sink: &RecordingSink) -> Vec<TestStepResult> {
        sink.tasks
            .iter()
            .filter_map(|task| match task {
                Task::TestStepFinished(finished) => Some(finished.test_step_result.clone()),
                _ => None,
            })
            .collect()
    }

    fn statuses(sink: &RecordingSink) -> Vec<TestStepResultStatus> {
        step_results(sink).into_iter().map(|result| result.status).collect()
    }

    fn case_finished(sink: &RecordingSink) -> Vec<bool> {
        sink.tasks
            .iter()
            .filter_map(|task| match task {
                Task::TestCaseFinished(finished) => Some(finished.will_be_retried),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_failing_first_step_skips_the_rest() {
        let mut composition =
            testing::composed(steps_registry(), two_steps(), ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut sink = RecordingSink::new();
        let mut world = World::default();

        composition.context.before_all(&mut sink).unwrap();
        let outcome = composition.context.run_test(&mut world, &pickle_id, &mut sink).unwrap();
        assert!(matches!(outcome, AttemptOutcome::Failed(StepFailure::Error { .. })));
        assert_eq!(outcome_message(&outcome), "it broke");

        let retried = composition
            .context
            .after_each(&pickle_id, &outcome, 0, 0, &mut sink)
            .unwrap();
        assert!(!retried);

        assert_eq!(
            sink.names(),
            vec![
                "specEnvelopes",
                "testCaseStarted",
                "testStepStarted",
                "testStepFinished",
                "testStepStarted",
                "testStepFinished",
                "testCaseFinished",
            ]
        );
        let results = step_results(&sink);
        assert_eq!(results[0].status, TestStepResultStatus::Failed);
        assert_eq!(results[0].exception.as_ref().unwrap().exception_type, "Error");
        assert!(results[0].duration > ZERO);
        assert_eq!(results[1].status, TestStepResultStatus::Skipped);
        assert_eq!(results[1].duration, ZERO);
        assert_eq!(world.log, vec!["failing"]);
        assert_eq!(composition.context.included().count(), 0);
    }

    fn outcome_message(outcome: &AttemptOutcome) -> &str {
        match outcome {
            AttemptOutcome::Failed(failure) => failure.message(),
            _ => "",
        }
    }

    #[test]
    fn test_passing_test_reports_every_step() {
        let doc = document(
            "feature",
            &[],
            vec![scenario(
                "s1",
                "first",
                &[],
                &[("st1", "a passing step"), ("st2", "a passing step")],
            )],
        );
        let mut composition = testing::composed(steps_registry(), doc, ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut sink = RecordingSink::new();

        let outcome = composition
            .context
            .run_test(&mut World::default(), &pickle_id, &mut sink)
            .unwrap();
        assert_eq!(outcome, AttemptOutcome::Passed);
        composition.context.after_each(&pickle_id, &outcome, 0, 0, &mut sink).unwrap();

        assert_eq!(statuses(&sink), vec![TestStepResultStatus::Passed; 2]);
        assert_eq!(case_finished(&sink), vec![false]);
    }

    #[test]
    fn test_retry_restarts_with_a_new_case_started_id() {
        let mut composition =
            testing::composed(steps_registry(), two_steps(), ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut sink = RecordingSink::new();
        let mut world = World::default();

        let first_id = composition
            .context
            .properties(&pickle_id)
            .unwrap()
            .test_case_started_id
            .clone();
        let outcome = composition.context.run_test(&mut world, &pickle_id, &mut sink).unwrap();
        assert!(composition.context.after_each(&pickle_id, &outcome, 0, 1, &mut sink).unwrap());

        let properties = composition.context.properties(&pickle_id).unwrap();
        assert_ne!(properties.test_case_started_id, first_id);
        assert_eq!(properties.remaining_steps.len(), 2);
        assert_eq!(composition.context.included().count(), 1);

        let outcome = composition.context.run_test(&mut world, &pickle_id, &mut sink).unwrap();
        assert!(!composition.context.after_each(&pickle_id, &outcome, 1, 1, &mut sink).unwrap());

        let attempts: Vec<u32> = sink
            .tasks
            .iter()
            .filter_map(|task| match task {
                Task::TestCaseStarted(started) => Some(started.attempt),
                _ => None,
            })
            .collect();
        assert_eq!(attempts, vec![0, 1]);
        assert_eq!(case_finished(&sink), vec![true, false]);
    }

    #[test]
    fn test_undefined_step_suggests_and_disables_retries() {
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "first", &[], &[("st1", "I eat 5 cukes")])],
        );
        let mut composition = testing::composed(steps_registry(), doc, ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut sink = RecordingSink::new();

        let outcome = composition
            .context
            .run_test(&mut World::default(), &pickle_id, &mut sink)
            .unwrap();
        match &outcome {
            AttemptOutcome::Failed(StepFailure::Undefined { message }) => {
                assert!(message.contains("I eat 5 cukes"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }

        let retried = composition
            .context
            .after_each(&pickle_id, &outcome, 0, 3, &mut sink)
            .unwrap();
        assert!(!retried);
        assert_eq!(
            sink.names(),
            vec![
                "testCaseStarted",
                "testStepStarted",
                "suggestion",
                "testStepFinished",
                "testCaseFinished",
            ]
        );
        assert_eq!(statuses(&sink), vec![TestStepResultStatus::Undefined]);
        match &sink.tasks[2] {
            Task::Suggestion(suggestion) => assert!(suggestion.snippets[0].code.contains("{int}")),
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_step_carries_candidates() {
        let registry = testing::registry(|registry| {
            registry.given("a step", |_, _| Ok(StepOutcome::Passed));
            registry.given("a {word}", |_, _| Ok(StepOutcome::Passed));
        });
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "first", &[], &[("st1", "a step")])],
        );
        let mut composition = testing::composed(registry, doc, ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut sink = RecordingSink::new();

        let outcome = composition
            .context
            .run_test(&mut World::default(), &pickle_id, &mut sink)
            .unwrap();
        composition.context.after_each(&pickle_id, &outcome, 0, 0, &mut sink).unwrap();

        let results = step_results(&sink);
        assert_eq!(results[0].status, TestStepResultStatus::Ambiguous);
        assert_eq!(results[0].duration, ZERO);
        assert!(results[0]
            .message
            .as_ref()
            .unwrap()
            .contains("Multiple matching step definitions"));
    }

    #[test]
    fn test_pending_step_skips_the_rest() {
        let doc = document(
            "feature",
            &[],
            vec![scenario(
                "s1",
                "first",
                &[],
                &[("st1", "a pending step"), ("st2", "a passing step")],
            )],
        );
        let mut composition = testing::composed(steps_registry(), doc, ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut sink = RecordingSink::new();
        let mut world = World::default();

        let outcome = composition.context.run_test(&mut world, &pickle_id, &mut sink).unwrap();
        assert_eq!(outcome, AttemptOutcome::Skipped);
        composition.context.after_each(&pickle_id, &outcome, 0, 0, &mut sink).unwrap();

        assert_eq!(
            statuses(&sink),
            vec![TestStepResultStatus::Pending, TestStepResultStatus::Skipped]
        );
        assert!(world.log.is_empty());
        assert_eq!(case_finished(&sink), vec![false]);
    }

    #[test]
    fn test_panics_are_failures() {
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "first", &[], &[("st1", "a panicking step")])],
        );
        let mut composition = testing::composed(steps_registry(), doc, ComposeOptions::default());
        let pickle_id = first_pickle(&composition);

        let outcome = composition
            .context
            .run_test(&mut World::default(), &pickle_id, &mut RecordingSink::new())
            .unwrap();
        assert_eq!(
            outcome,
            AttemptOutcome::Failed(StepFailure::Error {
                error_type: "Panic".to_string(),
                message: "kaboom".to_string(),
            })
        );
    }

    #[test]
    fn test_filtered_head_is_reported_as_skipped() {
        let doc = document(
            "feature",
            &[],
            vec![
                scenario("s1", "filtered", &[], &[("st1", "a passing step")]),
                scenario("s2", "kept", &["@smoke"], &[("st2", "a passing step")]),
            ],
        );
        let options = ComposeOptions {
            tags: Some("@smoke".to_string()),
            ..Default::default()
        };
        let mut composition = testing::composed(steps_registry(), doc, options);
        let mut sink = RecordingSink::new();

        composition.context.before_all(&mut sink).unwrap();

        assert_eq!(
            sink.names(),
            vec![
                "specEnvelopes",
                "testCaseStarted",
                "testStepStarted",
                "testStepFinished",
                "testCaseFinished",
            ]
        );
        assert_eq!(statuses(&sink), vec![TestStepResultStatus::Skipped]);
        assert_eq!(composition.context.included().count(), 1);
    }

    #[test]
    fn test_run_test_out_of_order_is_an_assertion() {
        let doc = document(
            "feature",
            &[],
            vec![
                scenario("s1", "first", &[], &[("st1", "a passing step")]),
                scenario("s2", "second", &[], &[("st2", "a passing step")]),
            ],
        );
        let mut composition = testing::composed(steps_registry(), doc, ComposeOptions::default());
        let second = composition.suite.tests()[1].pickle_id.clone();

        let result = composition
            .context
            .run_test(&mut World::default(), &second, &mut RecordingSink::new());
        assert!(matches!(result, Err(ComposeError::Assertion(_))));
    }

    #[test]
    fn test_dry_run_resolves_but_does_not_call_handlers() {
        let options = ComposeOptions {
            dry_run: true,
            ..Default::default()
        };
        let mut composition = testing::composed(steps_registry(), two_steps(), options);
        let pickle_id = first_pickle(&composition);
        let mut world = World::default();
        let mut sink = RecordingSink::new();

        let outcome = composition.context.run_test(&mut world, &pickle_id, &mut sink).unwrap();
        assert_eq!(outcome, AttemptOutcome::Passed);
        assert!(world.log.is_empty());
    }

    #[test]
    fn test_step_hooks_wrap_steps_and_attachments_flow() {
        let registry = testing::registry(|registry| {
            registry.given("a passing step", |_, _| Ok(StepOutcome::Passed));
            registry.before(HookOptions::default(), |_, call| {
                call.log("setting up");
                Ok(StepOutcome::Passed)
            });
            registry.after_step(HookOptions::default(), |world, call| {
                world.log.push(call.pickle_step.text.clone());
                Ok(StepOutcome::Passed)
            });
        });
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "first", &[], &[("st1", "a passing step")])],
        );
        let mut composition = testing::composed(registry, doc, ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut world = World::default();
        let mut sink = RecordingSink::new();

        let outcome = composition.context.run_test(&mut world, &pickle_id, &mut sink).unwrap();
        assert_eq!(outcome, AttemptOutcome::Passed);
        assert_eq!(world.log, vec!["a passing step"]);
        assert_eq!(
            sink.names(),
            vec![
                "testCaseStarted",
                "testStepStarted",
                "createStringAttachment",
                "testStepFinished",
                "testStepStarted",
                "testStepFinished",
            ]
        );
    }

    #[test]
    fn test_pending_before_step_hook_still_runs_the_step() {
        let registry = testing::registry(|registry| {
            registry.given("a passing step", |world, _| {
                world.log.push("passing".to_string());
                Ok(StepOutcome::Passed)
            });
            registry.before_step(HookOptions::default(), |_, _| Ok(StepOutcome::Pending));
            registry.after_step(HookOptions::default(), |world, call| {
                world.log.push(call.pickle_step.text.clone());
                Ok(StepOutcome::Passed)
            });
        });
        let doc = document(
            "feature",
            &[],
            vec![scenario(
                "s1",
                "first",
                &[],
                &[("st1", "a passing step"), ("st2", "a passing step")],
            )],
        );
        let mut composition = testing::composed(registry, doc, ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut world = World::default();
        let mut sink = RecordingSink::new();

        let outcome = composition.context.run_test(&mut world, &pickle_id, &mut sink).unwrap();
        assert_eq!(outcome, AttemptOutcome::Skipped);
        composition.context.after_each(&pickle_id, &outcome, 0, 0, &mut sink).unwrap();

        assert_eq!(world.log, vec!["passing", "a passing step"]);
        assert_eq!(
            statuses(&sink),
            vec![TestStepResultStatus::Pending, TestStepResultStatus::Skipped]
        );
    }

    #[test]
    fn test_failing_before_all_hook_is_reported() {
        let registry = testing::registry(|registry| {
            registry.before_all(HookOptions::default(), |_| anyhow::bail!("no database"));
        });
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "first", &[], &[("st1", "a step")])],
        );
        let mut composition = testing::composed(registry, doc, ComposeOptions::default());
        let mut sink = RecordingSink::new();

        let error = composition.context.before_all(&mut sink).unwrap_err();
        assert_eq!(error.to_string(), "BeforeAll hook failed: no database");
        assert_eq!(
            sink.names(),
            vec!["specEnvelopes", "testRunHookStarted", "testRunHookFinished"]
        );
        match &sink.tasks[2] {
            Task::TestRunHookFinished(finished) => {
                assert_eq!(finished.result.status, TestStepResultStatus::Failed)
            }
            other => panic!("unexpected task {other:?}"),
        }
    }

    #[test]
    fn test_hook_failure_outcome_sends_nothing() {
        let mut composition =
            testing::composed(steps_registry(), two_steps(), ComposeOptions::default());
        let pickle_id = first_pickle(&composition);
        let mut sink = RecordingSink::new();

        let outcome = AttemptOutcome::HookFailure("\"before each\" hook failed".to_string());
        assert!(!composition.context.after_each(&pickle_id, &outcome, 0, 0, &mut sink).unwrap());
        assert!(sink.tasks.is_empty());
    }
}
