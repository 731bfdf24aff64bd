//! Run-state reconciliation.
//!
//! Execution signals arrive one at a time, possibly out of order with
//! respect to what the host runner reloads or retries. The [`Reconciler`]
//! folds them through the pure [`transition`] function into a single
//! ordered message log and writes it out at the end of the run.
//!
//! # Module Structure
//!
//! - `state` - states and the transition function
//! - `events` - transition inputs
//! - `channel` - the reconciler on its own thread
//! - `meta` - the opening `meta` envelope
//! - `output` - report writers

mod channel;
mod events;
mod meta;
mod output;
mod state;

pub use channel::{spawn, TaskChannel};
pub use events::{Event, Spec, SpecDisposition};
pub use meta::{create_meta, detect_ci};
pub use output::{NdjsonReport, ReportFormatter};
pub use state::{transition, Rejected, SpecMessages, State, TrackingErrorKind};

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::attachments::{Attach, Attachments, StringAttachment};
use crate::config::Configuration;
use crate::error::{assert_that, CucumberError, Ensure, HOMEPAGE};
use crate::messages::{
    AttachmentContentEncoding, Envelope, GherkinDocument, Pickle, PickleStep, TestRunFinished,
    TestRunStarted, TestStepFinished, TestStepResult,
};
use crate::paths::ensure_is_absolute;
use crate::runner::SpecResults;
use crate::tasks::{EventSink, SinkError, Task};
use crate::time::{Clock, SystemClock};

static BROWSER_CRASH: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(r"We detected that the .+ process just crashed").expect("crash regex is valid"),
        Regex::new(r"We detected that the .+ Renderer process just crashed")
            .expect("crash regex is valid"),
    ]
});

static HOOK_FAILURE: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(
            r"Because this error occurred during a `[^`]+` hook we are skipping all of the remaining tests\.",
        )
        .expect("hook failure regex is valid"),
        Regex::new(
            r"Because this error occurred during a `[^`]+` hook we are skipping the remaining tests in the current suite:",
        )
        .expect("hook failure regex is valid"),
    ]
});

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    #[error(
        "Unexpected state in {handler}: {state}. This almost always means that events reached the reconciler out of order (if that is not the case, please report at {homepage})",
        homepage = HOMEPAGE
    )]
    UnexpectedState {
        handler: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Assertion(#[from] CucumberError),

    #[error("{name} report failed: {message}")]
    Formatter { name: String, message: String },

    #[error("after step callback failed: {message}")]
    Callback { message: String },
}

/// The part of the configuration the reconciler acts on.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerSettings {
    /// Whether anything is tracked at all. Every handler is a no-op otherwise.
    pub tracking: bool,
    pub soft_errors: bool,
    /// Where to write NDJSON messages, if enabled.
    pub messages_output: Option<PathBuf>,
    pub add_screenshots: bool,
    pub project_root: PathBuf,
}

impl ReconcilerSettings {
    pub fn from_configuration(
        configuration: &Configuration,
        text_terminal: bool,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tracking: configuration.is_tracking_state(text_terminal),
            soft_errors: configuration.state.soft_errors,
            messages_output: configuration
                .messages
                .enabled
                .then(|| PathBuf::from(&configuration.messages.output)),
            add_screenshots: configuration.attachments.add_screenshots,
            project_root: project_root.into(),
        }
    }
}

/// What an after-step callback gets to see. Attachments made through it are
/// added to the step before it is marked finished.
pub struct AfterStepCall<'a> {
    pub result: &'a TestStepResult,
    pub pickle: &'a Pickle,
    pub pickle_step: &'a PickleStep,
    pub gherkin_document: &'a GherkinDocument,
    pub test_case_started_id: &'a str,
    pub test_step_id: &'a str,
    attachments: Attachments,
}

impl Attach for AfterStepCall<'_> {
    fn attachments(&mut self) -> &mut Attachments {
        &mut self.attachments
    }
}

pub type OnAfterStep = Box<dyn FnMut(&mut AfterStepCall<'_>) -> anyhow::Result<()> + Send>;

/// Owns the run state and every output derived from it.
pub struct Reconciler {
    settings: ReconcilerSettings,
    state: State,
    clock: Arc<dyn Clock>,
    on_after_step: Option<OnAfterStep>,
    formatters: Vec<Box<dyn ReportFormatter>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.settings)
            .field("state", &self.state.name())
            .field("formatters", &self.formatters.len())
            .finish()
    }
}

impl Reconciler {
    pub fn new(settings: ReconcilerSettings) -> Self {
        Self {
            settings,
            state: State::Uninitialized,
            clock: Arc::new(SystemClock),
            on_after_step: None,
            formatters: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_after_step<F>(mut self, callback: F) -> Self
    where
        F: FnMut(&mut AfterStepCall<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.on_after_step = Some(Box::new(callback));
        self
    }

    /// Register an extra report, written after the messages report.
    pub fn with_formatter(mut self, formatter: Box<dyn ReportFormatter>) -> Self {
        self.formatters.push(formatter);
        self
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.settings
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    /// The final log, once the run is over.
    pub fn envelopes(&self) -> Option<&[Envelope]> {
        match &self.state {
            State::AfterRun { accumulation } => Some(accumulation),
            _ => None,
        }
    }

    pub fn into_envelopes(self) -> Option<Vec<Envelope>> {
        match self.state {
            State::AfterRun { accumulation } => Some(accumulation),
            _ => None,
        }
    }

    pub fn before_run(&mut self, test_run_started_id: &str) -> Result<(), ReconcilerError> {
        debug!("before_run");

        if !self.settings.tracking {
            return Ok(());
        }

        self.apply(Event::BeforeRun {
            meta: create_meta(),
            test_run_started: TestRunStarted {
                timestamp: self.clock.now(),
                id: Some(test_run_started_id.to_string()),
            },
        })
    }

    pub fn before_spec(&mut self, spec: &Spec) -> Result<(), ReconcilerError> {
        debug!(spec = %spec.relative, "before_spec");

        if !spec.is_feature() || !self.settings.tracking {
            return Ok(());
        }

        self.graceful(|this| this.apply(Event::BeforeSpec(spec.clone())))
    }

    pub fn after_spec(
        &mut self,
        spec: &Spec,
        results: &SpecResults,
    ) -> Result<(), ReconcilerError> {
        debug!(spec = %spec.relative, "after_spec");

        if !spec.is_feature() || !self.settings.tracking {
            return Ok(());
        }

        self.graceful(|this| {
            let disposition = disposition(results);
            match disposition {
                SpecDisposition::BrowserCrash => {
                    warn!("Due to browser crash, no reports are created for {}.", spec.relative)
                }
                SpecDisposition::HookFailure => warn!(
                    "Hook failures can't be represented in any reports (messages / json / html), thus none is created for {}.",
                    spec.relative
                ),
                SpecDisposition::Keep => {}
            }
            this.apply(Event::AfterSpec {
                spec: spec.clone(),
                disposition,
            })
        })
    }

    /// Close the log and write every enabled report.
    pub fn after_run(&mut self, success: bool) -> Result<(), ReconcilerError> {
        debug!(success, "after_run");

        if !self.settings.tracking {
            return Ok(());
        }

        if let State::TrackingError { kind, error } = &self.state {
            warn!(
                "A Cucumber library state error (shown below) occurred in the {}, thus no report is created.",
                kind.as_str()
            );
            warn!("{error}");
            return Ok(());
        }

        let test_run_started_id = self.state.accumulation().and_then(|envelopes| {
            envelopes.iter().find_map(|envelope| match envelope {
                Envelope::TestRunStarted(started) => started.id.clone(),
                _ => None,
            })
        });

        self.apply(Event::AfterRun(TestRunFinished {
            success,
            timestamp: self.clock.now(),
            test_run_started_id,
            ..TestRunFinished::default()
        }))?;

        self.write_reports()
    }

    /// Attach a screenshot taken by the host to the open step.
    pub fn after_screenshot(&mut self, path: &Path) -> Result<(), ReconcilerError> {
        debug!(path = %path.display(), "after_screenshot");

        if !self.settings.tracking || !self.settings.add_screenshots {
            return Ok(());
        }

        if !matches!(self.state, State::StepStarted { .. }) {
            return Ok(());
        }

        let Ok(bytes) = fs::read(path) else {
            return Ok(());
        };

        self.apply(Event::Attachment {
            attachment: StringAttachment {
                data: STANDARD.encode(bytes),
                media_type: "image/png".to_string(),
                encoding: AttachmentContentEncoding::Base64,
                file_name: None,
            },
            timestamp: None,
        })
    }

    /// Handle one task sent by a running spec.
    pub fn handle_task(&mut self, task: Task) -> Result<(), ReconcilerError> {
        debug!(task = task.name(), state = self.state.name(), "handle_task");

        if let Task::FrontendTrackingError(error) = task {
            return self.apply(Event::FrontendTrackingError(error));
        }

        if !self.settings.tracking {
            return Ok(());
        }

        self.graceful(|this| match task {
            Task::SpecEnvelopes(envelopes) => this.apply(Event::SpecEnvelopes(envelopes)),
            Task::TestCaseStarted(started) => this.apply(Event::TestCaseStarted(started)),
            Task::TestStepStarted(started) => this.apply(Event::TestStepStarted(started)),
            Task::TestStepFinished(finished) => this.test_step_finished(finished),
            Task::TestRunHookStarted(started) => this.apply(Event::TestRunHookStarted(started)),
            Task::TestRunHookFinished(finished) => this.apply(Event::TestRunHookFinished(finished)),
            Task::TestCaseFinished(finished) => this.apply(Event::TestCaseFinished(finished)),
            Task::CreateStringAttachment(attachment) => this.apply(Event::Attachment {
                attachment,
                timestamp: Some(this.clock.now()),
            }),
            Task::Suggestion(suggestion) => this.apply(Event::Suggestion(suggestion)),
            Task::FrontendTrackingError(error) => this.apply(Event::FrontendTrackingError(error)),
        })
    }

    fn test_step_finished(&mut self, finished: TestStepFinished) -> Result<(), ReconcilerError> {
        let State::StepStarted { messages, .. } = &self.state else {
            return Err(ReconcilerError::UnexpectedState {
                handler: "test_step_finished",
                state: self.state.name(),
            });
        };

        let attachments =
            after_step_attachments(&messages.current, &finished, self.on_after_step.as_mut())?;

        for attachment in attachments {
            let timestamp = Some(self.clock.now());
            self.apply(Event::Attachment {
                attachment,
                timestamp,
            })?;
        }

        self.apply(Event::TestStepFinished(finished))
    }

    /// In tracking-error everything is a no-op. With soft errors, a failing
    /// handler moves the reconciler into tracking-error instead of failing.
    fn graceful<F>(&mut self, handler: F) -> Result<(), ReconcilerError>
    where
        F: FnOnce(&mut Self) -> Result<(), ReconcilerError>,
    {
        if matches!(self.state, State::TrackingError { .. }) {
            return Ok(());
        }

        match handler(self) {
            Ok(()) => Ok(()),
            Err(err) if self.settings.soft_errors => {
                warn!(error = %err, "state tracking failed, no report will be created");
                self.state = State::TrackingError {
                    kind: TrackingErrorKind::Backend,
                    error: err.to_string(),
                };
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn apply(&mut self, event: Event) -> Result<(), ReconcilerError> {
        let state = std::mem::replace(&mut self.state, State::Uninitialized);
        match transition(state, event) {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(Rejected { handler, state }) => {
                let name = state.name();
                self.state = state;
                Err(ReconcilerError::UnexpectedState {
                    handler,
                    state: name,
                })
            }
        }
    }

    fn write_reports(&mut self) -> Result<(), ReconcilerError> {
        let State::AfterRun { accumulation } = &self.state else {
            return Err(ReconcilerError::UnexpectedState {
                handler: "after_run",
                state: self.state.name(),
            });
        };

        if let Some(output) = &self.settings.messages_output {
            let path = ensure_is_absolute(&self.settings.project_root, output);
            let mut report = NdjsonReport::new(path);
            report
                .write(accumulation)
                .map_err(|err| ReconcilerError::Formatter {
                    name: report.name().to_string(),
                    message: format!("{err:#}"),
                })?;
        }

        for formatter in &mut self.formatters {
            formatter
                .write(accumulation)
                .map_err(|err| ReconcilerError::Formatter {
                    name: formatter.name().to_string(),
                    message: format!("{err:#}"),
                })?;
            info!(report = formatter.name(), "wrote report");
        }

        Ok(())
    }
}

impl EventSink for Reconciler {
    fn send(&mut self, task: Task) -> Result<(), SinkError> {
        Ok(self.handle_task(task)?)
    }
}

/// Decide what becomes of a finished spec's messages.
pub fn disposition(results: &SpecResults) -> SpecDisposition {
    if let Some(error) = &results.error {
        if BROWSER_CRASH.iter().any(|regex| regex.is_match(error)) {
            return SpecDisposition::BrowserCrash;
        }
    }

    let hook_failed = results.tests.iter().any(|test| {
        test.display_error
            .as_deref()
            .is_some_and(|error| HOOK_FAILURE.iter().any(|regex| regex.is_match(error)))
    });

    if hook_failed {
        SpecDisposition::HookFailure
    } else {
        SpecDisposition::Keep
    }
}

fn after_step_attachments(
    current: &[Envelope],
    finished: &TestStepFinished,
    callback: Option<&mut OnAfterStep>,
) -> Result<Vec<StringAttachment>, ReconcilerError> {
    let test_case_started = current
        .iter()
        .find_map(|envelope| match envelope {
            Envelope::TestCaseStarted(started) if started.id == finished.test_case_started_id => {
                Some(started)
            }
            _ => None,
        })
        .ensure("Expected to find a testCaseStarted")?;

    let test_case = current
        .iter()
        .find_map(|envelope| match envelope {
            Envelope::TestCase(test_case) if test_case.id == test_case_started.test_case_id => {
                Some(test_case)
            }
            _ => None,
        })
        .ensure("Expected to find a testCase")?;

    let test_step = test_case
        .test_steps
        .iter()
        .find(|step| step.id == finished.test_step_id)
        .ensure("Expected to find a testStep")?;

    let Some(pickle_step_id) = &test_step.pickle_step_id else {
        assert_that(
            test_step.hook_id.is_some(),
            "Expected a hookId in absence of pickleStepId",
        )?;
        return Ok(Vec::new());
    };

    let pickle = current
        .iter()
        .find_map(|envelope| match envelope {
            Envelope::Pickle(pickle) if pickle.id == test_case.pickle_id => Some(pickle),
            _ => None,
        })
        .ensure("Expected to find a pickle")?;

    let pickle_step = pickle
        .steps
        .iter()
        .find(|step| &step.id == pickle_step_id)
        .ensure("Expected to find a pickleStep")?;

    let gherkin_document = current
        .iter()
        .find_map(|envelope| match envelope {
            Envelope::GherkinDocument(document)
                if document.uri.as_deref() == Some(pickle.uri.as_str()) =>
            {
                Some(document)
            }
            _ => None,
        })
        .ensure("Expected to find a gherkinDocument")?;

    let Some(callback) = callback else {
        return Ok(Vec::new());
    };

    let mut call = AfterStepCall {
        result: &finished.test_step_result,
        pickle,
        pickle_step,
        gherkin_document,
        test_case_started_id: &finished.test_case_started_id,
        test_step_id: &finished.test_step_id,
        attachments: Attachments::new(),
    };
    callback(&mut call).map_err(|err| ReconcilerError::Callback {
        message: format!("{err:#}"),
    })?;

    Ok(call.attachments.into_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{
        TestCase, TestCaseFinished, TestCaseStarted, TestStep, TestStepResultStatus,
        TestStepStarted,
    };
    use crate::runner::{all_hook_failure_message, each_hook_failure_message, TestResult, TestState};

    fn settings() -> ReconcilerSettings {
        ReconcilerSettings {
            tracking: true,
            ..ReconcilerSettings::default()
        }
    }

    fn spec() -> Spec {
        Spec::new("features/a.feature", "/project/features/a.feature")
    }

    fn spec_envelopes() -> Vec<Envelope> {
        vec![
            Envelope::GherkinDocument(GherkinDocument {
                uri: Some("features/a.feature".to_string()),
                ..Default::default()
            }),
            Envelope::Pickle(Pickle {
                id: "pickle-1".to_string(),
                uri: "features/a.feature".to_string(),
                steps: vec![PickleStep {
                    id: "pickle-step-1".to_string(),
                    text: "a step".to_string(),
                    ..Default::default()
                }],
                ..Default::default()
            }),
            Envelope::TestCase(TestCase {
                id: "case-1".to_string(),
                pickle_id: "pickle-1".to_string(),
                test_steps: vec![
                    TestStep {
                        id: "hook-step".to_string(),
                        hook_id: Some("hook-1".to_string()),
                        ..Default::default()
                    },
                    TestStep {
                        id: "test-step-1".to_string(),
                        pickle_step_id: Some("pickle-step-1".to_string()),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
        ]
    }

    fn started_step(reconciler: &mut Reconciler, step: &str) {
        reconciler.before_run("run-1").unwrap();
        reconciler.before_spec(&spec()).unwrap();
        reconciler.handle_task(Task::SpecEnvelopes(spec_envelopes())).unwrap();
        reconciler
            .handle_task(Task::TestCaseStarted(TestCaseStarted {
                id: "tcs-1".to_string(),
                test_case_id: "case-1".to_string(),
                ..Default::default()
            }))
            .unwrap();
        reconciler
            .handle_task(Task::TestStepStarted(TestStepStarted {
                test_case_started_id: "tcs-1".to_string(),
                test_step_id: step.to_string(),
                ..Default::default()
            }))
            .unwrap();
    }

    fn step_finished(step: &str) -> Task {
        Task::TestStepFinished(TestStepFinished {
            test_case_started_id: "tcs-1".to_string(),
            test_step_id: step.to_string(),
            test_step_result: TestStepResult::new(TestStepResultStatus::Passed, Default::default()),
            ..Default::default()
        })
    }

    fn passed(title: &str) -> TestResult {
        TestResult {
            title: title.to_string(),
            state: TestState::Passed,
            display_error: None,
            attempts: 1,
        }
    }

    #[test]
    fn test_not_tracking_ignores_everything() {
        let mut reconciler = Reconciler::new(ReconcilerSettings::default());
        reconciler.before_run("run-1").unwrap();
        reconciler.handle_task(step_finished("x")).unwrap();
        reconciler.after_run(true).unwrap();
        assert_eq!(reconciler.state().name(), "uninitialized");
    }

    #[test]
    fn test_non_feature_specs_are_ignored() {
        let mut reconciler = Reconciler::new(settings());
        reconciler.before_run("run-1").unwrap();
        let plain = Spec::new("e2e/plain.rs", "/project/e2e/plain.rs");
        reconciler.before_spec(&plain).unwrap();
        reconciler.after_spec(&plain, &SpecResults::default()).unwrap();
        assert_eq!(reconciler.state().name(), "before-run");
    }

    #[test]
    fn test_after_step_callback_attaches_before_step_finishes() {
        let mut reconciler = Reconciler::new(settings()).with_after_step(|call| {
            assert_eq!(call.pickle_step.text, "a step");
            assert_eq!(call.result.status, TestStepResultStatus::Passed);
            call.log("after step");
            Ok(())
        });
        started_step(&mut reconciler, "test-step-1");

        reconciler.handle_task(step_finished("test-step-1")).unwrap();

        let current = reconciler.state().current().unwrap();
        let tail: Vec<&str> = current[current.len() - 2..]
            .iter()
            .map(|envelope| envelope.kind().name())
            .collect();
        assert_eq!(tail, vec!["attachment", "testStepFinished"]);
    }

    #[test]
    fn test_hook_steps_skip_the_callback() {
        let mut reconciler = Reconciler::new(settings()).with_after_step(|_| {
            anyhow::bail!("must not be called for hooks")
        });
        started_step(&mut reconciler, "hook-step");
        reconciler.handle_task(step_finished("hook-step")).unwrap();
        assert_eq!(reconciler.state().name(), "step-finished");
    }

    #[test]
    fn test_unknown_test_step_is_an_assertion() {
        let mut reconciler = Reconciler::new(settings());
        started_step(&mut reconciler, "nope");
        let err = reconciler.handle_task(step_finished("nope")).unwrap_err();
        assert!(matches!(err, ReconcilerError::Assertion(_)));
        assert!(err.to_string().starts_with("Expected to find a testStep"));
    }

    #[test]
    fn test_unexpected_state_without_soft_errors() {
        let mut reconciler = Reconciler::new(settings());
        reconciler.before_run("run-1").unwrap();
        let err = reconciler
            .handle_task(Task::TestCaseFinished(TestCaseFinished::default()))
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Unexpected state in test_case_finished: before-run."));
        assert_eq!(reconciler.state().name(), "before-run");
    }

    #[test]
    fn test_soft_errors_move_to_tracking_error() {
        let mut reconciler = Reconciler::new(ReconcilerSettings {
            soft_errors: true,
            ..settings()
        });
        reconciler.before_run("run-1").unwrap();
        reconciler
            .handle_task(Task::TestCaseFinished(TestCaseFinished::default()))
            .unwrap();
        assert!(matches!(
            reconciler.state(),
            State::TrackingError {
                kind: TrackingErrorKind::Backend,
                ..
            }
        ));

        // Everything else is now a no-op, including the report.
        reconciler.before_spec(&spec()).unwrap();
        reconciler.after_run(true).unwrap();
        assert_eq!(reconciler.state().name(), "tracking-error");
        assert!(reconciler.envelopes().is_none());
    }

    #[test]
    fn test_frontend_tracking_error_bypasses_soft_errors() {
        let mut reconciler = Reconciler::new(settings());
        reconciler.before_run("run-1").unwrap();
        reconciler
            .handle_task(Task::FrontendTrackingError("lost track".into()))
            .unwrap();
        assert_eq!(
            reconciler.state(),
            &State::TrackingError {
                kind: TrackingErrorKind::Frontend,
                error: "lost track".to_string()
            }
        );
    }

    #[test]
    fn test_screenshot_attaches_to_open_step() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        fs::write(&path, b"png").unwrap();

        let mut reconciler = Reconciler::new(ReconcilerSettings {
            add_screenshots: true,
            ..settings()
        });
        started_step(&mut reconciler, "test-step-1");
        reconciler.after_screenshot(&path).unwrap();
        reconciler.after_screenshot(&dir.path().join("missing.png")).unwrap();

        let attachments: Vec<_> = reconciler
            .state()
            .current()
            .unwrap()
            .iter()
            .filter_map(|envelope| match envelope {
                Envelope::Attachment(attachment) => Some(attachment),
                _ => None,
            })
            .collect();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].body, "cG5n");
        assert_eq!(attachments[0].media_type, "image/png");
        assert_eq!(attachments[0].timestamp, None);
    }

    #[test]
    fn test_after_run_writes_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut reconciler = Reconciler::new(ReconcilerSettings {
            messages_output: Some(PathBuf::from("reports/messages.ndjson")),
            project_root: dir.path().to_path_buf(),
            ..settings()
        });
        reconciler.before_run("run-1").unwrap();
        reconciler.after_run(false).unwrap();

        let written = fs::read_to_string(dir.path().join("reports/messages.ndjson")).unwrap();
        let envelopes = crate::messages::parse_ndjson(&written).unwrap();
        match envelopes.last() {
            Some(Envelope::TestRunFinished(finished)) => {
                assert!(!finished.success);
                assert_eq!(finished.test_run_started_id.as_deref(), Some("run-1"));
            }
            other => panic!("unexpected envelope {other:?}"),
        }
    }

    #[test]
    fn test_disposition() {
        let mut results = SpecResults {
            error: None,
            tests: vec![passed("a")],
        };
        assert_eq!(disposition(&results), SpecDisposition::Keep);

        results.tests.push(TestResult {
            title: "b".to_string(),
            state: TestState::Failed,
            display_error: Some(each_hook_failure_message("before each", "boom")),
            attempts: 1,
        });
        assert_eq!(disposition(&results), SpecDisposition::HookFailure);

        results.tests[1].display_error =
            Some(all_hook_failure_message("after all", "boom", "suite"));
        assert_eq!(disposition(&results), SpecDisposition::HookFailure);

        results.error = Some("We detected that the Chromium process just crashed.".to_string());
        assert_eq!(disposition(&results), SpecDisposition::BrowserCrash);
    }
}
