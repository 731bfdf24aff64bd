//! Signals sent from a running spec to the reconciler.

use crate::attachments::StringAttachment;
use crate::messages::{
    Envelope, Suggestion, TestCaseFinished, TestCaseStarted, TestRunHookFinished,
    TestRunHookStarted, TestStepFinished, TestStepStarted,
};
use crate::reconciler::ReconcilerError;

/// One execution signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Structural envelopes of the spec, sent once before anything runs.
    SpecEnvelopes(Vec<Envelope>),
    TestCaseStarted(TestCaseStarted),
    TestStepStarted(TestStepStarted),
    TestStepFinished(TestStepFinished),
    TestRunHookStarted(TestRunHookStarted),
    TestRunHookFinished(TestRunHookFinished),
    TestCaseFinished(TestCaseFinished),
    /// Attached to whatever step or run hook is open when it arrives.
    CreateStringAttachment(StringAttachment),
    Suggestion(Suggestion),
    /// The sending side lost track of the run; stop reconciling.
    FrontendTrackingError(String),
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::SpecEnvelopes(_) => "specEnvelopes",
            Task::TestCaseStarted(_) => "testCaseStarted",
            Task::TestStepStarted(_) => "testStepStarted",
            Task::TestStepFinished(_) => "testStepFinished",
            Task::TestRunHookStarted(_) => "testRunHookStarted",
            Task::TestRunHookFinished(_) => "testRunHookFinished",
            Task::TestCaseFinished(_) => "testCaseFinished",
            Task::CreateStringAttachment(_) => "createStringAttachment",
            Task::Suggestion(_) => "suggestion",
            Task::FrontendTrackingError(_) => "frontendTrackingError",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("reconciler is no longer running")]
    Disconnected,

    #[error(transparent)]
    Reconciler(#[from] ReconcilerError),
}

/// Where the composer sends its tasks. Each `send` returns once the task
/// has been handled.
pub trait EventSink {
    fn send(&mut self, task: Task) -> Result<(), SinkError>;
}

/// Keeps every task in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub tasks: Vec<Task>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(Task::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn send(&mut self, task: Task) -> Result<(), SinkError> {
        self.tasks.push(task);
        Ok(())
    }
}

/// Drops tasks. Used when nothing is being tracked.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn send(&mut self, _task: Task) -> Result<(), SinkError> {
        Ok(())
    }
}
