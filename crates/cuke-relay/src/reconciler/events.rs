use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::attachments::StringAttachment;
use crate::messages::{
    Envelope, Meta, Suggestion, TestCaseFinished, TestCaseStarted, TestRunFinished,
    TestRunHookFinished, TestRunHookStarted, TestRunStarted, TestStepFinished, TestStepStarted,
    Timestamp,
};

/// A spec file as the host runner knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spec {
    /// File name, e.g. `login.feature`.
    pub name: String,
    /// Path relative to the project root. Identifies the spec across reloads.
    pub relative: String,
    pub absolute: PathBuf,
}

impl Spec {
    pub fn new(relative: impl Into<String>, absolute: impl Into<PathBuf>) -> Self {
        let relative = relative.into();
        let name = relative
            .rsplit('/')
            .next()
            .unwrap_or(relative.as_str())
            .to_string();
        Self {
            name,
            relative,
            absolute: absolute.into(),
        }
    }

    pub fn is_feature(&self) -> bool {
        self.name.ends_with(".feature")
    }
}

/// What to do with a finished spec's messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecDisposition {
    Keep,
    /// The host crashed; the spec's messages are unreliable.
    BrowserCrash,
    /// A hook failure skipped tests in a way messages cannot represent.
    HookFailure,
}

/// Input of [`transition`](super::transition).
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BeforeRun {
        meta: Meta,
        test_run_started: TestRunStarted,
    },
    BeforeSpec(Spec),
    SpecEnvelopes(Vec<Envelope>),
    TestCaseStarted(TestCaseStarted),
    TestStepStarted(TestStepStarted),
    TestStepFinished(TestStepFinished),
    TestRunHookStarted(TestRunHookStarted),
    TestRunHookFinished(TestRunHookFinished),
    TestCaseFinished(TestCaseFinished),
    Attachment {
        attachment: StringAttachment,
        timestamp: Option<Timestamp>,
    },
    Suggestion(Suggestion),
    AfterSpec {
        spec: Spec,
        disposition: SpecDisposition,
    },
    AfterRun(TestRunFinished),
    FrontendTrackingError(String),
}

impl Event {
    /// Handler name used in state errors.
    pub fn handler(&self) -> &'static str {
        match self {
            Event::BeforeRun { .. } => "before_run",
            Event::BeforeSpec(_) => "before_spec",
            Event::SpecEnvelopes(_) => "spec_envelopes",
            Event::TestCaseStarted(_) => "test_case_started",
            Event::TestStepStarted(_) => "test_step_started",
            Event::TestStepFinished(_) => "test_step_finished",
            Event::TestRunHookStarted(_) => "test_run_hook_started",
            Event::TestRunHookFinished(_) => "test_run_hook_finished",
            Event::TestCaseFinished(_) => "test_case_finished",
            Event::Attachment { .. } => "create_string_attachment",
            Event::Suggestion(_) => "suggestion",
            Event::AfterSpec { .. } => "after_spec",
            Event::AfterRun(_) => "after_run",
            Event::FrontendTrackingError(_) => "frontend_tracking_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_name_and_kind() {
        let spec = Spec::new("cypress/e2e/login.feature", "/project/cypress/e2e/login.feature");
        assert_eq!(spec.name, "login.feature");
        assert!(spec.is_feature());
        assert!(!Spec::new("cypress/e2e/plain.cy.ts", "/p/plain.cy.ts").is_feature());
    }
}
