//! The envelope sum type.

use serde::{Deserialize, Serialize};

use super::*;

/// Exactly one message. Serialized externally tagged, so the wire form is
/// `{"testCaseStarted": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Envelope {
    Meta(Meta),
    Source(Source),
    GherkinDocument(GherkinDocument),
    Pickle(Pickle),
    ParameterType(ParameterType),
    StepDefinition(StepDefinition),
    Hook(Hook),
    TestRunStarted(TestRunStarted),
    TestCase(TestCase),
    TestCaseStarted(TestCaseStarted),
    TestStepStarted(TestStepStarted),
    Attachment(Attachment),
    TestStepFinished(TestStepFinished),
    TestRunHookStarted(TestRunHookStarted),
    TestRunHookFinished(TestRunHookFinished),
    TestCaseFinished(TestCaseFinished),
    TestRunFinished(TestRunFinished),
    Suggestion(Suggestion),
}

/// Discriminant of an [`Envelope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    Meta,
    Source,
    GherkinDocument,
    Pickle,
    ParameterType,
    StepDefinition,
    Hook,
    TestRunStarted,
    TestCase,
    TestCaseStarted,
    TestStepStarted,
    Attachment,
    TestStepFinished,
    TestRunHookStarted,
    TestRunHookFinished,
    TestCaseFinished,
    TestRunFinished,
    Suggestion,
}

impl EnvelopeKind {
    /// Position among the structural envelopes that precede everything else
    /// in an ordered log. Run-time envelopes have no priority.
    pub fn structural_priority(self) -> Option<u8> {
        match self {
            EnvelopeKind::Meta => Some(0),
            EnvelopeKind::Source => Some(1),
            EnvelopeKind::GherkinDocument => Some(2),
            EnvelopeKind::Pickle => Some(3),
            EnvelopeKind::ParameterType => Some(4),
            EnvelopeKind::StepDefinition => Some(5),
            EnvelopeKind::Hook => Some(6),
            EnvelopeKind::TestRunStarted => Some(7),
            EnvelopeKind::TestCase => Some(8),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EnvelopeKind::Meta => "meta",
            EnvelopeKind::Source => "source",
            EnvelopeKind::GherkinDocument => "gherkinDocument",
            EnvelopeKind::Pickle => "pickle",
            EnvelopeKind::ParameterType => "parameterType",
            EnvelopeKind::StepDefinition => "stepDefinition",
            EnvelopeKind::Hook => "hook",
            EnvelopeKind::TestRunStarted => "testRunStarted",
            EnvelopeKind::TestCase => "testCase",
            EnvelopeKind::TestCaseStarted => "testCaseStarted",
            EnvelopeKind::TestStepStarted => "testStepStarted",
            EnvelopeKind::Attachment => "attachment",
            EnvelopeKind::TestStepFinished => "testStepFinished",
            EnvelopeKind::TestRunHookStarted => "testRunHookStarted",
            EnvelopeKind::TestRunHookFinished => "testRunHookFinished",
            EnvelopeKind::TestCaseFinished => "testCaseFinished",
            EnvelopeKind::TestRunFinished => "testRunFinished",
            EnvelopeKind::Suggestion => "suggestion",
        }
    }
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Envelope::Meta(_) => EnvelopeKind::Meta,
            Envelope::Source(_) => EnvelopeKind::Source,
            Envelope::GherkinDocument(_) => EnvelopeKind::GherkinDocument,
            Envelope::Pickle(_) => EnvelopeKind::Pickle,
            Envelope::ParameterType(_) => EnvelopeKind::ParameterType,
            Envelope::StepDefinition(_) => EnvelopeKind::StepDefinition,
            Envelope::Hook(_) => EnvelopeKind::Hook,
            Envelope::TestRunStarted(_) => EnvelopeKind::TestRunStarted,
            Envelope::TestCase(_) => EnvelopeKind::TestCase,
            Envelope::TestCaseStarted(_) => EnvelopeKind::TestCaseStarted,
            Envelope::TestStepStarted(_) => EnvelopeKind::TestStepStarted,
            Envelope::Attachment(_) => EnvelopeKind::Attachment,
            Envelope::TestStepFinished(_) => EnvelopeKind::TestStepFinished,
            Envelope::TestRunHookStarted(_) => EnvelopeKind::TestRunHookStarted,
            Envelope::TestRunHookFinished(_) => EnvelopeKind::TestRunHookFinished,
            Envelope::TestCaseFinished(_) => EnvelopeKind::TestCaseFinished,
            Envelope::TestRunFinished(_) => EnvelopeKind::TestRunFinished,
            Envelope::Suggestion(_) => EnvelopeKind::Suggestion,
        }
    }

    /// Identity of structural envelopes, used to drop repeats when merging
    /// logs. Sources and documents are identified by URI.
    pub fn structural_id(&self) -> Option<&str> {
        match self {
            Envelope::Source(source) => Some(source.uri.as_str()),
            Envelope::GherkinDocument(document) => document.uri.as_deref(),
            Envelope::Pickle(pickle) => Some(pickle.id.as_str()),
            Envelope::ParameterType(parameter_type) => Some(parameter_type.id.as_str()),
            Envelope::StepDefinition(definition) => Some(definition.id.as_str()),
            Envelope::Hook(hook) => Some(hook.id.as_str()),
            Envelope::TestCase(test_case) => Some(test_case.id.as_str()),
            _ => None,
        }
    }
}
