//! The reconciler's state machine.
//!
//! [`transition`] is pure: it never logs, reads configuration or touches
//! the filesystem. Everything else lives in the [`Reconciler`](super::Reconciler)
//! shell.

use crate::attachments::StringAttachment;
use crate::messages::{
    order_messages, remove_duplicated_step_definitions, Attachment, Envelope, Timestamp,
};

use super::events::{Event, Spec, SpecDisposition};

/// Messages of the run so far and of the spec being executed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpecMessages {
    /// Envelopes of finished specs, plus meta and testRunStarted.
    pub accumulation: Vec<Envelope>,
    pub current: Vec<Envelope>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingErrorKind {
    /// The reconciler itself failed.
    Backend,
    /// The composer lost track and said so.
    Frontend,
}

impl TrackingErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TrackingErrorKind::Backend => "backend",
            TrackingErrorKind::Frontend => "frontend",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum State {
    Uninitialized,
    BeforeRun {
        accumulation: Vec<Envelope>,
    },
    BeforeSpec {
        spec: Spec,
        accumulation: Vec<Envelope>,
    },
    ReceivedEnvelopes {
        spec: Spec,
        messages: SpecMessages,
    },
    TestStarted {
        spec: Spec,
        messages: SpecMessages,
        test_case_started_id: String,
    },
    StepStarted {
        spec: Spec,
        messages: SpecMessages,
        test_case_started_id: String,
        test_step_id: String,
    },
    StepFinished {
        spec: Spec,
        messages: SpecMessages,
        test_case_started_id: String,
    },
    RunHookStarted {
        spec: Spec,
        messages: SpecMessages,
        test_run_hook_started_id: String,
    },
    RunHookFinished {
        spec: Spec,
        messages: SpecMessages,
    },
    TestFinished {
        spec: Spec,
        messages: SpecMessages,
    },
    AfterSpec {
        accumulation: Vec<Envelope>,
    },
    AfterRun {
        accumulation: Vec<Envelope>,
    },
    /// The spec was reloaded by the host; its last test will run again.
    HasReloaded {
        spec: Spec,
        messages: SpecMessages,
    },
    HasReloadedReceivedEnvelopes {
        spec: Spec,
        spec_envelopes: Vec<Envelope>,
        messages: SpecMessages,
    },
    TrackingError {
        kind: TrackingErrorKind,
        error: String,
    },
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Uninitialized => "uninitialized",
            State::BeforeRun { .. } => "before-run",
            State::BeforeSpec { .. } => "before-spec",
            State::ReceivedEnvelopes { .. } => "received-envelopes",
            State::TestStarted { .. } => "test-started",
            State::StepStarted { .. } => "step-started",
            State::StepFinished { .. } => "step-finished",
            State::RunHookStarted { .. } => "run-hook-started",
            State::RunHookFinished { .. } => "run-hook-finished",
            State::TestFinished { .. } => "test-finished",
            State::AfterSpec { .. } => "after-spec",
            State::AfterRun { .. } => "after-run",
            State::HasReloaded { .. } => "has-reloaded",
            State::HasReloadedReceivedEnvelopes { .. } => "has-reloaded-received-envelopes",
            State::TrackingError { .. } => "tracking-error",
        }
    }

    /// Envelopes of the spec being executed.
    pub fn current(&self) -> Option<&[Envelope]> {
        match self {
            State::ReceivedEnvelopes { messages, .. }
            | State::TestStarted { messages, .. }
            | State::StepStarted { messages, .. }
            | State::StepFinished { messages, .. }
            | State::RunHookStarted { messages, .. }
            | State::RunHookFinished { messages, .. }
            | State::TestFinished { messages, .. }
            | State::HasReloaded { messages, .. }
            | State::HasReloadedReceivedEnvelopes { messages, .. } => Some(&messages.current),
            _ => None,
        }
    }

    pub fn accumulation(&self) -> Option<&[Envelope]> {
        match self {
            State::BeforeRun { accumulation }
            | State::BeforeSpec { accumulation, .. }
            | State::AfterSpec { accumulation }
            | State::AfterRun { accumulation } => Some(accumulation),
            State::ReceivedEnvelopes { messages, .. }
            | State::TestStarted { messages, .. }
            | State::StepStarted { messages, .. }
            | State::StepFinished { messages, .. }
            | State::RunHookStarted { messages, .. }
            | State::RunHookFinished { messages, .. }
            | State::TestFinished { messages, .. }
            | State::HasReloaded { messages, .. }
            | State::HasReloadedReceivedEnvelopes { messages, .. } => Some(&messages.accumulation),
            State::Uninitialized | State::TrackingError { .. } => None,
        }
    }

    fn is_within_spec(&self) -> bool {
        self.current().is_some() || matches!(self, State::BeforeSpec { .. })
    }

    /// Drop whatever the current spec produced.
    fn into_accumulation(self) -> Vec<Envelope> {
        match self {
            State::BeforeRun { accumulation }
            | State::BeforeSpec { accumulation, .. }
            | State::AfterSpec { accumulation }
            | State::AfterRun { accumulation } => accumulation,
            State::ReceivedEnvelopes { messages, .. }
            | State::TestStarted { messages, .. }
            | State::StepStarted { messages, .. }
            | State::StepFinished { messages, .. }
            | State::RunHookStarted { messages, .. }
            | State::RunHookFinished { messages, .. }
            | State::TestFinished { messages, .. }
            | State::HasReloaded { messages, .. }
            | State::HasReloadedReceivedEnvelopes { messages, .. } => messages.accumulation,
            State::Uninitialized | State::TrackingError { .. } => Vec::new(),
        }
    }
}

/// An event that is illegal in `state`. The state is handed back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejected {
    pub handler: &'static str,
    pub state: State,
}

enum AttachmentTarget {
    Step {
        test_case_started_id: String,
        test_step_id: String,
    },
    RunHook {
        test_run_hook_started_id: String,
    },
}

fn attachment_envelope(
    attachment: StringAttachment,
    timestamp: Option<Timestamp>,
    target: AttachmentTarget,
) -> Envelope {
    let mut envelope = Attachment {
        body: attachment.data,
        content_encoding: attachment.encoding,
        file_name: attachment.file_name,
        media_type: attachment.media_type,
        timestamp,
        ..Attachment::default()
    };
    match target {
        AttachmentTarget::Step {
            test_case_started_id,
            test_step_id,
        } => {
            envelope.test_case_started_id = Some(test_case_started_id);
            envelope.test_step_id = Some(test_step_id);
        }
        AttachmentTarget::RunHook {
            test_run_hook_started_id,
        } => envelope.test_run_hook_started_id = Some(test_run_hook_started_id),
    }
    Envelope::Attachment(envelope)
}

/// Apply `event` to `state`.
pub fn transition(state: State, event: Event) -> Result<State, Rejected> {
    let handler = event.handler();

    match (state, event) {
        (_, Event::FrontendTrackingError(error)) => Ok(State::TrackingError {
            kind: TrackingErrorKind::Frontend,
            error,
        }),

        (
            State::Uninitialized,
            Event::BeforeRun {
                meta,
                test_run_started,
            },
        ) => Ok(State::BeforeRun {
            accumulation: vec![Envelope::Meta(meta), Envelope::TestRunStarted(test_run_started)],
        }),

        (
            State::BeforeRun { accumulation } | State::AfterSpec { accumulation },
            Event::BeforeSpec(spec),
        ) => {
            Ok(State::BeforeSpec { spec, accumulation })
        }

        // Reload in a before all hook: the next state is the natural one anyway.
        (state @ State::BeforeSpec { .. }, Event::BeforeSpec(_)) => Ok(state),

        (
            State::ReceivedEnvelopes {
                spec: previous,
                messages,
            }
            | State::TestStarted {
                spec: previous,
                messages,
                ..
            }
            | State::StepStarted {
                spec: previous,
                messages,
                ..
            }
            | State::StepFinished {
                spec: previous,
                messages,
                ..
            }
            | State::TestFinished {
                spec: previous,
                messages,
            },
            Event::BeforeSpec(spec),
        ) if previous.relative == spec.relative => Ok(State::HasReloaded { spec, messages }),

        (State::BeforeSpec { spec, accumulation }, Event::SpecEnvelopes(envelopes)) => {
            Ok(State::ReceivedEnvelopes {
                spec,
                messages: SpecMessages {
                    accumulation,
                    current: envelopes,
                },
            })
        }

        (State::HasReloaded { spec, messages }, Event::SpecEnvelopes(spec_envelopes)) => {
            Ok(State::HasReloadedReceivedEnvelopes {
                spec,
                spec_envelopes,
                messages,
            })
        }

        (
            State::ReceivedEnvelopes { spec, messages }
            | State::TestFinished { spec, messages }
            | State::RunHookFinished { spec, messages },
            Event::TestCaseStarted(started),
        ) => Ok(test_started(spec, messages, started)),

        (
            State::HasReloadedReceivedEnvelopes {
                spec, mut messages, ..
            },
            Event::TestCaseStarted(started),
        ) => {
            let last = messages
                .current
                .iter()
                .rposition(|envelope| matches!(envelope, Envelope::TestCaseStarted(_)));
            if let Some(index) = last {
                // The same test is running again: forget its first run.
                let restarted = matches!(
                    &messages.current[index],
                    Envelope::TestCaseStarted(previous) if previous.id == started.id
                );
                if restarted {
                    messages.current.truncate(index);
                }
            }
            Ok(test_started(spec, messages, started))
        }

        (
            State::TestStarted {
                spec,
                mut messages,
                test_case_started_id,
            }
            | State::StepFinished {
                spec,
                mut messages,
                test_case_started_id,
            }
            | State::StepStarted {
                spec,
                mut messages,
                test_case_started_id,
                ..
            },
            Event::TestStepStarted(started),
        ) => {
            let test_step_id = started.test_step_id.clone();
            messages.current.push(Envelope::TestStepStarted(started));
            Ok(State::StepStarted {
                spec,
                messages,
                test_case_started_id,
                test_step_id,
            })
        }

        (
            State::StepStarted {
                spec,
                mut messages,
                test_case_started_id,
                ..
            },
            Event::TestStepFinished(finished),
        ) => {
            messages.current.push(Envelope::TestStepFinished(finished));
            Ok(State::StepFinished {
                spec,
                messages,
                test_case_started_id,
            })
        }

        (
            State::ReceivedEnvelopes { spec, mut messages }
            | State::TestFinished { spec, mut messages }
            | State::RunHookFinished { spec, mut messages },
            Event::TestRunHookStarted(started),
        ) => {
            let test_run_hook_started_id = started.id.clone();
            messages.current.push(Envelope::TestRunHookStarted(started));
            Ok(State::RunHookStarted {
                spec,
                messages,
                test_run_hook_started_id,
            })
        }

        (
            State::RunHookStarted { spec, mut messages, .. },
            Event::TestRunHookFinished(finished),
        ) => {
            messages.current.push(Envelope::TestRunHookFinished(finished));
            Ok(State::RunHookFinished { spec, messages })
        }

        (
            State::TestStarted { spec, mut messages, .. }
            | State::StepFinished { spec, mut messages, .. },
            Event::TestCaseFinished(finished),
        ) => {
            messages.current.push(Envelope::TestCaseFinished(finished));
            Ok(State::TestFinished { spec, messages })
        }

        (
            State::StepStarted {
                spec,
                mut messages,
                test_case_started_id,
                test_step_id,
            },
            Event::Attachment {
                attachment,
                timestamp,
            },
        ) => {
            messages.current.push(attachment_envelope(
                attachment,
                timestamp,
                AttachmentTarget::Step {
                    test_case_started_id: test_case_started_id.clone(),
                    test_step_id: test_step_id.clone(),
                },
            ));
            Ok(State::StepStarted {
                spec,
                messages,
                test_case_started_id,
                test_step_id,
            })
        }

        (
            State::RunHookStarted {
                spec,
                mut messages,
                test_run_hook_started_id,
            },
            Event::Attachment {
                attachment,
                timestamp,
            },
        ) => {
            messages.current.push(attachment_envelope(
                attachment,
                timestamp,
                AttachmentTarget::RunHook {
                    test_run_hook_started_id: test_run_hook_started_id.clone(),
                },
            ));
            Ok(State::RunHookStarted {
                spec,
                messages,
                test_run_hook_started_id,
            })
        }

        (
            State::StepStarted {
                spec,
                mut messages,
                test_case_started_id,
                test_step_id,
            },
            Event::Suggestion(suggestion),
        ) => {
            messages.current.push(Envelope::Suggestion(suggestion));
            Ok(State::StepStarted {
                spec,
                messages,
                test_case_started_id,
                test_step_id,
            })
        }

        // A crashed host or a failed hook can leave the spec anywhere.
        (state, Event::AfterSpec { disposition, .. })
            if disposition != SpecDisposition::Keep && state.is_within_spec() =>
        {
            Ok(State::AfterSpec {
                accumulation: state.into_accumulation(),
            })
        }

        (State::BeforeSpec { accumulation, .. }, Event::AfterSpec { .. }) => {
            Ok(State::AfterSpec { accumulation })
        }

        (
            State::TestFinished { messages, .. }
            | State::RunHookFinished { messages, .. }
            | State::ReceivedEnvelopes { messages, .. },
            Event::AfterSpec { disposition, .. },
        ) => {
            let SpecMessages {
                mut accumulation,
                current,
            } = messages;
            if disposition == SpecDisposition::Keep {
                accumulation.extend(current);
                accumulation = order_messages(accumulation);
            }
            Ok(State::AfterSpec { accumulation })
        }

        (
            State::AfterSpec { mut accumulation } | State::BeforeRun { mut accumulation },
            Event::AfterRun(finished),
        ) => {
            accumulation.push(Envelope::TestRunFinished(finished));
            Ok(State::AfterRun {
                accumulation: remove_duplicated_step_definitions(accumulation),
            })
        }

        (state, _) => Err(Rejected { handler, state }),
    }
}

fn test_started(
    spec: Spec,
    mut messages: SpecMessages,
    started: crate::messages::TestCaseStarted,
) -> State {
    let test_case_started_id = started.id.clone();
    messages.current.push(Envelope::TestCaseStarted(started));
    State::TestStarted {
        spec,
        messages,
        test_case_started_id,
    }
}
