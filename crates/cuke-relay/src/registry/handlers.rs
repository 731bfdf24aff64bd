//! What handlers receive and return.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::attachments::{Attach, Attachments};
use crate::messages::{GherkinDocument, Pickle, PickleStep};

use super::DataTable;

/// How a handler finished, short of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepOutcome {
    #[default]
    Passed,
    /// Not implemented yet. The rest of the test is skipped.
    Pending,
    /// Skip the rest of the test.
    Skipped,
}

pub type HandlerResult = anyhow::Result<StepOutcome>;

/// The argument attached to a pickle step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepArgument {
    DataTable(DataTable),
    DocString(String),
}

/// Parameter of a step definition handler.
#[derive(Debug)]
pub struct StepCall {
    pub text: String,
    pub args: Vec<Value>,
    pub argument: Option<StepArgument>,
    attachments: Attachments,
}

impl StepCall {
    pub fn new(text: impl Into<String>, args: Vec<Value>, argument: Option<StepArgument>) -> Self {
        Self {
            text: text.into(),
            args,
            argument,
            attachments: Attachments::new(),
        }
    }

    /// The `index`th matched argument, deserialized.
    pub fn arg<T: DeserializeOwned>(&self, index: usize) -> anyhow::Result<T> {
        let value = self.args.get(index).ok_or_else(|| {
            anyhow::anyhow!(
                "step \"{}\" has {} argument(s), asked for #{}",
                self.text,
                self.args.len(),
                index
            )
        })?;
        Ok(serde_json::from_value(value.clone())?)
    }

    pub fn data_table(&self) -> Option<&DataTable> {
        match &self.argument {
            Some(StepArgument::DataTable(table)) => Some(table),
            _ => None,
        }
    }

    pub fn doc_string(&self) -> Option<&str> {
        match &self.argument {
            Some(StepArgument::DocString(content)) => Some(content),
            _ => None,
        }
    }

    pub fn into_attachments(self) -> Attachments {
        self.attachments
    }
}

impl Attach for StepCall {
    fn attachments(&mut self) -> &mut Attachments {
        &mut self.attachments
    }
}

/// Parameter of a Before / After hook.
#[derive(Debug)]
pub struct CaseHookCall<'a> {
    pub pickle: &'a Pickle,
    pub document: &'a GherkinDocument,
    pub test_case_started_id: &'a str,
    attachments: Attachments,
}

impl<'a> CaseHookCall<'a> {
    pub fn new(
        pickle: &'a Pickle,
        document: &'a GherkinDocument,
        test_case_started_id: &'a str,
    ) -> Self {
        Self {
            pickle,
            document,
            test_case_started_id,
            attachments: Attachments::new(),
        }
    }

    pub fn into_attachments(self) -> Attachments {
        self.attachments
    }
}

impl Attach for CaseHookCall<'_> {
    fn attachments(&mut self) -> &mut Attachments {
        &mut self.attachments
    }
}

/// Parameter of a BeforeStep / AfterStep hook.
#[derive(Debug)]
pub struct StepHookCall<'a> {
    pub pickle: &'a Pickle,
    pub pickle_step: &'a PickleStep,
    pub document: &'a GherkinDocument,
    pub test_case_started_id: &'a str,
    pub test_step_id: &'a str,
    attachments: Attachments,
}

impl<'a> StepHookCall<'a> {
    pub fn new(
        pickle: &'a Pickle,
        pickle_step: &'a PickleStep,
        document: &'a GherkinDocument,
        test_case_started_id: &'a str,
        test_step_id: &'a str,
    ) -> Self {
        Self {
            pickle,
            pickle_step,
            document,
            test_case_started_id,
            test_step_id,
            attachments: Attachments::new(),
        }
    }

    pub fn into_attachments(self) -> Attachments {
        self.attachments
    }
}

impl Attach for StepHookCall<'_> {
    fn attachments(&mut self) -> &mut Attachments {
        &mut self.attachments
    }
}

/// Parameter of a BeforeAll / AfterAll hook.
#[derive(Debug, Default)]
pub struct RunHookCall {
    attachments: Attachments,
}

impl RunHookCall {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_attachments(self) -> Attachments {
        self.attachments
    }
}

impl Attach for RunHookCall {
    fn attachments(&mut self) -> &mut Attachments {
        &mut self.attachments
    }
}

pub type StepHandler<W> = Arc<dyn Fn(&mut W, &mut StepCall) -> HandlerResult + Send + Sync>;
pub type CaseHookHandler<W> =
    Arc<dyn Fn(&mut W, &mut CaseHookCall<'_>) -> HandlerResult + Send + Sync>;
pub type StepHookHandler<W> =
    Arc<dyn Fn(&mut W, &mut StepHookCall<'_>) -> HandlerResult + Send + Sync>;
pub type RunHookHandler = Arc<dyn Fn(&mut RunHookCall) -> HandlerResult + Send + Sync>;
