//! Step definitions, hooks and parameter types.
//!
//! A [`RegistryBuilder`] collects registrations; finalizing it yields an
//! immutable [`Registry`] that is shared by `Arc` for the rest of the spec.

mod builder;
mod data_table;
mod handlers;

use std::fmt;

pub use builder::RegistryBuilder;
pub use data_table::DataTable;
pub use handlers::{
    CaseHookCall, CaseHookHandler, HandlerResult, RunHookCall, RunHookHandler, StepArgument,
    StepCall, StepHandler, StepHookCall, StepHookHandler, StepOutcome,
};

use crate::expressions::{Argument, ExpressionError, ParameterTypeRegistry, StepExpression};
use crate::messages::{self, HookType, SourceReference, StepDefinitionPattern};
use crate::tags::{TagExpression, TagExpressionError};

/// Order given to hooks that do not specify one.
pub const DEFAULT_HOOK_ORDER: i64 = 10000;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    #[error(transparent)]
    TagExpression(#[from] TagExpressionError),

    #[error("{0} hooks cannot be filtered by tags")]
    TaggedRunHook(HookKeyword),
}

/// No single step definition matched a step's text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StepMatchError {
    #[error("Step implementation missing for \"{text}\"")]
    Missing { text: String },

    #[error("Multiple matching step definitions for: {text}\n{candidates}")]
    Ambiguous { text: String, candidates: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKeyword {
    Before,
    After,
    BeforeStep,
    AfterStep,
    BeforeAll,
    AfterAll,
}

impl HookKeyword {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKeyword::Before => "Before",
            HookKeyword::After => "After",
            HookKeyword::BeforeStep => "BeforeStep",
            HookKeyword::AfterStep => "AfterStep",
            HookKeyword::BeforeAll => "BeforeAll",
            HookKeyword::AfterAll => "AfterAll",
        }
    }

    pub fn hook_type(self) -> HookType {
        match self {
            HookKeyword::Before => HookType::BeforeTestCase,
            HookKeyword::After => HookType::AfterTestCase,
            HookKeyword::BeforeStep => HookType::BeforeTestStep,
            HookKeyword::AfterStep => HookType::AfterTestStep,
            HookKeyword::BeforeAll => HookType::BeforeTestRun,
            HookKeyword::AfterAll => HookType::AfterTestRun,
        }
    }
}

impl fmt::Display for HookKeyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional settings of a hook registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookOptions {
    pub name: Option<String>,
    /// Tag expression the pickle's tags must satisfy.
    pub tags: Option<String>,
    /// Lower runs first. Defaults to [`DEFAULT_HOOK_ORDER`].
    pub order: Option<i64>,
}

impl HookOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn tagged(tags: impl Into<String>) -> Self {
        Self {
            tags: Some(tags.into()),
            ..Self::default()
        }
    }

    pub fn with_order(mut self, order: i64) -> Self {
        self.order = Some(order);
        self
    }
}

fn describe(name: Option<&str>, tags: Option<&str>) -> Option<String> {
    match (name, tags) {
        (None, None) => None,
        (Some(name), None) => Some(name.to_string()),
        (None, Some(tags)) => Some(tags.to_string()),
        (Some(name), Some(tags)) => Some(format!("{name} ({tags})")),
    }
}

pub struct StepDefinition<W> {
    id: String,
    expression: StepExpression,
    handler: StepHandler<W>,
    source: SourceReference,
}

impl<W> StepDefinition<W> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn expression(&self) -> &StepExpression {
        &self.expression
    }

    pub fn source_reference(&self) -> &SourceReference {
        &self.source
    }

    pub fn run(&self, world: &mut W, call: &mut StepCall) -> HandlerResult {
        (self.handler)(world, call)
    }

    pub fn to_message(&self) -> messages::StepDefinition {
        messages::StepDefinition {
            id: self.id.clone(),
            pattern: StepDefinitionPattern {
                source: self.expression.source().to_string(),
                pattern_type: self.expression.pattern_type(),
            },
            source_reference: self.source.clone(),
        }
    }

    fn location_label(&self) -> String {
        let uri = self.source.uri.as_deref().unwrap_or(messages::SOURCE_NOT_AVAILABLE);
        match &self.source.location {
            Some(location) => format!("{uri}:{}", location.line),
            None => uri.to_string(),
        }
    }
}

/// A Before / After hook.
pub struct CaseHook<W> {
    id: String,
    keyword: HookKeyword,
    name: Option<String>,
    tags: Option<String>,
    filter: TagExpression,
    order: i64,
    handler: CaseHookHandler<W>,
    source: SourceReference,
}

impl<W> CaseHook<W> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keyword(&self) -> HookKeyword {
        self.keyword
    }

    pub fn order(&self) -> i64 {
        self.order
    }

    pub fn description(&self) -> Option<String> {
        describe(self.name.as_deref(), self.tags.as_deref())
    }

    pub fn run(&self, world: &mut W, call: &mut CaseHookCall<'_>) -> HandlerResult {
        (self.handler)(world, call)
    }

    pub fn to_message(&self) -> messages::Hook {
        messages::Hook {
            id: self.id.clone(),
            name: self.name.clone(),
            source_reference: self.source.clone(),
            tag_expression: self.tags.clone(),
            hook_type: Some(self.keyword.hook_type()),
        }
    }
}

/// A BeforeStep / AfterStep hook.
pub struct StepHook<W> {
    id: String,
    keyword: HookKeyword,
    name: Option<String>,
    tags: Option<String>,
    filter: TagExpression,
    order: i64,
    handler: StepHookHandler<W>,
    source: SourceReference,
}

impl<W> StepHook<W> {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keyword(&self) -> HookKeyword {
        self.keyword
    }

    pub fn description(&self) -> Option<String> {
        describe(self.name.as_deref(), self.tags.as_deref())
    }

    pub fn run(&self, world: &mut W, call: &mut StepHookCall<'_>) -> HandlerResult {
        (self.handler)(world, call)
    }

    pub fn to_message(&self) -> messages::Hook {
        messages::Hook {
            id: self.id.clone(),
            name: self.name.clone(),
            source_reference: self.source.clone(),
            tag_expression: self.tags.clone(),
            hook_type: Some(self.keyword.hook_type()),
        }
    }
}

/// A BeforeAll / AfterAll hook.
pub struct RunHook {
    id: String,
    keyword: HookKeyword,
    name: Option<String>,
    order: i64,
    handler: RunHookHandler,
    source: SourceReference,
}

impl RunHook {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn keyword(&self) -> HookKeyword {
        self.keyword
    }

    pub fn description(&self) -> Option<String> {
        self.name.clone()
    }

    pub fn run(&self, call: &mut RunHookCall) -> HandlerResult {
        (self.handler)(call)
    }

    pub fn to_message(&self) -> messages::Hook {
        messages::Hook {
            id: self.id.clone(),
            name: self.name.clone(),
            source_reference: self.source.clone(),
            tag_expression: None,
            hook_type: Some(self.keyword.hook_type()),
        }
    }
}

/// A step definition that matched a step's text, with its arguments.
pub struct StepMatch<'a, W> {
    pub definition: &'a StepDefinition<W>,
    pub arguments: Vec<Argument>,
}

/// Finalized, read-only registry.
pub struct Registry<W> {
    parameter_types: ParameterTypeRegistry,
    step_definitions: Vec<StepDefinition<W>>,
    case_hooks: Vec<CaseHook<W>>,
    step_hooks: Vec<StepHook<W>>,
    run_hooks: Vec<RunHook>,
}

impl<W> Registry<W> {
    pub fn parameter_types(&self) -> &ParameterTypeRegistry {
        &self.parameter_types
    }

    pub fn step_definitions(&self) -> &[StepDefinition<W>] {
        &self.step_definitions
    }

    pub fn case_hooks(&self) -> &[CaseHook<W>] {
        &self.case_hooks
    }

    pub fn step_hooks(&self) -> &[StepHook<W>] {
        &self.step_hooks
    }

    pub fn run_hooks(&self) -> &[RunHook] {
        &self.run_hooks
    }

    /// Every step definition whose pattern matches `text`, in registration
    /// order.
    pub fn matching_step_definitions(&self, text: &str) -> Vec<StepMatch<'_, W>> {
        self.step_definitions
            .iter()
            .filter_map(|definition| {
                definition
                    .expression
                    .match_text(text)
                    .map(|arguments| StepMatch {
                        definition,
                        arguments,
                    })
            })
            .collect()
    }

    /// The one step definition matching `text`.
    pub fn resolve_step_definition(&self, text: &str) -> Result<StepMatch<'_, W>, StepMatchError> {
        let mut matches = self.matching_step_definitions(text);
        match matches.len() {
            0 => Err(StepMatchError::Missing {
                text: text.to_string(),
            }),
            1 => Ok(matches.remove(0)),
            _ => Err(StepMatchError::Ambiguous {
                text: text.to_string(),
                candidates: matches
                    .iter()
                    .map(|m| {
                        format!(
                            "  {} - {}",
                            m.definition.expression.source(),
                            m.definition.location_label()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            }),
        }
    }

    pub fn resolve_before_hooks<S: AsRef<str>>(&self, tags: &[S]) -> Vec<&CaseHook<W>> {
        self.resolve_case_hooks(HookKeyword::Before, tags)
    }

    pub fn resolve_after_hooks<S: AsRef<str>>(&self, tags: &[S]) -> Vec<&CaseHook<W>> {
        self.resolve_case_hooks(HookKeyword::After, tags)
    }

    pub fn resolve_before_step_hooks<S: AsRef<str>>(&self, tags: &[S]) -> Vec<&StepHook<W>> {
        self.resolve_step_hooks(HookKeyword::BeforeStep, tags)
    }

    pub fn resolve_after_step_hooks<S: AsRef<str>>(&self, tags: &[S]) -> Vec<&StepHook<W>> {
        self.resolve_step_hooks(HookKeyword::AfterStep, tags)
    }

    pub fn resolve_before_all_hooks(&self) -> Vec<&RunHook> {
        self.resolve_run_hooks(HookKeyword::BeforeAll)
    }

    pub fn resolve_after_all_hooks(&self) -> Vec<&RunHook> {
        self.resolve_run_hooks(HookKeyword::AfterAll)
    }

    fn resolve_case_hooks<S: AsRef<str>>(
        &self,
        keyword: HookKeyword,
        tags: &[S],
    ) -> Vec<&CaseHook<W>> {
        let mut hooks: Vec<_> = self
            .case_hooks
            .iter()
            .filter(|hook| hook.keyword == keyword && hook.filter.evaluate(tags))
            .collect();
        hooks.sort_by_key(|hook| hook.order);
        hooks
    }

    fn resolve_step_hooks<S: AsRef<str>>(
        &self,
        keyword: HookKeyword,
        tags: &[S],
    ) -> Vec<&StepHook<W>> {
        let mut hooks: Vec<_> = self
            .step_hooks
            .iter()
            .filter(|hook| hook.keyword == keyword && hook.filter.evaluate(tags))
            .collect();
        hooks.sort_by_key(|hook| hook.order);
        hooks
    }

    fn resolve_run_hooks(&self, keyword: HookKeyword) -> Vec<&RunHook> {
        let mut hooks: Vec<_> = self
            .run_hooks
            .iter()
            .filter(|hook| hook.keyword == keyword)
            .collect();
        hooks.sort_by_key(|hook| hook.order);
        hooks
    }
}
