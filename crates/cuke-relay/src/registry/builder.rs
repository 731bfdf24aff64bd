//! Collecting registrations before a run.

use std::panic::Location as CallerLocation;
use std::sync::Arc;

use crate::expressions::{ParameterType, ParameterTypeRegistry, StepExpression, StepPattern};
use crate::ids::IdGenerator;
use crate::messages::{Location, SourceReference};
use crate::tags::TagExpression;

use super::handlers::{
    CaseHookCall, CaseHookHandler, HandlerResult, RunHookCall, RunHookHandler, StepCall,
    StepHandler, StepHookCall, StepHookHandler,
};
use super::{
    CaseHook, HookKeyword, HookOptions, Registry, RegistryError, RunHook, StepDefinition,
    StepHook, DEFAULT_HOOK_ORDER,
};

struct PendingStep<W> {
    pattern: StepPattern,
    handler: StepHandler<W>,
    source: SourceReference,
}

struct PendingHook<H> {
    keyword: HookKeyword,
    options: HookOptions,
    handler: H,
    source: SourceReference,
}

/// Collects step definitions, hooks and parameter types.
///
/// Registration order is kept; [`RegistryBuilder::finalize`] compiles every
/// pattern and tag expression and assigns IDs in that order.
pub struct RegistryBuilder<W> {
    parameter_types: ParameterTypeRegistry,
    steps: Vec<PendingStep<W>>,
    case_hooks: Vec<PendingHook<CaseHookHandler<W>>>,
    step_hooks: Vec<PendingHook<StepHookHandler<W>>>,
    run_hooks: Vec<PendingHook<RunHookHandler>>,
}

impl<W> Default for RegistryBuilder<W> {
    fn default() -> Self {
        Self {
            parameter_types: ParameterTypeRegistry::new(),
            steps: Vec::new(),
            case_hooks: Vec::new(),
            step_hooks: Vec::new(),
            run_hooks: Vec::new(),
        }
    }
}

#[track_caller]
fn caller_source() -> SourceReference {
    let caller = CallerLocation::caller();
    SourceReference {
        uri: Some(caller.file().replace('\\', "/")),
        location: Some(Location::new(caller.line(), caller.column())),
    }
}

impl<W> RegistryBuilder<W> {
    pub fn new() -> Self {
        Self::default()
    }

    #[track_caller]
    pub fn given<P, F>(&mut self, pattern: P, handler: F) -> &mut Self
    where
        P: Into<StepPattern>,
        F: Fn(&mut W, &mut StepCall) -> HandlerResult + Send + Sync + 'static,
    {
        self.step(pattern, handler)
    }

    #[track_caller]
    pub fn when<P, F>(&mut self, pattern: P, handler: F) -> &mut Self
    where
        P: Into<StepPattern>,
        F: Fn(&mut W, &mut StepCall) -> HandlerResult + Send + Sync + 'static,
    {
        self.step(pattern, handler)
    }

    #[track_caller]
    pub fn then<P, F>(&mut self, pattern: P, handler: F) -> &mut Self
    where
        P: Into<StepPattern>,
        F: Fn(&mut W, &mut StepCall) -> HandlerResult + Send + Sync + 'static,
    {
        self.step(pattern, handler)
    }

    /// Register a step definition. The keyword used to register it does not
    /// restrict which steps it matches.
    #[track_caller]
    pub fn step<P, F>(&mut self, pattern: P, handler: F) -> &mut Self
    where
        P: Into<StepPattern>,
        F: Fn(&mut W, &mut StepCall) -> HandlerResult + Send + Sync + 'static,
    {
        let source = caller_source();
        self.steps.push(PendingStep {
            pattern: pattern.into(),
            handler: Arc::new(handler),
            source,
        });
        self
    }

    #[track_caller]
    pub fn before<F>(&mut self, options: HookOptions, handler: F) -> &mut Self
    where
        F: Fn(&mut W, &mut CaseHookCall<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.case_hook(HookKeyword::Before, options, Arc::new(handler))
    }

    #[track_caller]
    pub fn after<F>(&mut self, options: HookOptions, handler: F) -> &mut Self
    where
        F: Fn(&mut W, &mut CaseHookCall<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.case_hook(HookKeyword::After, options, Arc::new(handler))
    }

    #[track_caller]
    pub fn before_step<F>(&mut self, options: HookOptions, handler: F) -> &mut Self
    where
        F: Fn(&mut W, &mut StepHookCall<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.step_hook(HookKeyword::BeforeStep, options, Arc::new(handler))
    }

    #[track_caller]
    pub fn after_step<F>(&mut self, options: HookOptions, handler: F) -> &mut Self
    where
        F: Fn(&mut W, &mut StepHookCall<'_>) -> HandlerResult + Send + Sync + 'static,
    {
        self.step_hook(HookKeyword::AfterStep, options, Arc::new(handler))
    }

    #[track_caller]
    pub fn before_all<F>(&mut self, options: HookOptions, handler: F) -> &mut Self
    where
        F: Fn(&mut RunHookCall) -> HandlerResult + Send + Sync + 'static,
    {
        self.run_hook(HookKeyword::BeforeAll, options, Arc::new(handler))
    }

    #[track_caller]
    pub fn after_all<F>(&mut self, options: HookOptions, handler: F) -> &mut Self
    where
        F: Fn(&mut RunHookCall) -> HandlerResult + Send + Sync + 'static,
    {
        self.run_hook(HookKeyword::AfterAll, options, Arc::new(handler))
    }

    pub fn define_parameter_type(
        &mut self,
        parameter_type: ParameterType,
    ) -> Result<&mut Self, RegistryError> {
        self.parameter_types.define(parameter_type)?;
        Ok(self)
    }

    #[track_caller]
    fn case_hook(
        &mut self,
        keyword: HookKeyword,
        options: HookOptions,
        handler: CaseHookHandler<W>,
    ) -> &mut Self {
        let source = caller_source();
        self.case_hooks.push(PendingHook {
            keyword,
            options,
            handler,
            source,
        });
        self
    }

    #[track_caller]
    fn step_hook(
        &mut self,
        keyword: HookKeyword,
        options: HookOptions,
        handler: StepHookHandler<W>,
    ) -> &mut Self {
        let source = caller_source();
        self.step_hooks.push(PendingHook {
            keyword,
            options,
            handler,
            source,
        });
        self
    }

    #[track_caller]
    fn run_hook(
        &mut self,
        keyword: HookKeyword,
        options: HookOptions,
        handler: RunHookHandler,
    ) -> &mut Self {
        let source = caller_source();
        self.run_hooks.push(PendingHook {
            keyword,
            options,
            handler,
            source,
        });
        self
    }

    /// Compile patterns and tag expressions and assign IDs.
    ///
    /// IDs are drawn in a fixed order (step definitions, case hooks, step
    /// hooks, run hooks), so a seeded generator gives the same IDs for the
    /// same registrations.
    pub fn finalize(self, ids: &mut dyn IdGenerator) -> Result<Registry<W>, RegistryError> {
        let RegistryBuilder {
            parameter_types,
            steps,
            case_hooks,
            step_hooks,
            run_hooks,
        } = self;

        let mut step_definitions = Vec::with_capacity(steps.len());
        for pending in steps {
            let expression = StepExpression::compile(&pending.pattern, &parameter_types)?;
            step_definitions.push(StepDefinition {
                id: ids.new_id(),
                expression,
                handler: pending.handler,
                source: pending.source,
            });
        }

        let mut compiled_case_hooks = Vec::with_capacity(case_hooks.len());
        for pending in case_hooks {
            let filter = compile_tags(&pending.options)?;
            compiled_case_hooks.push(CaseHook {
                id: ids.new_id(),
                keyword: pending.keyword,
                name: pending.options.name,
                tags: pending.options.tags,
                filter,
                order: pending.options.order.unwrap_or(DEFAULT_HOOK_ORDER),
                handler: pending.handler,
                source: pending.source,
            });
        }

        let mut compiled_step_hooks = Vec::with_capacity(step_hooks.len());
        for pending in step_hooks {
            let filter = compile_tags(&pending.options)?;
            compiled_step_hooks.push(StepHook {
                id: ids.new_id(),
                keyword: pending.keyword,
                name: pending.options.name,
                tags: pending.options.tags,
                filter,
                order: pending.options.order.unwrap_or(DEFAULT_HOOK_ORDER),
                handler: pending.handler,
                source: pending.source,
            });
        }

        let mut compiled_run_hooks = Vec::with_capacity(run_hooks.len());
        for pending in run_hooks {
            if pending.options.tags.is_some() {
                return Err(RegistryError::TaggedRunHook(pending.keyword));
            }
            compiled_run_hooks.push(RunHook {
                id: ids.new_id(),
                keyword: pending.keyword,
                name: pending.options.name,
                order: pending.options.order.unwrap_or(DEFAULT_HOOK_ORDER),
                handler: pending.handler,
                source: pending.source,
            });
        }

        tracing::debug!(
            step_definitions = step_definitions.len(),
            case_hooks = compiled_case_hooks.len(),
            step_hooks = compiled_step_hooks.len(),
            run_hooks = compiled_run_hooks.len(),
            "finalized registry"
        );

        Ok(Registry {
            parameter_types,
            step_definitions,
            case_hooks: compiled_case_hooks,
            step_hooks: compiled_step_hooks,
            run_hooks: compiled_run_hooks,
        })
    }
}

fn compile_tags(options: &HookOptions) -> Result<TagExpression, RegistryError> {
    match &options.tags {
        Some(tags) => Ok(TagExpression::parse(tags)?),
        None => Ok(TagExpression::True),
    }
}
