use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::ast::AstIndex;
use crate::error::{CucumberError, Ensure};
use crate::ids::IdGenerator;
use crate::messages::{Envelope, GherkinDocument, Pickle, Timestamp};
use crate::registry::Registry;
use crate::snippets::StepDefinitionHints;
use crate::tags::TagExpression;
use crate::time::Clock;

/// An included pickle waiting for its turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncludedPickle {
    pub pickle_id: String,
    /// Filtered out; reported as skipped when it reaches the head.
    pub will_be_skipped: bool,
}

/// A step of a test case: a Before/After hook or a pickle step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRef {
    Hook(String),
    PickleStep(String),
}

impl StepRef {
    /// The hook id or pickle step id.
    pub fn id(&self) -> &str {
        match self {
            StepRef::Hook(id) | StepRef::PickleStep(id) => id,
        }
    }
}

/// The step that has been started and not yet finished.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentStep {
    pub step: StepRef,
    pub started: Timestamp,
}

/// Bookkeeping of one test across its attempts.
#[derive(Debug, Clone, PartialEq)]
pub struct TestProperties {
    pub pickle_id: String,
    pub test_case_started_id: String,
    pub attempt: u32,
    pub current_step: Option<CurrentStep>,
    pub all_steps: Vec<StepRef>,
    pub remaining_steps: VecDeque<StepRef>,
}

impl TestProperties {
    pub(crate) fn new(
        pickle_id: String,
        test_case_started_id: String,
        all_steps: Vec<StepRef>,
    ) -> Self {
        Self {
            pickle_id,
            test_case_started_id,
            attempt: 0,
            current_step: None,
            remaining_steps: all_steps.iter().cloned().collect(),
            all_steps,
        }
    }
}

/// Everything one spec file needs while its tests run.
pub struct CompositionContext<W> {
    pub(crate) registry: Arc<Registry<W>>,
    pub(crate) document: Arc<GherkinDocument>,
    pub(crate) ast: AstIndex,
    pub(crate) filter: TagExpression,
    pub(crate) pickles: Vec<Arc<Pickle>>,
    pub(crate) included: VecDeque<IncludedPickle>,
    pub(crate) spec_envelopes: Vec<Envelope>,
    /// pickle id -> (hook id or pickle step id) -> test step id
    pub(crate) test_step_ids: HashMap<String, HashMap<String, String>>,
    /// Case steps of every included pickle, before hooks to after hooks.
    pub(crate) case_steps: HashMap<String, Vec<StepRef>>,
    pub(crate) tests: HashMap<String, TestProperties>,
    pub(crate) dry_run: bool,
    pub(crate) soft_errors: bool,
    pub(crate) omit_filtered: bool,
    pub(crate) is_tracking: bool,
    pub(crate) hints: StepDefinitionHints,
    pub(crate) test_run_started_id: String,
    pub(crate) ids: Box<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl<W> CompositionContext<W> {
    pub fn registry(&self) -> &Registry<W> {
        &self.registry
    }

    pub fn document(&self) -> &GherkinDocument {
        &self.document
    }

    pub fn ast(&self) -> &AstIndex {
        &self.ast
    }

    pub fn filter(&self) -> &TagExpression {
        &self.filter
    }

    pub fn spec_envelopes(&self) -> &[Envelope] {
        &self.spec_envelopes
    }

    pub fn is_omitting_filtered(&self) -> bool {
        self.omit_filtered
    }

    /// Pickles not yet run or reported, head first.
    pub fn included(&self) -> impl Iterator<Item = &IncludedPickle> {
        self.included.iter()
    }

    pub fn properties(&self, pickle_id: &str) -> Option<&TestProperties> {
        self.tests.get(pickle_id)
    }

    pub(crate) fn pickle(&self, pickle_id: &str) -> Result<Arc<Pickle>, CucumberError> {
        self.pickles
            .iter()
            .find(|pickle| pickle.id == pickle_id)
            .cloned()
            .ensure_with(|| format!("Expected to find a pickle with id = {pickle_id}"))
    }

    pub(crate) fn test_step_id(
        &self,
        pickle_id: &str,
        step: &StepRef,
    ) -> Result<String, CucumberError> {
        self.test_step_ids
            .get(pickle_id)
            .ensure_with(|| format!("Expected to find test step IDs for pickle = {pickle_id}"))?
            .get(step.id())
            .cloned()
            .ensure_with(|| {
                format!(
                    "Expected to find test step ID for pickle = {pickle_id} and hook or step = {}",
                    step.id()
                )
            })
    }

    pub(crate) fn take_properties(
        &mut self,
        pickle_id: &str,
    ) -> Result<TestProperties, CucumberError> {
        self.tests
            .remove(pickle_id)
            .ensure_with(|| {
                format!("Expected to find internal properties for pickle = {pickle_id}")
            })
    }

    pub(crate) fn new_id(&mut self) -> String {
        self.ids.new_id()
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.clock.now()
    }
}
