//! Glue definitions and compiled test cases.

use serde::{Deserialize, Serialize};

use super::Location;

/// URI used when a definition's source position is unknown.
pub const SOURCE_NOT_AVAILABLE: &str = "not available";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl SourceReference {
    pub fn not_available() -> Self {
        Self {
            uri: Some(SOURCE_NOT_AVAILABLE.to_string()),
            location: Some(Location::new(0, 0)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepDefinitionPatternType {
    CucumberExpression,
    RegularExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinitionPattern {
    pub source: String,
    #[serde(rename = "type")]
    pub pattern_type: StepDefinitionPatternType,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: String,
    pub pattern: StepDefinitionPattern,
    pub source_reference: SourceReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HookType {
    BeforeTestRun,
    AfterTestRun,
    BeforeTestCase,
    AfterTestCase,
    BeforeTestStep,
    AfterTestStep,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hook {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub source_reference: SourceReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_expression: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub hook_type: Option<HookType>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterType {
    pub id: String,
    pub name: String,
    pub regular_expressions: Vec<String>,
    pub prefer_for_regular_expression_match: bool,
    pub use_for_snippets: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<SourceReference>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub pickle_id: String,
    #[serde(default)]
    pub test_steps: Vec<TestStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_run_started_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStep {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pickle_step_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_definition_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_match_arguments_lists: Option<Vec<StepMatchArgumentsList>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMatchArgumentsList {
    pub step_match_arguments: Vec<StepMatchArgument>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMatchArgument {
    pub group: Group,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_type_name: Option<String>,
}

/// A capture group and its nested groups, positioned in the step text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Group {
    #[serde(default)]
    pub children: Vec<Group>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Group {
    /// Values handed to a parameter transformer: the children's values when
    /// there are nested groups, otherwise this group's own value.
    pub fn values(&self) -> Vec<Option<&str>> {
        if self.children.is_empty() {
            vec![self.value.as_deref()]
        } else {
            self.children.iter().map(|child| child.value.as_deref()).collect()
        }
    }
}
