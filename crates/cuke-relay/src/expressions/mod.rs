//! Step-text matching: cucumber expressions, regular expressions, parameter
//! types and snippet expression generation.

mod argument;
mod cucumber;
mod generator;
mod parameter;
mod regular;
mod tree_regexp;

pub use argument::Argument;
pub use cucumber::CucumberExpression;
pub use generator::{CucumberExpressionGenerator, GeneratedExpression};
pub use parameter::{ParameterType, ParameterTypeRegistry, Transformer};
pub use regular::RegularExpression;
pub use tree_regexp::{GroupBuilder, TreeRegexp};

use crate::messages::StepDefinitionPatternType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExpressionError {
    #[error("Undefined parameter type {{{name}}} in expression \"{expression}\"")]
    UndefinedParameterType { name: String, expression: String },

    #[error("{message} in expression \"{expression}\"")]
    Syntax { expression: String, message: String },

    #[error("Invalid regular expression /{pattern}/: {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("There is already a parameter type with name {0}")]
    DuplicateParameterType(String),

    #[error(
        "There can only be one preferential parameter type per regexp. The regexp /{regexp}/ is used for two preferential parameter types, {{{first}}} and {{{second}}}"
    )]
    DuplicatePreferential {
        regexp: String,
        first: String,
        second: String,
    },

    #[error(
        "Your Regular Expression /{expression}/ matches multiple parameter types with regexp /{regexp}/: {candidates}. Define one of them as preferential."
    )]
    AmbiguousParameterType {
        expression: String,
        regexp: String,
        candidates: String,
    },

    #[error(
        "Illegal character in parameter name {{{0}}}. Parameter names may not contain '{{', '}}', '(', ')', '\\' or '/'"
    )]
    IllegalParameterName(String),
}

/// Where a step definition's pattern came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepPattern {
    Cucumber(String),
    Regex(String),
}

impl StepPattern {
    pub fn source(&self) -> &str {
        match self {
            StepPattern::Cucumber(source) | StepPattern::Regex(source) => source,
        }
    }
}

impl From<&str> for StepPattern {
    fn from(source: &str) -> Self {
        StepPattern::Cucumber(source.to_string())
    }
}

impl From<String> for StepPattern {
    fn from(source: String) -> Self {
        StepPattern::Cucumber(source)
    }
}

impl From<regex::Regex> for StepPattern {
    fn from(regex: regex::Regex) -> Self {
        StepPattern::Regex(regex.as_str().to_string())
    }
}

/// A compiled step pattern.
#[derive(Debug, Clone)]
pub enum StepExpression {
    Cucumber(CucumberExpression),
    Regular(RegularExpression),
}

impl StepExpression {
    pub fn compile(
        pattern: &StepPattern,
        registry: &ParameterTypeRegistry,
    ) -> Result<Self, ExpressionError> {
        match pattern {
            StepPattern::Cucumber(source) => {
                CucumberExpression::new(source, registry).map(StepExpression::Cucumber)
            }
            StepPattern::Regex(source) => {
                RegularExpression::new(source, registry).map(StepExpression::Regular)
            }
        }
    }

    pub fn source(&self) -> &str {
        match self {
            StepExpression::Cucumber(expression) => expression.source(),
            StepExpression::Regular(expression) => expression.source(),
        }
    }

    pub fn pattern_type(&self) -> StepDefinitionPatternType {
        match self {
            StepExpression::Cucumber(_) => StepDefinitionPatternType::CucumberExpression,
            StepExpression::Regular(_) => StepDefinitionPatternType::RegularExpression,
        }
    }

    /// Arguments when `text` matches, `None` otherwise.
    pub fn match_text(&self, text: &str) -> Option<Vec<Argument>> {
        match self {
            StepExpression::Cucumber(expression) => expression.match_text(text),
            StepExpression::Regular(expression) => expression.match_text(text),
        }
    }
}
