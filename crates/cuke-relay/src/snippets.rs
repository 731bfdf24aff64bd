//! Snippets and remediation text for steps without a definition.

use crate::expressions::{CucumberExpressionGenerator, GeneratedExpression, ParameterTypeRegistry};
use crate::messages::{PickleStep, PickleStepType, Snippet};

/// Language tag on emitted `suggestion` snippets.
pub const SNIPPET_LANGUAGE: &str = "rust";

/// Where step definitions were searched for, shown when one is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepDefinitionHints {
    /// Configured search templates.
    pub step_definitions: Vec<String>,
    /// The templates with `[filepath]` / `[filepart]` resolved.
    pub step_definition_patterns: Vec<String>,
    /// Files the patterns matched.
    pub step_definition_paths: Vec<String>,
}

const NO_STEP_DEFINITION_PATHS_TEMPLATE: &str = "\
Step implementation missing for \"<text>\".

We tried searching for files containing step definitions using the following search pattern templates:

<step-definitions>

These templates resolved to the following search patterns:

<step-definition-patterns>

These patterns matched **no files** containing step definitions. This almost certainly means that you have misconfigured `stepDefinitions`.

You can implement it using the suggestion(s) below.

<snippets>
";

const SOME_STEP_DEFINITION_PATHS_TEMPLATE: &str = "\
Step implementation missing for \"<text>\".

We tried searching for files containing step definitions using the following search pattern templates:

<step-definitions>

These templates resolved to the following search patterns:

<step-definition-patterns>

These patterns matched the following files:

<step-definition-paths>

However, none of these files contained a step definition matching \"<text>\".

You can implement it using the suggestion(s) below.

<snippets>
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtraParameter {
    DataTable,
    DocString,
}

fn extra_parameter(step: &PickleStep) -> Option<ExtraParameter> {
    let argument = step.argument.as_ref()?;
    if argument.data_table.is_some() {
        Some(ExtraParameter::DataTable)
    } else if argument.doc_string.is_some() {
        Some(ExtraParameter::DocString)
    } else {
        None
    }
}

fn registration_method(step_type: Option<PickleStepType>) -> &'static str {
    match step_type {
        Some(PickleStepType::Action) => "when",
        Some(PickleStepType::Outcome) => "then",
        _ => "given",
    }
}

fn rust_type(parameter_type_name: &str) -> &'static str {
    match parameter_type_name {
        "int" | "biginteger" | "long" | "short" | "byte" => "i64",
        "float" | "double" | "bigdecimal" => "f64",
        "string" | "word" | "" => "String",
        _ => "serde_json::Value",
    }
}

fn escape_rust_string(source: &str) -> String {
    source.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Registration code for one suggested expression.
pub fn generate_snippet(expression: &GeneratedExpression, step: &PickleStep) -> String {
    let method = registration_method(step.step_type);
    let mut body = Vec::new();
    for (index, (name, parameter_type)) in expression
        .parameter_names()
        .iter()
        .zip(expression.parameter_types())
        .enumerate()
    {
        let binding = if name.is_empty() { format!("arg{index}") } else { name.clone() };
        body.push(format!(
            "    let {binding}: {} = step.arg({index})?;",
            rust_type(parameter_type.name())
        ));
    }
    match extra_parameter(step) {
        Some(ExtraParameter::DataTable) => {
            body.push("    let table = step.data_table();".to_string())
        }
        Some(ExtraParameter::DocString) => {
            body.push("    let doc_string = step.doc_string();".to_string())
        }
        None => {}
    }
    body.push(
        "    // Write code here that turns the phrase above into concrete actions".to_string(),
    );
    body.push("    Ok(StepOutcome::Pending)".to_string());

    format!(
        "registry.{method}(\"{}\", |world, step| {{\n{}\n}});",
        escape_rust_string(expression.source()),
        body.join("\n")
    )
}

/// Snippets for every expression suggested for `step`.
pub fn generate_snippets(
    step: &PickleStep,
    parameter_types: &ParameterTypeRegistry,
) -> Vec<String> {
    CucumberExpressionGenerator::new(parameter_types)
        .generate_expressions(&step.text)
        .iter()
        .map(|expression| generate_snippet(expression, step))
        .collect()
}

/// The same snippets in `suggestion` message shape.
pub fn suggestion_snippets(
    step: &PickleStep,
    parameter_types: &ParameterTypeRegistry,
) -> Vec<Snippet> {
    generate_snippets(step, parameter_types)
        .into_iter()
        .map(|code| Snippet {
            language: SNIPPET_LANGUAGE.to_string(),
            code,
        })
        .collect()
}

fn indent(text: &str, count: usize) -> String {
    let padding = " ".repeat(count);
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{padding}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn pretty_print_list(items: &[String], escape_globs: bool) -> String {
    items
        .iter()
        .map(|item| {
            if escape_globs {
                format!("  - {}", item.replace('*', "\\*"))
            } else {
                format!("  - {item}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remediation text for a step without a definition.
///
/// `escape_globs` escapes `*` for outputs that render markdown.
pub fn missing_step_definition_message(
    step: &PickleStep,
    hints: &StepDefinitionHints,
    parameter_types: &ParameterTypeRegistry,
    escape_globs: bool,
) -> String {
    let template = if hints.step_definition_paths.is_empty() {
        NO_STEP_DEFINITION_PATHS_TEMPLATE
    } else {
        SOME_STEP_DEFINITION_PATHS_TEMPLATE
    };

    let snippets = generate_snippets(step, parameter_types)
        .iter()
        .map(|snippet| indent(snippet, 2))
        .collect::<Vec<_>>()
        .join("\n\n");

    template
        .replace("<text>", &step.text)
        .replace(
            "<step-definitions>",
            &pretty_print_list(&hints.step_definitions, escape_globs),
        )
        .replace(
            "<step-definition-patterns>",
            &pretty_print_list(&hints.step_definition_patterns, escape_globs),
        )
        .replace(
            "<step-definition-paths>",
            &pretty_print_list(&hints.step_definition_paths, escape_globs),
        )
        .replace("<snippets>", &snippets)
}
