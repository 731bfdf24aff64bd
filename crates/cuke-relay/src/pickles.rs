//! Compiling a parsed Gherkin document into pickles.
//!
//! This is not a Gherkin parser: the input is the already-parsed document.
//! It resolves backgrounds, rules, tag inheritance and outline rows the same
//! way the reference Gherkin compiler does.

use crate::ids::IdGenerator;
use crate::messages::{
    FeatureChild, GherkinDocument, Pickle, PickleDocString, PickleStep, PickleStepArgument,
    PickleStepType, PickleTable, PickleTag, RuleChild, Scenario, Step, StepKeywordType, Tag,
    TableRow,
};

struct Scope<'a> {
    uri: &'a str,
    language: &'a str,
    tags: Vec<&'a Tag>,
    background: Vec<&'a Step>,
}

pub fn compile(document: &GherkinDocument, ids: &mut dyn IdGenerator) -> Vec<Pickle> {
    let mut pickles = Vec::new();
    let Some(feature) = &document.feature else {
        return pickles;
    };

    let mut scope = Scope {
        uri: document.uri.as_deref().unwrap_or_default(),
        language: &feature.language,
        tags: feature.tags.iter().collect(),
        background: Vec::new(),
    };

    for child in &feature.children {
        match child {
            FeatureChild::Background(background) => {
                scope.background.extend(background.steps.iter());
            }
            FeatureChild::Scenario(scenario) => {
                compile_scenario_or_outline(&scope, scenario, ids, &mut pickles);
            }
            FeatureChild::Rule(rule) => {
                let mut rule_scope = Scope {
                    uri: scope.uri,
                    language: scope.language,
                    tags: scope.tags.iter().copied().chain(rule.tags.iter()).collect(),
                    background: scope.background.clone(),
                };
                for child in &rule.children {
                    match child {
                        RuleChild::Background(background) => {
                            rule_scope.background.extend(background.steps.iter());
                        }
                        RuleChild::Scenario(scenario) => {
                            compile_scenario_or_outline(&rule_scope, scenario, ids, &mut pickles);
                        }
                    }
                }
            }
        }
    }

    pickles
}

fn compile_scenario_or_outline(
    scope: &Scope<'_>,
    scenario: &Scenario,
    ids: &mut dyn IdGenerator,
    pickles: &mut Vec<Pickle>,
) {
    if scenario.examples.is_empty() {
        compile_scenario(scope, scenario, ids, pickles);
    } else {
        compile_outline(scope, scenario, ids, pickles);
    }
}

fn compile_scenario(
    scope: &Scope<'_>,
    scenario: &Scenario,
    ids: &mut dyn IdGenerator,
    pickles: &mut Vec<Pickle>,
) {
    let mut last_type = PickleStepType::Unknown;
    let mut steps = Vec::new();

    if !scenario.steps.is_empty() {
        for step in &scope.background {
            steps.push(pickle_step(step, None, &mut last_type, ids));
        }
    }
    for step in &scenario.steps {
        steps.push(pickle_step(step, None, &mut last_type, ids));
    }

    let tags: Vec<&Tag> = scope.tags.iter().copied().chain(scenario.tags.iter()).collect();

    pickles.push(Pickle {
        id: ids.new_id(),
        uri: scope.uri.to_string(),
        location: Some(scenario.location),
        name: scenario.name.clone(),
        language: scope.language.to_string(),
        steps,
        tags: pickle_tags(&tags),
        ast_node_ids: vec![scenario.id.clone()],
    });
}

fn compile_outline(
    scope: &Scope<'_>,
    scenario: &Scenario,
    ids: &mut dyn IdGenerator,
    pickles: &mut Vec<Pickle>,
) {
    for examples in &scenario.examples {
        let Some(header) = &examples.table_header else {
            continue;
        };
        let variables: Vec<&str> = header.cells.iter().map(|c| c.value.as_str()).collect();

        for row in &examples.table_body {
            let mut last_type = PickleStepType::Unknown;
            let mut steps = Vec::new();

            if !scenario.steps.is_empty() {
                for step in &scope.background {
                    steps.push(pickle_step(step, None, &mut last_type, ids));
                }
            }
            for step in &scenario.steps {
                steps.push(pickle_step(
                    step,
                    Some((variables.as_slice(), row)),
                    &mut last_type,
                    ids,
                ));
            }

            let tags: Vec<&Tag> = scope
                .tags
                .iter()
                .copied()
                .chain(scenario.tags.iter())
                .chain(examples.tags.iter())
                .collect();

            pickles.push(Pickle {
                id: ids.new_id(),
                uri: scope.uri.to_string(),
                location: Some(row.location),
                name: interpolate(&scenario.name, &variables, row),
                language: scope.language.to_string(),
                steps,
                tags: pickle_tags(&tags),
                ast_node_ids: vec![scenario.id.clone(), row.id.clone()],
            });
        }
    }
}

fn pickle_step(
    step: &Step,
    row: Option<(&[&str], &TableRow)>,
    last_type: &mut PickleStepType,
    ids: &mut dyn IdGenerator,
) -> PickleStep {
    let step_type = match step.keyword_type {
        Some(StepKeywordType::Context) => PickleStepType::Context,
        Some(StepKeywordType::Action) => PickleStepType::Action,
        Some(StepKeywordType::Outcome) => PickleStepType::Outcome,
        Some(StepKeywordType::Conjunction) => *last_type,
        Some(StepKeywordType::Unknown) | None => PickleStepType::Unknown,
    };
    *last_type = step_type;

    let substitute = |text: &str| match row {
        Some((variables, row)) => interpolate(text, variables, row),
        None => text.to_string(),
    };

    let argument = if let Some(doc_string) = &step.doc_string {
        Some(PickleStepArgument {
            doc_string: Some(PickleDocString {
                media_type: doc_string.media_type.as_deref().map(&substitute),
                content: substitute(&doc_string.content),
            }),
            data_table: None,
        })
    } else {
        step.data_table.as_ref().map(|table| PickleStepArgument {
            doc_string: None,
            data_table: Some(PickleTable::from_rows(table.rows.iter().map(|r| {
                r.cells
                    .iter()
                    .map(|cell| substitute(&cell.value))
                    .collect::<Vec<_>>()
            }))),
        })
    };

    let mut ast_node_ids = vec![step.id.clone()];
    if let Some((_, row)) = row {
        ast_node_ids.push(row.id.clone());
    }

    PickleStep {
        argument,
        ast_node_ids,
        id: ids.new_id(),
        step_type: Some(step_type),
        text: substitute(&step.text),
    }
}

fn interpolate(text: &str, variables: &[&str], row: &TableRow) -> String {
    let mut result = text.to_string();
    for (variable, cell) in variables.iter().zip(&row.cells) {
        result = result.replace(&format!("<{variable}>"), &cell.value);
    }
    result
}

fn pickle_tags(tags: &[&Tag]) -> Vec<PickleTag> {
    tags.iter()
        .map(|tag| PickleTag {
            name: tag.name.clone(),
            ast_node_id: tag.id.clone(),
        })
        .collect()
}
