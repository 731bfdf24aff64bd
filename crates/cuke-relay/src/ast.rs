//! Lookups into a parsed Gherkin document by AST node id.

use std::collections::HashMap;

use crate::messages::{
    Background, Examples, FeatureChild, GherkinDocument, Rule, RuleChild, Scenario, Step, Tag,
};

/// Node ids of a document mapped to (copies of) the nodes.
#[derive(Debug, Clone, Default)]
pub struct AstIndex {
    scenarios: HashMap<String, Scenario>,
    steps: HashMap<String, Step>,
    rules: HashMap<String, Rule>,
    example_rows: HashMap<String, Examples>,
}

impl AstIndex {
    pub fn new(document: &GherkinDocument) -> Self {
        let mut index = Self::default();
        if let Some(feature) = &document.feature {
            for child in &feature.children {
                match child {
                    FeatureChild::Background(background) => index.add_background(background),
                    FeatureChild::Scenario(scenario) => index.add_scenario(scenario),
                    FeatureChild::Rule(rule) => {
                        for child in &rule.children {
                            match child {
                                RuleChild::Background(background) => {
                                    index.add_background(background)
                                }
                                RuleChild::Scenario(scenario) => index.add_scenario(scenario),
                            }
                        }
                        index.rules.insert(rule.id.clone(), rule.clone());
                    }
                }
            }
        }
        index
    }

    fn add_background(&mut self, background: &Background) {
        for step in &background.steps {
            self.steps.insert(step.id.clone(), step.clone());
        }
    }

    fn add_scenario(&mut self, scenario: &Scenario) {
        for step in &scenario.steps {
            self.steps.insert(step.id.clone(), step.clone());
        }
        for examples in &scenario.examples {
            for row in &examples.table_body {
                self.example_rows.insert(row.id.clone(), examples.clone());
            }
        }
        self.scenarios.insert(scenario.id.clone(), scenario.clone());
    }

    pub fn scenario(&self, id: &str) -> Option<&Scenario> {
        self.scenarios.get(id)
    }

    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.get(id)
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rules.get(id)
    }

    /// The `Examples` block owning a table-body row.
    pub fn examples_for_row(&self, row_id: &str) -> Option<&Examples> {
        self.example_rows.get(row_id)
    }
}

pub fn collect_tag_names(tags: &[Tag]) -> Vec<String> {
    tags.iter().map(|tag| tag.name.clone()).collect()
}

/// Every tag name appearing anywhere in the document.
pub fn document_tag_names(document: &GherkinDocument) -> Vec<String> {
    let mut names = Vec::new();
    let Some(feature) = &document.feature else {
        return names;
    };

    fn visit_scenario(scenario: &Scenario, names: &mut Vec<String>) {
        names.extend(collect_tag_names(&scenario.tags));
        for examples in &scenario.examples {
            names.extend(collect_tag_names(&examples.tags));
        }
    }

    names.extend(collect_tag_names(&feature.tags));

    for child in &feature.children {
        match child {
            FeatureChild::Scenario(scenario) => visit_scenario(scenario, &mut names),
            FeatureChild::Rule(rule) => {
                names.extend(collect_tag_names(&rule.tags));
                for child in &rule.children {
                    if let RuleChild::Scenario(scenario) = child {
                        visit_scenario(scenario, &mut names);
                    }
                }
            }
            FeatureChild::Background(_) => {}
        }
    }

    names
}
