//! Builders shared by unit tests.

use std::sync::Arc;

use crate::composer::{compose, ComposeOptions, Composition, SpecInput};
use crate::ids::{IncrementingIdGenerator, SeededIdGenerator};
use crate::messages::{
    Feature, FeatureChild, GherkinDocument, Location, Rule, RuleChild, Scenario, Step,
    StepKeywordType, Tag, Timestamp,
};
use crate::pickles;
use crate::registry::{Registry, RegistryBuilder};
use crate::time::FixedClock;

/// What step handlers in tests write into.
#[derive(Debug, Default)]
pub struct World {
    pub log: Vec<String>,
}

pub fn tag(name: &str) -> Tag {
    Tag {
        location: Location::default(),
        name: name.to_string(),
        id: format!("tag{name}"),
    }
}

pub fn step(id: &str, text: &str) -> Step {
    Step {
        id: id.to_string(),
        keyword: "Given ".to_string(),
        keyword_type: Some(StepKeywordType::Context),
        text: text.to_string(),
        ..Default::default()
    }
}

pub fn scenario(id: &str, name: &str, tags: &[&str], steps: &[(&str, &str)]) -> FeatureChild {
    FeatureChild::Scenario(scenario_node(id, name, tags, steps))
}

pub fn scenario_node(id: &str, name: &str, tags: &[&str], steps: &[(&str, &str)]) -> Scenario {
    Scenario {
        id: id.to_string(),
        keyword: "Scenario".to_string(),
        name: name.to_string(),
        tags: tags.iter().map(|name| tag(name)).collect(),
        steps: steps.iter().map(|(id, text)| step(id, text)).collect(),
        ..Default::default()
    }
}

pub fn rule(id: &str, name: &str, tags: &[&str], scenarios: Vec<Scenario>) -> FeatureChild {
    FeatureChild::Rule(Rule {
        id: id.to_string(),
        keyword: "Rule".to_string(),
        name: name.to_string(),
        tags: tags.iter().map(|name| tag(name)).collect(),
        children: scenarios.into_iter().map(RuleChild::Scenario).collect(),
        ..Default::default()
    })
}

pub fn document(name: &str, tags: &[&str], children: Vec<FeatureChild>) -> GherkinDocument {
    GherkinDocument {
        uri: Some("features/a.feature".to_string()),
        feature: Some(Feature {
            keyword: "Feature".to_string(),
            language: "en".to_string(),
            name: name.to_string(),
            tags: tags.iter().map(|name| tag(name)).collect(),
            children,
            ..Default::default()
        }),
        comments: vec![],
    }
}

pub fn registry(build: impl FnOnce(&mut RegistryBuilder<World>)) -> Arc<Registry<World>> {
    let mut builder = RegistryBuilder::new();
    build(&mut builder);
    match builder.finalize(&mut IncrementingIdGenerator::new()) {
        Ok(registry) => Arc::new(registry),
        Err(err) => panic!("registry failed to finalize: {err}"),
    }
}

/// Compile `document` and compose it with counter IDs and a clock ticking
/// one millisecond per reading. Pickles get UUIDs so their step ids never
/// collide with the registry's counter ids.
pub fn composed(
    registry: Arc<Registry<World>>,
    document: GherkinDocument,
    options: ComposeOptions,
) -> Composition<World> {
    let pickles = pickles::compile(&document, &mut SeededIdGenerator::new(7));
    let input = SpecInput {
        source: String::new(),
        document,
        pickles,
    };
    let clock = FixedClock::ticking(Timestamp::default(), 1_000_000);
    match compose(
        registry,
        input,
        options,
        Box::new(IncrementingIdGenerator::new()),
        Arc::new(clock),
    ) {
        Ok(composition) => composition,
        Err(err) => panic!("composition failed: {err}"),
    }
}
