use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tracing::debug;

use crate::ast::{collect_tag_names, document_tag_names, AstIndex};
use crate::error::Ensure;
use crate::ids::IdGenerator;
use crate::messages::{
    self, Envelope, FeatureChild, GherkinDocument, Pickle, RuleChild, Scenario, Source,
    SourceMediaType, SourceReference, StepMatchArgumentsList, TestCase, TestStep,
};
use crate::registry::Registry;
use crate::snippets::StepDefinitionHints;
use crate::tags::{
    TagExpression, TagExpressionError, TagOptionError, TestOptions, FOCUS_TAGS, SKIP_TAG,
};
use crate::time::Clock;

use super::context::{CompositionContext, IncludedPickle, StepRef, TestProperties};
use super::suite::{Suite, SuiteChild, Test};
use super::{ComposeError, UNNAMED_FEATURE, UNNAMED_RULE, UNNAMED_SCENARIO};

/// One spec file: the feature source and what was parsed from it.
#[derive(Debug, Clone)]
pub struct SpecInput {
    /// Raw feature text, carried in the `source` envelope.
    pub source: String,
    pub document: GherkinDocument,
    pub pickles: Vec<Pickle>,
}

#[derive(Debug, Clone, Default)]
pub struct ComposeOptions {
    /// Configured tag expression; ignored when the document focuses.
    pub tags: Option<String>,
    pub omit_filtered: bool,
    pub dry_run: bool,
    pub soft_errors: bool,
    pub is_tracking: bool,
    pub hints: StepDefinitionHints,
    pub test_run_started_id: String,
}

/// A composed spec: the suite tree and the context its tests run against.
pub struct Composition<W> {
    pub suite: Suite,
    pub context: CompositionContext<W>,
}

/// `@only or @focus` when the document uses either tag anywhere, else the
/// configured expression, else everything.
pub fn tag_filter(
    document: &GherkinDocument,
    configured: Option<&str>,
) -> Result<TagExpression, TagExpressionError> {
    let tags = document_tag_names(document);
    if tags.iter().any(|tag| FOCUS_TAGS.contains(&tag.as_str())) {
        return TagExpression::parse("@only or @focus");
    }
    match configured {
        Some(expression) if !expression.trim().is_empty() => TagExpression::parse(expression),
        _ => Ok(TagExpression::True),
    }
}

pub fn should_skip(filter: &TagExpression, pickle: &Pickle) -> bool {
    let tags = pickle.tag_names();
    !filter.evaluate(&tags) || tags.iter().any(|tag| tag == SKIP_TAG)
}

pub fn compose<W>(
    registry: Arc<Registry<W>>,
    input: SpecInput,
    options: ComposeOptions,
    mut ids: Box<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
) -> Result<Composition<W>, ComposeError> {
    let SpecInput {
        source,
        document,
        pickles,
    } = input;

    let filter = tag_filter(&document, options.tags.as_deref())?;

    let included: Vec<&Pickle> = pickles
        .iter()
        .filter(|pickle| !options.omit_filtered || !should_skip(&filter, pickle))
        .collect();

    let mut test_step_ids: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut case_steps: HashMap<String, Vec<StepRef>> = HashMap::new();
    let test_cases: Vec<TestCase> = included
        .iter()
        .map(|pickle| {
            let (test_case, steps, step_ids) = create_test_case(
                &registry,
                pickle,
                &options.test_run_started_id,
                ids.as_mut(),
            );
            test_step_ids.insert(pickle.id.clone(), step_ids);
            case_steps.insert(pickle.id.clone(), steps);
            test_case
        })
        .collect();

    let uri = document
        .uri
        .clone()
        .ensure("Expected gherkin document to have URI")?;

    let mut spec_envelopes = vec![
        Envelope::Source(Source {
            uri,
            data: source,
            media_type: SourceMediaType::GherkinPlain,
        }),
        Envelope::GherkinDocument(document.clone()),
    ];
    spec_envelopes.extend(included.iter().map(|pickle| Envelope::Pickle((*pickle).clone())));
    spec_envelopes.extend(
        registry
            .case_hooks()
            .iter()
            .map(|hook| Envelope::Hook(hook.to_message())),
    );
    spec_envelopes.extend(
        registry
            .step_hooks()
            .iter()
            .map(|hook| Envelope::Hook(hook.to_message())),
    );
    spec_envelopes.extend(
        registry
            .run_hooks()
            .iter()
            .map(|hook| Envelope::Hook(hook.to_message())),
    );
    for parameter_type in registry.parameter_types().parameter_types() {
        if parameter_type.is_builtin() {
            continue;
        }
        spec_envelopes.push(Envelope::ParameterType(messages::ParameterType {
            id: ids.new_id(),
            name: parameter_type.name().to_string(),
            regular_expressions: parameter_type.regexps().to_vec(),
            prefer_for_regular_expression_match: parameter_type.prefer_for_regexp_match(),
            use_for_snippets: parameter_type.use_for_snippets(),
            source_reference: Some(SourceReference::not_available()),
        }));
    }
    spec_envelopes.extend(
        registry
            .step_definitions()
            .iter()
            .map(|definition| Envelope::StepDefinition(definition.to_message())),
    );
    spec_envelopes.extend(test_cases.into_iter().map(Envelope::TestCase));

    let included_queue: VecDeque<IncludedPickle> = included
        .iter()
        .map(|pickle| IncludedPickle {
            pickle_id: pickle.id.clone(),
            will_be_skipped: should_skip(&filter, pickle),
        })
        .collect();

    let ast = AstIndex::new(&document);
    let mut builder = SuiteBuilder {
        ast: &ast,
        pickles: &pickles,
        filter: &filter,
        omit_filtered: options.omit_filtered,
        case_steps: &case_steps,
        ids: ids.as_mut(),
        tests: HashMap::new(),
    };
    let suite = builder.feature_suite(&document)?;
    let tests = builder.tests;

    debug!(
        uri = document.uri.as_deref().unwrap_or_default(),
        pickles = pickles.len(),
        included = included_queue.len(),
        tests = tests.len(),
        "composed spec"
    );

    let context = CompositionContext {
        registry,
        document: Arc::new(document),
        ast,
        filter,
        pickles: pickles.into_iter().map(Arc::new).collect(),
        included: included_queue,
        spec_envelopes,
        test_step_ids,
        case_steps,
        tests,
        dry_run: options.dry_run,
        soft_errors: options.soft_errors,
        omit_filtered: options.omit_filtered,
        is_tracking: options.is_tracking,
        hints: options.hints,
        test_run_started_id: options.test_run_started_id,
        ids,
        clock,
    };

    Ok(Composition { suite, context })
}

fn create_test_case<W>(
    registry: &Registry<W>,
    pickle: &Pickle,
    test_run_started_id: &str,
    ids: &mut dyn IdGenerator,
) -> (TestCase, Vec<StepRef>, HashMap<String, String>) {
    let tags = pickle.tag_names();
    let mut test_steps = Vec::new();
    let mut steps = Vec::new();
    let mut step_ids = HashMap::new();

    for hook in registry.resolve_before_hooks(&tags) {
        push_hook_step(hook.id(), ids, &mut step_ids, &mut test_steps, &mut steps);
    }

    for pickle_step in &pickle.steps {
        let matches = registry.matching_step_definitions(&pickle_step.text);
        let id = ids.new_id();
        step_ids.insert(pickle_step.id.clone(), id.clone());
        steps.push(StepRef::PickleStep(pickle_step.id.clone()));
        test_steps.push(TestStep {
            id,
            hook_id: None,
            pickle_step_id: Some(pickle_step.id.clone()),
            step_definition_ids: Some(
                matches
                    .iter()
                    .map(|step_match| step_match.definition.id().to_string())
                    .collect(),
            ),
            step_match_arguments_lists: Some(
                matches
                    .iter()
                    .map(|step_match| StepMatchArgumentsList {
                        step_match_arguments: step_match
                            .arguments
                            .iter()
                            .map(|argument| argument.to_message())
                            .collect(),
                    })
                    .collect(),
            ),
        });
    }

    for hook in registry.resolve_after_hooks(&tags) {
        push_hook_step(hook.id(), ids, &mut step_ids, &mut test_steps, &mut steps);
    }

    let test_case = TestCase {
        id: pickle.id.clone(),
        pickle_id: pickle.id.clone(),
        test_steps,
        test_run_started_id: Some(test_run_started_id.to_string()),
    };

    (test_case, steps, step_ids)
}

fn push_hook_step(
    hook_id: &str,
    ids: &mut dyn IdGenerator,
    step_ids: &mut HashMap<String, String>,
    test_steps: &mut Vec<TestStep>,
    steps: &mut Vec<StepRef>,
) {
    let id = ids.new_id();
    step_ids.insert(hook_id.to_string(), id.clone());
    steps.push(StepRef::Hook(hook_id.to_string()));
    test_steps.push(TestStep {
        id,
        hook_id: Some(hook_id.to_string()),
        ..TestStep::default()
    });
}

/// Row ids of an outline, or the scenario id itself.
fn scenario_pickle_ids(scenario: &Scenario) -> Vec<&str> {
    if scenario.examples.is_empty() {
        vec![scenario.id.as_str()]
    } else {
        scenario
            .examples
            .iter()
            .flat_map(|examples| examples.table_body.iter())
            .map(|row| row.id.as_str())
            .collect()
    }
}

struct SuiteBuilder<'a> {
    ast: &'a AstIndex,
    pickles: &'a [Pickle],
    filter: &'a TagExpression,
    omit_filtered: bool,
    case_steps: &'a HashMap<String, Vec<StepRef>>,
    ids: &'a mut dyn IdGenerator,
    tests: HashMap<String, TestProperties>,
}

impl<'a> SuiteBuilder<'a> {
    fn feature_suite(&mut self, document: &GherkinDocument) -> Result<Suite, ComposeError> {
        let feature = document
            .feature
            .as_ref()
            .ensure("Expected gherkin document to have a feature")?;

        let title = non_empty_or(&feature.name, UNNAMED_FEATURE);
        let mut suite = Suite::new(title, suite_options(&collect_tag_names(&feature.tags))?);

        for child in &feature.children {
            match child {
                FeatureChild::Scenario(scenario) => self.scenario_tests(scenario, &mut suite)?,
                FeatureChild::Rule(rule) => {
                    let scenarios: Vec<&Scenario> = rule
                        .children
                        .iter()
                        .filter_map(|child| match child {
                            RuleChild::Scenario(scenario) => Some(scenario),
                            RuleChild::Background(_) => None,
                        })
                        .collect();

                    if self.omit_filtered {
                        let mut any_match = false;
                        for scenario in &scenarios {
                            for ast_id in scenario_pickle_ids(scenario) {
                                let pickle = self.find_pickle(ast_id)?;
                                any_match |= self.filter.evaluate(&pickle.tag_names());
                            }
                        }
                        if !any_match {
                            continue;
                        }
                    }

                    let title = non_empty_or(&rule.name, UNNAMED_RULE);
                    let mut rule_suite =
                        Suite::new(title, suite_options(&collect_tag_names(&rule.tags))?);
                    for scenario in scenarios {
                        self.scenario_tests(scenario, &mut rule_suite)?;
                    }
                    suite.children.push(SuiteChild::Suite(rule_suite));
                }
                FeatureChild::Background(_) => {}
            }
        }

        Ok(suite)
    }

    fn find_pickle(&self, ast_id: &str) -> Result<&'a Pickle, ComposeError> {
        let pickles: &'a [Pickle] = self.pickles;
        Ok(pickles
            .iter()
            .find(|pickle| pickle.ast_node_ids.iter().any(|id| id == ast_id))
            .ensure_with(|| format!("Expected to find a pickle associated with id = {ast_id}"))?)
    }

    fn scenario_tests(
        &mut self,
        scenario: &Scenario,
        suite: &mut Suite,
    ) -> Result<(), ComposeError> {
        let outline = !scenario.examples.is_empty();
        for (index, ast_id) in scenario_pickle_ids(scenario).into_iter().enumerate() {
            let pickle = self.find_pickle(ast_id)?;
            let name = non_empty_or(&pickle.name, UNNAMED_SCENARIO);
            let title = if outline {
                format!("{name} (example #{})", index + 1)
            } else {
                name
            };
            self.pickle_test(pickle, title, suite)?;
        }
        Ok(())
    }

    fn pickle_test(
        &mut self,
        pickle: &Pickle,
        title: String,
        suite: &mut Suite,
    ) -> Result<(), ComposeError> {
        if should_skip(self.filter, pickle) {
            if !self.omit_filtered {
                suite.children.push(SuiteChild::Test(Test {
                    title,
                    pickle_id: pickle.id.clone(),
                    options: TestOptions::new(),
                    pending: true,
                }));
            }
            return Ok(());
        }

        let scenario_id = pickle
            .ast_node_ids
            .first()
            .ensure("Expected to find at least one astNodeId")?;
        let scenario = self
            .ast
            .scenario(scenario_id)
            .ensure_with(|| {
                format!("Expected to find scenario associated with id = {scenario_id}")
            })?;

        let mut specific_tags = collect_tag_names(&scenario.tags);
        for examples in &scenario.examples {
            specific_tags.extend(collect_tag_names(&examples.tags));
        }
        TestOptions::from_tags(&specific_tags)
            .and_then(|options| options.ensure_test_level())
            .map_err(option_error)?;

        let options = TestOptions::from_tags(&pickle.tag_names())
            .map_err(option_error)?
            .test_level();

        let all_steps = self
            .case_steps
            .get(&pickle.id)
            .cloned()
            .ensure_with(|| format!("Expected to find case steps for pickle = {}", pickle.id))?;
        let test_case_started_id = self.ids.new_id();
        self.tests.insert(
            pickle.id.clone(),
            TestProperties::new(pickle.id.clone(), test_case_started_id, all_steps),
        );

        suite.children.push(SuiteChild::Test(Test {
            title,
            pickle_id: pickle.id.clone(),
            options,
            pending: false,
        }));
        Ok(())
    }
}

fn suite_options(tags: &[String]) -> Result<TestOptions, ComposeError> {
    Ok(TestOptions::from_tags(tags).map_err(option_error)?.suite_level())
}

fn option_error(error: TagOptionError) -> ComposeError {
    match error {
        TagOptionError::SuiteOnly { option, .. } => ComposeError::SuiteOnlyOption(option),
        TagOptionError::NotAnOption(tag) => {
            ComposeError::Assertion(crate::error::fail(format!(
                "Expected {tag} to be a configuration tag"
            )))
        }
    }
}

fn non_empty_or(name: &str, fallback: &str) -> String {
    if name.is_empty() {
        fallback.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Examples, TableRow};
    use crate::registry::{HookOptions, StepOutcome};
    use crate::testing::{self, document, rule, scenario, scenario_node, World};

    fn passing_registry() -> Arc<Registry<World>> {
        testing::registry(|registry| {
            registry.given("a step", |_, _| Ok(StepOutcome::Passed));
            registry.before(HookOptions::default(), |_, _| Ok(StepOutcome::Passed));
        })
    }

    fn envelope_kinds(composition: &Composition<World>) -> Vec<&'static str> {
        composition
            .context
            .spec_envelopes()
            .iter()
            .map(|envelope| envelope.kind().name())
            .collect()
    }

    #[test]
    fn test_spec_envelopes_in_order() {
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "first", &[], &[("st1", "a step")])],
        );
        let composition = testing::composed(passing_registry(), doc, ComposeOptions::default());

        assert_eq!(
            envelope_kinds(&composition),
            vec!["source", "gherkinDocument", "pickle", "hook", "stepDefinition", "testCase"]
        );
        assert_eq!(composition.suite.title, "feature");
        assert_eq!(composition.suite.titles(), vec!["first"]);
    }

    #[test]
    fn test_case_steps_start_with_before_hooks() {
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "first", &[], &[("st1", "a step")])],
        );
        let composition = testing::composed(passing_registry(), doc, ComposeOptions::default());
        let test_case = composition
            .context
            .spec_envelopes()
            .iter()
            .find_map(|envelope| match envelope {
                Envelope::TestCase(test_case) => Some(test_case),
                _ => None,
            })
            .unwrap();

        assert_eq!(test_case.test_steps.len(), 2);
        assert!(test_case.test_steps[0].hook_id.is_some());
        assert_eq!(test_case.test_steps[1].step_definition_ids.as_ref().unwrap().len(), 1);
        assert_eq!(test_case.test_run_started_id.as_deref(), Some(""));
    }

    #[test]
    fn test_outline_titles_count_rows() {
        let mut outline = scenario_node("s1", "eating", &[], &[("st1", "a step")]);
        outline.examples = vec![Examples {
            id: "ex".to_string(),
            table_header: Some(TableRow {
                id: "header".to_string(),
                ..Default::default()
            }),
            table_body: ["r1", "r2", "r3"]
                .iter()
                .map(|id| TableRow {
                    id: id.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }];
        let doc = document("", &[], vec![FeatureChild::Scenario(outline)]);
        let composition = testing::composed(passing_registry(), doc, ComposeOptions::default());

        assert_eq!(composition.suite.title, UNNAMED_FEATURE);
        assert_eq!(
            composition.suite.titles(),
            vec!["eating (example #1)", "eating (example #2)", "eating (example #3)"]
        );
    }

    #[test]
    fn test_filtered_pickles_are_pending_by_default() {
        let doc = document(
            "feature",
            &[],
            vec![
                scenario("s1", "kept", &["@smoke"], &[("st1", "a step")]),
                scenario("s2", "filtered", &[], &[("st2", "a step")]),
            ],
        );
        let options = ComposeOptions {
            tags: Some("@smoke".to_string()),
            ..Default::default()
        };
        let composition = testing::composed(passing_registry(), doc, options);
        let tests = composition.suite.tests();

        assert_eq!(tests.len(), 2);
        assert!(!tests[0].pending);
        assert!(tests[1].pending);
        let included: Vec<bool> = composition
            .context
            .included()
            .map(|p| p.will_be_skipped)
            .collect();
        assert_eq!(included, vec![false, true]);
    }

    #[test]
    fn test_omit_filtered_drops_pickles_and_empty_rules() {
        let doc = document(
            "feature",
            &[],
            vec![
                scenario("s1", "kept", &["@smoke"], &[("st1", "a step")]),
                rule(
                    "r",
                    "nothing here",
                    &[],
                    vec![scenario_node("s2", "filtered", &[], &[("st2", "a step")])],
                ),
            ],
        );
        let options = ComposeOptions {
            tags: Some("@smoke".to_string()),
            omit_filtered: true,
            ..Default::default()
        };
        let composition = testing::composed(passing_registry(), doc, options);

        assert_eq!(composition.suite.children.len(), 1);
        assert_eq!(composition.context.included().count(), 1);
        let pickles = composition
            .context
            .spec_envelopes()
            .iter()
            .filter(|envelope| matches!(envelope, Envelope::Pickle(_)))
            .count();
        assert_eq!(pickles, 1);
    }

    #[test]
    fn test_focus_tags_override_configured_expression() {
        let doc = document(
            "feature",
            &[],
            vec![
                scenario("s1", "focused", &["@focus"], &[("st1", "a step")]),
                scenario("s2", "other", &["@smoke"], &[("st2", "a step")]),
            ],
        );
        let filter = tag_filter(&doc, Some("@smoke")).unwrap();
        assert!(filter.evaluate(&["@focus"]));
        assert!(!filter.evaluate(&["@smoke"]));
    }

    #[test]
    fn test_skip_tag_always_skips() {
        let pickle = Pickle {
            tags: vec![messages::PickleTag {
                name: SKIP_TAG.to_string(),
                ast_node_id: "t".to_string(),
            }],
            ..Default::default()
        };
        assert!(should_skip(&TagExpression::True, &pickle));
    }

    #[test]
    fn test_suite_only_option_on_scenario_is_rejected() {
        let doc = document(
            "feature",
            &[],
            vec![scenario("s1", "bad", &["@testIsolation(false)"], &[("st1", "a step")])],
        );
        let pickles = crate::pickles::compile(&doc, &mut crate::ids::SeededIdGenerator::new(7));
        let result = compose(
            passing_registry(),
            SpecInput {
                source: String::new(),
                document: doc,
                pickles,
            },
            ComposeOptions::default(),
            Box::new(crate::ids::IncrementingIdGenerator::new()),
            Arc::new(crate::time::SystemClock),
        );

        match result {
            Err(ComposeError::SuiteOnlyOption(option)) => assert_eq!(option, "testIsolation"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("composition should fail"),
        }
    }

    #[test]
    fn test_feature_options_feed_the_suite_and_tests_inherit_the_rest() {
        let doc = document(
            "feature",
            &["@testIsolation(false)", "@retries(2)"],
            vec![scenario("s1", "first", &[], &[("st1", "a step")])],
        );
        let composition = testing::composed(passing_registry(), doc, ComposeOptions::default());

        assert_eq!(composition.suite.options.keys().collect::<Vec<_>>(), vec!["testIsolation"]);
        let tests = composition.suite.tests();
        assert_eq!(tests[0].options.retries(), Some(2));
        assert!(tests[0].options.get("testIsolation").is_none());
    }
}
