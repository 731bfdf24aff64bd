//! End-to-end runs: documents composed, executed and reconciled into a log.

mod common;

use std::sync::{Arc, Mutex};

use common::{count, document, session, spec_source, step, step_statuses, World};
use cuke_relay::messages::{Envelope, EnvelopeKind, TestStepResultStatus};
use cuke_relay::registry::{RegistryBuilder, StepOutcome};
use cuke_relay::runner::TestState;
use serde_json::json;

// =============================================================================
// Failing first step
// =============================================================================

#[test]
fn test_failing_first_step_skips_the_rest() {
    let doc = document(
        "features/failing.feature",
        json!({
            "location": { "line": 1, "column": 1 },
            "language": "en",
            "keyword": "Feature",
            "name": "failing",
            "children": [{
                "scenario": {
                    "id": "s1",
                    "location": { "line": 2, "column": 3 },
                    "keyword": "Scenario",
                    "name": "breaks early",
                    "steps": [
                        step("st1", 3, "Given ", "a failing step"),
                        step("st2", 4, "When ", "a passing step"),
                        step("st3", 5, "Then ", "a passing step"),
                    ],
                }
            }],
        }),
    );

    let mut session = session(3, None);
    let source = spec_source("features/failing.feature", doc);
    let results = session
        .run_spec(source, |registry: &mut RegistryBuilder<World>| {
            registry.given("a failing step", |_, _| anyhow::bail!("boom"));
            registry.given("a passing step", |_, _| Ok(StepOutcome::Passed));
        })
        .unwrap();

    assert_eq!(results.tests.len(), 1);
    assert_eq!(results.tests[0].state, TestState::Failed);
    assert!(results.tests[0]
        .display_error
        .as_deref()
        .is_some_and(|error| error.contains("boom")));

    let envelopes = session.finish(results.success()).unwrap().unwrap();
    assert_eq!(
        step_statuses(&envelopes),
        vec![
            TestStepResultStatus::Failed,
            TestStepResultStatus::Skipped,
            TestStepResultStatus::Skipped,
        ]
    );

    let finished: Vec<bool> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestCaseFinished(finished) => Some(finished.will_be_retried),
            _ => None,
        })
        .collect();
    assert_eq!(finished, vec![false]);

    match envelopes.last() {
        Some(Envelope::TestRunFinished(finished)) => assert!(!finished.success),
        other => panic!("expected testRunFinished last, got {other:?}"),
    }
}

// =============================================================================
// Scenario outlines
// =============================================================================

#[test]
fn test_three_row_examples_run_three_test_cases() {
    let row = |id: &str, line: u32, start: &str, eat: &str, left: &str| {
        json!({
            "id": id,
            "location": { "line": line, "column": 7 },
            "cells": [
                { "location": { "line": line, "column": 9 }, "value": start },
                { "location": { "line": line, "column": 17 }, "value": eat },
                { "location": { "line": line, "column": 23 }, "value": left },
            ],
        })
    };
    let doc = document(
        "features/eating.feature",
        json!({
            "location": { "line": 1, "column": 1 },
            "language": "en",
            "keyword": "Feature",
            "name": "cucumbers",
            "children": [{
                "scenario": {
                    "id": "outline",
                    "location": { "line": 2, "column": 3 },
                    "keyword": "Scenario Outline",
                    "name": "eating",
                    "steps": [
                        step("st1", 3, "Given ", "there are <start> cucumbers"),
                        step("st2", 4, "When ", "I eat <eat> cucumbers"),
                        step("st3", 5, "Then ", "I should have <left> cucumbers"),
                    ],
                    "examples": [{
                        "id": "examples",
                        "location": { "line": 7, "column": 5 },
                        "keyword": "Examples",
                        "tableHeader": row("header", 8, "start", "eat", "left"),
                        "tableBody": [
                            row("r1", 9, "12", "5", "7"),
                            row("r2", 10, "20", "5", "15"),
                            row("r3", 11, "5", "5", "0"),
                        ],
                    }],
                }
            }],
        }),
    );

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut session = session(5, None);
    let results = {
        let seen = Arc::clone(&seen);
        let source = spec_source("features/eating.feature", doc);
        session
            .run_spec(source, move |registry: &mut RegistryBuilder<World>| {
                let start = Arc::clone(&seen);
                registry.given("there are {int} cucumbers", move |_, call| {
                    start.lock().unwrap().push(call.arg::<i64>(0)?);
                    Ok(StepOutcome::Passed)
                });
                registry.when("I eat {int} cucumbers", |_, _| Ok(StepOutcome::Passed));
                registry.then("I should have {int} cucumbers", |_, _| Ok(StepOutcome::Passed));
            })
            .unwrap()
    };

    let titles: Vec<&str> = results.tests.iter().map(|test| test.title.as_str()).collect();
    assert_eq!(
        titles,
        vec!["eating (example #1)", "eating (example #2)", "eating (example #3)"]
    );
    assert!(results.success());
    assert_eq!(*seen.lock().unwrap(), vec![12, 20, 5]);

    let envelopes = session.finish(true).unwrap().unwrap();
    assert_eq!(count(&envelopes, EnvelopeKind::Pickle), 3);
    assert_eq!(count(&envelopes, EnvelopeKind::TestCase), 3);
    assert_eq!(count(&envelopes, EnvelopeKind::TestCaseStarted), 3);
    assert_eq!(count(&envelopes, EnvelopeKind::TestCaseFinished), 3);
    assert_eq!(count(&envelopes, EnvelopeKind::StepDefinition), 3);
    assert!(step_statuses(&envelopes)
        .iter()
        .all(|status| *status == TestStepResultStatus::Passed));
}

// =============================================================================
// Retries
// =============================================================================

#[test]
fn test_retried_attempts_are_all_logged() {
    let doc = document(
        "features/flaky.feature",
        json!({
            "location": { "line": 1, "column": 1 },
            "language": "en",
            "keyword": "Feature",
            "name": "flaky",
            "children": [{
                "scenario": {
                    "id": "s1",
                    "location": { "line": 3, "column": 3 },
                    "keyword": "Scenario",
                    "name": "eventually",
                    "tags": [{
                        "id": "t1",
                        "location": { "line": 2, "column": 3 },
                        "name": "@retries(1)",
                    }],
                    "steps": [step("st1", 4, "Given ", "a flaky step")],
                }
            }],
        }),
    );

    let calls = Arc::new(Mutex::new(0u32));
    let mut session = session(11, None);
    let counter = Arc::clone(&calls);
    let source = spec_source("features/flaky.feature", doc);
    let results = session
        .run_spec(source, move |registry: &mut RegistryBuilder<World>| {
            registry.given("a flaky step", move |_, _| {
                let mut calls = counter.lock().unwrap();
                *calls += 1;
                if *calls == 1 {
                    anyhow::bail!("not yet")
                }
                Ok(StepOutcome::Passed)
            });
        })
        .unwrap();

    assert_eq!(results.tests[0].state, TestState::Passed);
    assert_eq!(results.tests[0].attempts, 2);

    let envelopes = session.finish(true).unwrap().unwrap();
    let retried: Vec<bool> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestCaseFinished(finished) => Some(finished.will_be_retried),
            _ => None,
        })
        .collect();
    assert_eq!(retried, vec![true, false]);

    let attempts: Vec<u32> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestCaseStarted(started) => Some(started.attempt),
            _ => None,
        })
        .collect();
    assert_eq!(attempts, vec![0, 1]);
}

// =============================================================================
// Shared glue across specs
// =============================================================================

fn shared_glue(registry: &mut RegistryBuilder<World>) {
    registry.given("a passing step", |_, _| Ok(StepOutcome::Passed));
}

fn single_step_feature(uri: &str, name: &str) -> cuke_relay::messages::GherkinDocument {
    document(
        uri,
        json!({
            "location": { "line": 1, "column": 1 },
            "language": "en",
            "keyword": "Feature",
            "name": name,
            "children": [{
                "scenario": {
                    "id": "s1",
                    "location": { "line": 2, "column": 3 },
                    "keyword": "Scenario",
                    "name": "passes",
                    "steps": [step("st1", 3, "Given ", "a passing step")],
                }
            }],
        }),
    )
}

#[test]
fn test_glue_shared_by_two_specs_is_defined_once() {
    let mut session = session(11, None);
    let features = [
        ("features/first.feature", "first"),
        ("features/second.feature", "second"),
    ];
    for (uri, name) in features {
        let results = session
            .run_spec(spec_source(uri, single_step_feature(uri, name)), shared_glue)
            .unwrap();
        assert!(results.success());
    }

    let envelopes = session.finish(true).unwrap().unwrap();
    let definitions: Vec<&str> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::StepDefinition(definition) => Some(definition.id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(definitions.len(), 1);
    assert_eq!(count(&envelopes, EnvelopeKind::TestCase), 2);

    let referenced: Vec<&str> = envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestCase(test_case) => Some(test_case),
            _ => None,
        })
        .flat_map(|test_case| &test_case.test_steps)
        .flat_map(|test_step| test_step.step_definition_ids.iter().flatten())
        .map(String::as_str)
        .collect();
    assert_eq!(referenced, vec![definitions[0], definitions[0]]);
}
