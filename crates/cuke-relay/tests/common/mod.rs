//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use cuke_relay::config::{
    combine, Configuration, EnvironmentOverrides, RuntimeContext, UserConfiguration,
};
use cuke_relay::messages::{
    Envelope, EnvelopeKind, GherkinDocument, TestStepResultStatus, Timestamp,
};
use cuke_relay::reconciler::{Reconciler, ReconcilerSettings, Spec};
use cuke_relay::runner::RunnerOptions;
use cuke_relay::time::{Clock, FixedClock};
use cuke_relay::{Session, SessionOptions, SpecSource};
use serde_json::{json, Value};

pub const PROJECT_ROOT: &str = "/project";

/// Step handlers write nothing into it; observations go through shared state.
#[derive(Debug, Default)]
pub struct World;

pub fn configuration() -> Configuration {
    combine(
        &UserConfiguration::default(),
        &EnvironmentOverrides::default(),
        &RuntimeContext {
            project_root: PathBuf::from(PROJECT_ROOT),
            implicit_integration_folder: PathBuf::from(PROJECT_ROOT).join("features"),
            ..Default::default()
        },
    )
}

/// A tracking session with a clock ticking one millisecond per reading.
pub fn session(seed: u64, messages_output: Option<PathBuf>) -> Session {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::ticking(Timestamp::default(), 1_000_000));
    let reconciler = Reconciler::new(ReconcilerSettings {
        tracking: true,
        messages_output,
        project_root: PathBuf::from(PROJECT_ROOT),
        ..Default::default()
    })
    .with_clock(Arc::clone(&clock));

    Session::begin(
        configuration(),
        reconciler,
        SessionOptions {
            seed,
            runner: RunnerOptions::default(),
            clock,
        },
    )
    .expect("session starts")
}

/// A document in its Cucumber-messages JSON shape, with `feature` as given.
pub fn document(uri: &str, feature: Value) -> GherkinDocument {
    serde_json::from_value(json!({
        "uri": uri,
        "feature": feature,
        "comments": [],
    }))
    .expect("document fixture is valid")
}

pub fn step(id: &str, line: u32, keyword: &str, text: &str) -> Value {
    json!({
        "id": id,
        "location": { "line": line, "column": 5 },
        "keyword": keyword,
        "text": text,
    })
}

pub fn spec_source(relative: &str, document: GherkinDocument) -> SpecSource {
    SpecSource {
        spec: Spec::new(relative, PathBuf::from(PROJECT_ROOT).join(relative)),
        source: format!("# {relative}"),
        document,
        step_definition_paths: Vec::new(),
    }
}

pub fn kinds(envelopes: &[Envelope]) -> Vec<&'static str> {
    envelopes.iter().map(|envelope| envelope.kind().name()).collect()
}

pub fn count(envelopes: &[Envelope], kind: EnvelopeKind) -> usize {
    envelopes
        .iter()
        .filter(|envelope| envelope.kind() == kind)
        .count()
}

pub fn step_statuses(envelopes: &[Envelope]) -> Vec<TestStepResultStatus> {
    envelopes
        .iter()
        .filter_map(|envelope| match envelope {
            Envelope::TestStepFinished(finished) => Some(finished.test_step_result.status),
            _ => None,
        })
        .collect()
}
