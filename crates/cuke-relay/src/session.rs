//! One run, driven in process.
//!
//! A [`Session`] owns the reconciler thread for the duration of a run and
//! feeds it every spec in turn: before-spec, compose, run, after-spec.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use tracing::{debug, info, warn};

use crate::composer::{compose, ComposeError, ComposeOptions, SpecInput};
use crate::config::Configuration;
use crate::ids::{random_seed, IdGenerator, SeededIdGenerator};
use crate::messages::{Envelope, GherkinDocument};
use crate::paths::step_definition_patterns;
use crate::pickles;
use crate::reconciler::{spawn, Reconciler, Spec, TaskChannel};
use crate::registry::{RegistryBuilder, RegistryError};
use crate::runner::{run_suite, RunnerOptions, SpecResults};
use crate::snippets::StepDefinitionHints;
use crate::tasks::SinkError;
use crate::time::{Clock, SystemClock};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to start the reconciler: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("the reconciler thread panicked")]
    ReconcilerPanicked,

    #[error(transparent)]
    Sink(#[from] SinkError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Compose(#[from] ComposeError),
}

/// A feature file ready to be run.
#[derive(Debug, Clone)]
pub struct SpecSource {
    pub spec: Spec,
    /// Raw feature text.
    pub source: String,
    pub document: GherkinDocument,
    /// Files the step-definition patterns matched, quoted when a step is
    /// missing.
    pub step_definition_paths: Vec<PathBuf>,
}

pub struct SessionOptions {
    /// Seeds every ID of the run. Equal seeds give equal logs.
    pub seed: u64,
    pub runner: RunnerOptions,
    pub clock: Arc<dyn Clock>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            seed: random_seed(),
            runner: RunnerOptions::default(),
            clock: Arc::new(SystemClock),
        }
    }
}

pub struct Session {
    configuration: Configuration,
    options: SessionOptions,
    tracking: bool,
    test_run_started_id: String,
    specs_run: u64,
    channel: TaskChannel,
    handle: JoinHandle<Reconciler>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("tracking", &self.tracking)
            .field("test_run_started_id", &self.test_run_started_id)
            .field("specs_run", &self.specs_run)
            .finish()
    }
}

impl Session {
    /// Start the reconciler and open the run.
    pub fn begin(
        configuration: Configuration,
        reconciler: Reconciler,
        options: SessionOptions,
    ) -> Result<Self, SessionError> {
        let tracking = reconciler.settings().tracking;
        let test_run_started_id = SeededIdGenerator::new(options.seed).new_id();
        let (channel, handle) = spawn(reconciler).map_err(SessionError::Spawn)?;

        info!(seed = options.seed, tracking, "starting run");
        channel.before_run(&test_run_started_id)?;

        Ok(Self {
            configuration,
            options,
            tracking,
            test_run_started_id,
            specs_run: 0,
            channel,
            handle,
        })
    }

    pub fn test_run_started_id(&self) -> &str {
        &self.test_run_started_id
    }

    /// Run one spec with the step definitions `define` registers.
    ///
    /// Once the spec is opened, any failure (glue registration, composition
    /// or the suite itself) closes it with the error as its host error
    /// before being returned.
    pub fn run_spec<W, F>(
        &mut self,
        input: SpecSource,
        define: F,
    ) -> Result<SpecResults, SessionError>
    where
        W: Default,
        F: FnOnce(&mut RegistryBuilder<W>),
    {
        let SpecSource {
            spec,
            source,
            document,
            step_definition_paths,
        } = input;
        debug!(spec = %spec.relative, "running spec");

        self.specs_run += 1;
        let mut ids = SeededIdGenerator::new(self.options.seed.wrapping_add(self.specs_run));

        self.channel.before_spec(&spec)?;

        let mut builder = RegistryBuilder::new();
        define(&mut builder);
        let registry = match builder.finalize(&mut ids) {
            Ok(registry) => Arc::new(registry),
            Err(err) => return Err(self.abandon_spec(&spec, err)),
        };

        let pickles = pickles::compile(&document, &mut ids);
        let options = ComposeOptions {
            tags: self.configuration.tags.clone(),
            omit_filtered: self.configuration.omit_filtered,
            dry_run: self.configuration.dry_run,
            soft_errors: self.configuration.state.soft_errors,
            is_tracking: self.tracking,
            hints: self.hints(&spec, &step_definition_paths),
            test_run_started_id: self.test_run_started_id.clone(),
        };
        let composed = compose(
            registry,
            SpecInput {
                source,
                document,
                pickles,
            },
            options,
            Box::new(ids),
            Arc::clone(&self.options.clock),
        );
        let mut composition = match composed {
            Ok(composition) => composition,
            Err(err) => return Err(self.abandon_spec(&spec, err)),
        };

        let results = match run_suite(&mut composition, &self.options.runner, &mut self.channel) {
            Ok(results) => results,
            Err(err) => return Err(self.abandon_spec(&spec, err)),
        };

        self.channel.after_spec(&spec, &results)?;
        info!(
            spec = %spec.relative,
            tests = results.tests.len(),
            failures = results.failures(),
            "spec finished"
        );
        Ok(results)
    }

    /// Close the run and hand back the final log, if anything was tracked.
    pub fn finish(self, success: bool) -> Result<Option<Vec<Envelope>>, SessionError> {
        self.channel.after_run(success)?;
        drop(self.channel);

        let reconciler = self
            .handle
            .join()
            .map_err(|_| SessionError::ReconcilerPanicked)?;
        Ok(reconciler.into_envelopes())
    }

    /// Close a spec that failed before producing results.
    fn abandon_spec<E>(&self, spec: &Spec, err: E) -> SessionError
    where
        E: std::fmt::Display + Into<SessionError>,
    {
        warn!(spec = %spec.relative, error = %err, "spec failed");
        let results = SpecResults {
            error: Some(err.to_string()),
            tests: Vec::new(),
        };
        match self.channel.after_spec(spec, &results) {
            Ok(()) => err.into(),
            Err(close) => close.into(),
        }
    }

    fn hints(&self, spec: &Spec, step_definition_paths: &[PathBuf]) -> StepDefinitionHints {
        let step_definition_patterns =
            match step_definition_patterns(&self.configuration, &spec.absolute) {
                Ok(patterns) => patterns,
                Err(err) => {
                    debug!(%err, "no step definition patterns for hints");
                    Vec::new()
                }
            };

        StepDefinitionHints {
            step_definitions: self.configuration.step_definitions.clone(),
            step_definition_patterns,
            step_definition_paths: step_definition_paths
                .iter()
                .map(|path| path.display().to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{combine, EnvironmentOverrides, RuntimeContext, UserConfiguration};
    use crate::messages::{EnvelopeKind, Timestamp};
    use crate::reconciler::ReconcilerSettings;
    use crate::registry::StepOutcome;
    use crate::runner::TestState;
    use crate::tasks::{EventSink, Task};
    use crate::testing::{document, scenario, World};
    use crate::time::FixedClock;

    fn configuration() -> Configuration {
        combine(
            &UserConfiguration::default(),
            &EnvironmentOverrides::default(),
            &RuntimeContext {
                project_root: PathBuf::from("/project"),
                implicit_integration_folder: PathBuf::from("/project/features"),
                ..Default::default()
            },
        )
    }

    fn session(tracking: bool, seed: u64) -> Session {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::ticking(Timestamp::default(), 1_000_000));
        let reconciler = Reconciler::new(ReconcilerSettings {
            tracking,
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
        .unwrap()
    }

    fn spec_source() -> SpecSource {
        SpecSource {
            spec: Spec::new("features/a.feature", "/project/features/a.feature"),
            source: "Feature: a".to_string(),
            document: document(
                "a",
                &[],
                vec![
                    scenario("s1", "passes", &[], &[("st1", "a step")]),
                    scenario("s2", "fails", &[], &[("st2", "a broken step")]),
                ],
            ),
            step_definition_paths: Vec::new(),
        }
    }

    fn steps(registry: &mut RegistryBuilder<World>) {
        registry.given("a step", |world: &mut World, _| {
            world.log.push("a step".to_string());
            Ok(StepOutcome::Passed)
        });
        registry.given("a broken step", |_: &mut World, _| anyhow::bail!("broken"));
    }

    #[test]
    fn test_run_produces_a_closed_log() {
        let mut session = session(true, 1);
        let results = session.run_spec(spec_source(), steps).unwrap();
        let states: Vec<TestState> = results.tests.iter().map(|test| test.state).collect();
        assert_eq!(states, vec![TestState::Passed, TestState::Failed]);

        let envelopes = session.finish(results.success()).unwrap().unwrap();
        assert_eq!(envelopes.first().map(Envelope::kind), Some(EnvelopeKind::Meta));
        match envelopes.last() {
            Some(Envelope::TestRunFinished(finished)) => assert!(!finished.success),
            other => panic!("expected testRunFinished last, got {other:?}"),
        }
        let finished_cases = envelopes
            .iter()
            .filter(|envelope| envelope.kind() == EnvelopeKind::TestCaseFinished)
            .count();
        assert_eq!(finished_cases, 2);
    }

    #[test]
    fn test_equal_seeds_give_equal_logs() {
        let run = |seed| {
            let mut session = session(true, seed);
            session.run_spec(spec_source(), steps).unwrap();
            session.finish(false).unwrap().unwrap()
        };
        assert_eq!(run(9), run(9));
    }

    fn isolation_override_spec() -> SpecSource {
        SpecSource {
            spec: Spec::new("features/a.feature", "/project/features/a.feature"),
            source: "Feature: a".to_string(),
            document: document(
                "a",
                &[],
                vec![scenario("s1", "isolated", &["@testIsolation(false)"], &[("st1", "a step")])],
            ),
            step_definition_paths: Vec::new(),
        }
    }

    fn second_spec_source() -> SpecSource {
        let mut document = document(
            "b",
            &[],
            vec![scenario("s1", "passes", &[], &[("st1", "a step")])],
        );
        document.uri = Some("features/b.feature".to_string());
        SpecSource {
            spec: Spec::new("features/b.feature", "/project/features/b.feature"),
            source: "Feature: b".to_string(),
            document,
            step_definition_paths: Vec::new(),
        }
    }

    #[test]
    fn test_compose_failure_closes_the_spec() {
        let mut session = session(true, 3);
        let err = session.run_spec(isolation_override_spec(), steps).unwrap_err();
        assert!(matches!(err, SessionError::Compose(ComposeError::SuiteOnlyOption(_))));

        // A closed spec no longer takes envelopes.
        let rejected = session.channel.send(Task::SpecEnvelopes(Vec::new())).unwrap_err();
        assert!(rejected.to_string().contains("Unexpected state in"));
    }

    #[test]
    fn test_next_spec_runs_after_a_compose_failure() {
        let mut session = session(true, 3);
        session.run_spec(isolation_override_spec(), steps).unwrap_err();
        let results = session.run_spec(second_spec_source(), steps).unwrap();
        assert!(results.success());

        let envelopes = session.finish(results.success()).unwrap().unwrap();
        let documents: Vec<Option<&str>> = envelopes
            .iter()
            .filter_map(|envelope| match envelope {
                Envelope::GherkinDocument(document) => Some(document.uri.as_deref()),
                _ => None,
            })
            .collect();
        assert_eq!(documents, vec![Some("features/b.feature")]);
        let finished_cases = envelopes
            .iter()
            .filter(|envelope| envelope.kind() == EnvelopeKind::TestCaseFinished)
            .count();
        assert_eq!(finished_cases, 1);
    }

    #[test]
    fn test_untracked_run_has_no_log() {
        let mut session = session(false, 1);
        session.run_spec(spec_source(), steps).unwrap();
        assert_eq!(session.finish(true).unwrap(), None);
    }
}
