//! Merging message logs from several runs into one.

use std::collections::HashSet;

use tracing::debug;

use super::{order_messages, Envelope, EnvelopeKind, Meta, TestRunFinished, TestRunStarted};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("Expected at least one report to merge")]
    NoReports,

    #[error("Report #{0} contains no testRunStarted message")]
    MissingTestRunStarted(usize),

    #[error("Report #{0} contains no testRunFinished message")]
    MissingTestRunFinished(usize),
}

/// Merge several logs.
///
/// The first meta and the earliest `testRunStarted` win; the merged
/// `testRunFinished` takes the latest timestamp and succeeds only if every
/// input did. Structural envelopes seen in an earlier log are dropped, and
/// every `testRunStartedId` is pointed at the surviving run.
pub fn merge_messages(logs: Vec<Vec<Envelope>>) -> Result<Vec<Envelope>, MergeError> {
    if logs.is_empty() {
        return Err(MergeError::NoReports);
    }

    let mut meta: Option<Meta> = None;
    let mut started: Option<TestRunStarted> = None;
    let mut finished: Option<TestRunFinished> = None;
    let mut seen: HashSet<(EnvelopeKind, String)> = HashSet::new();
    let mut body = Vec::new();

    for (index, log) in logs.into_iter().enumerate() {
        let mut has_started = false;
        let mut has_finished = false;

        for envelope in log {
            match envelope {
                Envelope::Meta(candidate) => {
                    meta.get_or_insert(candidate);
                }
                Envelope::TestRunStarted(candidate) => {
                    has_started = true;
                    let earlier = started
                        .as_ref()
                        .map_or(true, |current| candidate.timestamp < current.timestamp);
                    if earlier {
                        started = Some(candidate);
                    }
                }
                Envelope::TestRunFinished(candidate) => {
                    has_finished = true;
                    finished = Some(match finished.take() {
                        None => candidate,
                        Some(current) => {
                            let success = current.success && candidate.success;
                            let mut latest = if candidate.timestamp > current.timestamp {
                                candidate
                            } else {
                                current
                            };
                            latest.success = success;
                            latest
                        }
                    });
                }
                other => {
                    let key = other
                        .structural_id()
                        .map(|id| (other.kind(), id.to_string()));
                    match key {
                        Some(key) if seen.contains(&key) => {
                            debug!(kind = other.kind().name(), "dropping repeated envelope");
                        }
                        Some(key) => {
                            seen.insert(key);
                            body.push(other);
                        }
                        None => body.push(other),
                    }
                }
            }
        }

        if !has_started {
            return Err(MergeError::MissingTestRunStarted(index + 1));
        }
        if !has_finished {
            return Err(MergeError::MissingTestRunFinished(index + 1));
        }
    }

    let started = started.ok_or(MergeError::MissingTestRunStarted(1))?;
    let mut finished = finished.ok_or(MergeError::MissingTestRunFinished(1))?;
    let run_id = started.id.clone();

    if let Some(run_id) = &run_id {
        for envelope in &mut body {
            match envelope {
                Envelope::TestCase(test_case) => {
                    test_case.test_run_started_id = Some(run_id.clone());
                }
                Envelope::TestRunHookStarted(hook) => {
                    hook.test_run_started_id = run_id.clone();
                }
                _ => {}
            }
        }
    }
    finished.test_run_started_id = run_id;

    let mut merged = Vec::with_capacity(body.len() + 3);
    if let Some(meta) = meta {
        merged.push(Envelope::Meta(meta));
    }
    merged.push(Envelope::TestRunStarted(started));
    merged.extend(body);

    let mut merged = order_messages(merged);
    merged.push(Envelope::TestRunFinished(finished));
    Ok(merged)
}
