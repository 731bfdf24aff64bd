//! The reconciler on a dedicated thread.
//!
//! Every request blocks until the reconciler has handled it, so the log
//! reflects execution order exactly.

use std::io;
use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use tracing::debug;

use super::{Reconciler, ReconcilerError, Spec};
use crate::runner::SpecResults;
use crate::tasks::{EventSink, SinkError, Task};

enum Request {
    BeforeRun { test_run_started_id: String },
    BeforeSpec(Spec),
    AfterSpec { spec: Spec, results: SpecResults },
    AfterRun { success: bool },
    AfterScreenshot(PathBuf),
    Task(Task),
}

type Reply = Sender<Result<(), ReconcilerError>>;

/// Handle to a spawned reconciler. Dropping every handle stops the thread.
#[derive(Clone)]
pub struct TaskChannel {
    requests: Sender<(Request, Reply)>,
}

impl std::fmt::Debug for TaskChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskChannel")
            .field("pending", &self.requests.len())
            .finish()
    }
}

/// Move `reconciler` onto its own thread. Joining the returned handle, after
/// every [`TaskChannel`] is dropped, gives the reconciler back.
pub fn spawn(reconciler: Reconciler) -> io::Result<(TaskChannel, JoinHandle<Reconciler>)> {
    let (requests, inbox) = unbounded();
    let handle = thread::Builder::new()
        .name("cuke-relay-reconciler".to_string())
        .spawn(move || serve(reconciler, inbox))?;
    Ok((TaskChannel { requests }, handle))
}

fn serve(mut reconciler: Reconciler, inbox: Receiver<(Request, Reply)>) -> Reconciler {
    debug!("reconciler started");

    for (request, reply) in inbox.iter() {
        let result = match request {
            Request::BeforeRun {
                test_run_started_id,
            } => reconciler.before_run(&test_run_started_id),
            Request::BeforeSpec(spec) => reconciler.before_spec(&spec),
            Request::AfterSpec { spec, results } => reconciler.after_spec(&spec, &results),
            Request::AfterRun { success } => reconciler.after_run(success),
            Request::AfterScreenshot(path) => reconciler.after_screenshot(&path),
            Request::Task(task) => reconciler.handle_task(task),
        };
        // The caller may have given up waiting.
        let _ = reply.send(result);
    }

    debug!(state = reconciler.state().name(), "reconciler stopped");
    reconciler
}

impl TaskChannel {
    pub fn before_run(&self, test_run_started_id: &str) -> Result<(), SinkError> {
        self.call(Request::BeforeRun {
            test_run_started_id: test_run_started_id.to_string(),
        })
    }

    pub fn before_spec(&self, spec: &Spec) -> Result<(), SinkError> {
        self.call(Request::BeforeSpec(spec.clone()))
    }

    pub fn after_spec(&self, spec: &Spec, results: &SpecResults) -> Result<(), SinkError> {
        self.call(Request::AfterSpec {
            spec: spec.clone(),
            results: results.clone(),
        })
    }

    pub fn after_run(&self, success: bool) -> Result<(), SinkError> {
        self.call(Request::AfterRun { success })
    }

    pub fn after_screenshot(&self, path: impl Into<PathBuf>) -> Result<(), SinkError> {
        self.call(Request::AfterScreenshot(path.into()))
    }

    fn call(&self, request: Request) -> Result<(), SinkError> {
        let (reply, acknowledgement) = bounded(1);
        self.requests
            .send((request, reply))
            .map_err(|_| SinkError::Disconnected)?;
        let result = acknowledgement
            .recv()
            .map_err(|_| SinkError::Disconnected)?;
        Ok(result?)
    }
}

impl EventSink for TaskChannel {
    fn send(&mut self, task: Task) -> Result<(), SinkError> {
        self.call(Request::Task(task))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Envelope, TestCaseFinished};
    use crate::reconciler::ReconcilerSettings;

    fn tracking() -> Reconciler {
        Reconciler::new(ReconcilerSettings {
            tracking: true,
            ..ReconcilerSettings::default()
        })
    }

    #[test]
    fn test_round_trip_returns_the_reconciler() {
        let (channel, handle) = spawn(tracking()).unwrap();
        channel.before_run("run-1").unwrap();
        channel.after_run(true).unwrap();
        drop(channel);

        let reconciler = handle.join().unwrap();
        let envelopes = reconciler.into_envelopes().unwrap();
        assert!(matches!(envelopes.first(), Some(Envelope::Meta(_))));
        assert!(matches!(envelopes.last(), Some(Envelope::TestRunFinished(_))));
    }

    #[test]
    fn test_errors_come_back_to_the_caller() {
        let (mut channel, handle) = spawn(tracking()).unwrap();
        channel.before_run("run-1").unwrap();

        let err = channel
            .send(Task::TestCaseFinished(TestCaseFinished::default()))
            .unwrap_err();
        assert!(matches!(
            err,
            SinkError::Reconciler(ReconcilerError::UnexpectedState {
                handler: "test_case_finished",
                state: "before-run"
            })
        ));

        drop(channel);
        assert_eq!(handle.join().unwrap().state().name(), "before-run");
    }

    #[test]
    fn test_clones_share_one_reconciler() {
        let (channel, handle) = spawn(tracking()).unwrap();
        let other = channel.clone();
        channel.before_run("run-1").unwrap();
        other.after_run(true).unwrap();
        drop(channel);
        drop(other);
        assert_eq!(handle.join().unwrap().state().name(), "after-run");
    }
}
