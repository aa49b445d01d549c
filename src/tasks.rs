//! Execution of background work scheduled by the reconcile path

use futures::future::{self, BoxFuture};
use tracing::Instrument;

/// Runs tasks handed over by reconcile steps.
///
/// The future returned by [`TaskRunner::run`] resolves once the task has been
/// *handed over*; whether that means finished depends on the runner.
pub trait TaskRunner: Send + Sync {
    fn run(&self, name: &'static str, task: BoxFuture<'static, ()>) -> BoxFuture<'static, ()>;
}

/// Spawns each task on the tokio runtime and forgets about it.
///
/// No join handle is kept: the task cannot be awaited, cancelled or observed,
/// and its outcome is only visible through its own logs and metrics.
#[derive(Clone, Copy, Debug, Default)]
pub struct DetachedTasks;

impl TaskRunner for DetachedTasks {
    fn run(&self, name: &'static str, task: BoxFuture<'static, ()>) -> BoxFuture<'static, ()> {
        let span = tracing::info_span!("task", name);
        drop(tokio::spawn(task.instrument(span)));
        Box::pin(future::ready(()))
    }
}

/// Runs each task to completion before returning
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineTasks;

impl TaskRunner for InlineTasks {
    fn run(&self, _name: &'static str, task: BoxFuture<'static, ()>) -> BoxFuture<'static, ()> {
        task
    }
}
