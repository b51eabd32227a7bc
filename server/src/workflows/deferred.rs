//! Work scheduled to run after the webhook has been acknowledged.

use std::panic::AssertUnwindSafe;

use futures::future::BoxFuture;
use futures::FutureExt as _;
use tokio::task::JoinHandle;
use tracing::error;

/// Tasks collected while handling one event.
///
/// Nothing runs until the caller decides to [`spawn`](Self::spawn) or
/// [`run`](Self::run) them; a task must handle its own failures.
#[derive(Default)]
pub struct DeferredTasks {
    tasks: Vec<(&'static str, BoxFuture<'static, ()>)>,
}

impl DeferredTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F>(&mut self, name: &'static str, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name, task.boxed()));
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Names of the pending tasks, in order.
    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Detach every task onto the runtime. A panicking task is logged and
    /// does not affect the others.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        self.tasks
            .into_iter()
            .map(|(name, task)| tokio::spawn(guarded(name, task)))
            .collect()
    }

    /// Run every task to completion on the current task, in order.
    pub async fn run(self) {
        for (name, task) in self.tasks {
            guarded(name, task).await;
        }
    }
}

async fn guarded(name: &'static str, task: BoxFuture<'static, ()>) {
    if AssertUnwindSafe(task).catch_unwind().await.is_err() {
        error!(task = name, "Deferred task panicked");
    }
}
