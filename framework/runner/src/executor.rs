use std::future::Future;

use tokio::runtime::Handle;

#[derive(Debug)]
pub struct Executor {
    runtime: tokio::runtime::Runtime,
}

impl Executor {
    pub(crate) fn new(runtime: tokio::runtime::Runtime) -> Self {
        Self { runtime }
    }

    /// Run async code in place, blocking until it completes.
    ///
    /// The future is never cancelled by the runner, a scenario call that is in flight when the run
    /// is stopped gets until the end of the grace period to finish. Any per-call timeout is up to
    /// the future itself.
    pub fn execute_in_place<T>(
        &self,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        self.runtime.block_on(fut)
    }

    /// Submit async code to be run in the background.
    ///
    /// It is not guaranteed that the runner will wait for the future to complete before shutting
    /// down. In a virtual user behaviour, use [Executor::execute_in_place] so that the work is part
    /// of the iteration.
    pub fn spawn(&self, fut: impl Future<Output = ()> + Send + 'static) {
        self.runtime.spawn(fut);
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }
}
