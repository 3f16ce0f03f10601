//! An executor abstraction (spec.md §5 "single-threaded cooperative event
//! loop") for placing a `CheckTask::run` future onto whatever async
//! runtime is driving the engine.
//!
//! Each checked server's `CheckTask` is spawned independently so the
//! engine scales across tokio's worker threads, with serialization of
//! same-backend edge effects provided by `Backend::edge_gate`
//! (`crate::model`) instead of by a shared single thread.

use std::future::Future;

/// Places a future onto an async runtime (spec.md §6's polling/timer
/// collaborators, generalized to "wherever `CheckTask::run` futures live").
pub trait Executor<Fut> {
    /// Spawn `fut` to run to completion, detached from the caller.
    fn execute(&self, fut: Fut);
}

/// The production `Executor`, backed by `tokio::spawn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioExecutor;

impl<Fut> Executor<Fut> for TokioExecutor
where
    Fut: Future + Send + 'static,
    Fut::Output: Send + 'static,
{
    fn execute(&self, fut: Fut) {
        tokio::spawn(fut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn tokio_executor_runs_the_spawned_future() {
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        TokioExecutor.execute(async move {
            flag.store(true, Ordering::SeqCst);
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
