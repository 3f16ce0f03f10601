//! Wiring and lifecycle (spec.md §3 "Lifecycle"; SPEC_FULL.md §6).
//!
//! `CheckEngine::spawn` creates one `CheckTask` per `CHECKED` server and
//! hands each to the `Executor`: build a connector/executor pair, then let
//! the runtime drive it, rather than introducing an internal scheduler
//! loop of its own.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::backend_ops::BackendOps;
use crate::config::CheckEngineConfig;
use crate::log::LogSink;
use crate::model::Backend;
use crate::rt::{Clock, Executor};
use crate::scheduler::CheckTask;
use crate::transparent::TransparentBinder;

/// Spawns and owns the lifecycle of one backend's check tasks.
///
/// Per spec.md §3: a task is created once per checked server at startup and
/// lives until the backend is torn down. There is no forced-abort path
/// (spec.md §5) — `shutdown` only flips the backend to stopped, which
/// causes the scheduler to skip new probes while letting any in-flight
/// probe run to completion (spec.md §4.1 step 1's `!CHECKED || proxy
/// stopped` branch).
pub struct CheckEngine {
    backend: Arc<Backend>,
}

impl CheckEngine {
    /// Create one `CheckTask` per `CHECKED` server in `backend` and spawn
    /// each onto `executor` (spec.md §3 Lifecycle; SPEC_FULL.md §6).
    pub fn spawn<E, C>(
        backend: Arc<Backend>,
        ops: Arc<dyn BackendOps>,
        log: Arc<dyn LogSink>,
        binder: Arc<dyn TransparentBinder>,
        clock: Arc<C>,
        executor: &E,
        config: &CheckEngineConfig,
    ) -> CheckEngine
    where
        E: Executor<std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>>,
        C: Clock,
    {
        let probe_permits = config.max_concurrent_probes().map(|n| Arc::new(Semaphore::new(n)));

        for server in backend.servers.iter().filter(|s| s.config.is_checked()) {
            let task = CheckTask::new(
                backend.clone(),
                server.clone(),
                ops.clone(),
                log.clone(),
                binder.clone(),
                clock.clone(),
                probe_permits.clone(),
                config.reuse_address(),
                config.transparent_by_default(),
            );
            let fut: std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>> = Box::pin(task.run());
            executor.execute(fut);
        }

        CheckEngine { backend }
    }

    /// Stop issuing new probes on this backend (spec.md §5 cancellation
    /// model: sets the backend to `STSTOPPED`; in-flight probes, if any,
    /// run to completion or to deadline — there is no forced abort).
    pub fn shutdown(&self) {
        self.backend.state.lock().unwrap().stopped = true;
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}
