//! The check scheduler (spec.md §4.1): one task per checked server, woken
//! on its `expire` deadline.
//!
//! `rephase` is the `while expire <= now { expire += inter }` idiom lifted
//! into a free function exactly as SPEC_FULL.md §5 asks, so the "phase
//! monotonicity" law (spec.md §8) is unit-testable with no async runtime at
//! all. `CheckTask::tick_once` is the rest of spec.md §4.1 collapsed into a
//! single straight-line async function per the REDESIGN FLAGS (spec.md §9):
//! because every stage of one probe is `.await`ed before `tick_once`
//! returns, the "`curfd != none` suppresses restart" invariant (spec.md §8
//! invariant 3) holds by construction — there is no point at which a
//! second probe for the same server can start while one is in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;

use crate::backend_ops::BackendOps;
use crate::error::Error;
use crate::log::LogSink;
use crate::model::{Backend, Server};
use crate::probe::{self, ProbeOutcome, ProbeSpec, SourceBinding};
use crate::propagate;
use crate::rt::Clock;
use crate::transparent::TransparentBinder;

/// Advance `expire` by whole multiples of `inter` until it is strictly
/// after `now` (spec.md §4.1's rephasing idiom; §8's phase-monotonicity
/// law). A no-op, other than the final strict-inequality check, when
/// `expire` is already ahead of `now`.
pub fn rephase(mut expire: Instant, inter: Duration, now: Instant) -> Instant {
    debug_assert!(inter > Duration::ZERO, "a zero interval would loop forever");
    while expire <= now {
        expire += inter;
    }
    expire
}

/// One server's check task: owns its own `expire` deadline and a
/// non-owning handle (`Arc`) to the server and backend it checks (spec.md
/// §9: tasks hold a non-owning handle to their server).
pub struct CheckTask<C> {
    backend: Arc<Backend>,
    server: Arc<Server>,
    ops: Arc<dyn BackendOps>,
    log: Arc<dyn LogSink>,
    binder: Arc<dyn TransparentBinder>,
    clock: Arc<C>,
    probe_permits: Option<Arc<Semaphore>>,
    reuse_address: bool,
    transparent_by_default: bool,
    expire: Instant,
}

impl<C: Clock> CheckTask<C> {
    pub fn new(
        backend: Arc<Backend>,
        server: Arc<Server>,
        ops: Arc<dyn BackendOps>,
        log: Arc<dyn LogSink>,
        binder: Arc<dyn TransparentBinder>,
        clock: Arc<C>,
        probe_permits: Option<Arc<Semaphore>>,
        reuse_address: bool,
        transparent_by_default: bool,
    ) -> CheckTask<C> {
        let now = clock.now();
        CheckTask {
            backend,
            server,
            ops,
            log,
            binder,
            clock,
            probe_permits,
            reuse_address,
            transparent_by_default,
            expire: now,
        }
    }

    /// Run this server's checks forever (spec.md §3 "Lifecycle": "lives
    /// until the backend is torn down" — there is no explicit cancel,
    /// spec.md §5; dropping the task, e.g. on engine shutdown, is how it
    /// stops).
    pub async fn run(mut self) {
        loop {
            self.clock.sleep_until(self.expire).await;
            let now = self.clock.now();
            self.tick_once(now).await;
        }
    }

    /// One entry of the scheduler (spec.md §4.1), runnable directly from
    /// tests with an explicit `now` — no sleeping, no spawn — so the
    /// scenario table in spec.md §8 can be driven probe-by-probe.
    pub async fn tick_once(&mut self, now: Instant) {
        let inter = self.server.config.inter;

        if !self.server.config.is_checked() || self.backend.state.lock().unwrap().stopped {
            self.expire = rephase(self.expire, inter, now);
            return;
        }

        let _permit = match &self.probe_permits {
            Some(sem) => match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    // Engine-wide concurrent-probe cap spent: absorbed
                    // silently, no probe this tick (spec.md §4.2 step 2, §7).
                    self.expire = rephase(self.expire, inter, now);
                    return;
                }
            },
            None => None,
        };

        // `None` means the probe was absorbed (spec.md §4.2 step 2, §7:
        // socket creation failed or the fd cap was hit) — a synchronous
        // no-op, not a failed check, so the FSM never sees it.
        if let Some(outcome) = self.run_one_probe().await {
            propagate::apply(&self.backend, &self.server, self.ops.as_ref(), self.log.as_ref(), outcome).await;
        }

        let now = self.clock.now();
        self.expire = rephase(self.expire, inter, now);
    }

    async fn run_one_probe(&self) -> Option<ProbeOutcome> {
        let cfg = &self.server.config;
        let source = resolve_source(&self.backend, cfg, self.transparent_by_default);
        let check_req = &self.backend.check_req;
        let spec = ProbeSpec {
            endpoint: cfg.check_endpoint(),
            source,
            reuse_address: self.reuse_address,
            kind: self.backend.check_kind,
            check_req,
        };

        match tokio::time::timeout(cfg.connect_timeout(), probe::run(spec, self.binder.as_ref())).await {
            Ok(Ok(outcome)) => Some(outcome),
            Ok(Err(e)) => self.handle_probe_error(e),
            Err(_elapsed) => Some(ProbeOutcome::Failure), // spec.md §4.5 "Failure or timeout"
        }
    }

    /// spec.md §7: resource-exhaustion errors (socket creation, fd over cap)
    /// are absorbed — `None`, no probe this tick, no failed-check count — to
    /// avoid a flap cascade when the OS is briefly constrained. Bind
    /// failures are always logged at `Alert` and always count as one failed
    /// probe.
    fn handle_probe_error(&self, err: Error) -> Option<ProbeOutcome> {
        if err.is_bind_failure() {
            self.log.alert(&format!(
                "Server {}/{}: {}",
                self.backend.id.0,
                self.server.id().0,
                err
            ));
            return Some(ProbeOutcome::Failure);
        }
        if err.is_resource_exhaustion() {
            return None;
        }
        Some(ProbeOutcome::Failure)
    }
}

/// Outbound binding priority, spec.md §4.2 step 4: server-level `BIND_SRC`
/// before proxy-level `BIND_SRC`. `transparent_by_default`
/// (`CheckEngineConfig::transparent_by_default`, SPEC_FULL.md §0) turns on
/// the transparent-proxy handshake for a source bind that didn't otherwise
/// ask for it via `ServerFlags::TRANSPARENT`/`BackendFlags::TRANSPARENT`.
fn resolve_source(backend: &Backend, cfg: &crate::model::ServerConfig, transparent_by_default: bool) -> Option<SourceBinding> {
    use crate::model::ServerFlags;

    if cfg.flags.contains(ServerFlags::BIND_SRC) {
        if let Some(addr) = cfg.source_addr {
            let transparent = transparent_by_default || cfg.flags.contains(ServerFlags::TRANSPARENT);
            return Some(SourceBinding { addr, transparent });
        }
    }
    if backend.flags.contains(crate::model::BackendFlags::BIND_SRC) {
        if let Some(addr) = backend.source_addr {
            let transparent = transparent_by_default || backend.flags.contains(crate::model::BackendFlags::TRANSPARENT);
            return Some(SourceBinding { addr, transparent });
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_ops::DefaultBackendOps;
    use crate::error::Kind;
    use crate::fsm::Health;
    use crate::model::{BackendFlags, BackendId, BackendOptions, ServerConfig, ServerFlags, ServerId};
    use crate::protocol::CheckKind;
    use crate::rt::TokioClock;
    use crate::testing::RecordingLogSink;
    use crate::transparent::DefaultTransparentBinder;

    const INTER: Duration = Duration::from_secs(2);

    fn t(seconds: u64) -> Instant {
        // Tests only ever compare relative offsets, so any fixed base works;
        // `Instant` has no public epoch constructor.
        Instant::now() - Duration::from_secs(3600) + Duration::from_secs(seconds)
    }

    #[test]
    fn rephase_is_a_noop_when_still_ahead_of_now() {
        let expire = t(10);
        let now = t(5);
        assert_eq!(rephase(expire, INTER, now), expire);
    }

    #[test]
    fn rephase_advances_by_whole_multiples_of_inter() {
        let expire = t(10);
        let now = t(11);
        let next = rephase(expire, INTER, now);
        assert_eq!(next, t(12));
        assert!(next > now);
    }

    #[test]
    fn rephase_catches_up_after_a_long_pause() {
        let expire = t(0);
        let now = t(100);
        let next = rephase(expire, INTER, now);
        assert!(next > now);
        let elapsed = next.duration_since(t(0));
        assert_eq!(elapsed.as_secs() % INTER.as_secs(), 0);
    }

    #[test]
    fn rephase_is_idempotent_once_ahead() {
        let expire = t(10);
        let now = t(5);
        let once = rephase(expire, INTER, now);
        let twice = rephase(once, INTER, now);
        assert_eq!(once, twice);
    }

    fn server_config(bind_src: bool, transparent_flag: bool) -> crate::model::ServerConfig {
        use crate::model::{ServerFlags, ServerId};

        let mut flags = ServerFlags::CHECKED;
        if bind_src {
            flags = flags | ServerFlags::BIND_SRC;
        }
        if transparent_flag {
            flags = flags | ServerFlags::TRANSPARENT;
        }
        crate::model::ServerConfig {
            id: ServerId(0),
            addr: "127.0.0.1:80".parse().unwrap(),
            check_addr: None,
            check_port: None,
            source_addr: Some("127.0.0.1:0".parse().unwrap()),
            flags,
            inter: Duration::from_secs(2),
            connect_timeout: None,
            rise: 2,
            fall: 3,
            maxconn: 0,
        }
    }

    fn backend_without_source() -> Backend {
        use crate::model::{BackendFlags, BackendId, BackendOptions};
        use crate::protocol::CheckKind;

        Backend::new(BackendId(0), BackendOptions::empty(), BackendFlags::empty(), CheckKind::Tcp, bytes::Bytes::new(), None, vec![])
    }

    #[test]
    fn resolve_source_is_none_without_bind_src() {
        let cfg = server_config(false, false);
        let backend = backend_without_source();
        assert!(resolve_source(&backend, &cfg, false).is_none());
    }

    #[test]
    fn resolve_source_honors_server_transparent_flag() {
        let cfg = server_config(true, true);
        let backend = backend_without_source();
        let source = resolve_source(&backend, &cfg, false).unwrap();
        assert!(source.transparent);
    }

    #[test]
    fn resolve_source_transparent_by_default_applies_without_the_flag() {
        let cfg = server_config(true, false);
        let backend = backend_without_source();
        let source = resolve_source(&backend, &cfg, true).unwrap();
        assert!(source.transparent, "engine-wide default should turn transparency on");
    }

    fn checked_server() -> Arc<Server> {
        let cfg = ServerConfig {
            id: ServerId(0),
            addr: "127.0.0.1:1".parse().unwrap(),
            check_addr: None,
            check_port: None,
            source_addr: None,
            flags: ServerFlags::CHECKED,
            inter: Duration::from_secs(3600),
            connect_timeout: None,
            rise: 2,
            fall: 3,
            maxconn: 0,
        };
        Arc::new(Server::new(cfg, Health::freshly_up()))
    }

    fn check_task(server: Arc<Server>, backend: Arc<Backend>) -> CheckTask<TokioClock> {
        CheckTask::new(
            backend,
            server,
            Arc::new(DefaultBackendOps),
            Arc::new(RecordingLogSink::default()),
            Arc::new(DefaultTransparentBinder),
            Arc::new(TokioClock),
            None,
            true,
            false,
        )
    }

    // spec.md §4.2 step 2 / §7: resource exhaustion is a synchronous no-op,
    // not a failed check — the task just retries next interval.
    #[test]
    fn resource_exhaustion_is_absorbed_not_counted_as_a_failure() {
        let server = checked_server();
        let backend = Arc::new(Backend::new(
            BackendId(0),
            BackendOptions::empty(),
            BackendFlags::empty(),
            CheckKind::Tcp,
            bytes::Bytes::new(),
            None,
            vec![server.clone()],
        ));
        let task = check_task(server.clone(), backend);
        let outcome = task.handle_probe_error(Error::new(Kind::SocketCreate));
        assert_eq!(outcome, None);
    }

    // spec.md §4.2 step 4 / §7: a source bind failure always counts as one
    // failed probe and is always logged at `Alert`.
    #[test]
    fn bind_failure_counts_as_a_failed_probe() {
        let server = checked_server();
        let backend = Arc::new(Backend::new(
            BackendId(0),
            BackendOptions::empty(),
            BackendFlags::empty(),
            CheckKind::Tcp,
            bytes::Bytes::new(),
            None,
            vec![server.clone()],
        ));
        let task = check_task(server.clone(), backend);
        let outcome = task.handle_probe_error(Error::new(Kind::Bind));
        assert_eq!(outcome, Some(ProbeOutcome::Failure));
    }
}
