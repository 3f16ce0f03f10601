//! The backend collaborator (spec.md §6 "To the backend"; §1 Non-goals:
//! "the load-balancing map recomputation" and "pending-connection queue
//! internals" are explicitly out of scope).
//!
//! Of the four operations spec.md names, `pendconn_from_px`/`pendconn_free`
//! are concrete methods on `crate::model::Backend` (`pop_pending`/
//! `free_pending`) because this crate's own `Backend` owns the
//! backend-wide queue outright. What genuinely stays pluggable — because
//! it depends on the surrounding load balancer's own server-count and
//! routing-map bookkeeping, which this crate never sees — is
//! `recount_servers`/`recalc_server_map`, so those two become `BackendOps`
//! trait methods: a small trait sitting right at the collaborator
//! boundary, with no default beyond `DefaultBackendOps` below.

use crate::model::Backend;

/// The two backend-wide bookkeeping operations the FSM propagator
/// (`crate::fsm_drive`) invokes on every UP/DOWN edge (spec.md §4.5 edge
/// effects 2–3; §6).
pub trait BackendOps: Send + Sync + 'static {
    /// Recompute `srv_act`/`srv_bck` for `backend` (spec.md §8 invariant 6:
    /// after this call, `srv_act + srv_bck` equals the number of UP
    /// servers of each role).
    fn recount_servers(&self, backend: &Backend);

    /// Recompute the backend's load-balancing map after a liveness edge.
    /// Out of scope per spec.md §1; this crate never reads or writes a map
    /// itself, so implementations are free to do nothing observable to the
    /// check engine beyond their own external bookkeeping.
    fn recalc_server_map(&self, backend: &Backend);
}

/// Default `BackendOps`: recomputes `srv_act`/`srv_bck` by scanning each
/// server's current liveness, and treats `recalc_server_map` as a no-op.
///
/// Suitable standalone for tests and for callers with no load-balancing
/// map of their own (e.g. a pure health-monitoring deployment); production
/// integrations with a real routing map should supply their own
/// `BackendOps` that wraps this one's `recount_servers` and additionally
/// recomputes their map in `recalc_server_map`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackendOps;

impl BackendOps for DefaultBackendOps {
    fn recount_servers(&self, backend: &Backend) {
        let mut act = 0u32;
        let mut bck = 0u32;
        for server in &backend.servers {
            let up = server.state.lock().unwrap().is_up();
            if !up {
                continue;
            }
            if server.config.is_backup() {
                bck += 1;
            } else {
                act += 1;
            }
        }
        let mut state = backend.state.lock().unwrap();
        state.srv_act = act;
        state.srv_bck = bck;
    }

    fn recalc_server_map(&self, _backend: &Backend) {}
}
