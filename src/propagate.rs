//! The liveness FSM's edge propagator (spec.md §4.5 "UP edge effects" /
//! "DOWN edge effects"; §4.6 drain policies).
//!
//! `crate::fsm` is the pure state machine; this module is the side-effecting
//! half of "Liveness FSM & propagator" (spec.md §2's component table):
//! consuming one probe's `ProbeOutcome`, updating `ServerState::health`, and
//! — on an edge — calling into `BackendOps`, draining queues, and logging.
//! Edge-effect processing for one backend is serialized through
//! `Backend::edge_gate` (SPEC_FULL.md §5), since several `CheckTask`s can
//! run concurrently against servers of the same backend.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::backend_ops::BackendOps;
use crate::fsm::Edge;
use crate::log::LogSink;
use crate::model::{Backend, BackendOptions, Server};
use crate::probe::ProbeOutcome;

/// Feed one completed probe's outcome into `server`'s liveness state and
/// run whatever edge effects fire (spec.md §4.5). Mirrors spec.md §8
/// invariant 4: after this call, the caller's own transient per-probe
/// result has been fully consumed.
pub async fn apply(backend: &Backend, server: &Arc<Server>, ops: &dyn BackendOps, log: &dyn LogSink, outcome: ProbeOutcome) {
    let edge = {
        let mut state = server.state.lock().unwrap();
        let was_up = state.health.is_up();
        let (next, edge) = match outcome {
            ProbeOutcome::Success => state.health.on_success(server.config.rise, server.config.fall),
            ProbeOutcome::Failure => {
                let (next, edge) = state.health.on_failure(server.config.fall);
                // spec.md §4.5: `failed_checks` only counts the
                // cushion-draining case (UP, with cushion left) — not the
                // edge-firing failure and not repeated failures while
                // already down.
                if was_up && edge.is_none() {
                    state.failed_checks += 1;
                }
                (next, edge)
            }
        };
        state.health = next;
        edge
    };

    match edge {
        None => {}
        Some(Edge::Up) => on_up(backend, server, ops, log).await,
        Some(Edge::Down) => on_down(backend, server, ops, log).await,
    }
}

/// spec.md §4.5 "UP edge effects" / §4.6 "UP drain pulls from the
/// backend-wide queue, FIFO, limited by the server's dynamic capacity".
async fn on_up(backend: &Backend, server: &Arc<Server>, ops: &dyn BackendOps, log: &dyn LogSink) {
    let _gate = backend.edge_gate.lock().await;

    ops.recount_servers(backend);
    ops.recalc_server_map(backend);

    let cap = server.dynamic_maxconn();
    let mut requeued = 0u32;
    loop {
        if let Some(cap) = cap {
            if requeued >= cap {
                break;
            }
        }
        let Some(pending) = backend.pop_pending() else {
            break;
        };
        pending.session.assign_server(server.id());
        pending.session.wake();
        backend.free_pending(pending);
        requeued += 1;
    }

    let remaining = backend.state.lock().unwrap().pendconns.len();
    let (srv_act, srv_bck) = {
        let st = backend.state.lock().unwrap();
        (st.srv_act, st.srv_bck)
    };
    log.notice(&format!(
        "Server {}/{} is UP. {} active and {} backup servers online. {} sessions requeued, {} remaining in queue.",
        backend.id.0,
        server.id().0,
        srv_act,
        srv_bck,
        requeued,
        remaining,
    ));
}

/// spec.md §4.5 "DOWN edge effects" / §4.6 "DOWN rescue iterates the
/// server-specific queue and moves only those whose session opts into
/// redispatch".
async fn on_down(backend: &Backend, server: &Arc<Server>, ops: &dyn BackendOps, log: &dyn LogSink) {
    let _gate = backend.edge_gate.lock().await;

    {
        let mut state = server.state.lock().unwrap();
        state.down_trans += 1;
    }

    ops.recount_servers(backend);
    ops.recalc_server_map(backend);

    let redisp = backend.options.contains(BackendOptions::REDISP);
    let mut xfers = 0u32;
    let mut kept = std::collections::VecDeque::new();
    let mut drained = std::collections::VecDeque::new();
    {
        let mut state = server.state.lock().unwrap();
        std::mem::swap(&mut drained, &mut state.pendconns);
    }
    while let Some(pc) = drained.pop_front() {
        if redisp && pc.session.redispatch_enabled() {
            pc.session.clear_assignment();
            pc.session.wake();
            backend.free_pending(pc);
            xfers += 1;
        } else {
            kept.push_back(pc);
        }
    }
    let remaining_q = kept.len();
    {
        let mut state = server.state.lock().unwrap();
        state.pendconns = kept;
    }

    let (srv_act, srv_bck) = {
        let st = backend.state.lock().unwrap();
        (st.srv_act, st.srv_bck)
    };
    let cur_sess = server.cur_sess.load(Ordering::Relaxed);

    log.alert(&format!(
        "Server {}/{} is DOWN. {} active and {} backup servers left. {} sessions active, {} requeued, {} remaining in queue.",
        backend.id.0,
        server.id().0,
        srv_act,
        srv_bck,
        cur_sess,
        xfers,
        remaining_q,
    ));

    backend.down_trans_total.fetch_add(1, Ordering::Relaxed);

    if srv_act == 0 && srv_bck == 0 {
        log.emerg(&format!("Backend {}: no server available!", backend.id.0));
    }
}
