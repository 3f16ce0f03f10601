//! `lbcheck` — the active, per-backend-server health-check engine of a
//! TCP/HTTP load balancer.
//!
//! Periodically probes each checked server over a fresh TCP connection,
//! optionally performs a minimal application-layer handshake (HTTP, SSL v3,
//! or SMTP), classifies the outcome, and feeds it into a hysteretic
//! liveness state machine (`rise`/`fall` thresholds) that drives backend
//! membership changes and queued-session redispatch.
//!
//! # Layout
//!
//! - [`model`] — `Server`, `Backend`, `PendingConnection`: the data this
//!   engine mutates.
//! - [`fsm`] — the liveness state machine, independent of any I/O.
//! - [`protocol`] — wire formats for the three built-in probe handshakes
//!   and reply classification, also pure.
//! - [`probe`] — connects, optionally handshakes, and classifies one probe.
//! - [`propagate`] — consumes a completed probe's outcome, drives the FSM,
//!   and runs UP/DOWN edge effects (queue draining, logging).
//! - [`scheduler`] — one timer-driven task per checked server.
//! - [`engine`] — wiring: spawn one task per checked server, shut a backend
//!   down.
//! - [`backend_ops`] and [`session`] — trait boundaries to the surrounding
//!   load balancer's routing map and session state, which this crate never
//!   owns.
//! - [`rt`], [`config`], [`error`], [`log`] — the ambient runtime,
//!   configuration, error, and logging stack.
//!
//! Configuration parsing of proxy/server declarations, the generic polling
//! abstraction, the session/request state and its HTTP parser, the
//! load-balancing map's own recomputation algorithm, and transparent-proxy
//! source-address binding's platform specifics beyond Linux are treated as
//! external collaborators, not reimplemented here.

pub mod backend_ops;
pub mod config;
pub mod engine;
pub mod error;
pub mod fsm;
pub mod log;
pub mod model;
pub mod probe;
pub mod propagate;
pub mod protocol;
pub mod rt;
pub mod scheduler;
pub mod session;
pub mod transparent;

#[cfg(test)]
pub(crate) mod testing;

pub use config::CheckEngineConfig;
pub use engine::CheckEngine;
pub use error::{Error, Result};
