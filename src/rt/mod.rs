//! Runtime abstraction (spec.md §6's "To the timer wheel" and "To the
//! polling abstraction" external collaborators), grounded on the teacher's
//! `rt::Timer`/`rt::Executor` traits (`src/rt/timer.rs`, `src/rt/mod.rs`).
//!
//! By default this crate runs on tokio (`TokioClock`, `TokioExecutor`).
//! Tests drive the clock deterministically with `tokio::time::pause`/
//! `advance` rather than a bespoke fake `Clock` impl, since `TokioClock`
//! already defers to tokio's own (pausable) timer wheel.

mod clock;
mod executor;

pub use clock::{Clock, TokioClock};
pub use executor::{Executor, TokioExecutor};
