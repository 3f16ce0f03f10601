//! The "timer wheel" external collaborator from spec.md §6, lifted into a
//! small trait so the scheduler (`crate::scheduler`) can be driven by a real
//! tokio timer in production and by `tokio::time::pause`/`advance` in tests.
//!
//! This crate only ever ships one production implementation (`TokioClock`)
//! and tests drive real tokio time rather than a bespoke fake clock, so
//! `Clock::sleep_until` can just return a concrete boxed future with no
//! downcasting machinery behind it.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

/// A source of the current time and of sleep futures (spec.md §6 "To the
/// timer wheel": "insert a task with a deadline; update the deadline and
/// re-insert").
pub trait Clock: Send + Sync + 'static {
    /// The current monotonic time, standing in for spec.md §4.1's `now`.
    fn now(&self) -> Instant;

    /// A future that resolves once `deadline` has passed.
    fn sleep_until(&self, deadline: Instant) -> Pin<Box<dyn Future<Output = ()> + Send>>;

    /// A future that resolves after `duration` from now.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        self.sleep_until(self.now() + duration)
    }
}

/// The production `Clock`, backed directly by tokio's timer wheel.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep_until(&self, deadline: Instant) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep_until(deadline.into()))
    }
}
