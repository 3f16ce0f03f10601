//! The log/alert sink (spec.md §6 "To the log/alert sink"). The concrete
//! destination is an external collaborator per spec.md §1; this module only
//! defines the trait and a `tracing`-backed default.

/// Receives the three log levels the engine emits (spec.md §4.5, §6):
/// `Notice` on an UP edge, `Alert` on a DOWN edge, `Emerg` when a backend is
/// left with zero active and zero backup servers.
pub trait LogSink: Send + Sync + 'static {
    fn notice(&self, message: &str);
    fn alert(&self, message: &str);
    fn emerg(&self, message: &str);
}

/// Default `LogSink`, backed directly by `tracing`.
///
/// Unlike the teacher, which hides its own `trace!`/`debug!` macros behind
/// an unstable, opt-in cfg flag (`hyper_unstable_tracing`) because hyper is
/// a dependency of other libraries and must not impose a logging backend on
/// its consumers, this crate calls `tracing` unconditionally: a load
/// balancer's health-check engine is closer to an application than a
/// library other crates silently depend on, matching how the `sozu` and
/// `synctv` health monitors in the reference pack call
/// `tracing::info!`/`warn!` directly.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn notice(&self, message: &str) {
        tracing::info!(target: "lbcheck", "{}", message);
    }

    fn alert(&self, message: &str) {
        tracing::warn!(target: "lbcheck", "{}", message);
    }

    fn emerg(&self, message: &str) {
        tracing::error!(target: "lbcheck", "{}", message);
    }
}
