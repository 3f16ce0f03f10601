//! In-crate test doubles (SPEC_FULL.md §7): something concrete to drive
//! the scheduler and propagator against without a real proxy or a real
//! logging backend.
//!
//! Only compiled for this crate's own tests (`#[cfg(test)]` in `lib.rs`) —
//! downstream integration tests exercise the real `TracingLogSink` and a
//! loopback `TcpListener` instead (SPEC_FULL.md §8).

use std::sync::Mutex;

use crate::log::LogSink;

/// Captures every line logged through it, in order, tagged with the level
/// it was logged at.
#[derive(Debug, Default)]
pub struct RecordingLogSink {
    lines: Mutex<Vec<(&'static str, String)>>,
}

impl RecordingLogSink {
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for RecordingLogSink {
    fn notice(&self, message: &str) {
        self.lines.lock().unwrap().push(("notice", message.to_owned()));
    }

    fn alert(&self, message: &str) {
        self.lines.lock().unwrap().push(("alert", message.to_owned()));
    }

    fn emerg(&self, message: &str) {
        self.lines.lock().unwrap().push(("emerg", message.to_owned()));
    }
}
