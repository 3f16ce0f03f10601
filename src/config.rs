//! Engine-level tunables (SPEC_FULL.md §0), grounded on the teacher's
//! `HttpConnector` setter-style builder in `src/client/connect/http.rs`.
//! Proxy/server *declaration* parsing stays an external collaborator
//! (spec.md §1 Non-goals); this builder only configures the engine's own
//! knobs: the concurrent-probe cap, whether transparent-proxy binding is on
//! by default, and the read-buffer size used by the read-side handler.

use std::time::Duration;

/// The read-side handler's fixed scratch buffer size (spec.md §4.4: "reads
/// up to 64 bytes into a stack buffer in one non-blocking `recv()`").
pub const PROBE_READ_BUF_LEN: usize = 64;

/// Engine-wide configuration, independent of any one server or backend.
#[derive(Debug, Clone)]
pub struct CheckEngineConfig {
    max_concurrent_probes: Option<usize>,
    transparent_by_default: bool,
    reuse_address: bool,
}

impl Default for CheckEngineConfig {
    fn default() -> CheckEngineConfig {
        CheckEngineConfig {
            max_concurrent_probes: None,
            transparent_by_default: false,
            reuse_address: true,
        }
    }
}

impl CheckEngineConfig {
    /// Construct a config with the engine's defaults: no concurrency cap,
    /// transparent-proxy binding off unless a server opts in, `SO_REUSEADDR`
    /// set before every source bind (spec.md §4.2 step 4).
    pub fn new() -> CheckEngineConfig {
        CheckEngineConfig::default()
    }

    /// Cap on probe sockets that may be simultaneously open across the
    /// whole engine (spec.md §4.2 step 2: "the fd exceeds the configured
    /// maximum"). `None` (the default) means unbounded.
    #[inline]
    pub fn set_max_concurrent_probes(&mut self, max: Option<usize>) -> &mut Self {
        self.max_concurrent_probes = max;
        self
    }

    #[inline]
    pub fn max_concurrent_probes(&self) -> Option<usize> {
        self.max_concurrent_probes
    }

    /// Whether servers that don't explicitly set `ServerFlags::TRANSPARENT`
    /// should still use transparent-proxy source binding when one is
    /// configured at the proxy level. Default `false`.
    #[inline]
    pub fn set_transparent_by_default(&mut self, enabled: bool) -> &mut Self {
        self.transparent_by_default = enabled;
        self
    }

    #[inline]
    pub fn transparent_by_default(&self) -> bool {
        self.transparent_by_default
    }

    /// Whether to set `SO_REUSEADDR` before a source-address bind (spec.md
    /// §4.2 step 4). Default `true`.
    #[inline]
    pub fn set_reuse_address(&mut self, reuse: bool) -> &mut Self {
        self.reuse_address = reuse;
        self
    }

    #[inline]
    pub fn reuse_address(&self) -> bool {
        self.reuse_address
    }
}

/// A small helper for tests and callers that want a quick sanity bound on
/// probe timeouts, since spec.md §9 documents `inter`-as-connect-timeout as
/// a lint rather than a hard requirement: anything under a millisecond is
/// almost certainly a misconfiguration rather than an intentionally tight
/// deadline.
pub fn sane_minimum_inter() -> Duration {
    Duration::from_millis(1)
}
