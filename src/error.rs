//! Error and result types, grounded on the teacher's `src/error.rs`: a
//! boxed, private `Kind` behind a public opaque `Error`, rather than a
//! `thiserror`-derived enum.
//!
//! Most probe failures are not represented here at all — they're
//! `protocol::Outcome::Failure`, consumed by the FSM at the next task
//! re-entry (spec.md §7: "failures never bubble out of a callback as an
//! error"). `Error` exists for the handful of paths that must surface
//! outside that flow: bind failures (always an `Alert`, spec.md §7) and
//! the handful of static configuration-misuse cases.

use std::error::Error as StdError;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn StdError + Send + Sync>;

pub struct Error {
    inner: Box<ErrorImpl>,
}

struct ErrorImpl {
    kind: Kind,
    cause: Option<Cause>,
}

#[derive(Debug)]
pub(crate) enum Kind {
    /// Socket creation failed, or the configured concurrent-probe cap was
    /// already spent (spec.md §4.2 step 2, §7: absorbed silently by the
    /// scheduler — this variant exists for callers that want visibility
    /// into *why*, not for the engine's own control flow).
    SocketCreate,
    /// A server- or backend-level `BIND_SRC` source bind failed (spec.md
    /// §4.2 step 4, §7: always an `Alert`).
    Bind,
    /// The `transparent` feature was requested on a server but is not
    /// available: either the `transparent` Cargo feature wasn't enabled at
    /// compile time, or the platform doesn't support it.
    TransparentUnsupported,
}

impl Error {
    pub(crate) fn new(kind: Kind) -> Error {
        Error { inner: Box::new(ErrorImpl { kind, cause: None }) }
    }

    pub(crate) fn with_cause<C>(kind: Kind, cause: C) -> Error
    where
        C: Into<Cause>,
    {
        Error { inner: Box::new(ErrorImpl { kind, cause: Some(cause.into()) }) }
    }

    /// Whether this error came from a source-address bind failure —
    /// callers that want to mirror spec.md §7's "bind failures are always
    /// logged at `Alert`" policy on top of their own error handling can
    /// branch on this.
    pub fn is_bind_failure(&self) -> bool {
        matches!(self.inner.kind, Kind::Bind | Kind::TransparentUnsupported)
    }

    /// Whether this error is the synchronous resource-exhaustion case
    /// spec.md §4.2 step 2 and §7 say must be *absorbed* rather than
    /// counted as a failed probe: socket creation failed, or the
    /// engine-wide concurrent-probe cap was already spent.
    pub fn is_resource_exhaustion(&self) -> bool {
        matches!(self.inner.kind, Kind::SocketCreate)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("lbcheck::Error");
        builder.field("kind", &self.inner.kind);
        if let Some(ref cause) = self.inner.cause {
            builder.field("cause", cause);
        }
        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.kind {
            Kind::SocketCreate => f.write_str("failed to create probe socket"),
            Kind::Bind => f.write_str("failed to bind probe socket to its source address"),
            Kind::TransparentUnsupported => {
                f.write_str("transparent-proxy source binding is not available on this build/platform")
            }
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.cause.as_ref().map(|cause| &**cause as _)
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::with_cause(Kind::SocketCreate, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_reports_is_bind_failure() {
        let err = Error::new(Kind::Bind);
        assert!(err.is_bind_failure());
        assert_eq!(err.to_string(), "failed to bind probe socket to its source address");
    }

    #[test]
    fn io_error_carries_its_cause() {
        let io_err = io::Error::new(io::ErrorKind::Other, "no fds");
        let err: Error = io_err.into();
        assert!(!err.is_bind_failure());
        assert!(err.source().is_some());
    }
}
