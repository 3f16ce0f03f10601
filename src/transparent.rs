//! Transparent-proxy source binding (spec.md §4.2 step 4's "transparent
//! source handshake"; SPEC_FULL.md §4), behind the `transparent` Cargo
//! feature.
//!
//! This crate never implements the transparent-proxy handshake for real on
//! non-Linux targets; it's referenced only through the interface it
//! exposes, `TransparentBinder`: a Linux `libc`-based default that sets
//! `IP_TRANSPARENT`, and a no-op fallback for every other target so the
//! crate still builds (and the engine still runs ordinary, non-transparent
//! probes) off Linux.

/// Applies whatever socket option(s) make an outbound connection appear to
/// originate from `source_addr` even though the host doesn't own that
/// address, before `connect()` is called (spec.md §4.2 step 4).
///
/// Takes a raw fd rather than a concrete socket type so it applies equally
/// to the `socket2::Socket` the probe driver builds its listener-style
/// options on and to any other fd-owning type a caller might hand in.
pub trait TransparentBinder: Send + Sync + 'static {
    fn apply(&self, fd: std::os::raw::c_int) -> std::io::Result<()>;
}

/// The engine's default binder: `IP_TRANSPARENT` on Linux when the
/// `transparent` feature is enabled, a no-op everywhere else.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultTransparentBinder;

#[cfg(all(feature = "transparent", target_os = "linux"))]
mod linux {
    use super::*;

    impl TransparentBinder for DefaultTransparentBinder {
        fn apply(&self, fd: std::os::raw::c_int) -> std::io::Result<()> {
            let enable: libc::c_int = 1;
            // SAFETY: `fd` is a valid, open socket owned by `socket` for the
            // duration of this call; `enable` is a plain stack value of the
            // size setsockopt expects for IP_TRANSPARENT.
            let ret = unsafe {
                libc::setsockopt(
                    fd,
                    libc::SOL_IP,
                    libc::IP_TRANSPARENT,
                    &enable as *const libc::c_int as *const libc::c_void,
                    std::mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            };
            if ret != 0 {
                Err(std::io::Error::last_os_error())
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(not(all(feature = "transparent", target_os = "linux")))]
impl TransparentBinder for DefaultTransparentBinder {
    fn apply(&self, _fd: std::os::raw::c_int) -> std::io::Result<()> {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "transparent-proxy source binding requires the `transparent` feature on Linux",
        ))
    }
}
