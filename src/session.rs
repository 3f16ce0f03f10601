//! The session collaborator (spec.md §6 "To the session"; §1 Non-goals:
//! "the session/request state and its HTTP parser" are out of scope). This
//! module only defines the trait boundary the FSM propagator needs.

use crate::model::ServerId;

/// A queued or in-flight session, as seen from the check engine.
///
/// Real implementations back this with the load balancer's actual session
/// struct; the check engine only ever needs the four operations below
/// (spec.md §6).
pub trait SessionHandle: Send + Sync + 'static {
    /// Whether this session's backend has `REDISP` enabled (spec.md §4.5
    /// DOWN edge effect 3: only redispatch-eligible sessions are rescued).
    fn redispatch_enabled(&self) -> bool;

    /// Pin this session to `server` (spec.md §4.5 UP edge effect 4:
    /// `pend.sess.srv := S`).
    fn assign_server(&self, server: ServerId);

    /// Strip sticky-routing state (spec.md §4.5 DOWN edge effect 3: clear
    /// `DIRECT`/`ASSIGNED`/`ADDR_SET`, clear the chosen server, invalidate
    /// cookie-derived routing state) so the session can be redispatched from
    /// scratch.
    fn clear_assignment(&self);

    /// Wake whatever task is waiting on this session so it re-enters the
    /// scheduler/dispatcher (spec.md §6: "wake `sess.task`").
    fn wake(&self);
}
