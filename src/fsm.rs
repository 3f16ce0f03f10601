//! The liveness state machine (spec.md §4.5).
//!
//! The distilled spec represents liveness as a single `health: u32` counter
//! with implicit edges at `health == rise`. Per the REDESIGN FLAGS in
//! spec.md §9, this module lifts that into an explicit tagged variant: edges
//! become constructor changes instead of a comparison buried in an `if`, and
//! `health()` is kept only as a read-only projection for callers that still
//! want the spec's legacy integer (e.g. for an external metrics exporter).

/// A server's liveness, expressed as "how far from an edge transition".
///
/// `Down { streak }`: the server is DOWN; `streak` consecutive successful
/// probes have been observed since the last time it was fully down
/// (`streak` is in `[0, rise - 1]`).
///
/// `Up { cushion }`: the server is UP; `cushion` is the number of
/// consecutive failures it can still absorb before a DOWN edge fires
/// (`cushion` is in `[0, fall - 1]`). `cushion == 0` means "freshly up, or
/// fully drained" — one more failure sends it back down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    Down { streak: u32 },
    Up { cushion: u32 },
}

/// A liveness transition fired by a completed probe (spec.md §4.5 "UP edge
/// effects" / "DOWN edge effects"). Each fires at most once per probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Up,
    Down,
}

impl Health {
    /// A server that has never passed a check: fully down.
    pub fn fully_down() -> Health {
        Health::Down { streak: 0 }
    }

    /// A server assumed up before its first check has run (spec.md §8's
    /// scenario table starts every scenario at `health == rise`): freshly
    /// up, with no failure cushion yet.
    pub fn freshly_up() -> Health {
        Health::Up { cushion: 0 }
    }

    pub fn is_up(self) -> bool {
        matches!(self, Health::Up { .. })
    }

    /// The spec.md §3 legacy integer representation, derived for external
    /// callers. `0 <= health(rise) <= rise + fall - 1` always holds
    /// (spec.md §8 invariant 1).
    pub fn health(self, rise: u32) -> u32 {
        match self {
            Health::Down { streak } => streak,
            Health::Up { cushion } => rise + cushion,
        }
    }

    /// Apply one successful probe (spec.md §4.5 "Success").
    pub fn on_success(self, rise: u32, fall: u32) -> (Health, Option<Edge>) {
        debug_assert!(rise >= 1 && fall >= 1);
        match self {
            Health::Down { streak } => {
                let next = streak + 1;
                if next >= rise {
                    (Health::Up { cushion: 0 }, Some(Edge::Up))
                } else {
                    (Health::Down { streak: next }, None)
                }
            }
            Health::Up { cushion } => {
                let next = (cushion + 1).min(fall - 1);
                (Health::Up { cushion: next }, None)
            }
        }
    }

    /// Apply one failed (or timed-out) probe (spec.md §4.5 "Failure or
    /// timeout").
    ///
    /// Spec.md's prose only describes the UP side precisely (drain the
    /// cushion by one, or fire a DOWN edge and reset straight to 0 once the
    /// cushion is empty). It leaves the DOWN side's failure behavior
    /// implicit — see DESIGN.md's "Open Questions" entry for `fsm`: this
    /// implementation drains `streak` by one, symmetric with the UP side's
    /// per-failure cushion drain, rather than resetting it to zero.
    pub fn on_failure(self, fall: u32) -> (Health, Option<Edge>) {
        debug_assert!(fall >= 1);
        match self {
            Health::Up { cushion } if cushion > 0 => (Health::Up { cushion: cushion - 1 }, None),
            Health::Up { .. } => (Health::Down { streak: 0 }, Some(Edge::Down)),
            Health::Down { streak } => (Health::Down { streak: streak.saturating_sub(1) }, None),
        }
    }
}
