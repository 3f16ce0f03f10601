//! The data model (spec.md §3; SPEC_FULL.md §1): `Server`, `Backend`, and
//! `PendingConnection`, plus the small bitflag-style option sets spec.md
//! calls `state`/`options`.
//!
//! The teacher has no dependency on the `bitflags` crate anywhere in the
//! retrieved source; its own small internal option sets (e.g.
//! `proto::h1::role::Conn`'s keep-alive state) are hand-rolled `struct
//! Foo(u32)` newtypes with `const` associated items, so `ServerFlags` and
//! `BackendOptions` below follow that shape rather than pulling in a crate
//! for it.
//!
//! Cyclic-reference note (spec.md §9): the source has servers pointing at
//! tasks and at pending connections, and vice versa. Here the `Backend`
//! is the single owner of its `Server`s and of both pending-connection
//! queues; a `CheckTask` (`crate::scheduler`) only ever holds cloned
//! `Arc<Backend>`/`Arc<Server>` handles, never a unique or mutably-owning
//! reference to the server it checks.

use std::collections::VecDeque;
use std::net::SocketAddrV4;
use std::sync::atomic::{AtomicU32, AtomicU64};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use crate::fsm::Health;
use crate::protocol::CheckKind;
use crate::session::SessionHandle;

macro_rules! flags {
    ($name:ident { $($variant:ident = $bit:expr),* $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
        pub struct $name(u32);

        impl $name {
            $(pub const $variant: $name = $name($bit);)*

            pub const fn empty() -> $name {
                $name(0)
            }

            pub const fn contains(self, other: $name) -> bool {
                self.0 & other.0 == other.0
            }

            pub const fn union(self, other: $name) -> $name {
                $name(self.0 | other.0)
            }
        }

        impl std::ops::BitOr for $name {
            type Output = $name;
            fn bitor(self, rhs: $name) -> $name {
                self.union(rhs)
            }
        }
    };
}

flags!(ServerFlags {
    /// Probes are enabled for this server (spec.md §3 `CHECKED`).
    CHECKED = 1 << 0,
    /// `source_addr` should be used to bind the probe socket (spec.md §3
    /// `SRV_BIND_SRC`).
    BIND_SRC = 1 << 1,
    /// The probe socket should additionally go through the
    /// transparent-proxy source handshake (spec.md §4.2 step 4).
    TRANSPARENT = 1 << 2,
    /// This server is a backup server for routing-map purposes (spec.md §3
    /// `BACKUP`).
    BACKUP = 1 << 3,
});

flags!(BackendOptions {
    HTTP_CHK = 1 << 0,
    SSL3_CHK = 1 << 1,
    SMTP_CHK = 1 << 2,
    /// Queued sessions assigned to a server that goes DOWN are eligible for
    /// redispatch (spec.md §4.5 DOWN edge effect 3).
    REDISP = 1 << 3,
});

flags!(BackendFlags {
    BIND_SRC = 1 << 0,
    TRANSPARENT = 1 << 1,
});

/// Most of a server's/backend's runtime state only ever needs a short,
/// non-blocking critical section (spec.md §5: "no operation inside any
/// callback or FSM transition is permitted to block"), so it sits behind a
/// plain `std::sync::Mutex` rather than an async one. The one place that
/// genuinely needs async waiting is serializing edge-effect processing
/// across the several `CheckTask`s that can concurrently belong to the same
/// backend (SPEC_FULL.md §5) — that's `Backend::edge_gate`, a
/// `tokio::sync::Mutex<()>` acquired for the duration of one FSM edge.
pub type EdgeGate = tokio::sync::Mutex<()>;

/// Stable, non-owning handle to a `Server` within its `Backend` (spec.md §9:
/// "tasks hold a non-owning handle to their server by stable index").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServerId(pub usize);

/// Static, immutable-after-construction configuration for one checked
/// server (spec.md §3's `addr`, `check_addr`, `check_port`, `source_addr`,
/// `inter`, `rise`, `fall`, and the binding/checked/backup flags).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub id: ServerId,
    pub addr: SocketAddrV4,
    pub check_addr: Option<SocketAddrV4>,
    pub check_port: Option<u16>,
    pub source_addr: Option<SocketAddrV4>,
    pub flags: ServerFlags,
    /// The probe interval, reused as the connect timeout unless
    /// `connect_timeout` overrides it (spec.md §9's documented FIXME).
    pub inter: Duration,
    pub connect_timeout: Option<Duration>,
    pub rise: u32,
    pub fall: u32,
    /// `0` means unbounded (spec.md §4.5 UP edge effect 4,
    /// `srv_dynamic_maxconn`).
    pub maxconn: u32,
}

impl ServerConfig {
    /// Resolve the probe destination: `check_addr` overrides `addr`,
    /// `check_port` overrides whichever address's port (spec.md §4.2 step 3).
    pub fn check_endpoint(&self) -> SocketAddrV4 {
        let mut ep = self.check_addr.unwrap_or(self.addr);
        if let Some(port) = self.check_port {
            ep.set_port(port);
        }
        ep
    }

    /// The connect timeout actually used for one probe (spec.md §9: `inter`
    /// unless a dedicated override was configured).
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(self.inter)
    }

    pub fn is_checked(&self) -> bool {
        self.flags.contains(ServerFlags::CHECKED)
    }

    pub fn is_backup(&self) -> bool {
        self.flags.contains(ServerFlags::BACKUP)
    }
}

/// A session waiting for a server slot (spec.md §3 `pendconns`).
///
/// `target`, when set, records which server's queue this entry currently
/// lives in; it is `None` while sitting in the backend-wide queue.
pub struct PendingConnection {
    pub session: Arc<dyn SessionHandle>,
    pub target: Option<ServerId>,
}

impl std::fmt::Debug for PendingConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingConnection").field("target", &self.target).finish()
    }
}

/// Mutable per-server runtime state (spec.md §3 `health`, `result`'s
/// lifecycle owner, `failed_checks`, `down_trans`, and the server-specific
/// `pendconns` queue).
///
/// `RUNNING` is not stored separately: it is derived from `health.is_up()`,
/// which makes spec.md §8 invariant 2 (`state & RUNNING` iff `health >=
/// rise`) true by construction instead of something that can drift out of
/// sync.
#[derive(Debug)]
pub struct ServerState {
    pub health: Health,
    pub failed_checks: u64,
    pub down_trans: u64,
    pub pendconns: VecDeque<PendingConnection>,
}

impl ServerState {
    pub fn new(health: Health) -> ServerState {
        ServerState {
            health,
            failed_checks: 0,
            down_trans: 0,
            pendconns: VecDeque::new(),
        }
    }

    pub fn is_up(&self) -> bool {
        self.health.is_up()
    }
}

/// A checked server: immutable config plus a lock around the mutable
/// liveness state (spec.md §5: edge effects are serialized per backend, and
/// in this crate's async redesign per-server state is guarded by a mutex
/// rather than by a single-threaded loop).
#[derive(Debug)]
pub struct Server {
    pub config: ServerConfig,
    pub state: Mutex<ServerState>,
    /// Counts current sessions pinned to this server (spec.md §3
    /// `cur_sess`), read-only from the core's perspective; maintained by the
    /// external session/routing layer via `SessionHandle`.
    pub cur_sess: AtomicU32,
}

impl Server {
    pub fn new(config: ServerConfig, initial_health: Health) -> Server {
        Server {
            config,
            state: Mutex::new(ServerState::new(initial_health)),
            cur_sess: AtomicU32::new(0),
        }
    }

    pub fn id(&self) -> ServerId {
        self.config.id
    }

    /// The server's dynamic connection cap for UP-edge queue draining
    /// (spec.md §4.5 UP edge effect 4): `maxconn == 0` means unbounded.
    pub fn dynamic_maxconn(&self) -> Option<u32> {
        if self.config.maxconn == 0 {
            None
        } else {
            Some(self.config.maxconn)
        }
    }

    /// Additive instrumentation beyond the distilled spec (SPEC_FULL.md
    /// §1): a `health / rise` ratio in `[0.0, (rise + fall - 1) / rise]` for
    /// an external metrics exporter, read without needing the state lock's
    /// full invariants.
    pub fn health_ratio(health: Health, rise: u32) -> f64 {
        if rise == 0 {
            return 0.0;
        }
        f64::from(health.health(rise)) / f64::from(rise)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackendId(pub usize);

/// Mutable backend-wide counters and queues (spec.md §3 `srv_act`/`srv_bck`,
/// the backend-wide `pendconns` queue, and the stopped/running `state`).
#[derive(Debug)]
pub struct BackendState {
    pub stopped: bool,
    pub srv_act: u32,
    pub srv_bck: u32,
    pub pendconns: VecDeque<PendingConnection>,
}

impl BackendState {
    pub fn new() -> BackendState {
        BackendState {
            stopped: false,
            srv_act: 0,
            srv_bck: 0,
            pendconns: VecDeque::new(),
        }
    }
}

impl Default for BackendState {
    fn default() -> BackendState {
        BackendState::new()
    }
}

/// A backend (proxy): a group of interchangeable servers (spec.md §3
/// "Proxy").
#[derive(Debug)]
pub struct Backend {
    pub id: BackendId,
    pub options: BackendOptions,
    pub flags: BackendFlags,
    pub check_kind: CheckKind,
    /// Pre-rendered probe payload (`check_req`/`check_len` in spec.md §3);
    /// empty for `CheckKind::Tcp`.
    pub check_req: Bytes,
    pub source_addr: Option<SocketAddrV4>,
    pub servers: Vec<Arc<Server>>,
    pub state: Mutex<BackendState>,
    pub down_trans_total: AtomicU64,
    /// Serializes FSM edge-effect processing across this backend's
    /// concurrently-running `CheckTask`s (SPEC_FULL.md §5).
    pub edge_gate: EdgeGate,
}

impl Backend {
    pub fn new(
        id: BackendId,
        options: BackendOptions,
        flags: BackendFlags,
        check_kind: CheckKind,
        check_req: Bytes,
        source_addr: Option<SocketAddrV4>,
        servers: Vec<Arc<Server>>,
    ) -> Backend {
        Backend {
            id,
            options,
            flags,
            check_kind,
            check_req,
            source_addr,
            servers,
            state: Mutex::new(BackendState::new()),
            down_trans_total: AtomicU64::new(0),
            edge_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Pop one entry from the backend-wide pending queue, FIFO (spec.md §6
    /// `pendconn_from_px`). Used by the UP-edge drain (spec.md §4.6).
    pub fn pop_pending(&self) -> Option<PendingConnection> {
        self.state.lock().unwrap().pendconns.pop_front()
    }

    /// Release a pending-connection entry back to the backend (spec.md §6
    /// `pendconn_free`). A no-op beyond dropping `pc` in this crate's
    /// self-contained model — kept as an explicit call so that production
    /// `BackendOps` implementations backed by a real, externally-indexed
    /// pending-connection structure have a hook to unlink it from their own
    /// bookkeeping too.
    pub fn free_pending(&self, pc: PendingConnection) {
        drop(pc);
    }

    pub fn server(&self, id: ServerId) -> Option<&Arc<Server>> {
        self.servers.iter().find(|s| s.id() == id)
    }
}
