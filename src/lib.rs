//! # lobbyvisor
//!
//! **lobbyvisor** supervises one long-running game-server worker on behalf
//! of an operator: it spawns the worker, reconstructs structured session
//! state from its unstructured text output, publishes that state for
//! external monitors, takes commands through a watched control directory,
//! enforces timeout and idle policy, persists finished matches, and
//! relaunches the worker with a bounded fail budget.
//!
//! ## Architecture
//! ```text
//!                 ┌──────────────────────────────────────────────┐
//!                 │  Supervisor (restart loop, fail budget)      │
//!                 └──────────────────┬───────────────────────────┘
//!                                    ▼ one at a time
//! ┌──────────────────────────────────────────────────────────────┐
//! │  Lobby (one session)                                         │
//! │                                                              │
//! │  WorkerProcess ── stdout ──► stdout scanner ─► PlayerRegistry│
//! │   (spawn/pipes)                │   (sole state │ Activity    │
//! │       ▲          ── stderr ──► │    mutator)   │ Status      │
//! │       │                stderr scanner          ▼             │
//! │       │                        │         MatchCollector ──► *.json.gz
//! │  terminate ◄── CancelCell ◄────┴── IdleWatcher ◄─ ControlSpec│
//! │   (grace→kill)  (first cause wins)                 ▲         │
//! └────────────────────────────────────────────────────│─────────┘
//!                                                      │
//!                       control directory ──► DirWatcher (debounced)
//! ```
//!
//! ## Rules
//! - All scan-state mutation happens on the stdout-scanning task; other
//!   tasks read through narrow, lock-protected accessors
//!   ([`PlayerRegistry`], [`ControlSpec`] snapshots, [`StatusPublisher`]).
//! - One cancellation primitive per session; the first recorded cause is
//!   the terminal reason, and every later attempt is logged and dropped.
//! - A match with zero kill events is never persisted.
//! - Match loss is preferred over blocking the scanner: the collector queue
//!   drops when full, because a stalled scanner stalls the worker's own
//!   stdout pipe.
//!
//! ## Example
//! ```no_run
//! use lobbyvisor::{LobbyConfig, OutputSink, Supervisor};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = LobbyConfig {
//!     exe: "game-server".into(),
//!     session: "Casual Friday".into(),
//!     spec_dir: Some("/var/lib/lobby/spec".into()),
//!     stat_dir: Some("/var/lib/lobby/stat".into()),
//!     ..LobbyConfig::default()
//! };
//! let supervisor = Supervisor::with_lobby(cfg, OutputSink::stdio())?;
//! let reason = supervisor.run(CancellationToken::new()).await?;
//! println!("lobby ended: {reason}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod lobby;
pub mod matches;
pub mod players;
mod scan;
pub mod supervisor;
pub mod watch;

pub use config::{IdlePolicy, LobbyConfig, DEFAULT_MAX_PLAYERS, SESSION_MAX_LEN};
pub use control::{ControlSpec, SpecState};
pub use error::{ConfigError, LobbyError, RunError, StopReason, WatchError};
pub use lobby::{Lobby, OutputSink, StatusPublisher};
pub use matches::{Kill, Location, Match, Team};
pub use players::{Player, PlayerRegistry, RosterChange};
pub use supervisor::{SessionOutcome, SessionRunner, Supervisor, RETRY_FLOOR};
pub use watch::{WatchEvent, WatchGuard, WatchNotice, WatchOp};
