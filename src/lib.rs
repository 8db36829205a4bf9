//! Purge Sync Client Library
//!
//! Client-side real-time synchronization for the Purge battle-royale game.
//! One WebSocket session per (game, player) is shared by every registered
//! [`SyncHandler`]; local state goes out in rate-adapted batches and server
//! events fan out to all handlers.

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;

pub use config::SyncConfig;
pub use game::state::{GamePhase, PlayerPatch, PlayerState, SafeZone};
pub use metrics::{StatsSnapshot, SyncMetrics};
pub use net::handler::{HandlerId, SyncError, SyncHandler};
pub use net::multiplexer::SyncManager;
