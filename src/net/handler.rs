//! Handler registration and broadcast
//!
//! Every UI consumer registers one [`SyncHandler`] under a [`HandlerId`].
//! Events are delivered to all handlers in registration order. A handler that
//! panics is logged and skipped; delivery continues with the next one.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use crate::game::state::{GamePhase, PlayerState, SafeZone};
use crate::net::protocol::GameStateUpdate;
use crate::net::router::SyncEvent;

/// Failures surfaced to handlers through [`SyncHandler::on_error`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyncError {
    #[error("reconnect failed — manual refresh required")]
    ReconnectExhausted { attempts: u32 },
    #[error("Server error: {0}")]
    Server(String),
}

/// Callback bundle for one consumer. Every method defaults to a no-op.
///
/// Callbacks run on the session task and must not block.
#[allow(unused_variables)]
pub trait SyncHandler: Send + Sync {
    fn on_connected(&self) {}
    fn on_disconnected(&self) {}
    /// A retry is scheduled; `attempt` counts from 1
    fn on_reconnecting(&self, attempt: u32, delay: Duration) {}
    fn on_sync(&self, players: &[PlayerState]) {}
    fn on_player_update(&self, player: &PlayerState) {}
    fn on_player_joined(&self, player: &PlayerState) {}
    fn on_player_left(&self, player_id: &str) {}
    fn on_player_eliminated(&self, player_id: &str) {}
    fn on_player_ready(&self, player_id: &str) {}
    fn on_game_state(&self, state: &GameStateUpdate) {}
    fn on_phase_change(&self, from: GamePhase, to: GamePhase) {}
    fn on_countdown_start(&self, start_ms: u64, duration_ms: u64) {}
    fn on_game_start(&self) {}
    fn on_game_end(&self, winner_id: Option<&str>) {}
    fn on_safe_zone(&self, zone: &SafeZone) {}
    fn on_zone_damage(&self, hp: f32) {}
    fn on_error(&self, error: &SyncError) {}
}

/// Opaque handler identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HandlerId(Uuid);

impl HandlerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for HandlerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Route one event to the matching callback
pub fn deliver(handler: &dyn SyncHandler, event: &SyncEvent) {
    match event {
        SyncEvent::Sync { players } => handler.on_sync(players),
        SyncEvent::PlayerUpdate { player } => handler.on_player_update(player),
        SyncEvent::PlayerJoined { player } => handler.on_player_joined(player),
        SyncEvent::PlayerLeft { player_id } => handler.on_player_left(player_id),
        SyncEvent::PlayerEliminated { player_id } => handler.on_player_eliminated(player_id),
        SyncEvent::PlayerReady { player_id } => handler.on_player_ready(player_id),
        SyncEvent::GameState(state) => handler.on_game_state(state),
        SyncEvent::PhaseChanged { from, to } => handler.on_phase_change(*from, *to),
        SyncEvent::CountdownStart {
            start_ms,
            duration_ms,
        } => handler.on_countdown_start(*start_ms, *duration_ms),
        SyncEvent::GameStart => handler.on_game_start(),
        SyncEvent::GameEnd { winner_id } => handler.on_game_end(winner_id.as_deref()),
        SyncEvent::SafeZone(zone) => handler.on_safe_zone(zone),
        SyncEvent::ZoneDamage { hp } => handler.on_zone_damage(*hp),
        SyncEvent::ServerError { message } => {
            handler.on_error(&SyncError::Server(message.clone()))
        }
    }
}

/// Run one callback, containing any panic. Returns false if it panicked.
pub fn invoke_isolated(id: HandlerId, f: impl FnOnce()) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(()) => true,
        Err(_) => {
            error!("Handler {} panicked; continuing with remaining handlers", id);
            false
        }
    }
}

type Entry = (HandlerId, Arc<dyn SyncHandler>);

#[derive(Default)]
struct RegistryInner {
    entries: Vec<Entry>,
    /// Session currently open; read together with `entries` so a handler
    /// registered around the open gets exactly one `on_connected`
    connected: bool,
}

/// Ordered handler set for one session
#[derive(Default)]
pub struct HandlerRegistry {
    inner: Mutex<RegistryInner>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace in place) a handler. Returns whether the session was
    /// already open at registration time.
    pub fn register(&self, id: HandlerId, handler: Arc<dyn SyncHandler>) -> bool {
        let mut inner = self.inner.lock();
        match inner.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = handler,
            None => inner.entries.push((id, handler)),
        }
        inner.connected
    }

    /// Remove a handler. Returns whether it was present.
    pub fn unregister(&self, id: HandlerId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(existing, _)| *existing != id);
        inner.entries.len() != before
    }

    pub fn contains(&self, id: HandlerId) -> bool {
        self.inner.lock().entries.iter().any(|(existing, _)| *existing == id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drop every handler silently
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.connected = false;
    }

    fn snapshot(&self) -> Vec<Entry> {
        self.inner.lock().entries.clone()
    }

    /// Call `f` on every handler in registration order, outside the lock.
    /// Returns the number of handlers that panicked.
    pub fn broadcast(&self, f: impl Fn(&dyn SyncHandler)) -> usize {
        self.call_each(self.snapshot(), f)
    }

    pub fn dispatch(&self, event: &SyncEvent) -> usize {
        self.broadcast(|handler| deliver(handler, event))
    }

    /// Mark the session open and notify every handler registered so far
    pub fn broadcast_connected(&self) -> usize {
        let entries = {
            let mut inner = self.inner.lock();
            inner.connected = true;
            inner.entries.clone()
        };
        self.call_each(entries, |handler| handler.on_connected())
    }

    pub fn broadcast_disconnected(&self) -> usize {
        let entries = {
            let mut inner = self.inner.lock();
            inner.connected = false;
            inner.entries.clone()
        };
        self.call_each(entries, |handler| handler.on_disconnected())
    }

    fn call_each(&self, entries: Vec<Entry>, f: impl Fn(&dyn SyncHandler)) -> usize {
        entries
            .iter()
            .filter(|(id, handler)| !invoke_isolated(*id, || f(handler.as_ref())))
            .count()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &inner.entries.len())
            .field("connected", &inner.connected)
            .finish()
    }
}
