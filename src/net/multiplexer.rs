//! Shared connection manager
//!
//! Every game screen talks to the server through one [`SyncManager`]. It
//! keeps at most one session alive, keyed by game and player id, and fans
//! events out to all registered handlers. Registering a handler for the
//! session that is already running attaches to it; registering for a
//! different key tears the old session down first. When the last handler
//! leaves, the socket is closed and the identity forgotten.

use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::SyncConfig;
use crate::game::state::PlayerPatch;
use crate::metrics::{StatsSnapshot, SyncMetrics};
use crate::net::driver::{self, SessionCommand, SessionHandle};
use crate::net::handler::{invoke_isolated, HandlerId, HandlerRegistry, SyncHandler};
use crate::net::session::{SessionCore, SessionKey};
use crate::net::transport::{Connector, WsConnector};

static GLOBAL: OnceLock<SyncManager> = OnceLock::new();

struct ActiveSession {
    key: SessionKey,
    handlers: Arc<HandlerRegistry>,
    handle: SessionHandle,
}

impl ActiveSession {
    fn teardown(self) {
        // No callbacks after this point, even for frames already in flight
        self.handlers.clear();
        self.handle.shutdown();
    }
}

/// Wall-clock milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub struct SyncManager {
    config: SyncConfig,
    connector: Arc<dyn Connector>,
    metrics: Arc<SyncMetrics>,
    active: Mutex<Option<ActiveSession>>,
}

impl SyncManager {
    pub fn new(config: SyncConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            metrics: Arc::new(SyncMetrics::new()),
            active: Mutex::new(None),
        }
    }

    pub fn with_websocket(config: SyncConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    /// Process-wide manager, configured from the environment on first use
    pub fn global() -> &'static SyncManager {
        GLOBAL.get_or_init(|| Self::with_websocket(SyncConfig::load_or_default()))
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<SyncMetrics> {
        &self.metrics
    }

    /// Register `handler` for the session `(game_id, player_id)`, opening it
    /// if needed. Must be called inside a tokio runtime.
    ///
    /// A handler joining a session whose socket is already open gets
    /// `on_connected` before this returns, and a fresh sync is requested.
    pub fn connect(
        &self,
        game_id: &str,
        player_id: &str,
        handler_id: HandlerId,
        handler: Arc<dyn SyncHandler>,
    ) {
        let key = SessionKey::new(game_id, player_id);
        let mut active = self.active.lock();

        if let Some(session) = active.as_ref().filter(|s| s.key == key) {
            let already_open = session.handlers.register(handler_id, handler.clone());
            debug!(
                "Handler {} joined {} ({} registered)",
                handler_id,
                key,
                session.handlers.len()
            );
            if !already_open {
                return;
            }
            session.handle.send(SessionCommand::HandlerAdded);
            drop(active);

            // It missed the original open
            if !invoke_isolated(handler_id, || handler.on_connected()) {
                self.metrics.record_handler_panics(1);
            }
            return;
        }

        if let Some(previous) = active.take() {
            info!("Switching session {} -> {}", previous.key, key);
            previous.teardown();
        }

        let handlers = Arc::new(HandlerRegistry::new());
        handlers.register(handler_id, handler);
        let core = SessionCore::new(key.clone(), &self.config);
        let handle = driver::spawn_session(
            core,
            self.connector.clone(),
            handlers.clone(),
            self.metrics.clone(),
            self.config.batch_tick,
        );
        info!("Opening session {}", key);

        *active = Some(ActiveSession {
            key,
            handlers,
            handle,
        });
    }

    /// Remove a handler. Closes the session when it was the last one.
    /// Returns false if the id was not registered.
    pub fn unregister_handler(&self, handler_id: HandlerId) -> bool {
        let mut active = self.active.lock();
        let Some(session) = active.as_ref() else {
            return false;
        };
        if !session.handlers.unregister(handler_id) {
            return false;
        }
        debug!("Handler {} left {}", handler_id, session.key);

        if session.handlers.is_empty() {
            if let Some(session) = active.take() {
                info!("Last handler left, closing {}", session.key);
                session.teardown();
            }
        }
        true
    }

    /// Close the session and drop every handler
    pub fn disconnect(&self) {
        if let Some(session) = self.active.lock().take() {
            info!("Closing session {}", session.key);
            session.teardown();
        }
    }

    fn command(&self, command: SessionCommand) -> bool {
        match self.active.lock().as_ref() {
            Some(session) => session.handle.send(command),
            None => {
                debug!("No active session, dropping command");
                false
            }
        }
    }

    /// Queue a partial local state change; coalesced into the next batch
    pub fn queue_update(&self, patch: PlayerPatch) -> bool {
        self.command(SessionCommand::QueueUpdate {
            patch,
            timestamp_ms: now_millis(),
        })
    }

    /// Advance the local simulation (zone damage) by `dt` seconds
    pub fn simulate_tick(&self, dt: f32) -> bool {
        self.command(SessionCommand::Simulate { dt })
    }

    pub fn send_ready(&self) -> bool {
        self.command(SessionCommand::Ready)
    }

    pub fn send_eliminated(&self) -> bool {
        self.command(SessionCommand::Eliminated)
    }

    pub fn send_winner(&self, winner_id: &str) -> bool {
        self.command(SessionCommand::Winner {
            winner_id: winner_id.to_string(),
        })
    }

    pub fn request_sync(&self) -> bool {
        self.command(SessionCommand::RequestSync)
    }

    pub fn stats(&self) -> StatsSnapshot {
        match self.active.lock().as_ref() {
            Some(session) => {
                let mut stats = session.handle.status();
                stats.handler_count = session.handlers.len();
                stats
            }
            None => StatsSnapshot::idle(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stats().connected
    }

    pub fn handler_count(&self) -> usize {
        self.active
            .lock()
            .as_ref()
            .map_or(0, |session| session.handlers.len())
    }

    pub fn session_key(&self) -> Option<SessionKey> {
        self.active.lock().as_ref().map(|session| session.key.clone())
    }
}

impl Drop for SyncManager {
    fn drop(&mut self) {
        if let Some(session) = self.active.get_mut().take() {
            session.teardown();
        }
    }
}

impl std::fmt::Debug for SyncManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncManager")
            .field("session", &self.session_key())
            .field("handlers", &self.handler_count())
            .finish()
    }
}
