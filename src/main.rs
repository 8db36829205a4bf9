use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use rand::Rng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use purge_sync::util::vec2::Vec2;
use purge_sync::{
    GamePhase, HandlerId, PlayerPatch, PlayerState, SafeZone, SyncConfig, SyncError, SyncHandler,
    SyncManager,
};

/// Logs every event it sees
struct LogHandler;

impl SyncHandler for LogHandler {
    fn on_connected(&self) {
        info!("Connected");
    }

    fn on_disconnected(&self) {
        warn!("Disconnected");
    }

    fn on_reconnecting(&self, attempt: u32, delay: Duration) {
        info!("Reconnect attempt {} in {:?}", attempt, delay);
    }

    fn on_sync(&self, players: &[PlayerState]) {
        info!("Full sync: {} players", players.len());
    }

    fn on_player_joined(&self, player: &PlayerState) {
        info!("Player joined: {}", player.id);
    }

    fn on_player_left(&self, player_id: &str) {
        info!("Player left: {}", player_id);
    }

    fn on_player_eliminated(&self, player_id: &str) {
        info!("Player eliminated: {}", player_id);
    }

    fn on_phase_change(&self, from: GamePhase, to: GamePhase) {
        info!("Phase {} -> {}", from, to);
    }

    fn on_safe_zone(&self, zone: &SafeZone) {
        info!("Safe zone ({}, {}) r={}", zone.center_x, zone.center_y, zone.radius);
    }

    fn on_zone_damage(&self, hp: f32) {
        warn!("Outside the safe zone, hp={:.1}", hp);
    }

    fn on_game_end(&self, winner_id: Option<&str>) {
        info!("Game over, winner: {}", winner_id.unwrap_or("none"));
    }

    fn on_error(&self, error: &SyncError) {
        warn!("Sync error: {}", error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("Purge Sync Client v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let game_id = args
        .next()
        .or_else(|| std::env::var("PURGE_GAME_ID").ok())
        .context("usage: purge-sync <game-id> <player-id> (or set PURGE_GAME_ID)")?;
    let player_id = args
        .next()
        .or_else(|| std::env::var("PURGE_PLAYER_ID").ok())
        .context("usage: purge-sync <game-id> <player-id> (or set PURGE_PLAYER_ID)")?;

    let config = SyncConfig::load_or_default();
    config.validate()?;
    info!("Connecting to {}", config.game_url(&game_id, &player_id));

    let tick = config.batch_tick;
    let manager = SyncManager::with_websocket(config);
    let handler_id = HandlerId::new();
    manager.connect(&game_id, &player_id, handler_id, Arc::new(LogHandler));

    // Random walk so the server sees a moving player
    let mut position = Vec2::ZERO;
    let mut ticker = tokio::time::interval(tick);
    let mut report = tokio::time::interval(Duration::from_secs(10));

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let velocity = {
                    let mut rng = rand::thread_rng();
                    Vec2::new(rng.gen_range(-200.0..200.0), rng.gen_range(-200.0..200.0))
                };
                let dt = tick.as_secs_f32();
                position += velocity * dt;
                manager.queue_update(PlayerPatch::movement(position, velocity, velocity.angle()));
                manager.simulate_tick(dt);
            }
            _ = report.tick() => {
                let stats = manager.stats();
                info!(
                    "state={:?} quality={:?} latency={:?}ms phase={} players={} queued={}",
                    stats.state,
                    stats.quality,
                    stats.latency_ms,
                    stats.phase,
                    stats.remote_players,
                    stats.queue_size
                );
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.unregister_handler(handler_id);
    // Let the close frame go out
    tokio::time::sleep(Duration::from_millis(100)).await;

    let metrics = manager.metrics().snapshot();
    info!(
        "Client stopped: {} frames in, {} frames out, {} parse failures",
        metrics.frames_received, metrics.frames_sent, metrics.parse_failures
    );

    Ok(())
}
