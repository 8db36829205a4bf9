use std::time::Duration;

use crate::game::constants::{batch, game, net, reconnect};

/// Errors reported by [`SyncConfig::validate`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("base URL must start with ws:// or wss:// (got '{0}')")]
    InvalidBaseUrl(String),
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("backoff base ({base}ms) cannot exceed backoff cap ({cap}ms)")]
    BackoffInverted { base: u64, cap: u64 },
    #[error("zone damage must be a finite, non-negative number")]
    InvalidZoneDamage,
}

/// Client synchronization configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// WebSocket base URL (without the `/game` path)
    pub base_url: String,
    /// Heartbeat frame interval
    pub heartbeat_interval: Duration,
    /// Latency ping interval
    pub ping_interval: Duration,
    /// Batch flush tick
    pub batch_tick: Duration,
    /// Consecutive reconnect attempts before giving up
    pub max_reconnect_attempts: u32,
    /// First reconnect delay
    pub backoff_base: Duration,
    /// Longest reconnect delay
    pub backoff_cap: Duration,
    /// Queued partial updates kept between ticks
    pub max_queue_size: usize,
    /// Unacknowledged updates retained
    pub max_pending_updates: usize,
    /// Safe-zone damage in hp per second
    pub zone_damage_per_second: f32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: net::DEFAULT_BASE_URL.to_string(),
            heartbeat_interval: Duration::from_millis(net::HEARTBEAT_INTERVAL_MS),
            ping_interval: Duration::from_millis(net::PING_INTERVAL_MS),
            batch_tick: Duration::from_millis(batch::TICK_MS),
            max_reconnect_attempts: reconnect::MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(reconnect::BASE_DELAY_MS),
            backoff_cap: Duration::from_millis(reconnect::MAX_DELAY_MS),
            max_queue_size: batch::MAX_QUEUE_SIZE,
            max_pending_updates: batch::MAX_PENDING,
            zone_damage_per_second: game::ZONE_DAMAGE_PER_SECOND,
        }
    }
}

impl SyncConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("PURGE_WS_URL").or_else(|_| std::env::var("VITE_WS_URL")) {
            if url.starts_with("ws://") || url.starts_with("wss://") {
                config.base_url = url.trim_end_matches('/').to_string();
            } else {
                tracing::warn!("Invalid PURGE_WS_URL '{}', using default", url);
            }
        }

        if let Some(ms) = env_millis("PURGE_HEARTBEAT_MS") {
            config.heartbeat_interval = ms;
        }
        if let Some(ms) = env_millis("PURGE_PING_MS") {
            config.ping_interval = ms;
        }
        if let Some(ms) = env_millis("PURGE_BATCH_TICK_MS") {
            config.batch_tick = ms;
        }
        if let Some(ms) = env_millis("PURGE_BACKOFF_BASE_MS") {
            config.backoff_base = ms;
        }
        if let Some(ms) = env_millis("PURGE_BACKOFF_CAP_MS") {
            config.backoff_cap = ms;
        }

        if let Ok(attempts) = std::env::var("PURGE_MAX_RECONNECTS") {
            match attempts.parse::<u32>() {
                Ok(parsed) if (1..=20).contains(&parsed) => config.max_reconnect_attempts = parsed,
                _ => tracing::warn!("PURGE_MAX_RECONNECTS must be 1-20, using default"),
            }
        }

        if let Ok(size) = std::env::var("PURGE_QUEUE_SIZE") {
            match size.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.max_queue_size = parsed,
                _ => tracing::warn!("Invalid PURGE_QUEUE_SIZE '{}', using default", size),
            }
        }

        if let Ok(limit) = std::env::var("PURGE_PENDING_LIMIT") {
            match limit.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.max_pending_updates = parsed,
                _ => tracing::warn!("Invalid PURGE_PENDING_LIMIT '{}', using default", limit),
            }
        }

        if let Ok(dps) = std::env::var("PURGE_ZONE_DPS") {
            match dps.parse::<f32>() {
                Ok(parsed) if parsed.is_finite() && parsed >= 0.0 => {
                    config.zone_damage_per_second = parsed
                }
                _ => tracing::warn!("Invalid PURGE_ZONE_DPS '{}', using default", dps),
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.base_url.starts_with("ws://") && !self.base_url.starts_with("wss://") {
            return Err(ConfigError::InvalidBaseUrl(self.base_url.clone()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::Zero("heartbeat_interval"));
        }
        if self.ping_interval.is_zero() {
            return Err(ConfigError::Zero("ping_interval"));
        }
        if self.batch_tick.is_zero() {
            return Err(ConfigError::Zero("batch_tick"));
        }
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::Zero("max_reconnect_attempts"));
        }
        if self.max_queue_size == 0 {
            return Err(ConfigError::Zero("max_queue_size"));
        }
        if self.max_pending_updates == 0 {
            return Err(ConfigError::Zero("max_pending_updates"));
        }
        if self.backoff_base > self.backoff_cap {
            return Err(ConfigError::BackoffInverted {
                base: self.backoff_base.as_millis() as u64,
                cap: self.backoff_cap.as_millis() as u64,
            });
        }
        if !self.zone_damage_per_second.is_finite() || self.zone_damage_per_second < 0.0 {
            return Err(ConfigError::InvalidZoneDamage);
        }
        Ok(())
    }

    /// Connection URL for one (game, player) session
    pub fn game_url(&self, game_id: &str, player_id: &str) -> String {
        format!(
            "{}/game?gameId={}&playerId={}",
            self.base_url.trim_end_matches('/'),
            game_id,
            player_id
        )
    }
}

fn env_millis(key: &str) -> Option<Duration> {
    let raw = std::env::var(key).ok()?;
    match raw.parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}
