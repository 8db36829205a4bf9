/// Connection and liveness constants
pub mod net {
    /// Default server base URL when no environment override is present
    pub const DEFAULT_BASE_URL: &str = "wss://purge-server-production.up.railway.app";
    /// Heartbeat frame interval in milliseconds (liveness only)
    pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;
    /// Latency ping interval in milliseconds
    pub const PING_INTERVAL_MS: u64 = 5_000;
    /// WebSocket normal closure code
    pub const CLOSE_NORMAL: u16 = 1000;
    /// Reason attached to a client-initiated normal close
    pub const CLOSE_REASON_CLIENT: &str = "Client disconnect";
    /// Maximum accepted inbound text frame (a 100-player sync is ~40KB)
    pub const MAX_FRAME_SIZE: usize = 1024 * 1024;
    /// Number of characters of game/player ids shown in logs
    pub const LOG_ID_LEN: usize = 8;
}

/// Reconnection backoff constants
pub mod reconnect {
    /// First retry delay in milliseconds
    pub const BASE_DELAY_MS: u64 = 1_000;
    /// Upper bound on any single retry delay
    pub const MAX_DELAY_MS: u64 = 10_000;
    /// Consecutive abnormal closes tolerated before giving up
    pub const MAX_ATTEMPTS: u32 = 5;
    /// Message surfaced to every handler once retries are exhausted
    pub const EXHAUSTED_MESSAGE: &str = "reconnect failed — manual refresh required";
}

/// Outbound update batching constants
pub mod batch {
    /// Batch tick in milliseconds (20 Hz)
    pub const TICK_MS: u64 = 50;
    /// Minimum send interval on a good connection
    pub const GOOD_INTERVAL_MS: u64 = 50;
    /// Minimum send interval on a fair connection
    pub const FAIR_INTERVAL_MS: u64 = 100;
    /// Minimum send interval on a poor connection
    pub const POOR_INTERVAL_MS: u64 = 200;
    /// Queued partial states kept between ticks (oldest dropped)
    pub const MAX_QUEUE_SIZE: usize = 5;
    /// Unacknowledged updates retained for diagnostics
    pub const MAX_PENDING: usize = 10;
}

/// Connection quality thresholds
pub mod quality {
    /// Latency below which a connection can be `Good`
    pub const GOOD_LATENCY_MS: u64 = 100;
    /// Message recency required for `Good`
    pub const GOOD_RECENCY_MS: u64 = 1_000;
    /// Latency below which a connection can be `Fair`
    pub const FAIR_LATENCY_MS: u64 = 300;
    /// Message recency required for `Fair`
    pub const FAIR_RECENCY_MS: u64 = 3_000;
}

/// Round constants
pub mod game {
    /// Countdown length when the server omits one (ms)
    pub const DEFAULT_COUNTDOWN_MS: u64 = 15_000;
    /// Safe-zone damage in hp per second while outside the zone
    pub const ZONE_DAMAGE_PER_SECOND: f32 = 5.0;
    /// Starting hp of a player
    pub const STARTING_HP: f32 = 100.0;
    /// Default player radius in world units
    pub const PLAYER_RADIUS: f32 = 20.0;
}
