//! Per-socket connection bookkeeping: lifecycle state, latency samples,
//! message recency and the derived quality tier.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::game::constants::{batch, quality};

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Socket requested, handshake not finished
    Connecting,
    /// Handshake done, frames flowing
    Open,
    /// Close requested locally
    Closing,
    /// No socket
    Closed,
}

/// Link quality tier, gates the batch send interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    Good,
    Fair,
    Poor,
}

impl ConnectionQuality {
    /// Minimum time between two `player:update` frames
    pub fn send_interval(&self) -> Duration {
        match self {
            ConnectionQuality::Good => Duration::from_millis(batch::GOOD_INTERVAL_MS),
            ConnectionQuality::Fair => Duration::from_millis(batch::FAIR_INTERVAL_MS),
            ConnectionQuality::Poor => Duration::from_millis(batch::POOR_INTERVAL_MS),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionQuality::Good => "good",
            ConnectionQuality::Fair => "fair",
            ConnectionQuality::Poor => "poor",
        }
    }
}

impl std::fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify link quality from the latest latency sample and the time since
/// the last inbound message. No latency sample yet counts as zero latency;
/// no message ever seen is always `Poor`.
pub fn classify_quality(
    latency: Option<Duration>,
    since_last_message: Option<Duration>,
) -> ConnectionQuality {
    let Some(since) = since_last_message else {
        return ConnectionQuality::Poor;
    };
    let latency_ms = latency.map_or(0, |l| l.as_millis() as u64);
    let since_ms = since.as_millis() as u64;

    if latency_ms < quality::GOOD_LATENCY_MS && since_ms < quality::GOOD_RECENCY_MS {
        ConnectionQuality::Good
    } else if latency_ms < quality::FAIR_LATENCY_MS && since_ms < quality::FAIR_RECENCY_MS {
        ConnectionQuality::Fair
    } else {
        ConnectionQuality::Poor
    }
}

const RTT_WINDOW: usize = 10;

/// Client connection information
#[derive(Debug, Clone)]
pub struct Connection {
    pub state: ConnectionState,
    pub quality: ConnectionQuality,
    pub opened_at: Option<Instant>,
    pub last_message_at: Option<Instant>,
    /// Latest round-trip sample
    pub latency: Option<Duration>,
    pub rtt_samples: Vec<Duration>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub frames_sent: u64,
    pub frames_received: u64,
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Connection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Closed,
            quality: ConnectionQuality::Good,
            opened_at: None,
            last_message_at: None,
            latency: None,
            rtt_samples: Vec::with_capacity(RTT_WINDOW),
            bytes_sent: 0,
            bytes_received: 0,
            frames_sent: 0,
            frames_received: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn mark_connecting(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// Socket reached the open state. Counts as a fresh inbound signal so a
    /// brand-new link starts out `Good`.
    pub fn mark_open(&mut self, now: Instant) {
        self.state = ConnectionState::Open;
        self.opened_at = Some(now);
        self.last_message_at = Some(now);
        self.refresh_quality(now);
    }

    pub fn begin_close(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closing;
        }
    }

    pub fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.opened_at = None;
    }

    /// Transport error: downgrade immediately, the close that follows drives
    /// any retry
    pub fn mark_error(&mut self) {
        self.quality = ConnectionQuality::Poor;
    }

    /// Record an inbound frame and recompute quality
    pub fn record_received(&mut self, bytes: usize, now: Instant) -> ConnectionQuality {
        self.bytes_received += bytes as u64;
        self.frames_received += 1;
        self.last_message_at = Some(now);
        self.refresh_quality(now)
    }

    /// Record an outbound frame
    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.frames_sent += 1;
    }

    /// Record a round-trip sample from a pong and recompute quality
    pub fn update_rtt(&mut self, rtt: Duration, now: Instant) -> ConnectionQuality {
        if self.rtt_samples.len() >= RTT_WINDOW {
            self.rtt_samples.remove(0);
        }
        self.rtt_samples.push(rtt);
        self.latency = Some(rtt);
        self.refresh_quality(now)
    }

    /// Rolling average over the last samples
    pub fn average_rtt(&self) -> Option<Duration> {
        if self.rtt_samples.is_empty() {
            return None;
        }
        let sum: Duration = self.rtt_samples.iter().sum();
        Some(sum / self.rtt_samples.len() as u32)
    }

    pub fn refresh_quality(&mut self, now: Instant) -> ConnectionQuality {
        let since = self.last_message_at.map(|at| now.saturating_duration_since(at));
        self.quality = classify_quality(self.latency, since);
        self.quality
    }

    pub fn uptime(&self, now: Instant) -> Option<Duration> {
        self.opened_at.map(|at| now.saturating_duration_since(at))
    }
}
