//! Sync client metrics
//!
//! Process-wide atomic counters for frame traffic and failure modes, plus the
//! per-session [`StatsSnapshot`] published by each session task.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use crate::game::state::GamePhase;
use crate::net::connection::{ConnectionQuality, ConnectionState};

/// Counters shared by every session of a [`crate::net::multiplexer::SyncManager`]
#[derive(Debug)]
pub struct SyncMetrics {
    pub frames_received: AtomicU64,
    pub frames_sent: AtomicU64,
    pub bytes_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    /// Inbound frames rejected before decoding (size, encoding)
    pub dropped_frames: AtomicU64,
    /// Inbound frames that failed to decode
    pub parse_failures: AtomicU64,
    /// Outbound frames dropped because the socket was not open
    pub sends_while_closed: AtomicU64,
    pub reconnects_scheduled: AtomicU64,
    pub sessions_opened: AtomicU64,
    pub handler_panics: AtomicU64,
}

/// Point-in-time copy of [`SyncMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub dropped_frames: u64,
    pub parse_failures: u64,
    pub sends_while_closed: u64,
    pub reconnects_scheduled: u64,
    pub sessions_opened: u64,
    pub handler_panics: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: AtomicU64::new(0),
            frames_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            dropped_frames: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            sends_while_closed: AtomicU64::new(0),
            reconnects_scheduled: AtomicU64::new(0),
            sessions_opened: AtomicU64::new(0),
            handler_panics: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self, bytes: usize) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_sent(&self, bytes: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_handler_panics(&self, count: usize) {
        if count > 0 {
            self.handler_panics.fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            dropped_frames: self.dropped_frames.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            sends_while_closed: self.sends_while_closed.load(Ordering::Relaxed),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
        }
    }

    /// Prometheus text exposition of the counters
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        let mut output = String::with_capacity(1024);

        macro_rules! metric {
            ($name:expr, $help:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
                    $name, $help, $name, $name, $value
                ));
            };
        }

        metric!("purge_sync_frames_received", "Inbound frames", snapshot.frames_received);
        metric!("purge_sync_frames_sent", "Outbound frames", snapshot.frames_sent);
        metric!("purge_sync_bytes_received", "Inbound bytes", snapshot.bytes_received);
        metric!("purge_sync_bytes_sent", "Outbound bytes", snapshot.bytes_sent);
        metric!("purge_sync_dropped_frames", "Inbound frames rejected by framing", snapshot.dropped_frames);
        metric!("purge_sync_parse_failures", "Inbound frames that failed to decode", snapshot.parse_failures);
        metric!("purge_sync_sends_while_closed", "Outbound frames dropped while closed", snapshot.sends_while_closed);
        metric!("purge_sync_reconnects_scheduled", "Reconnect attempts scheduled", snapshot.reconnects_scheduled);
        metric!("purge_sync_sessions_opened", "Sockets that reached open", snapshot.sessions_opened);
        metric!("purge_sync_handler_panics", "Handler callbacks that panicked", snapshot.handler_panics);

        output
    }
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Session status, as reported by `SyncManager::stats`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub connected: bool,
    pub state: ConnectionState,
    pub quality: ConnectionQuality,
    /// Latest RTT sample
    pub latency_ms: Option<u64>,
    pub average_latency_ms: Option<u64>,
    pub reconnect_attempts: u32,
    pub queue_size: usize,
    pub pending_updates: usize,
    /// Inbound frames on this session
    pub message_count: u64,
    pub handler_count: usize,
    pub phase: GamePhase,
    pub remote_players: usize,
    /// Truncated ids, for display
    pub game_id: Option<String>,
    pub player_id: Option<String>,
}

impl StatsSnapshot {
    /// Status when no session exists
    pub fn idle() -> Self {
        Self {
            connected: false,
            state: ConnectionState::Closed,
            quality: ConnectionQuality::Poor,
            latency_ms: None,
            average_latency_ms: None,
            reconnect_attempts: 0,
            queue_size: 0,
            pending_updates: 0,
            message_count: 0,
            handler_count: 0,
            phase: GamePhase::Waiting,
            remote_players: 0,
            game_id: None,
            player_id: None,
        }
    }
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self::idle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = SyncMetrics::new();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_record_traffic() {
        let metrics = SyncMetrics::new();
        metrics.record_received(100);
        metrics.record_received(20);
        metrics.record_sent(7);
        metrics.record_handler_panics(0);
        metrics.record_handler_panics(2);
        SyncMetrics::incr(&metrics.parse_failures);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.bytes_received, 120);
        assert_eq!(snapshot.frames_sent, 1);
        assert_eq!(snapshot.handler_panics, 2);
        assert_eq!(snapshot.parse_failures, 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = SyncMetrics::new();
        metrics.record_sent(10);
        let output = metrics.to_prometheus();
        assert!(output.contains("# TYPE purge_sync_frames_sent counter"));
        assert!(output.contains("purge_sync_bytes_sent 10"));
    }

    #[test]
    fn test_idle_stats_serialize() {
        let json = serde_json::to_value(StatsSnapshot::idle()).unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["state"], "closed");
        assert_eq!(json["phase"], "waiting");
        assert!(json["latencyMs"].is_null());
    }
}
