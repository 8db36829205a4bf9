//! Reliability layer: reconnect backoff, latency probing and liveness
//! scheduling. All of it is plain state driven by explicit `Instant`s; the
//! session task decides when to call in.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::SyncConfig;

/// Exponential reconnect backoff with a capped attempt count.
///
/// `delay(n) = min(base * 2^n, cap)` for the n-th consecutive retry.
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    base: Duration,
    cap: Duration,
    max_attempts: u32,
    attempts: u32,
}

impl ReconnectPolicy {
    pub fn new(base: Duration, cap: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            cap,
            max_attempts,
            attempts: 0,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.backoff_base,
            config.backoff_cap,
            config.max_reconnect_attempts,
        )
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// Reserve the next retry. `None` once the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempts >= self.max_attempts {
            return None;
        }
        let delay = self.delay_for(self.attempts);
        self.attempts += 1;
        Some(delay)
    }

    /// Successful open
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Tracks the outstanding latency `ping` so the matching `pong` yields an
/// RTT sample
#[derive(Debug, Clone, Default)]
pub struct PingTracker {
    sent_at: Option<Instant>,
}

impl PingTracker {
    pub fn on_ping_sent(&mut self, now: Instant) {
        self.sent_at = Some(now);
    }

    /// RTT of the outstanding ping; `None` for an unsolicited pong
    pub fn on_pong(&mut self, now: Instant) -> Option<Duration> {
        self.sent_at
            .take()
            .map(|sent| now.saturating_duration_since(sent))
    }

    pub fn reset(&mut self) {
        self.sent_at = None;
    }
}

/// Which liveness frames are due on this tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LivenessDue {
    pub heartbeat: bool,
    pub ping: bool,
}

/// Heartbeat and ping deadlines. Only armed while the socket is open.
#[derive(Debug, Clone)]
pub struct LivenessSchedule {
    heartbeat_every: Duration,
    ping_every: Duration,
    next_heartbeat: Option<Instant>,
    next_ping: Option<Instant>,
}

impl LivenessSchedule {
    pub fn new(heartbeat_every: Duration, ping_every: Duration) -> Self {
        Self {
            heartbeat_every,
            ping_every,
            next_heartbeat: None,
            next_ping: None,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.heartbeat_interval, config.ping_interval)
    }

    pub fn start(&mut self, now: Instant) {
        self.next_heartbeat = Some(now + self.heartbeat_every);
        self.next_ping = Some(now + self.ping_every);
    }

    pub fn stop(&mut self) {
        self.next_heartbeat = None;
        self.next_ping = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_heartbeat.is_some()
    }

    /// Report due frames and re-arm them. A late tick does not replay
    /// missed periods.
    pub fn poll(&mut self, now: Instant) -> LivenessDue {
        let mut due = LivenessDue::default();
        if let Some(at) = self.next_heartbeat {
            if now >= at {
                due.heartbeat = true;
                self.next_heartbeat = Some(now + self.heartbeat_every);
            }
        }
        if let Some(at) = self.next_ping {
            if now >= at {
                due.ping = true;
                self.next_ping = Some(now + self.ping_every);
            }
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_backoff_sequence() {
        let mut policy = ReconnectPolicy::new(ms(1_000), ms(10_000), 5);
        let delays: Vec<_> = std::iter::from_fn(|| policy.next_delay()).collect();
        assert_eq!(delays, vec![ms(1_000), ms(2_000), ms(4_000), ms(8_000), ms(10_000)]);
        assert!(policy.is_exhausted());
        assert_eq!(policy.next_delay(), None);

        policy.reset();
        assert_eq!(policy.attempts(), 0);
        assert_eq!(policy.next_delay(), Some(ms(1_000)));
    }

    #[test]
    fn test_backoff_never_overflows() {
        let policy = ReconnectPolicy::new(ms(1_000), ms(10_000), 100);
        assert_eq!(policy.delay_for(31), ms(10_000));
        assert_eq!(policy.delay_for(64), ms(10_000));
    }

    #[test]
    fn test_ping_rtt() {
        let start = Instant::now();
        let mut ping = PingTracker::default();
        assert_eq!(ping.on_pong(start), None);

        ping.on_ping_sent(start);
        assert_eq!(ping.on_pong(start + ms(42)), Some(ms(42)));
        // Duplicate pong has nothing to match
        assert_eq!(ping.on_pong(start + ms(50)), None);
    }

    #[test]
    fn test_liveness_schedule() {
        let start = Instant::now();
        let mut schedule = LivenessSchedule::new(ms(30_000), ms(5_000));
        assert_eq!(schedule.poll(start + ms(60_000)), LivenessDue::default());

        schedule.start(start);
        assert_eq!(schedule.poll(start + ms(4_999)), LivenessDue::default());
        assert_eq!(
            schedule.poll(start + ms(5_000)),
            LivenessDue {
                heartbeat: false,
                ping: true
            }
        );
        assert!(!schedule.poll(start + ms(9_999)).ping);
        assert_eq!(
            schedule.poll(start + ms(30_000)),
            LivenessDue {
                heartbeat: true,
                ping: true
            }
        );

        schedule.stop();
        assert!(!schedule.is_running());
        assert_eq!(schedule.poll(start + ms(90_000)), LivenessDue::default());
    }
}
