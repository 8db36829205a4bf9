//! Outbound update batching
//!
//! Local state changes arrive far faster than they are worth sending. The
//! batcher keeps the last few partial states, and on each tick hands back
//! only the newest one, tagged with the next sequence number. Sent updates
//! sit in a bounded pending table until acknowledged or evicted; nothing is
//! ever resent.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use tokio::time::Instant;

use crate::game::state::PlayerPatch;

/// A partial local state waiting for the next tick
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedUpdate {
    pub state: PlayerPatch,
    /// Epoch ms when queued
    pub timestamp_ms: u64,
}

/// A sent update awaiting `update_ack`
#[derive(Debug, Clone)]
pub struct PendingUpdate {
    pub update: QueuedUpdate,
    pub sent_at: Instant,
}

/// Update chosen for transmission on this tick
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundUpdate {
    pub sequence: u64,
    pub update: QueuedUpdate,
}

#[derive(Debug)]
pub struct UpdateBatcher {
    queue: VecDeque<QueuedUpdate>,
    max_queue: usize,
    pending: BTreeMap<u64, PendingUpdate>,
    max_pending: usize,
    sequence: u64,
    last_send: Option<Instant>,
    /// Early-tick tolerance on the send interval
    slack: Duration,
    dropped: u64,
    evicted: u64,
}

impl UpdateBatcher {
    pub fn new(max_queue: usize, max_pending: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_queue),
            max_queue: max_queue.max(1),
            pending: BTreeMap::new(),
            max_pending: max_pending.max(1),
            sequence: 0,
            last_send: None,
            slack: Duration::ZERO,
            dropped: 0,
            evicted: 0,
        }
    }

    /// Accept a tick arriving up to `slack` early. With a ticker period
    /// equal to the send interval, half a tick keeps one late tick from
    /// suppressing the next on-time one.
    pub fn with_slack(mut self, slack: Duration) -> Self {
        self.slack = slack;
        self
    }

    /// Queue a partial state. On overflow the oldest entry is discarded.
    pub fn queue(&mut self, state: PlayerPatch, timestamp_ms: u64) {
        if self.queue.len() >= self.max_queue {
            self.queue.pop_front();
            self.dropped += 1;
        }
        self.queue.push_back(QueuedUpdate {
            state,
            timestamp_ms,
        });
    }

    /// Pick the update to send on this tick, if any.
    ///
    /// Nothing is sent when `can_send` is false (socket closed, or the round
    /// has ended) or when less than `interval` (minus the slack) has passed
    /// since the previous send; the queue is kept in both cases. Otherwise the newest entry is
    /// taken and the rest of the queue discarded.
    pub fn flush(&mut self, now: Instant, interval: Duration, can_send: bool) -> Option<OutboundUpdate> {
        if !can_send || self.queue.is_empty() {
            return None;
        }
        if let Some(last) = self.last_send {
            if now.saturating_duration_since(last) + self.slack < interval {
                return None;
            }
        }

        let update = self.queue.pop_back()?;
        self.queue.clear();

        self.sequence += 1;
        let sequence = self.sequence;

        if self.pending.len() >= self.max_pending {
            self.pending.pop_first();
            self.evicted += 1;
        }
        self.pending.insert(
            sequence,
            PendingUpdate {
                update: update.clone(),
                sent_at: now,
            },
        );
        self.last_send = Some(now);

        Some(OutboundUpdate { sequence, update })
    }

    /// Server acknowledged `sequence`. Returns the round trip when it was
    /// still pending.
    pub fn acknowledge(&mut self, sequence: u64, now: Instant) -> Option<Duration> {
        self.pending
            .remove(&sequence)
            .map(|p| now.saturating_duration_since(p.sent_at))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Last sequence number handed out
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Queued entries discarded by overflow
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Pending entries evicted without an ack
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Latest queued state, if any
    pub fn latest(&self) -> Option<&QueuedUpdate> {
        self.queue.back()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        self.pending.clear();
        self.last_send = None;
    }
}
