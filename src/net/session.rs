//! Session state for one (game, player) pair.
//!
//! [`SessionCore`] holds everything a session knows (connection, backoff,
//! batcher, router, phase, local player, zone) and exposes one method per
//! input: socket opened, frame received, socket closed, tick, local command.
//! Each returns the [`Effect`]s to perform. It never touches a socket or a
//! timer itself, so the whole state machine runs in tests with synthetic
//! `Instant`s.

use std::time::Duration;

use smallvec::SmallVec;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::SyncConfig;
use crate::game::constants::net::{CLOSE_NORMAL, CLOSE_REASON_CLIENT, LOG_ID_LEN};
use crate::game::phase::{PhaseMachine, PhaseTransition, PhaseTrigger};
use crate::game::state::{GamePhase, LocalPlayer, PlayerId, PlayerMirror, PlayerPatch, SafeZone};
use crate::game::zone::{accept_zone, apply_zone_damage, ZoneEvent, ZoneUpdate};
use crate::metrics::StatsSnapshot;
use crate::net::batcher::UpdateBatcher;
use crate::net::connection::Connection;
use crate::net::framing::is_abnormal_close;
use crate::net::handler::SyncError;
use crate::net::protocol::{self, ClientMessage, DecodeError};
use crate::net::reliability::{LivenessSchedule, PingTracker, ReconnectPolicy};
use crate::net::router::{MessageRouter, Routed, SyncEvent};

/// Truncate an id for log output
pub fn short_id(id: &str) -> &str {
    id.get(..LOG_ID_LEN).unwrap_or(id)
}

/// Session identity. Changing either part means a different session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub game_id: String,
    pub player_id: PlayerId,
}

impl SessionKey {
    pub fn new(game_id: impl Into<String>, player_id: impl Into<PlayerId>) -> Self {
        Self {
            game_id: game_id.into(),
            player_id: player_id.into(),
        }
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", short_id(&self.game_id), short_id(&self.player_id))
    }
}

/// Side effect requested by the core
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Transmit a frame (dropped with a warning if the socket is not open)
    Send(ClientMessage),
    /// Broadcast to handlers
    Emit(SyncEvent),
    /// Broadcast `on_connected`
    Connected,
    /// Broadcast `on_disconnected`
    Disconnected,
    /// Broadcast `on_error`
    Error(SyncError),
    /// Broadcast `on_reconnecting`
    Reconnecting { attempt: u32, delay: Duration },
    /// Open a new socket after the delay
    ScheduleReconnect(Duration),
    /// Close the socket
    Close { code: u16, reason: &'static str },
}

pub type Effects = SmallVec<[Effect; 4]>;

#[derive(Debug)]
pub struct SessionCore {
    key: SessionKey,
    url: String,
    connection: Connection,
    reconnect: ReconnectPolicy,
    ping: PingTracker,
    liveness: LivenessSchedule,
    batcher: UpdateBatcher,
    router: MessageRouter,
    phase: PhaseMachine,
    local: LocalPlayer,
    zone: Option<SafeZone>,
    zone_damage_per_second: f32,
    intentional_close: bool,
    exhausted: bool,
    message_count: u64,
}

impl SessionCore {
    pub fn new(key: SessionKey, config: &SyncConfig) -> Self {
        Self {
            url: config.game_url(&key.game_id, &key.player_id),
            connection: Connection::new(),
            reconnect: ReconnectPolicy::from_config(config),
            ping: PingTracker::default(),
            liveness: LivenessSchedule::from_config(config),
            batcher: UpdateBatcher::new(config.max_queue_size, config.max_pending_updates)
                .with_slack(config.batch_tick / 2),
            router: MessageRouter::new(key.player_id.clone()),
            phase: PhaseMachine::new(),
            local: LocalPlayer::new(key.player_id.clone()),
            zone: None,
            zone_damage_per_second: config.zone_damage_per_second,
            intentional_close: false,
            exhausted: false,
            message_count: 0,
            key,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn is_open(&self) -> bool {
        self.connection.is_open()
    }

    pub fn phase(&self) -> &PhaseMachine {
        &self.phase
    }

    pub fn local(&self) -> &LocalPlayer {
        &self.local
    }

    pub fn zone(&self) -> Option<&SafeZone> {
        self.zone.as_ref()
    }

    pub fn mirror(&self) -> &PlayerMirror {
        self.router.mirror()
    }

    pub fn batcher(&self) -> &UpdateBatcher {
        &self.batcher
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    /// A socket is being opened
    pub fn begin_connect(&mut self) {
        debug!("Session {} connecting to {}", self.key, self.url);
        self.connection.mark_connecting();
    }

    /// Socket reached open
    pub fn on_open(&mut self, now: Instant) -> Effects {
        info!(
            "Session {} open (after {} reconnect attempts)",
            self.key,
            self.reconnect.attempts()
        );
        self.reconnect.reset();
        self.exhausted = false;
        self.intentional_close = false;
        self.ping.reset();
        self.connection.mark_open(now);
        self.liveness.start(now);

        let mut effects = Effects::new();
        effects.push(Effect::Send(ClientMessage::Connect {
            game_id: self.key.game_id.clone(),
            player_id: self.key.player_id.clone(),
        }));
        effects.push(Effect::Send(ClientMessage::SyncRequest));
        effects.push(Effect::Connected);
        effects
    }

    /// Inbound text frame. A frame that fails to decode is reported to the
    /// caller and otherwise ignored; the session carries on.
    pub fn on_frame(&mut self, text: &str, now: Instant) -> Result<Effects, DecodeError> {
        self.message_count += 1;
        self.connection.record_received(text.len(), now);

        let message = protocol::decode(text)?;
        let mut effects = Effects::new();
        for routed in self.router.route(message) {
            self.apply_routed(routed, now, &mut effects);
        }
        Ok(effects)
    }

    fn apply_routed(&mut self, routed: Routed, now: Instant, effects: &mut Effects) {
        match routed {
            Routed::Event(event) => {
                if let SyncEvent::PlayerEliminated { player_id } = &event {
                    // Server says we are out; latch without announcing again
                    if *player_id == self.key.player_id && self.local.eliminate() {
                        info!("Session {} local player eliminated by server", self.key);
                    }
                }
                effects.push(Effect::Emit(event));
            }
            Routed::Phase(trigger) => self.apply_phase(trigger, effects),
            Routed::Zone(zone) => match accept_zone(&mut self.zone, zone) {
                ZoneUpdate::Applied => effects.push(Effect::Emit(SyncEvent::SafeZone(zone))),
                ZoneUpdate::RadiusClamped => {
                    warn!(
                        "Session {} safe zone grew to {} while shrinking, keeping previous radius",
                        self.key, zone.radius
                    );
                    if let Some(current) = self.zone {
                        effects.push(Effect::Emit(SyncEvent::SafeZone(current)));
                    }
                }
                ZoneUpdate::Rejected => {
                    warn!("Session {} rejected invalid safe zone {:?}", self.key, zone)
                }
            },
            Routed::LocalCorrection(state) => self.local.correct_from(&state),
            Routed::Pong => match self.ping.on_pong(now) {
                Some(rtt) => {
                    let quality = self.connection.update_rtt(rtt, now);
                    debug!("Session {} rtt {:?} ({})", self.key, rtt, quality);
                }
                None => debug!("Session {} unsolicited pong", self.key),
            },
            Routed::Ack(sequence) => {
                if self.batcher.acknowledge(sequence, now).is_none() {
                    debug!("Session {} ack for unknown sequence {}", self.key, sequence);
                }
            }
        }
    }

    fn apply_phase(&mut self, trigger: PhaseTrigger, effects: &mut Effects) {
        let restart = match &trigger {
            PhaseTrigger::CountdownStart {
                start_ms,
                duration_ms,
            } => Some((*start_ms, *duration_ms)),
            _ => None,
        };

        match self.phase.apply(trigger) {
            PhaseTransition::Advanced { from, to } => {
                info!("Session {} phase {} -> {}", self.key, from, to);
                effects.push(Effect::Emit(SyncEvent::PhaseChanged { from, to }));
                match to {
                    GamePhase::Countdown => {
                        if let Some(countdown) = self.phase.countdown() {
                            effects.push(Effect::Emit(SyncEvent::CountdownStart {
                                start_ms: countdown.start_ms,
                                duration_ms: countdown.duration_ms,
                            }));
                        }
                    }
                    GamePhase::Active => effects.push(Effect::Emit(SyncEvent::GameStart)),
                    GamePhase::Ended => effects.push(Effect::Emit(SyncEvent::GameEnd {
                        winner_id: self.phase.winner_id().map(str::to_string),
                    })),
                    GamePhase::Waiting => {}
                }
            }
            PhaseTransition::Unchanged => {
                if let Some((start_ms, duration_ms)) = restart {
                    effects.push(Effect::Emit(SyncEvent::CountdownStart {
                        start_ms,
                        duration_ms,
                    }));
                }
            }
            PhaseTransition::Stale { current, reported } => {
                warn!(
                    "Session {} stale phase '{}' reported while '{}', ignoring",
                    self.key, reported, current
                );
            }
            PhaseTransition::Invalid { current } => {
                warn!(
                    "Session {} out-of-order phase event while '{}', requesting sync",
                    self.key, current
                );
                effects.push(Effect::Send(ClientMessage::SyncRequest));
            }
        }
    }

    /// Transport reported an error; the close that follows decides on retry
    pub fn on_transport_error(&mut self, message: &str) {
        warn!("Session {} transport error: {}", self.key, message);
        self.connection.mark_error();
    }

    /// Socket closed (or failed to open)
    pub fn on_closed(&mut self, code: u16, reason: &str) -> Effects {
        let was_open = self.connection.is_open();
        self.liveness.stop();
        self.ping.reset();
        self.connection.mark_closed();

        let mut effects = Effects::new();
        if was_open {
            effects.push(Effect::Disconnected);
        }

        if self.intentional_close {
            info!("Session {} closed by client", self.key);
            return effects;
        }
        if !is_abnormal_close(code) {
            info!("Session {} closed normally by server: {}", self.key, reason);
            return effects;
        }

        match self.reconnect.next_delay() {
            Some(delay) => {
                info!(
                    "Session {} closed ({} {}), reconnecting in {}ms (attempt {}/{})",
                    self.key,
                    code,
                    reason,
                    delay.as_millis(),
                    self.reconnect.attempts(),
                    self.reconnect.max_attempts()
                );
                effects.push(Effect::Reconnecting {
                    attempt: self.reconnect.attempts(),
                    delay,
                });
                effects.push(Effect::ScheduleReconnect(delay));
            }
            None => {
                if !self.exhausted {
                    self.exhausted = true;
                    error!(
                        "Session {} gave up after {} reconnect attempts",
                        self.key,
                        self.reconnect.attempts()
                    );
                    effects.push(Effect::Error(SyncError::ReconnectExhausted {
                        attempts: self.reconnect.attempts(),
                    }));
                }
            }
        }
        effects
    }

    /// Periodic tick: liveness frames and the batch flush
    pub fn on_tick(&mut self, now: Instant) -> Effects {
        let mut effects = Effects::new();
        if !self.connection.is_open() {
            return effects;
        }

        let due = self.liveness.poll(now);
        if due.heartbeat {
            effects.push(Effect::Send(ClientMessage::Heartbeat));
        }
        if due.ping {
            self.ping.on_ping_sent(now);
            effects.push(Effect::Send(ClientMessage::Ping));
        }

        let interval = self.connection.refresh_quality(now).send_interval();
        let can_send = self.phase.accepts_gameplay_updates();
        if let Some(out) = self.batcher.flush(now, interval, can_send) {
            effects.push(Effect::Send(ClientMessage::PlayerUpdate {
                sequence: out.sequence,
                state: out.update.state,
                timestamp: out.update.timestamp_ms,
            }));
        }
        effects
    }

    /// Queue a local state fragment, applying it to the local copy first
    pub fn queue_update(&mut self, patch: PlayerPatch, timestamp_ms: u64) {
        self.local.predict(&patch);
        self.batcher.queue(patch, timestamp_ms);
    }

    /// Advance local simulation by `dt` seconds (zone damage)
    pub fn simulate(&mut self, dt: f32) -> Effects {
        let mut effects = Effects::new();
        let event = apply_zone_damage(
            self.phase.phase(),
            self.zone.as_ref(),
            &mut self.local,
            self.zone_damage_per_second,
            dt,
        );
        match event {
            Some(ZoneEvent::Damaged { hp, .. }) => {
                effects.push(Effect::Emit(SyncEvent::ZoneDamage { hp }));
            }
            Some(ZoneEvent::Eliminated) => {
                info!("Session {} local player eliminated by the zone", self.key);
                effects.push(Effect::Emit(SyncEvent::ZoneDamage { hp: 0.0 }));
                self.announce_elimination(&mut effects);
            }
            None => {}
        }
        effects
    }

    pub fn send_ready(&mut self) -> Effects {
        SmallVec::from_elem(Effect::Send(ClientMessage::Ready), 1)
    }

    /// Announce local elimination. Repeat calls are no-ops.
    pub fn send_eliminated(&mut self) -> Effects {
        let mut effects = Effects::new();
        if self.local.eliminate() {
            self.announce_elimination(&mut effects);
        } else {
            debug!("Session {} already eliminated", self.key);
        }
        effects
    }

    fn announce_elimination(&self, effects: &mut Effects) {
        effects.push(Effect::Send(ClientMessage::Eliminated));
        effects.push(Effect::Emit(SyncEvent::PlayerEliminated {
            player_id: self.key.player_id.clone(),
        }));
    }

    pub fn send_winner(&mut self, winner_id: PlayerId) -> Effects {
        SmallVec::from_elem(Effect::Send(ClientMessage::Winner { winner_id }), 1)
    }

    pub fn request_sync(&mut self) -> Effects {
        SmallVec::from_elem(Effect::Send(ClientMessage::SyncRequest), 1)
    }

    /// Client-initiated close; suppresses any retry
    pub fn close(&mut self) -> Effects {
        self.intentional_close = true;
        self.liveness.stop();
        self.ping.reset();
        self.batcher.clear();
        self.connection.begin_close();
        SmallVec::from_elem(
            Effect::Close {
                code: CLOSE_NORMAL,
                reason: CLOSE_REASON_CLIENT,
            },
            1,
        )
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.connection.record_sent(bytes);
    }

    pub fn stats(&self, handler_count: usize) -> StatsSnapshot {
        StatsSnapshot {
            connected: self.connection.is_open(),
            state: self.connection.state,
            quality: self.connection.quality,
            latency_ms: self.connection.latency.map(|l| l.as_millis() as u64),
            average_latency_ms: self.connection.average_rtt().map(|l| l.as_millis() as u64),
            reconnect_attempts: self.reconnect.attempts(),
            queue_size: self.batcher.queue_len(),
            pending_updates: self.batcher.pending_len(),
            message_count: self.message_count,
            handler_count,
            phase: self.phase.phase(),
            remote_players: self.router.mirror().len(),
            game_id: Some(short_id(&self.key.game_id).to_string()),
            player_id: Some(short_id(&self.key.player_id).to_string()),
        }
    }
}
