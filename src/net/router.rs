//! Inbound message routing
//!
//! Takes decoded [`ServerMessage`]s, keeps the remote-player mirror current
//! and turns each frame into handler events plus the control signals the
//! session itself acts on (phase triggers, zone pushes, pongs, acks).

use smallvec::SmallVec;
use tracing::{debug, warn};

use crate::game::constants::game::DEFAULT_COUNTDOWN_MS;
use crate::game::phase::PhaseTrigger;
use crate::game::state::{GamePhase, PlayerId, PlayerMirror, PlayerState, SafeZone};
use crate::net::protocol::{GameStateUpdate, ServerMessage};

/// Event broadcast to every registered handler
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Full snapshot; the same list goes to every handler
    Sync { players: Vec<PlayerState> },
    /// Remote player state after merging the incremental patch
    PlayerUpdate { player: PlayerState },
    PlayerJoined { player: PlayerState },
    PlayerLeft { player_id: PlayerId },
    PlayerEliminated { player_id: PlayerId },
    PlayerReady { player_id: PlayerId },
    /// Aggregate lobby/round summary
    GameState(GameStateUpdate),
    PhaseChanged { from: GamePhase, to: GamePhase },
    CountdownStart { start_ms: u64, duration_ms: u64 },
    GameStart,
    GameEnd { winner_id: Option<PlayerId> },
    SafeZone(SafeZone),
    /// Local player took zone damage this tick
    ZoneDamage { hp: f32 },
    /// Server-reported error frame
    ServerError { message: String },
}

/// One routing outcome
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Forward to handlers as-is
    Event(SyncEvent),
    /// Feed the phase machine
    Phase(PhaseTrigger),
    /// Candidate zone geometry
    Zone(SafeZone),
    /// Authoritative state for the local player (from a full sync)
    LocalCorrection(PlayerState),
    Pong,
    Ack(u64),
}

pub type RoutedBatch = SmallVec<[Routed; 4]>;

/// Demultiplexes inbound frames and owns the remote mirror
#[derive(Debug)]
pub struct MessageRouter {
    own_id: PlayerId,
    mirror: PlayerMirror,
}

impl MessageRouter {
    pub fn new(own_id: impl Into<PlayerId>) -> Self {
        Self {
            own_id: own_id.into(),
            mirror: PlayerMirror::new(),
        }
    }

    pub fn mirror(&self) -> &PlayerMirror {
        &self.mirror
    }

    pub fn own_id(&self) -> &str {
        &self.own_id
    }

    pub fn route(&mut self, message: ServerMessage) -> RoutedBatch {
        let mut out = RoutedBatch::new();

        match message {
            ServerMessage::Sync {
                players,
                safe_zone,
                phase,
            } => {
                // The mirror holds remote players only
                self.mirror
                    .replace_all(players.iter().filter(|p| p.id != self.own_id));
                if let Some(own) = players.iter().find(|p| p.id == self.own_id) {
                    out.push(Routed::LocalCorrection(own.clone()));
                }
                if let Some(zone) = safe_zone {
                    out.push(Routed::Zone(zone));
                }
                if let Some(phase) = phase {
                    out.push(Routed::Phase(PhaseTrigger::Resync(phase)));
                }
                out.push(Routed::Event(SyncEvent::Sync { players }));
            }
            ServerMessage::PlayerUpdate { player_id, state } => {
                if player_id == self.own_id {
                    // Echo of our own update; prediction stays authoritative
                    return out;
                }
                self.mirror.patch(&player_id, &state);
                if let Some(player) = self.mirror.get(&player_id) {
                    out.push(Routed::Event(SyncEvent::PlayerUpdate {
                        player: player.clone(),
                    }));
                }
            }
            ServerMessage::PlayerJoined { state, .. } => {
                if state.id != self.own_id {
                    self.mirror.upsert(state.clone());
                }
                out.push(Routed::Event(SyncEvent::PlayerJoined { player: state }));
            }
            ServerMessage::PlayerLeft { player_id } => {
                self.mirror.remove(&player_id);
                out.push(Routed::Event(SyncEvent::PlayerLeft { player_id }));
            }
            ServerMessage::PlayerEliminated { player_id } => {
                self.mirror.mark_eliminated(&player_id);
                out.push(Routed::Event(SyncEvent::PlayerEliminated { player_id }));
            }
            ServerMessage::PlayerReady { player_id } => {
                self.mirror.mark_ready(&player_id);
                out.push(Routed::Event(SyncEvent::PlayerReady { player_id }));
            }
            ServerMessage::GameState(update) => {
                if update.phase == GamePhase::Countdown {
                    if let Some(start_ms) = update.countdown_start_time {
                        out.push(Routed::Phase(PhaseTrigger::CountdownStart {
                            start_ms,
                            duration_ms: update.countdown_duration.unwrap_or(DEFAULT_COUNTDOWN_MS),
                        }));
                    }
                }
                out.push(Routed::Phase(PhaseTrigger::Resync(update.phase)));
                out.push(Routed::Event(SyncEvent::GameState(update)));
            }
            ServerMessage::Phase { phase } => {
                out.push(Routed::Phase(PhaseTrigger::Resync(phase)));
            }
            ServerMessage::Countdown {
                start_ms,
                duration_ms,
            } => {
                out.push(Routed::Phase(PhaseTrigger::CountdownStart {
                    start_ms,
                    duration_ms,
                }));
            }
            ServerMessage::GameStart => out.push(Routed::Phase(PhaseTrigger::GameStart)),
            ServerMessage::GameEnd { winner_id } => {
                out.push(Routed::Phase(PhaseTrigger::GameEnd { winner_id }));
            }
            ServerMessage::SafeZone(zone) => out.push(Routed::Zone(zone)),
            ServerMessage::Pong => out.push(Routed::Pong),
            ServerMessage::UpdateAck { sequence } => match sequence {
                Some(sequence) => out.push(Routed::Ack(sequence)),
                None => debug!("update_ack without sequence, ignoring"),
            },
            ServerMessage::Error { message } => {
                warn!("Server error: {}", message);
                out.push(Routed::Event(SyncEvent::ServerError { message }));
            }
            ServerMessage::Unknown { kind } => {
                debug!("Unknown message type '{}', dropping", kind);
            }
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::PlayerPatch;

    fn players(n: usize) -> Vec<PlayerState> {
        (0..n).map(|i| PlayerState::new(format!("p{i}"))).collect()
    }

    #[test]
    fn test_sync_replaces_mirror() {
        let mut router = MessageRouter::new("me");
        router.route(ServerMessage::PlayerJoined {
            player_id: "ghost".to_string(),
            state: PlayerState::new("ghost"),
        });

        let out = router.route(ServerMessage::Sync {
            players: players(42),
            safe_zone: None,
            phase: None,
        });
        assert_eq!(router.mirror().len(), 42);
        assert!(router.mirror().get("ghost").is_none());
        assert!(matches!(
            out.as_slice(),
            [Routed::Event(SyncEvent::Sync { players })] if players.len() == 42
        ));
    }

    #[test]
    fn test_sync_carries_local_zone_and_phase() {
        let mut router = MessageRouter::new("p1");
        let zone = SafeZone::new(crate::util::vec2::Vec2::ZERO, 300.0);
        let out = router.route(ServerMessage::Sync {
            players: players(3),
            safe_zone: Some(zone),
            phase: Some(GamePhase::Active),
        });
        assert!(out.iter().any(|r| matches!(r, Routed::LocalCorrection(p) if p.id == "p1")));
        assert!(out.contains(&Routed::Zone(zone)));
        assert!(out.contains(&Routed::Phase(PhaseTrigger::Resync(GamePhase::Active))));
    }

    #[test]
    fn test_own_player_kept_out_of_mirror() {
        let mut router = MessageRouter::new("p1");
        let out = router.route(ServerMessage::Sync {
            players: players(3),
            safe_zone: None,
            phase: None,
        });
        assert_eq!(router.mirror().len(), 2);
        assert!(router.mirror().get("p1").is_none());
        assert!(out.iter().any(|r| matches!(
            r,
            Routed::Event(SyncEvent::Sync { players }) if players.len() == 3
        )));

        let out = router.route(ServerMessage::PlayerJoined {
            player_id: "p1".to_string(),
            state: PlayerState::new("p1"),
        });
        assert_eq!(router.mirror().len(), 2);
        assert!(matches!(
            out.as_slice(),
            [Routed::Event(SyncEvent::PlayerJoined { player })] if player.id == "p1"
        ));
    }

    #[test]
    fn test_own_update_ignored() {
        let mut router = MessageRouter::new("me");
        let out = router.route(ServerMessage::PlayerUpdate {
            player_id: "me".to_string(),
            state: PlayerPatch {
                x: Some(999.0),
                ..Default::default()
            },
        });
        assert!(out.is_empty());
        assert!(router.mirror().get("me").is_none());
    }

    #[test]
    fn test_remote_update_merges() {
        let mut router = MessageRouter::new("me");
        router.route(ServerMessage::Sync {
            players: players(2),
            safe_zone: None,
            phase: None,
        });
        let out = router.route(ServerMessage::PlayerUpdate {
            player_id: "p1".to_string(),
            state: PlayerPatch {
                hp: Some(40.0),
                ..Default::default()
            },
        });
        match out.as_slice() {
            [Routed::Event(SyncEvent::PlayerUpdate { player })] => {
                assert_eq!(player.id, "p1");
                assert_eq!(player.hp, 40.0);
            }
            other => panic!("Unexpected routing: {other:?}"),
        }
    }

    #[test]
    fn test_incremental_events_patch_single_entry() {
        let mut router = MessageRouter::new("me");
        router.route(ServerMessage::Sync {
            players: players(3),
            safe_zone: None,
            phase: None,
        });

        router.route(ServerMessage::PlayerEliminated {
            player_id: "p0".to_string(),
        });
        router.route(ServerMessage::PlayerReady {
            player_id: "p1".to_string(),
        });
        router.route(ServerMessage::PlayerLeft {
            player_id: "p2".to_string(),
        });

        assert_eq!(router.mirror().len(), 2);
        assert!(router.mirror().get("p0").unwrap().eliminated);
        assert!(router.mirror().get("p1").unwrap().ready);
    }

    #[test]
    fn test_game_state_countdown() {
        let mut router = MessageRouter::new("me");
        let out = router.route(ServerMessage::GameState(GameStateUpdate {
            phase: GamePhase::Countdown,
            countdown_start_time: Some(500),
            countdown_duration: None,
            ready_players: 2,
            total_players: 2,
            active_players: None,
        }));
        assert_eq!(
            out[0],
            Routed::Phase(PhaseTrigger::CountdownStart {
                start_ms: 500,
                duration_ms: 15_000
            })
        );
        assert_eq!(out[1], Routed::Phase(PhaseTrigger::Resync(GamePhase::Countdown)));
        assert!(matches!(out[2], Routed::Event(SyncEvent::GameState(_))));
    }

    #[test]
    fn test_unknown_and_bare_ack_dropped() {
        let mut router = MessageRouter::new("me");
        assert!(router
            .route(ServerMessage::Unknown {
                kind: "emote".to_string()
            })
            .is_empty());
        assert!(router.route(ServerMessage::UpdateAck { sequence: None }).is_empty());
        assert_eq!(
            router.route(ServerMessage::UpdateAck { sequence: Some(4) }).as_slice(),
            &[Routed::Ack(4)]
        );
    }
}
