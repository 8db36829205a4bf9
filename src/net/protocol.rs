//! Wire protocol: JSON text frames tagged by a `type` field.
//!
//! Outbound frames are a serde-tagged enum. Inbound frames go through an
//! explicit alias table first, because the server has shipped several
//! spellings of the same event over time (`player:update` / `player_update`,
//! `game:winner` / `game_end`, ...). Every accepted spelling lands on one
//! [`MessageKind`], and each kind decodes into one [`ServerMessage`] variant.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::game::constants::game::DEFAULT_COUNTDOWN_MS;
use crate::game::state::{GamePhase, PlayerId, PlayerPatch, PlayerState, SafeZone};

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Session announcement sent right after the socket opens
    #[serde(rename = "connect", rename_all = "camelCase")]
    Connect { game_id: String, player_id: String },
    /// Ask the server for a full snapshot
    #[serde(rename = "sync_request")]
    SyncRequest,
    /// Batched local player state
    #[serde(rename = "player:update")]
    PlayerUpdate {
        sequence: u64,
        state: PlayerPatch,
        /// Epoch ms when the fragment was queued
        timestamp: u64,
    },
    #[serde(rename = "player:ready")]
    Ready,
    #[serde(rename = "player:eliminated")]
    Eliminated,
    #[serde(rename = "game:winner", rename_all = "camelCase")]
    Winner { winner_id: PlayerId },
    /// Latency ping, answered by `pong`
    #[serde(rename = "ping")]
    Ping,
    /// Liveness signal
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl ClientMessage {
    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Connect { .. } => "connect",
            ClientMessage::SyncRequest => "sync_request",
            ClientMessage::PlayerUpdate { .. } => "player:update",
            ClientMessage::Ready => "player:ready",
            ClientMessage::Eliminated => "player:eliminated",
            ClientMessage::Winner { .. } => "game:winner",
            ClientMessage::Ping => "ping",
            ClientMessage::Heartbeat => "heartbeat",
        }
    }
}

/// Semantic inbound event kind, independent of wire spelling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Sync,
    PlayerUpdate,
    PlayerJoined,
    PlayerLeft,
    PlayerEliminated,
    PlayerReady,
    GameState,
    Phase,
    Countdown,
    GameStart,
    GameEnd,
    SafeZone,
    Pong,
    UpdateAck,
    Error,
}

/// Every accepted inbound `type` spelling
pub const MESSAGE_ALIASES: &[(&str, MessageKind)] = &[
    ("sync", MessageKind::Sync),
    ("full_sync", MessageKind::Sync),
    ("player:update", MessageKind::PlayerUpdate),
    ("player_update", MessageKind::PlayerUpdate),
    ("player:joined", MessageKind::PlayerJoined),
    ("player_joined", MessageKind::PlayerJoined),
    ("player:connected", MessageKind::PlayerJoined),
    ("player:left", MessageKind::PlayerLeft),
    ("player_left", MessageKind::PlayerLeft),
    ("player:disconnected", MessageKind::PlayerLeft),
    ("player_disconnected", MessageKind::PlayerLeft),
    ("player:eliminated", MessageKind::PlayerEliminated),
    ("player_eliminated", MessageKind::PlayerEliminated),
    ("player:ready", MessageKind::PlayerReady),
    ("player_ready", MessageKind::PlayerReady),
    ("game_state_update", MessageKind::GameState),
    ("game:state", MessageKind::GameState),
    ("game:phase", MessageKind::Phase),
    ("phase_change", MessageKind::Phase),
    ("game:countdown", MessageKind::Countdown),
    ("countdown_start", MessageKind::Countdown),
    ("game:start", MessageKind::GameStart),
    ("game_start", MessageKind::GameStart),
    ("game:end", MessageKind::GameEnd),
    ("game:winner", MessageKind::GameEnd),
    ("game_end", MessageKind::GameEnd),
    ("safezone:update", MessageKind::SafeZone),
    ("safezone_update", MessageKind::SafeZone),
    ("safe_zone", MessageKind::SafeZone),
    ("pong", MessageKind::Pong),
    ("update_ack", MessageKind::UpdateAck),
    ("error", MessageKind::Error),
];

impl MessageKind {
    /// Resolve a wire `type` through the alias table
    pub fn from_wire(tag: &str) -> Option<Self> {
        MESSAGE_ALIASES
            .iter()
            .find(|(name, _)| *name == tag)
            .map(|(_, kind)| *kind)
    }
}

/// Aggregate lobby/round summary (`game:state`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateUpdate {
    pub phase: GamePhase,
    #[serde(default)]
    pub countdown_start_time: Option<u64>,
    #[serde(default)]
    pub countdown_duration: Option<u64>,
    #[serde(default)]
    pub ready_players: u32,
    #[serde(default)]
    pub total_players: u32,
    #[serde(default)]
    pub active_players: Option<u32>,
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    /// Authoritative snapshot of every player
    Sync {
        players: Vec<PlayerState>,
        safe_zone: Option<SafeZone>,
        phase: Option<GamePhase>,
    },
    PlayerUpdate { player_id: PlayerId, state: PlayerPatch },
    PlayerJoined { player_id: PlayerId, state: PlayerState },
    PlayerLeft { player_id: PlayerId },
    PlayerEliminated { player_id: PlayerId },
    PlayerReady { player_id: PlayerId },
    GameState(GameStateUpdate),
    Phase { phase: GamePhase },
    Countdown { start_ms: u64, duration_ms: u64 },
    GameStart,
    GameEnd { winner_id: Option<PlayerId> },
    SafeZone(SafeZone),
    Pong,
    UpdateAck { sequence: Option<u64> },
    Error { message: String },
    /// Type not in the alias table; kept for logging only
    Unknown { kind: String },
}

// Raw frame shapes. Alternative field spellings are separate optional
// fields (not serde aliases) so a frame carrying both does not fail with a
// duplicate-field error; the first present spelling wins.

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SyncFrame {
    #[serde(default)]
    players: Option<Vec<PlayerState>>,
    #[serde(default)]
    safe_zone: Option<SafeZone>,
    #[serde(default)]
    phase: Option<GamePhase>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerFrame {
    #[serde(default)]
    player_id: Option<PlayerId>,
    #[serde(default)]
    id: Option<PlayerId>,
    #[serde(default)]
    state: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

impl PlayerFrame {
    fn player_id(&mut self, kind: &'static str) -> Result<PlayerId, DecodeError> {
        self.player_id
            .take()
            .or_else(|| self.id.take())
            .ok_or(DecodeError::MissingPlayerId(kind))
    }

    fn payload(&mut self) -> Option<Value> {
        self.state
            .take()
            .filter(|v| !v.is_null())
            .or_else(|| self.data.take().filter(|v| !v.is_null()))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameStateFrame {
    #[serde(default)]
    game_state: Option<GameStateUpdate>,
    #[serde(default)]
    state: Option<GameStateUpdate>,
}

#[derive(Deserialize)]
struct PhaseFrame {
    phase: GamePhase,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CountdownFrame {
    #[serde(default)]
    start_time: Option<u64>,
    #[serde(default)]
    countdown_start_time: Option<u64>,
    #[serde(default)]
    duration: Option<u64>,
    #[serde(default)]
    countdown_duration: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GameEndFrame {
    #[serde(default)]
    winner_id: Option<PlayerId>,
    #[serde(default)]
    winner: Option<PlayerId>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SafeZoneFrame {
    #[serde(default)]
    safe_zone: Option<SafeZone>,
    #[serde(default)]
    zone: Option<SafeZone>,
}

#[derive(Deserialize)]
struct AckFrame {
    #[serde(default)]
    sequence: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorFrame {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Encode an outbound message as a JSON text frame
pub fn encode(message: &ClientMessage) -> Result<String, EncodeError> {
    serde_json::to_string(message).map_err(EncodeError)
}

/// Decode an inbound JSON text frame.
///
/// Unknown `type`s decode to [`ServerMessage::Unknown`] rather than failing;
/// only malformed JSON or a recognised frame with an unusable payload is an
/// error.
pub fn decode(text: &str) -> Result<ServerMessage, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    let tag = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(DecodeError::MissingType)?
        .to_string();

    let Some(kind) = MessageKind::from_wire(&tag) else {
        return Ok(ServerMessage::Unknown { kind: tag });
    };

    let message = match kind {
        MessageKind::Sync => {
            let frame: SyncFrame = serde_json::from_value(value)?;
            ServerMessage::Sync {
                players: frame.players.unwrap_or_default(),
                safe_zone: frame.safe_zone,
                phase: frame.phase,
            }
        }
        MessageKind::PlayerUpdate => {
            let mut frame: PlayerFrame = serde_json::from_value(value)?;
            let player_id = frame.player_id("player:update")?;
            let state = match frame.payload() {
                Some(payload) => serde_json::from_value(payload)?,
                None => PlayerPatch::default(),
            };
            ServerMessage::PlayerUpdate { player_id, state }
        }
        MessageKind::PlayerJoined => {
            let mut frame: PlayerFrame = serde_json::from_value(value)?;
            let player_id = frame.player_id("player:joined")?;
            let mut state: PlayerState = match frame.payload() {
                Some(payload) => serde_json::from_value(payload)?,
                None => PlayerState::default(),
            };
            if state.id.is_empty() {
                state.id = player_id.clone();
            }
            ServerMessage::PlayerJoined { player_id, state }
        }
        MessageKind::PlayerLeft => {
            let mut frame: PlayerFrame = serde_json::from_value(value)?;
            ServerMessage::PlayerLeft {
                player_id: frame.player_id("player:left")?,
            }
        }
        MessageKind::PlayerEliminated => {
            let mut frame: PlayerFrame = serde_json::from_value(value)?;
            ServerMessage::PlayerEliminated {
                player_id: frame.player_id("player:eliminated")?,
            }
        }
        MessageKind::PlayerReady => {
            let mut frame: PlayerFrame = serde_json::from_value(value)?;
            ServerMessage::PlayerReady {
                player_id: frame.player_id("player:ready")?,
            }
        }
        MessageKind::GameState => {
            let frame: GameStateFrame = serde_json::from_value(value)?;
            let state = frame
                .game_state
                .or(frame.state)
                .ok_or(DecodeError::MissingPayload("game:state"))?;
            ServerMessage::GameState(state)
        }
        MessageKind::Phase => {
            let frame: PhaseFrame = serde_json::from_value(value)?;
            ServerMessage::Phase { phase: frame.phase }
        }
        MessageKind::Countdown => {
            let frame: CountdownFrame = serde_json::from_value(value)?;
            ServerMessage::Countdown {
                start_ms: frame
                    .start_time
                    .or(frame.countdown_start_time)
                    .ok_or(DecodeError::MissingPayload("countdown_start"))?,
                duration_ms: frame
                    .duration
                    .or(frame.countdown_duration)
                    .unwrap_or(DEFAULT_COUNTDOWN_MS),
            }
        }
        MessageKind::GameStart => ServerMessage::GameStart,
        MessageKind::GameEnd => {
            let frame: GameEndFrame = serde_json::from_value(value)?;
            ServerMessage::GameEnd {
                winner_id: frame.winner_id.or(frame.winner),
            }
        }
        MessageKind::SafeZone => {
            let frame: SafeZoneFrame = serde_json::from_value(value)?;
            let zone = frame
                .safe_zone
                .or(frame.zone)
                .ok_or(DecodeError::MissingPayload("safezone:update"))?;
            ServerMessage::SafeZone(zone)
        }
        MessageKind::Pong => ServerMessage::Pong,
        MessageKind::UpdateAck => {
            let frame: AckFrame = serde_json::from_value(value)?;
            ServerMessage::UpdateAck {
                sequence: frame.sequence,
            }
        }
        MessageKind::Error => {
            let frame: ErrorFrame = serde_json::from_value(value)?;
            ServerMessage::Error {
                message: frame
                    .message
                    .or(frame.error)
                    .unwrap_or_else(|| "Unknown error".to_string()),
            }
        }
    };

    Ok(message)
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(serde_json::Error);

/// Inbound frame could not be turned into a [`ServerMessage`]
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Frame has no string `type` field")]
    MissingType,
    #[error("`{0}` frame is missing a player id")]
    MissingPlayerId(&'static str),
    #[error("`{0}` frame is missing its payload")]
    MissingPayload(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_message_wire_format() {
        let msg = ClientMessage::PlayerUpdate {
            sequence: 7,
            state: PlayerPatch {
                x: Some(1.0),
                ..Default::default()
            },
            timestamp: 1_700_000_000_000,
        };
        let value: Value = serde_json::from_str(&encode(&msg).unwrap()).unwrap();
        assert_eq!(value["type"], "player:update");
        assert_eq!(value["sequence"], 7);
        assert_eq!(value["state"]["x"], 1.0);
        assert_eq!(value["timestamp"], 1_700_000_000_000u64);

        let value: Value = serde_json::from_str(&encode(&ClientMessage::SyncRequest).unwrap()).unwrap();
        assert_eq!(value, json!({"type": "sync_request"}));

        let connect = ClientMessage::Connect {
            game_id: "g1".to_string(),
            player_id: "p1".to_string(),
        };
        let value: Value = serde_json::from_str(&encode(&connect).unwrap()).unwrap();
        assert_eq!(value, json!({"type": "connect", "gameId": "g1", "playerId": "p1"}));

        let winner = ClientMessage::Winner {
            winner_id: "p9".to_string(),
        };
        let value: Value = serde_json::from_str(&encode(&winner).unwrap()).unwrap();
        assert_eq!(value, json!({"type": "game:winner", "winnerId": "p9"}));
    }

    #[test]
    fn test_alias_table_has_no_duplicates() {
        for (i, (name, _)) in MESSAGE_ALIASES.iter().enumerate() {
            assert!(
                MESSAGE_ALIASES[i + 1..].iter().all(|(other, _)| other != name),
                "duplicate alias {name}"
            );
        }
    }

    #[test]
    fn test_aliases_decode_to_same_message() {
        let a = decode(r#"{"type":"player:update","playerId":"p2","state":{"x":3}}"#).unwrap();
        let b = decode(r#"{"type":"player_update","id":"p2","data":{"x":3}}"#).unwrap();
        assert_eq!(a, b);

        let end_frames = [
            r#"{"type":"game:end","winnerId":"w"}"#,
            r#"{"type":"game:winner","winnerId":"w"}"#,
            r#"{"type":"game_end","winner":"w"}"#,
        ];
        for frame in end_frames {
            assert_eq!(
                decode(frame).unwrap(),
                ServerMessage::GameEnd {
                    winner_id: Some("w".to_string())
                }
            );
        }
    }

    #[test]
    fn test_decode_sync() {
        let frame = json!({
            "type": "full_sync",
            "players": [{"id": "a", "x": 1, "y": 2}, {"id": "b"}],
            "safeZone": {"centerX": 0, "centerY": 0, "radius": 500, "targetRadius": 300, "shrinking": true},
            "phase": "active"
        });
        match decode(&frame.to_string()).unwrap() {
            ServerMessage::Sync { players, safe_zone, phase } => {
                assert_eq!(players.len(), 2);
                assert_eq!(players[0].id, "a");
                assert_eq!(safe_zone.unwrap().target_radius, 300.0);
                assert_eq!(phase, Some(GamePhase::Active));
            }
            other => panic!("Wrong message type: {other:?}"),
        }

        // Sync without players is an empty snapshot
        assert_eq!(
            decode(r#"{"type":"sync"}"#).unwrap(),
            ServerMessage::Sync {
                players: vec![],
                safe_zone: None,
                phase: None
            }
        );
    }

    #[test]
    fn test_decode_countdown_defaults() {
        let msg = decode(r#"{"type":"countdown_start","countdownStartTime":1000}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Countdown {
                start_ms: 1000,
                duration_ms: DEFAULT_COUNTDOWN_MS
            }
        );

        let msg = decode(r#"{"type":"game:countdown","startTime":5,"duration":3000}"#).unwrap();
        assert_eq!(
            msg,
            ServerMessage::Countdown {
                start_ms: 5,
                duration_ms: 3000
            }
        );
    }

    #[test]
    fn test_decode_game_state() {
        let msg = decode(
            r#"{"type":"game:state","gameState":{"phase":"countdown","countdownStartTime":10,"readyPlayers":3,"totalPlayers":4}}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::GameState(state) => {
                assert_eq!(state.phase, GamePhase::Countdown);
                assert_eq!(state.countdown_start_time, Some(10));
                assert_eq!(state.ready_players, 3);
                assert_eq!(state.active_players, None);
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_decode_joined_fills_id() {
        let msg = decode(r#"{"type":"player:joined","playerId":"n1"}"#).unwrap();
        match msg {
            ServerMessage::PlayerJoined { player_id, state } => {
                assert_eq!(player_id, "n1");
                assert_eq!(state.id, "n1");
            }
            other => panic!("Wrong message type: {other:?}"),
        }
    }

    #[test]
    fn test_decode_error_and_ack() {
        assert_eq!(
            decode(r#"{"type":"error","error":"room full"}"#).unwrap(),
            ServerMessage::Error {
                message: "room full".to_string()
            }
        );
        assert_eq!(
            decode(r#"{"type":"error"}"#).unwrap(),
            ServerMessage::Error {
                message: "Unknown error".to_string()
            }
        );
        assert_eq!(
            decode(r#"{"type":"update_ack","sequence":12}"#).unwrap(),
            ServerMessage::UpdateAck { sequence: Some(12) }
        );
    }

    #[test]
    fn test_unknown_type_is_not_an_error() {
        assert_eq!(
            decode(r#"{"type":"chat:message","text":"hi"}"#).unwrap(),
            ServerMessage::Unknown {
                kind: "chat:message".to_string()
            }
        );
    }

    #[test]
    fn test_invalid_decode() {
        assert!(matches!(decode("not json"), Err(DecodeError::Json(_))));
        assert!(matches!(decode(r#"{"no":"type"}"#), Err(DecodeError::MissingType)));
        assert!(matches!(
            decode(r#"{"type":"player:left"}"#),
            Err(DecodeError::MissingPlayerId(_))
        ));
        assert!(matches!(
            decode(r#"{"type":"game:phase","phase":"intermission"}"#),
            Err(DecodeError::Json(_))
        ));
    }
}
