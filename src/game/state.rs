//! Client-side game state: player mirrors, the local player copy and the
//! server-pushed safe zone.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::game::constants::game::{PLAYER_RADIUS, STARTING_HP};
use crate::util::vec2::Vec2;

/// Server-assigned player identifier (wallet address or uuid string)
pub type PlayerId = String;

/// Round phase. Ordering follows the only legal direction of travel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GamePhase {
    /// Lobby, players readying up
    Waiting,
    /// Countdown before the round starts
    Countdown,
    /// Round in progress
    Active,
    /// Round over, winner decided
    Ended,
}

impl Default for GamePhase {
    fn default() -> Self {
        Self::Waiting
    }
}

impl GamePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Waiting => "waiting",
            GamePhase::Countdown => "countdown",
            GamePhase::Active => "active",
            GamePhase::Ended => "ended",
        }
    }
}

impl std::fmt::Display for GamePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full player state as carried by `sync` and `player:joined` frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlayerState {
    pub id: PlayerId,
    pub x: f32,
    pub y: f32,
    #[serde(alias = "vx")]
    pub velocity_x: f32,
    #[serde(alias = "vy")]
    pub velocity_y: f32,
    pub rotation: f32,
    pub hp: f32,
    pub max_hp: f32,
    #[serde(alias = "isAlive")]
    pub alive: bool,
    pub eliminated: bool,
    pub ready: bool,
    pub radius: f32,
    #[serde(alias = "username", skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub has_shield: bool,
    pub has_speed: bool,
    pub score: u32,
    pub kills: u32,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            id: PlayerId::new(),
            x: 0.0,
            y: 0.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
            rotation: 0.0,
            hp: STARTING_HP,
            max_hp: STARTING_HP,
            alive: true,
            eliminated: false,
            ready: false,
            radius: PLAYER_RADIUS,
            name: None,
            color: None,
            has_shield: false,
            has_speed: false,
            score: 0,
            kills: 0,
        }
    }
}

impl PlayerState {
    pub fn new(id: impl Into<PlayerId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    #[inline]
    pub fn velocity(&self) -> Vec2 {
        Vec2::new(self.velocity_x, self.velocity_y)
    }

    /// Merge a partial update into this state (latest wins per field)
    pub fn apply_patch(&mut self, patch: &PlayerPatch) {
        if let Some(x) = patch.x {
            self.x = x;
        }
        if let Some(y) = patch.y {
            self.y = y;
        }
        if let Some(vx) = patch.velocity_x {
            self.velocity_x = vx;
        }
        if let Some(vy) = patch.velocity_y {
            self.velocity_y = vy;
        }
        if let Some(rotation) = patch.rotation {
            self.rotation = rotation;
        }
        if let Some(hp) = patch.hp {
            self.hp = hp;
        }
        if let Some(max_hp) = patch.max_hp {
            self.max_hp = max_hp;
        }
        if let Some(alive) = patch.alive {
            self.alive = alive;
        }
        if let Some(eliminated) = patch.eliminated {
            self.eliminated = eliminated;
            if eliminated {
                self.alive = false;
            }
        }
        if let Some(radius) = patch.radius {
            self.radius = radius;
        }
    }
}

/// Partial player state: outbound `player:update` payload and inbound
/// incremental patch. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, alias = "vx", skip_serializing_if = "Option::is_none")]
    pub velocity_x: Option<f32>,
    #[serde(default, alias = "vy", skip_serializing_if = "Option::is_none")]
    pub velocity_y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<f32>,
    #[serde(default, alias = "isAlive", skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eliminated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_in_safe_zone: Option<bool>,
}

impl PlayerPatch {
    /// Movement fragment (position + velocity + facing)
    pub fn movement(position: Vec2, velocity: Vec2, rotation: f32) -> Self {
        Self {
            x: Some(position.x),
            y: Some(position.y),
            velocity_x: Some(velocity.x),
            velocity_y: Some(velocity.y),
            rotation: Some(rotation),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Server-defined circular safe region
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SafeZone {
    #[serde(alias = "x")]
    pub center_x: f32,
    #[serde(alias = "y")]
    pub center_y: f32,
    pub radius: f32,
    #[serde(default)]
    pub target_radius: f32,
    #[serde(default)]
    pub shrinking: bool,
    /// Epoch ms of the next scheduled shrink, if announced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_shrink_at: Option<u64>,
}

impl SafeZone {
    pub fn new(center: Vec2, radius: f32) -> Self {
        Self {
            center_x: center.x,
            center_y: center.y,
            radius,
            target_radius: radius,
            shrinking: false,
            next_shrink_at: None,
        }
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.center_x, self.center_y)
    }

    /// Position is inside (or exactly on) the zone boundary
    pub fn contains(&self, position: Vec2) -> bool {
        position.distance_to(self.center()) <= self.radius
    }

    /// Geometry is usable (no NaN, non-negative radius)
    pub fn is_valid(&self) -> bool {
        self.center().is_finite() && self.radius.is_finite() && self.radius >= 0.0
    }
}

/// Mirror of remote players, keyed by id
#[derive(Debug, Clone, Default)]
pub struct PlayerMirror {
    players: HashMap<PlayerId, PlayerState>,
}

impl PlayerMirror {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entire mirror with an authoritative snapshot
    pub fn replace_all<'a>(&mut self, players: impl IntoIterator<Item = &'a PlayerState>) {
        self.players.clear();
        for player in players {
            self.players.insert(player.id.clone(), player.clone());
        }
    }

    /// Insert or overwrite one player
    pub fn upsert(&mut self, player: PlayerState) {
        self.players.insert(player.id.clone(), player);
    }

    /// Apply a partial update to one player, creating the entry if unseen
    pub fn patch(&mut self, id: &str, patch: &PlayerPatch) {
        self.players
            .entry_ref(id)
            .or_insert_with(|| PlayerState::new(id))
            .apply_patch(patch);
    }

    pub fn remove(&mut self, id: &str) -> Option<PlayerState> {
        self.players.remove(id)
    }

    pub fn mark_eliminated(&mut self, id: &str) {
        if let Some(player) = self.players.get_mut(id) {
            player.eliminated = true;
            player.alive = false;
        }
    }

    pub fn mark_ready(&mut self, id: &str) {
        if let Some(player) = self.players.get_mut(id) {
            player.ready = true;
        }
    }

    pub fn get(&self, id: &str) -> Option<&PlayerState> {
        self.players.get(id)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    /// Players not yet eliminated
    pub fn active_count(&self) -> usize {
        self.players.values().filter(|p| !p.eliminated).count()
    }

    pub fn ready_count(&self) -> usize {
        self.players.values().filter(|p| p.ready).count()
    }
}

/// The owning player's locally simulated copy
#[derive(Debug, Clone)]
pub struct LocalPlayer {
    pub state: PlayerState,
    /// Elimination already announced; guards against repeat emission
    eliminated: bool,
}

impl LocalPlayer {
    pub fn new(id: impl Into<PlayerId>) -> Self {
        Self {
            state: PlayerState::new(id),
            eliminated: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.state.id
    }

    pub fn is_eliminated(&self) -> bool {
        self.eliminated
    }

    /// Mark eliminated. Returns false when it already was (no-op).
    pub fn eliminate(&mut self) -> bool {
        if self.eliminated {
            return false;
        }
        self.eliminated = true;
        self.state.hp = 0.0;
        self.state.alive = false;
        self.state.eliminated = true;
        true
    }

    /// Local prediction: merge an outbound fragment into the own copy
    pub fn predict(&mut self, patch: &PlayerPatch) {
        if self.eliminated {
            return;
        }
        self.state.apply_patch(patch);
    }

    /// Take authoritative state from a full sync, keeping the elimination latch
    pub fn correct_from(&mut self, authoritative: &PlayerState) {
        let eliminated = self.eliminated || authoritative.eliminated;
        self.state = authoritative.clone();
        if eliminated {
            self.eliminated = true;
            self.state.hp = 0.0;
            self.state.alive = false;
            self.state.eliminated = true;
        }
    }
}
