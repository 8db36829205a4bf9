//! Safe-zone rules
//!
//! Damage outside the zone, elimination latch, and acceptance of
//! server-pushed zone geometry.

use crate::game::state::{GamePhase, LocalPlayer, SafeZone};

/// Result of one damage evaluation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ZoneEvent {
    /// Player is outside the zone and lost hp
    Damaged { hp_lost: f32, hp: f32 },
    /// Player reached 0 hp this tick (fires once)
    Eliminated,
}

/// Outcome of accepting a zone push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneUpdate {
    Applied,
    /// Radius grew while shrinking; previous radius kept
    RadiusClamped,
    /// NaN or negative geometry; push dropped
    Rejected,
}

/// Evaluate the per-tick damage rule for the local player.
///
/// Only runs while the round is active. Distance is measured from the zone
/// center; damage is `damage_per_second * dt` and hp never drops below 0.
pub fn apply_zone_damage(
    phase: GamePhase,
    zone: Option<&SafeZone>,
    local: &mut LocalPlayer,
    damage_per_second: f32,
    dt: f32,
) -> Option<ZoneEvent> {
    if phase != GamePhase::Active || local.is_eliminated() {
        return None;
    }
    let zone = zone?;
    if dt <= 0.0 || !dt.is_finite() {
        return None;
    }

    let position = local.state.position();
    let distance = position.distance_to(zone.center());
    if distance <= zone.radius {
        return None;
    }

    let before = local.state.hp;
    let hp = (before - damage_per_second * dt).max(0.0);
    local.state.hp = hp;

    if hp <= 0.0 {
        // eliminate() is the latch: a second call is a no-op
        return local.eliminate().then_some(ZoneEvent::Eliminated);
    }

    Some(ZoneEvent::Damaged {
        hp_lost: before - hp,
        hp,
    })
}

/// Accept a server zone push, keeping the radius non-increasing while the
/// zone reports itself as shrinking.
pub fn accept_zone(current: &mut Option<SafeZone>, incoming: SafeZone) -> ZoneUpdate {
    if !incoming.is_valid() {
        return ZoneUpdate::Rejected;
    }

    if let Some(existing) = current.as_mut() {
        if existing.shrinking && incoming.shrinking && incoming.radius > existing.radius {
            *existing = SafeZone {
                radius: existing.radius,
                ..incoming
            };
            return ZoneUpdate::RadiusClamped;
        }
    }

    *current = Some(incoming);
    ZoneUpdate::Applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec2::Vec2;

    fn local_at(x: f32, y: f32) -> LocalPlayer {
        let mut local = LocalPlayer::new("me");
        local.state.x = x;
        local.state.y = y;
        local
    }

    #[test]
    fn test_damage_outside_zone() {
        let zone = SafeZone::new(Vec2::ZERO, 100.0);
        let mut local = local_at(150.0, 0.0);

        let event = apply_zone_damage(GamePhase::Active, Some(&zone), &mut local, 5.0, 2.0);

        assert_eq!(event, Some(ZoneEvent::Damaged { hp_lost: 10.0, hp: 90.0 }));
        assert_eq!(local.state.hp, 90.0);
    }

    #[test]
    fn test_no_damage_inside_zone() {
        let zone = SafeZone::new(Vec2::new(10.0, 10.0), 100.0);
        let mut local = local_at(50.0, 50.0);

        assert!(apply_zone_damage(GamePhase::Active, Some(&zone), &mut local, 5.0, 1.0).is_none());
        assert_eq!(local.state.hp, 100.0);
    }

    #[test]
    fn test_no_damage_outside_active_phase() {
        let zone = SafeZone::new(Vec2::ZERO, 10.0);
        for phase in [GamePhase::Waiting, GamePhase::Countdown, GamePhase::Ended] {
            let mut local = local_at(500.0, 0.0);
            assert!(apply_zone_damage(phase, Some(&zone), &mut local, 5.0, 1.0).is_none());
            assert_eq!(local.state.hp, 100.0);
        }
    }

    #[test]
    fn test_no_zone_no_damage() {
        let mut local = local_at(500.0, 0.0);
        assert!(apply_zone_damage(GamePhase::Active, None, &mut local, 5.0, 1.0).is_none());
    }

    #[test]
    fn test_elimination_fires_once() {
        let zone = SafeZone::new(Vec2::ZERO, 100.0);
        let mut local = local_at(150.0, 0.0);
        local.state.hp = 3.0;

        let first = apply_zone_damage(GamePhase::Active, Some(&zone), &mut local, 5.0, 1.0);
        assert_eq!(first, Some(ZoneEvent::Eliminated));
        assert_eq!(local.state.hp, 0.0);

        let second = apply_zone_damage(GamePhase::Active, Some(&zone), &mut local, 5.0, 1.0);
        assert!(second.is_none());
        assert_eq!(local.state.hp, 0.0);
    }

    #[test]
    fn test_hp_bounded_at_zero() {
        let zone = SafeZone::new(Vec2::ZERO, 1.0);
        let mut local = local_at(150.0, 0.0);
        apply_zone_damage(GamePhase::Active, Some(&zone), &mut local, 1_000.0, 10.0);
        assert_eq!(local.state.hp, 0.0);
    }

    #[test]
    fn test_accept_zone_clamps_growth_while_shrinking() {
        let mut current = None;
        let mut zone = SafeZone::new(Vec2::ZERO, 500.0);
        zone.shrinking = true;
        zone.target_radius = 200.0;
        assert_eq!(accept_zone(&mut current, zone), ZoneUpdate::Applied);

        let mut grown = zone;
        grown.radius = 600.0;
        assert_eq!(accept_zone(&mut current, grown), ZoneUpdate::RadiusClamped);
        assert_eq!(current.unwrap().radius, 500.0);

        let mut shrunk = zone;
        shrunk.radius = 450.0;
        assert_eq!(accept_zone(&mut current, shrunk), ZoneUpdate::Applied);
        assert_eq!(current.unwrap().radius, 450.0);

        // A new shrink cycle (not shrinking) may reset the radius
        let reset = SafeZone::new(Vec2::ZERO, 700.0);
        assert_eq!(accept_zone(&mut current, reset), ZoneUpdate::Applied);
    }

    #[test]
    fn test_accept_zone_rejects_invalid() {
        let mut current = None;
        let zone = SafeZone::new(Vec2::new(f32::NAN, 0.0), 100.0);
        assert_eq!(accept_zone(&mut current, zone), ZoneUpdate::Rejected);
        assert!(current.is_none());
    }
}
