//! Round phase state machine
//!
//! waiting → countdown → active → ended, forward only. Server events drive
//! single-step transitions; a resync (`game:phase`, or the phase carried by a
//! full sync) may jump forward but never backward.

use crate::game::state::{GamePhase, PlayerId};

/// Something that may move the phase
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseTrigger {
    /// Server `countdown_start` (epoch ms + duration ms)
    CountdownStart { start_ms: u64, duration_ms: u64 },
    /// Server `game_start`
    GameStart,
    /// Server `game:end` / `game:winner`
    GameEnd { winner_id: Option<PlayerId> },
    /// Phase reported by a resync frame
    Resync(GamePhase),
}

/// Outcome of applying a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTransition {
    /// Phase moved forward
    Advanced { from: GamePhase, to: GamePhase },
    /// Duplicate or same-phase trigger; nothing changed
    Unchanged,
    /// Trigger reports an earlier phase than already observed
    Stale { current: GamePhase, reported: GamePhase },
    /// Trigger is not a legal edge from the current phase
    Invalid { current: GamePhase },
}

/// Countdown window announced by the server. Local evaluation is advisory
/// (UI only); it never changes the phase by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub start_ms: u64,
    pub duration_ms: u64,
}

impl Countdown {
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        let elapsed = now_ms.saturating_sub(self.start_ms);
        self.duration_ms.saturating_sub(elapsed)
    }

    /// Whole seconds left, rounded up (what a countdown display shows)
    pub fn seconds_left(&self, now_ms: u64) -> u64 {
        self.remaining_ms(now_ms).div_ceil(1000)
    }

    pub fn is_finished(&self, now_ms: u64) -> bool {
        self.remaining_ms(now_ms) == 0
    }
}

/// Forward-only phase tracker
#[derive(Debug, Clone, Default)]
pub struct PhaseMachine {
    phase: GamePhase,
    countdown: Option<Countdown>,
    winner_id: Option<PlayerId>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn countdown(&self) -> Option<Countdown> {
        self.countdown
    }

    pub fn winner_id(&self) -> Option<&str> {
        self.winner_id.as_deref()
    }

    /// Gameplay updates may still be transmitted
    pub fn accepts_gameplay_updates(&self) -> bool {
        self.phase != GamePhase::Ended
    }

    pub fn is_active(&self) -> bool {
        self.phase == GamePhase::Active
    }

    /// Apply a trigger and report what happened
    pub fn apply(&mut self, trigger: PhaseTrigger) -> PhaseTransition {
        let current = self.phase;
        match trigger {
            PhaseTrigger::CountdownStart { start_ms, duration_ms } => match current {
                GamePhase::Waiting => {
                    self.countdown = Some(Countdown { start_ms, duration_ms });
                    self.advance(GamePhase::Countdown)
                }
                GamePhase::Countdown => {
                    // Server restarted the countdown
                    self.countdown = Some(Countdown { start_ms, duration_ms });
                    PhaseTransition::Unchanged
                }
                _ => PhaseTransition::Stale {
                    current,
                    reported: GamePhase::Countdown,
                },
            },
            PhaseTrigger::GameStart => match current {
                GamePhase::Countdown => self.advance(GamePhase::Active),
                GamePhase::Active => PhaseTransition::Unchanged,
                GamePhase::Ended => PhaseTransition::Stale {
                    current,
                    reported: GamePhase::Active,
                },
                GamePhase::Waiting => PhaseTransition::Invalid { current },
            },
            PhaseTrigger::GameEnd { winner_id } => match current {
                GamePhase::Active => {
                    self.winner_id = winner_id;
                    self.advance(GamePhase::Ended)
                }
                GamePhase::Ended => PhaseTransition::Unchanged,
                _ => PhaseTransition::Invalid { current },
            },
            PhaseTrigger::Resync(reported) => {
                if reported > current {
                    self.advance(reported)
                } else if reported == current {
                    PhaseTransition::Unchanged
                } else {
                    PhaseTransition::Stale { current, reported }
                }
            }
        }
    }

    fn advance(&mut self, to: GamePhase) -> PhaseTransition {
        let from = self.phase;
        self.phase = to;
        if to != GamePhase::Countdown {
            self.countdown = None;
        }
        PhaseTransition::Advanced { from, to }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine_in(phase: GamePhase) -> PhaseMachine {
        let mut machine = PhaseMachine::new();
        machine.apply(PhaseTrigger::Resync(phase));
        machine
    }

    #[test]
    fn test_full_round() {
        let mut machine = PhaseMachine::new();
        assert_eq!(machine.phase(), GamePhase::Waiting);

        let t = machine.apply(PhaseTrigger::CountdownStart {
            start_ms: 1_000,
            duration_ms: 15_000,
        });
        assert_eq!(
            t,
            PhaseTransition::Advanced {
                from: GamePhase::Waiting,
                to: GamePhase::Countdown
            }
        );
        assert!(machine.countdown().is_some());

        let t = machine.apply(PhaseTrigger::GameStart);
        assert_eq!(
            t,
            PhaseTransition::Advanced {
                from: GamePhase::Countdown,
                to: GamePhase::Active
            }
        );
        assert!(machine.countdown().is_none());

        let t = machine.apply(PhaseTrigger::GameEnd {
            winner_id: Some("p7".to_string()),
        });
        assert!(matches!(t, PhaseTransition::Advanced { to: GamePhase::Ended, .. }));
        assert_eq!(machine.winner_id(), Some("p7"));
        assert!(!machine.accepts_gameplay_updates());
    }

    #[test]
    fn test_ended_never_regresses() {
        let mut machine = machine_in(GamePhase::Ended);

        for phase in [GamePhase::Waiting, GamePhase::Countdown, GamePhase::Active] {
            let t = machine.apply(PhaseTrigger::Resync(phase));
            assert_eq!(
                t,
                PhaseTransition::Stale {
                    current: GamePhase::Ended,
                    reported: phase
                }
            );
        }
        assert_eq!(machine.apply(PhaseTrigger::GameStart), PhaseTransition::Stale {
            current: GamePhase::Ended,
            reported: GamePhase::Active,
        });
        assert_eq!(machine.phase(), GamePhase::Ended);
    }

    #[test]
    fn test_duplicate_end_is_unchanged() {
        let mut machine = machine_in(GamePhase::Active);
        machine.apply(PhaseTrigger::GameEnd {
            winner_id: Some("a".to_string()),
        });
        let t = machine.apply(PhaseTrigger::GameEnd {
            winner_id: Some("b".to_string()),
        });
        assert_eq!(t, PhaseTransition::Unchanged);
        assert_eq!(machine.winner_id(), Some("a"));
    }

    #[test]
    fn test_illegal_edges() {
        let mut machine = PhaseMachine::new();
        assert_eq!(
            machine.apply(PhaseTrigger::GameStart),
            PhaseTransition::Invalid {
                current: GamePhase::Waiting
            }
        );
        assert_eq!(
            machine.apply(PhaseTrigger::GameEnd { winner_id: None }),
            PhaseTransition::Invalid {
                current: GamePhase::Waiting
            }
        );
        assert_eq!(machine.phase(), GamePhase::Waiting);
    }

    #[test]
    fn test_resync_jumps_forward() {
        let mut machine = PhaseMachine::new();
        let t = machine.apply(PhaseTrigger::Resync(GamePhase::Active));
        assert_eq!(
            t,
            PhaseTransition::Advanced {
                from: GamePhase::Waiting,
                to: GamePhase::Active
            }
        );
        assert_eq!(
            machine.apply(PhaseTrigger::Resync(GamePhase::Active)),
            PhaseTransition::Unchanged
        );
    }

    #[test]
    fn test_countdown_restart() {
        let mut machine = PhaseMachine::new();
        machine.apply(PhaseTrigger::CountdownStart {
            start_ms: 0,
            duration_ms: 10_000,
        });
        let t = machine.apply(PhaseTrigger::CountdownStart {
            start_ms: 5_000,
            duration_ms: 10_000,
        });
        assert_eq!(t, PhaseTransition::Unchanged);
        assert_eq!(machine.countdown().unwrap().start_ms, 5_000);
    }

    #[test]
    fn test_countdown_timer_is_advisory() {
        let countdown = Countdown {
            start_ms: 1_000,
            duration_ms: 15_000,
        };
        assert_eq!(countdown.remaining_ms(1_000), 15_000);
        assert_eq!(countdown.seconds_left(1_001), 15);
        assert_eq!(countdown.seconds_left(15_500), 1);
        assert!(countdown.is_finished(16_000));
        assert_eq!(countdown.remaining_ms(99_000), 0);
        // Clock behind the server start
        assert_eq!(countdown.remaining_ms(0), 15_000);
    }
}
