//! Top-level mode machine.
//!
//! Every phase owns a closed list of successors. Only [`PhaseController`]
//! writes the phase, and only through [`PhaseController::transition`] or the
//! wholesale [`PhaseController::restore`] used by new-game and load.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    #[default]
    Title,
    IntroCinematic,
    SystemBoot,
    Cutscene,
    Exploring,
    Dialogue,
    Shop,
    Combat,
    GameOver,
}

impl GamePhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::IntroCinematic => "intro_cinematic",
            Self::SystemBoot => "system_boot",
            Self::Cutscene => "cutscene",
            Self::Exploring => "exploring",
            Self::Dialogue => "dialogue",
            Self::Shop => "shop",
            Self::Combat => "combat",
            Self::GameOver => "game_over",
        }
    }

    /// Phases reachable from `self`.
    #[must_use]
    pub const fn successors(self) -> &'static [Self] {
        match self {
            Self::Title => &[Self::IntroCinematic],
            Self::IntroCinematic => &[Self::SystemBoot, Self::Exploring],
            Self::SystemBoot => &[Self::Exploring],
            Self::Cutscene => &[Self::Exploring, Self::Dialogue],
            Self::Exploring => &[
                Self::Dialogue,
                Self::Shop,
                Self::Combat,
                Self::Cutscene,
                Self::Title,
            ],
            Self::Dialogue => &[Self::Exploring, Self::Shop, Self::Cutscene],
            Self::Shop => &[Self::Exploring],
            Self::Combat => &[Self::Exploring, Self::GameOver],
            Self::GameOver => &[Self::Title],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Phases in which the player avatar cannot walk.
    #[must_use]
    pub const fn blocks_movement(self) -> bool {
        !matches!(self, Self::Exploring)
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("cannot move from phase {from} to {to}")]
    InvalidTransition { from: GamePhase, to: GamePhase },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PhaseController {
    current: GamePhase,
    previous: Option<GamePhase>,
}

impl PhaseController {
    #[must_use]
    pub fn new(initial: GamePhase) -> Self {
        Self {
            current: initial,
            previous: None,
        }
    }

    #[must_use]
    pub const fn current(&self) -> GamePhase {
        self.current
    }

    #[must_use]
    pub const fn previous(&self) -> Option<GamePhase> {
        self.previous
    }

    #[must_use]
    pub fn is(&self, phase: GamePhase) -> bool {
        self.current == phase
    }

    /// Move to `next` if the current phase allows it.
    ///
    /// # Errors
    ///
    /// Returns [`PhaseError::InvalidTransition`] and leaves the phase unchanged
    /// when `next` is not a successor of the current phase.
    pub fn transition(&mut self, next: GamePhase) -> Result<GamePhase, PhaseError> {
        if !self.current.can_transition_to(next) {
            log::warn!("rejected phase transition {} -> {}", self.current, next);
            return Err(PhaseError::InvalidTransition {
                from: self.current,
                to: next,
            });
        }
        log::debug!("phase {} -> {}", self.current, next);
        self.previous = Some(self.current);
        self.current = next;
        Ok(next)
    }

    /// Replace the phase wholesale. Reserved for session (re)initialization.
    pub(crate) fn restore(&mut self, phase: GamePhase) {
        log::debug!("phase restored to {phase}");
        self.previous = None;
        self.current = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [GamePhase; 9] = [
        GamePhase::Title,
        GamePhase::IntroCinematic,
        GamePhase::SystemBoot,
        GamePhase::Cutscene,
        GamePhase::Exploring,
        GamePhase::Dialogue,
        GamePhase::Shop,
        GamePhase::Combat,
        GamePhase::GameOver,
    ];

    #[test]
    fn every_phase_has_an_exit() {
        for phase in ALL {
            assert!(!phase.successors().is_empty(), "{phase} is a dead end");
            assert!(!phase.can_transition_to(phase), "{phase} loops onto itself");
        }
    }

    #[test]
    fn shop_and_combat_never_overlap() {
        assert!(!GamePhase::Shop.can_transition_to(GamePhase::Combat));
        assert!(!GamePhase::Combat.can_transition_to(GamePhase::Shop));
    }

    #[test]
    fn invalid_transition_keeps_phase() {
        let mut controller = PhaseController::new(GamePhase::Dialogue);
        let err = controller.transition(GamePhase::Combat).unwrap_err();
        assert_eq!(
            err,
            PhaseError::InvalidTransition {
                from: GamePhase::Dialogue,
                to: GamePhase::Combat
            }
        );
        assert!(controller.is(GamePhase::Dialogue));
    }

    #[test]
    fn combat_resolves_to_exploring_or_game_over() {
        let mut controller = PhaseController::new(GamePhase::Exploring);
        controller.transition(GamePhase::Combat).unwrap();
        controller.transition(GamePhase::GameOver).unwrap();
        assert_eq!(controller.previous(), Some(GamePhase::Combat));
        assert!(controller.transition(GamePhase::Exploring).is_err());
        controller.transition(GamePhase::Title).unwrap();
    }
}
