//! Drives a session through scripted routes, winning every fight on the way.
use anyhow::{Context, Result, bail, ensure};
use colored::Colorize;
use serde::Serialize;

use emberwake_game::{
    AppliedTransition, BattleReport, BlockReason, DialogueOutcome, GamePhase, GameSession,
    InteractionOutcome, MoveOutcome, WildEncounter,
};

/// Upper bound on lines advanced while closing a dialogue.
const MAX_DIALOGUE_LINES: usize = 32;

/// What a finished route looked like, for verbose traces and reports.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub steps: u32,
    pub battles: u32,
    pub gold: u32,
    pub party_size: usize,
    pub completed_quests: usize,
}

pub struct Pilot {
    game: GameSession,
    verbose: bool,
    steps: u32,
    battles: u32,
}

impl Pilot {
    pub const fn new(game: GameSession, verbose: bool) -> Self {
        Self {
            game,
            verbose,
            steps: 0,
            battles: 0,
        }
    }

    pub const fn game(&self) -> &GameSession {
        &self.game
    }

    pub const fn game_mut(&mut self) -> &mut GameSession {
        &mut self.game
    }

    pub fn at(&self) -> (i32, i32) {
        let position = &self.game.state().position;
        (position.x, position.y)
    }

    pub fn summary(&self) -> RunSummary {
        let state = self.game.state();
        RunSummary {
            steps: self.steps,
            battles: self.battles,
            gold: state.inventory.gold,
            party_size: state.party.len(),
            completed_quests: state.quests.completed().len(),
        }
    }

    fn trace(&self, what: &str) {
        log::debug!("{what}");
        if self.verbose {
            let position = &self.game.state().position;
            println!(
                "     {} {} @ {} ({}, {}) [{}]",
                "↳".dimmed(),
                what,
                position.map_id,
                position.x,
                position.y,
                self.game.phase()
            );
        }
    }

    /// One step. A wild battle it sets off is fought and won at once.
    pub fn step(&mut self, dx: i32, dy: i32) -> Result<MoveOutcome> {
        let outcome = self.game.move_by(dx, dy);
        if let MoveOutcome::Moved { wild_encounter } = &outcome {
            self.steps += 1;
            if let Some(encounter) = wild_encounter {
                self.trace(&format!("wild {:?}", encounter.roster));
                self.win_pending_battle()?;
            }
        }
        Ok(outcome)
    }

    /// One step that must succeed. A wild encounter is staged, not fought.
    pub fn stroll(&mut self, dx: i32, dy: i32) -> Result<Option<WildEncounter>> {
        match self.game.move_by(dx, dy) {
            MoveOutcome::Moved { wild_encounter } => {
                self.steps += 1;
                Ok(wild_encounter)
            }
            other => bail!("stroll ({dx}, {dy}) stopped at {:?}: {other:?}", self.at()),
        }
    }

    pub fn walk(&mut self, dx: i32, dy: i32, steps: usize) -> Result<()> {
        for _ in 0..steps {
            let outcome = self.step(dx, dy)?;
            if !matches!(outcome, MoveOutcome::Moved { .. }) {
                bail!(
                    "walk ({dx}, {dy}) stopped at {:?}: {outcome:?}",
                    self.at()
                );
            }
        }
        Ok(())
    }

    /// Step onto a gate and let the fade finish.
    pub fn teleport(&mut self, dx: i32, dy: i32, map_id: &str) -> Result<()> {
        let outcome = self.step(dx, dy)?;
        ensure!(
            matches!(&outcome, MoveOutcome::Teleporting { map_id: target } if target == map_id),
            "expected a gate to {map_id}, got {outcome:?}"
        );
        let applied = self.game.on_transition_complete();
        ensure!(
            matches!(&applied, Some(AppliedTransition::MapChanged { map_id: target }) if target == map_id),
            "gate to {map_id} applied as {applied:?}"
        );
        self.trace(&format!("arrived in {map_id}"));
        Ok(())
    }

    /// Start the staged battle and report a victory for it.
    pub fn win_pending_battle(&mut self) -> Result<BattleReport> {
        let applied = self.game.on_transition_complete();
        ensure!(
            matches!(applied, Some(AppliedTransition::BattleStarted { .. })),
            "no battle was staged: {applied:?}"
        );
        ensure!(
            self.game.phase() == GamePhase::Combat,
            "battle began outside combat: {}",
            self.game.phase()
        );
        let report = self
            .game
            .end_battle(true)
            .context("live battle vanished")?;
        self.battles += 1;
        let gained = report.rewards.as_ref().map_or(0, |r| r.experience);
        self.trace(&format!("won battle {} (+{gained} exp)", report.battle_id));
        Ok(report)
    }

    /// Bump into a collectible and pick it up.
    pub fn pick(&mut self, dx: i32, dy: i32, event_id: &str) -> Result<()> {
        let bump = self.game.move_by(dx, dy);
        ensure!(
            matches!(&bump, MoveOutcome::Blocked { reason: BlockReason::Event(id), .. } if id == event_id),
            "expected {event_id} ahead, got {bump:?}"
        );
        let picked = self.game.interact();
        ensure!(
            matches!(&picked, InteractionOutcome::Collected { event_id: id, .. } if id == event_id),
            "{event_id} gave {picked:?}"
        );
        self.trace(&format!("picked {event_id}"));
        Ok(())
    }

    /// Talk to whoever is ahead. Returns the opening node.
    pub fn talk(&mut self, npc_id: &str) -> Result<Option<String>> {
        match self.game.interact() {
            InteractionOutcome::Talk {
                npc_id: id,
                node_id,
                ..
            } if id == npc_id => {
                self.trace(&format!("talking to {npc_id} at {node_id:?}"));
                Ok(node_id)
            }
            other => bail!("expected to talk to {npc_id}, got {other:?}"),
        }
    }

    pub fn choose(&mut self, index: usize) -> Result<DialogueOutcome> {
        self.game
            .choose(index)
            .with_context(|| format!("choice {index} not offered"))
    }

    /// Advance until the dialogue box closes.
    pub fn close_dialogue(&mut self) -> Result<()> {
        for _ in 0..MAX_DIALOGUE_LINES {
            if self.game.advance_dialogue().ended() {
                return Ok(());
            }
        }
        bail!("dialogue did not close after {MAX_DIALOGUE_LINES} lines")
    }
}
