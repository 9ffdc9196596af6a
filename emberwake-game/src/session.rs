//! The orchestrator: one [`Session`] bound to injected content and a battle
//! subsystem, exposing every player and view action as a method.
//!
//! Movement, interaction and persistence live in their own modules as further
//! `impl GameSession` blocks.

use std::sync::Arc;
use thiserror::Error;

use crate::battle::{
    ActiveBattle, BattleReport, BattleRewards, BattleState, BattleSubsystem, StandardBattles,
    VictoryTarget, apply_victory,
};
use crate::config::{SessionConfig, SessionConfigError};
use crate::content::GameContent;
use crate::dialogue::{
    ActiveDialogue, DialogueEffect, DialogueOutcome, DialogueStep, EffectReport,
};
use crate::items::StackResult;
use crate::party::Party;
use crate::phase::{GamePhase, PhaseError};
use crate::quests::{
    ObjectiveKind, ObjectiveUpdate, ObjectiveUpdates, QuestError, QuestRewardPayload,
    RewardTarget,
};
use crate::shop::{self, Cart, Purchase, ShopError};
use crate::state::{Notification, QueuedShop, Session};
use crate::transition::{
    AppliedTransition, EncounterSource, PendingEncounter, PendingMapTransition, PendingTransition,
};
use crate::world::MapData;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] SessionConfigError),
    #[error("starting character {0} is not defined")]
    MissingStartCharacter(String),
    #[error("starting map {0} is not defined")]
    MissingStartMap(String),
}

pub struct GameSession {
    pub(crate) state: Session,
    pub(crate) content: Arc<GameContent>,
    battles: Box<dyn BattleSubsystem>,
}

impl GameSession {
    /// Start a new game: the starting character alone in the party, an empty
    /// quest ledger, and the intro cinematic playing.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid or the content lacks the starting
    /// character or map.
    pub fn new_game(
        content: Arc<GameContent>,
        config: SessionConfig,
        seed: u64,
    ) -> Result<Self, SessionError> {
        let state = Self::fresh_state(&content, config, seed)?;
        log::info!("new game (seed {seed})");
        Ok(Self {
            state,
            content,
            battles: Box::new(StandardBattles),
        })
    }

    fn fresh_state(
        content: &GameContent,
        config: SessionConfig,
        seed: u64,
    ) -> Result<Session, SessionError> {
        config.validate()?;
        let start = &content.start;
        let hero = content
            .character(&start.character)
            .cloned()
            .ok_or_else(|| SessionError::MissingStartCharacter(start.character.clone()))?;
        if !content.maps.contains(&start.map_id) {
            return Err(SessionError::MissingStartMap(start.map_id.clone()));
        }
        Ok(Session::new(
            start.position(),
            Party::new(vec![hero]),
            config,
            seed,
        ))
    }

    /// Swap in a different turn-resolution engine.
    #[must_use]
    pub fn with_battle_subsystem(mut self, battles: Box<dyn BattleSubsystem>) -> Self {
        self.battles = battles;
        self
    }

    #[must_use]
    pub const fn state(&self) -> &Session {
        &self.state
    }

    /// Direct access for debug and admin tooling.
    pub const fn state_mut(&mut self) -> &mut Session {
        &mut self.state
    }

    #[must_use]
    pub fn content(&self) -> &GameContent {
        &self.content
    }

    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.state.phase()
    }

    #[must_use]
    pub fn current_map(&self) -> Option<&MapData> {
        self.content.maps.get(self.state.current_map_id())
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.state.notifications)
    }

    pub(crate) fn go(&mut self, next: GamePhase) -> Result<GamePhase, PhaseError> {
        let phase = self.state.phase_mut().transition(next)?;
        if phase != GamePhase::Exploring {
            self.state.ui.clear_requests();
        }
        Ok(phase)
    }

    fn require_phase(&self, expected: GamePhase, next: GamePhase) -> Result<(), PhaseError> {
        if self.state.phase() == expected {
            Ok(())
        } else {
            Err(PhaseError::InvalidTransition {
                from: self.state.phase(),
                to: next,
            })
        }
    }

    // ---- phase flow -------------------------------------------------------

    /// Intro cinematic finished; boot sequence begins.
    ///
    /// # Errors
    ///
    /// Fails outside the intro cinematic.
    pub fn finish_intro(&mut self) -> Result<GamePhase, PhaseError> {
        self.require_phase(GamePhase::IntroCinematic, GamePhase::SystemBoot)?;
        self.go(GamePhase::SystemBoot)
    }

    /// Boot sequence finished; the player takes control.
    ///
    /// # Errors
    ///
    /// Fails outside the boot sequence.
    pub fn finish_boot(&mut self) -> Result<GamePhase, PhaseError> {
        self.require_phase(GamePhase::SystemBoot, GamePhase::Exploring)?;
        self.go(GamePhase::Exploring)
    }

    /// Jump from the intro or boot sequence straight to exploring.
    ///
    /// # Errors
    ///
    /// Fails when neither is playing.
    pub fn skip_intro(&mut self) -> Result<GamePhase, PhaseError> {
        self.go(GamePhase::Exploring)
    }

    /// # Errors
    ///
    /// Fails unless exploring.
    pub fn start_cutscene(&mut self, cutscene_id: &str) -> Result<GamePhase, PhaseError> {
        let phase = self.go(GamePhase::Cutscene)?;
        self.state.cutscene = Some(cutscene_id.to_string());
        Ok(phase)
    }

    /// # Errors
    ///
    /// Fails outside a cutscene.
    pub fn end_cutscene(&mut self) -> Result<GamePhase, PhaseError> {
        self.require_phase(GamePhase::Cutscene, GamePhase::Exploring)?;
        self.state.cutscene = None;
        self.go(GamePhase::Exploring)
    }

    /// Leave play for the title screen, discarding in-flight records.
    ///
    /// # Errors
    ///
    /// Fails unless exploring or on the game-over screen.
    pub fn return_to_title(&mut self) -> Result<GamePhase, PhaseError> {
        let phase = self.go(GamePhase::Title)?;
        self.state.clear_transients();
        Ok(phase)
    }

    /// Begin a fresh game from the title screen, keeping the configuration.
    ///
    /// # Errors
    ///
    /// Fails outside the title screen, or if the content cannot start a game.
    pub fn new_game_from_title(&mut self, seed: u64) -> anyhow::Result<GamePhase> {
        self.require_phase(GamePhase::Title, GamePhase::IntroCinematic)?;
        self.state = Self::fresh_state(&self.content, self.state.config.clone(), seed)?;
        log::info!("new game from title (seed {seed})");
        Ok(self.state.phase())
    }

    // ---- overlays and time ------------------------------------------------

    /// Open or close the field menu. Only honoured while exploring with no
    /// transition in flight. Returns whether the menu is now open.
    pub fn toggle_menu(&mut self) -> bool {
        if self.state.phase() == GamePhase::Exploring && !self.state.transition.in_flight() {
            self.state.ui.menu_open = !self.state.ui.menu_open;
        }
        self.state.ui.menu_open
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.state.ui.paused = !self.state.ui.paused;
        self.state.ui.paused
    }

    pub fn set_battles_paused(&mut self, paused: bool) {
        self.state.encounters.set_battles_paused(paused);
    }

    /// Advance the play clock unless paused.
    pub fn tick(&mut self, elapsed_ms: u64) {
        if !self.state.ui.paused {
            self.state.play_time_ms = self.state.play_time_ms.saturating_add(elapsed_ms);
        }
    }

    // ---- transitions ------------------------------------------------------

    pub(crate) fn stage(&mut self, record: PendingTransition) -> bool {
        self.state.transition.stage(record)
    }

    /// Transition view reached its midpoint: apply the staged record once.
    pub fn on_transition_midpoint(&mut self) -> Option<AppliedTransition> {
        let record = self.state.transition.take_for_midpoint()?;
        let applied = match record {
            PendingTransition::Map(pending) => self.apply_map_change(&pending),
            PendingTransition::Encounter(pending) => self.apply_encounter(pending),
        };
        self.state.transition.mark_applied(applied.clone());
        Some(applied)
    }

    /// Transition view finished. Applies the record first if the midpoint
    /// never fired, then enters combat for a started battle.
    pub fn on_transition_complete(&mut self) -> Option<AppliedTransition> {
        if self.state.transition.has_pending() {
            self.on_transition_midpoint();
        }
        let applied = self.state.transition.finish()?;
        if matches!(applied, AppliedTransition::BattleStarted { .. })
            && let Err(err) = self.go(GamePhase::Combat)
        {
            log::warn!("battle dropped: {err}");
            self.state.battle = None;
        }
        Some(applied)
    }

    /// Drop a staged record that was never applied.
    pub fn cancel_pending(&mut self) -> bool {
        let cancelled = self.state.transition.cancel().is_some();
        if self.state.phase() != GamePhase::Combat {
            self.state.battle = None;
        }
        cancelled
    }

    fn apply_map_change(&mut self, pending: &PendingMapTransition) -> AppliedTransition {
        let content = Arc::clone(&self.content);
        let dest = &pending.destination;
        if !content.maps.contains(&dest.map_id) {
            log::warn!("map {} not found; transition abandoned", dest.map_id);
            return AppliedTransition::Abandoned;
        }
        let position = &mut self.state.position;
        position.map_id.clone_from(&dest.map_id);
        position.x = dest.x;
        position.y = dest.y;
        if let Some(facing) = dest.facing {
            position.facing = facing;
        }
        self.state.visited_maps.insert(dest.map_id.clone());
        let updates = self.state.quests.record_action(
            &content.quests,
            ObjectiveKind::Explore,
            &dest.map_id,
            1,
        );
        self.notify_updates(&updates);
        log::info!("entered map {}", dest.map_id);
        AppliedTransition::MapChanged {
            map_id: dest.map_id.clone(),
        }
    }

    fn apply_encounter(&mut self, pending: PendingEncounter) -> AppliedTransition {
        let roster = self.content.enemies.resolve(&pending.roster);
        if roster.is_empty() {
            log::warn!("encounter had no known enemies; abandoned");
            return AppliedTransition::Abandoned;
        }
        let battle_id = self.state.next_battle_id();
        let battle = self
            .battles
            .start_battle(battle_id, self.state.party.members(), roster);
        log::info!("battle {battle_id} started ({:?})", pending.source);
        self.state.battle = Some(ActiveBattle::new(
            battle,
            pending.victory_flag,
            pending.source_event,
        ));
        AppliedTransition::BattleStarted { battle_id }
    }

    // ---- battle -----------------------------------------------------------

    #[must_use]
    pub fn battle(&self) -> Option<&BattleState> {
        self.state.battle.as_ref().map(|b| &b.state)
    }

    /// The live battle, for the battle subsystem to resolve turns on.
    pub fn battle_mut(&mut self) -> Option<&mut BattleState> {
        self.state.battle.as_mut().map(|b| &mut b.state)
    }

    /// Compute the reward payload for the live battle, once.
    pub fn finalize_rewards(&mut self) -> Option<BattleRewards> {
        let mut battle = self.state.battle.take()?;
        let rewards = battle.finalize_rewards(self.state.rng()).clone();
        self.state.battle = Some(battle);
        Some(rewards)
    }

    /// Resolve the live battle. Victory applies the finalized rewards and
    /// returns to exploring; defeat leads to game over with nothing applied.
    pub fn end_battle(&mut self, victory: bool) -> Option<BattleReport> {
        if self.state.phase() != GamePhase::Combat {
            return None;
        }
        let battle = self.state.battle.take()?;
        let battle_id = battle.state.id;
        if !victory {
            if let Err(err) = self.go(GamePhase::GameOver) {
                log::warn!("{err}");
            }
            log::info!("battle {battle_id} lost");
            return Some(BattleReport::defeat(battle_id));
        }

        let content = Arc::clone(&self.content);
        let victory_flag = battle.victory_flag.clone();
        let source_event = battle.source_event.clone();
        let (battle_state, rewards) = battle.into_rewards(self.state.rng());
        let curve = self.state.experience_curve();
        let max_stack = self.state.config.max_stack;
        let spoils = apply_victory(
            &battle_state,
            victory_flag.as_deref(),
            source_event.as_deref(),
            &rewards,
            VictoryTarget {
                party: &mut self.state.party,
                inventory: &mut self.state.inventory,
                flags: &mut self.state.flags,
                opened_events: &mut self.state.opened_events,
                items: &content.items,
                max_stack,
                curve,
            },
        );

        let mut objective_updates = Vec::new();
        for enemy_id in &rewards.defeated {
            objective_updates.extend(self.state.quests.record_action(
                &content.quests,
                ObjectiveKind::Defeat,
                enemy_id,
                1,
            ));
        }
        for grant in &rewards.drops {
            let dropped = spoils
                .overflow
                .iter()
                .find(|o| o.item_id == grant.item_id)
                .map_or(0, |o| o.quantity);
            let kept = grant.quantity.saturating_sub(dropped);
            if kept > 0 {
                objective_updates.extend(self.state.quests.on_item_collected(
                    &content.quests,
                    &grant.item_id,
                    kept,
                ));
            }
        }
        self.notify_updates(&objective_updates);
        for level_up in &spoils.level_ups {
            self.state
                .notifications
                .push(Notification::LevelUp(level_up.clone()));
        }
        if let Err(err) = self.go(GamePhase::Exploring) {
            log::warn!("{err}");
        }
        Some(BattleReport {
            battle_id,
            victory: true,
            rewards: Some(rewards),
            level_ups: spoils.level_ups,
            overflow: spoils.overflow,
            objective_updates,
        })
    }

    // ---- quests -----------------------------------------------------------

    /// # Errors
    ///
    /// Returns the unmet precondition, or [`QuestError::UnknownQuest`].
    pub fn start_quest(&mut self, quest_id: &str) -> Result<(), QuestError> {
        let content = Arc::clone(&self.content);
        let quest = content
            .quests
            .get(quest_id)
            .ok_or_else(|| QuestError::UnknownQuest(quest_id.to_string()))?;
        let level = self.state.party.max_level();
        self.state
            .quests
            .start_quest(quest, &mut self.state.flags, level)?;
        self.state
            .notifications
            .push(Notification::QuestStarted(quest_id.to_string()));
        Ok(())
    }

    /// Move an objective towards `value`; progress never decreases.
    pub fn update_objective_progress(
        &mut self,
        quest_id: &str,
        objective_id: &str,
        value: u32,
    ) -> Option<ObjectiveUpdate> {
        let content = Arc::clone(&self.content);
        let quest = content.quests.get(quest_id)?;
        let update = self
            .state
            .quests
            .set_objective_progress(quest, objective_id, value)?;
        self.notify_updates(std::slice::from_ref(&update));
        Some(update)
    }

    pub fn complete_objective(
        &mut self,
        quest_id: &str,
        objective_id: &str,
    ) -> Option<ObjectiveUpdate> {
        let content = Arc::clone(&self.content);
        let quest = content.quests.get(quest_id)?;
        let update = self.state.quests.complete_objective(quest, objective_id)?;
        self.notify_updates(std::slice::from_ref(&update));
        Some(update)
    }

    /// Complete an active quest and grant its rewards.
    pub fn complete_quest(&mut self, quest_id: &str) -> Option<QuestRewardPayload> {
        let content = Arc::clone(&self.content);
        let quest = content.quests.get(quest_id)?;
        let curve = self.state.experience_curve();
        let max_stack = self.state.config.max_stack;
        let payload = self.state.quests.complete_quest(
            quest,
            RewardTarget {
                flags: &mut self.state.flags,
                inventory: &mut self.state.inventory,
                party: &mut self.state.party,
                items: &content.items,
                recruits: &content.characters,
                max_stack,
                curve,
            },
        )?;
        for grant in &payload.items {
            self.state.notifications.push(Notification::ItemObtained {
                item_id: grant.item_id.clone(),
                quantity: grant.quantity,
            });
            let updates =
                self.state
                    .quests
                    .on_item_collected(&content.quests, &grant.item_id, grant.quantity);
            self.notify_updates(&updates);
        }
        let notifications = &mut self.state.notifications;
        if let Some(recruit) = &payload.recruited {
            notifications.push(Notification::Recruited(recruit.clone()));
        }
        for level_up in &payload.level_ups {
            notifications.push(Notification::LevelUp(level_up.clone()));
        }
        notifications.push(Notification::QuestCompleted(payload.clone()));
        Some(payload)
    }

    pub fn fail_quest(&mut self, quest_id: &str) -> bool {
        let failed = self.state.quests.fail_quest(quest_id);
        if failed {
            self.state
                .notifications
                .push(Notification::QuestFailed(quest_id.to_string()));
        }
        failed
    }

    pub(crate) fn notify_updates(&mut self, updates: &[ObjectiveUpdate]) {
        self.state.notifications.extend(
            updates
                .iter()
                .cloned()
                .map(Notification::ObjectiveUpdated),
        );
    }

    /// Add items with stack clamping and advance collect objectives for
    /// whatever actually fit.
    pub(crate) fn collect_item(
        &mut self,
        item_id: &str,
        quantity: u32,
    ) -> (StackResult, ObjectiveUpdates) {
        let content = Arc::clone(&self.content);
        let limit = content.items.stack_limit(item_id, self.state.config.max_stack);
        let result = self.state.inventory.add(item_id, quantity, limit);
        if result.overflow > 0 {
            log::warn!("{item_id} stack full; {} discarded", result.overflow);
        }
        if result.added == 0 {
            return (result, ObjectiveUpdates::new());
        }
        self.state.notifications.push(Notification::ItemObtained {
            item_id: item_id.to_string(),
            quantity: result.added,
        });
        let updates = self
            .state
            .quests
            .on_item_collected(&content.quests, item_id, result.added);
        self.notify_updates(&updates);
        (result, updates)
    }

    // ---- dialogue ---------------------------------------------------------

    /// Enter the dialogue graph at `node_id`. A missing node starts nothing.
    pub fn start_dialogue(&mut self, node_id: &str) -> DialogueOutcome {
        let content = Arc::clone(&self.content);
        let step = self.state.dialogue.plan(&content.dialogue, Some(node_id));
        if matches!(step, DialogueStep::End { .. }) {
            return DialogueOutcome {
                node_id: None,
                report: EffectReport::default(),
            };
        }
        if self.state.phase() != GamePhase::Dialogue
            && let Err(err) = self.go(GamePhase::Dialogue)
        {
            log::warn!("dialogue {node_id} not started: {err}");
            return DialogueOutcome {
                node_id: None,
                report: EffectReport::default(),
            };
        }
        self.run_step(step)
    }

    /// Show a standalone blocking message in the dialogue box.
    pub(crate) fn show_message(&mut self, speaker: Option<String>, text: String) -> bool {
        if self.state.phase() != GamePhase::Dialogue && self.go(GamePhase::Dialogue).is_err() {
            return false;
        }
        self.state.dialogue.show_message(speaker, text);
        true
    }

    /// Follow the current node's implicit continuation. Nodes offering
    /// choices wait for [`GameSession::choose`]; messages close.
    pub fn advance_dialogue(&mut self) -> DialogueOutcome {
        let content = Arc::clone(&self.content);
        let node_id = match self.state.dialogue.active().cloned() {
            None => {
                return DialogueOutcome {
                    node_id: None,
                    report: EffectReport::default(),
                };
            }
            Some(ActiveDialogue::Message { .. }) => return self.end_dialogue(),
            Some(ActiveDialogue::Node { node_id }) => node_id,
        };
        let Some(node) = content.dialogue.get(&node_id) else {
            return self.end_dialogue();
        };
        if node.available_choices(&self.state.flags).next().is_some() {
            return DialogueOutcome {
                node_id: Some(node_id),
                report: EffectReport::default(),
            };
        }
        let step = self.state.dialogue.plan(&content.dialogue, node.next.as_deref());
        self.run_step(step)
    }

    /// Pick the `index`-th available choice: run its effects, then move to its
    /// next node or end the dialogue. `None` if no such choice is offered.
    pub fn choose(&mut self, index: usize) -> Option<DialogueOutcome> {
        let content = Arc::clone(&self.content);
        let Some(ActiveDialogue::Node { node_id }) = self.state.dialogue.active().cloned() else {
            return None;
        };
        let node = content.dialogue.get(&node_id)?;
        let choice = node.available_choice(index, &self.state.flags)?;
        log::debug!("dialogue {node_id}: chose {:?}", choice.label);
        let mut report = self.apply_effects(&choice.effects);
        let step = self
            .state
            .dialogue
            .plan(&content.dialogue, choice.next.as_deref());
        let outcome = self.run_step(step);
        report.merge(outcome.report);
        Some(DialogueOutcome {
            node_id: outcome.node_id,
            report,
        })
    }

    /// Close the dialogue, running the current node's end effects, then move
    /// on to a queued shop or back to exploring.
    pub fn end_dialogue(&mut self) -> DialogueOutcome {
        if !self.state.dialogue.is_active() {
            return DialogueOutcome {
                node_id: None,
                report: EffectReport::default(),
            };
        }
        let content = Arc::clone(&self.content);
        let step = self.state.dialogue.plan(&content.dialogue, None);
        self.run_step(step)
    }

    fn run_step(&mut self, step: DialogueStep) -> DialogueOutcome {
        let report = self.apply_effects(step.effects());
        self.state.dialogue.commit(&step);
        match step {
            DialogueStep::Enter { node_id, .. } => DialogueOutcome {
                node_id: Some(node_id),
                report,
            },
            DialogueStep::End { .. } => {
                self.close_dialogue();
                DialogueOutcome {
                    node_id: None,
                    report,
                }
            }
        }
    }

    fn close_dialogue(&mut self) {
        self.state.dialogue.clear();
        if self.state.phase() != GamePhase::Dialogue {
            return;
        }
        let queued_shop = self.state.queued_shop.take();
        let entered_shop = queued_shop.is_some_and(|queued| self.enter_shop(&queued));
        if !entered_shop && let Err(err) = self.go(GamePhase::Exploring) {
            log::warn!("{err}");
        }
        if self.state.phase() == GamePhase::Exploring {
            self.stage_queued_battle();
        }
    }

    fn stage_queued_battle(&mut self) {
        if let Some(encounter) = self.state.queued_battle.take() {
            self.stage(PendingTransition::Encounter(encounter));
        }
    }

    /// Run a batch of dialogue effects in order.
    pub(crate) fn apply_effects(&mut self, effects: &[DialogueEffect]) -> EffectReport {
        let mut report = EffectReport::default();
        for effect in effects {
            self.apply_effect(effect, &mut report);
        }
        report
    }

    fn apply_effect(&mut self, effect: &DialogueEffect, report: &mut EffectReport) {
        let content = Arc::clone(&self.content);
        match effect {
            DialogueEffect::SetFlag { flag } => self.state.flags.set(flag.clone()),
            DialogueEffect::ClearFlag { flag } => self.state.flags.clear(flag.clone()),
            DialogueEffect::StartQuest { quest_id } => match self.start_quest(quest_id) {
                Ok(()) => report.started_quests.push(quest_id.clone()),
                Err(err) => report.skipped.push(err.to_string()),
            },
            DialogueEffect::AdvanceObjective {
                quest_id,
                objective_id,
                amount,
            } => {
                let update = content.quests.get(quest_id).and_then(|quest| {
                    self.state
                        .quests
                        .advance_objective(quest, objective_id, *amount)
                });
                if let Some(update) = update {
                    self.notify_updates(std::slice::from_ref(&update));
                    report.objective_updates.push(update);
                }
            }
            DialogueEffect::CompleteObjective {
                quest_id,
                objective_id,
            } => {
                if let Some(update) = self.complete_objective(quest_id, objective_id) {
                    report.objective_updates.push(update);
                }
            }
            DialogueEffect::CompleteQuest { quest_id } => match self.complete_quest(quest_id) {
                Some(payload) => report.completed_quests.push(payload),
                None => report.skipped.push(format!("quest {quest_id} is not active")),
            },
            DialogueEffect::FailQuest { quest_id } => {
                if self.fail_quest(quest_id) {
                    report.failed_quests.push(quest_id.clone());
                }
            }
            DialogueEffect::GiveItem { item_id, quantity } => {
                let (result, updates) = self.collect_item(item_id, *quantity);
                if result.added > 0 {
                    report.items_given.push((item_id.clone(), result.added));
                }
                report.objective_updates.extend(updates);
            }
            DialogueEffect::TakeItem { item_id, quantity } => {
                if let Err(err) = self.state.inventory.remove(item_id, *quantity) {
                    report.skipped.push(format!("take {item_id}: {err}"));
                }
            }
            DialogueEffect::GiveGold { amount } => self.state.inventory.add_gold(*amount),
            DialogueEffect::TakeGold { amount } => {
                if !self.state.inventory.spend_gold(*amount) {
                    report.skipped.push(format!("take {amount} gold: not enough"));
                }
            }
            DialogueEffect::OpenShop { shop_id, delay_ms } => {
                self.state.queued_shop = Some(QueuedShop {
                    shop_id: shop_id.clone(),
                    delay_ms: *delay_ms,
                });
            }
            DialogueEffect::ScheduleBattle {
                enemies,
                victory_flag,
            } => {
                self.state.queued_battle = Some(PendingEncounter {
                    roster: enemies.clone(),
                    victory_flag: victory_flag.clone(),
                    source_event: None,
                    source: EncounterSource::Dialogue,
                });
            }
            DialogueEffect::RestoreParty => self.state.party.restore_all(),
        }
    }

    // ---- shops and inns ---------------------------------------------------

    pub(crate) fn enter_shop(&mut self, queued: &QueuedShop) -> bool {
        if self.content.shops.get(&queued.shop_id).is_none() {
            log::warn!("shop {} not found", queued.shop_id);
            return false;
        }
        match self.go(GamePhase::Shop) {
            Ok(_) => {
                self.state.shop = Some(queued.shop_id.clone());
                true
            }
            Err(err) => {
                log::warn!("{err}");
                false
            }
        }
    }

    fn open_shop_id(&self) -> Result<String, ShopError> {
        match (&self.state.shop, self.state.phase()) {
            (Some(shop_id), GamePhase::Shop) => Ok(shop_id.clone()),
            _ => Err(ShopError::Closed),
        }
    }

    /// # Errors
    ///
    /// See [`GameSession::checkout`].
    pub fn buy(&mut self, item_id: &str, quantity: u32) -> Result<Purchase, ShopError> {
        self.checkout(&Cart::single(item_id, quantity))
    }

    /// Buy a whole cart from the open shop, all or nothing.
    ///
    /// # Errors
    ///
    /// Fails when no shop is open, an item is not stocked, gold is short, or a
    /// stack has no room.
    pub fn checkout(&mut self, cart: &Cart) -> Result<Purchase, ShopError> {
        let shop_id = self.open_shop_id()?;
        let content = Arc::clone(&self.content);
        let shop = content
            .shops
            .get(&shop_id)
            .ok_or_else(|| ShopError::UnknownShop(shop_id.clone()))?;
        let purchase = shop::checkout(
            cart,
            shop,
            &content.items,
            &mut self.state.inventory,
            self.state.config.max_stack,
        )?;
        for line in purchase.lines.iter().filter(|line| line.quantity > 0) {
            self.state.notifications.push(Notification::ItemObtained {
                item_id: line.item_id.clone(),
                quantity: line.quantity,
            });
            let updates =
                self.state
                    .quests
                    .on_item_collected(&content.quests, &line.item_id, line.quantity);
            self.notify_updates(&updates);
        }
        Ok(purchase)
    }

    /// # Errors
    ///
    /// Fails when no shop is open or the sale is not possible.
    pub fn sell(&mut self, item_id: &str, quantity: u32) -> Result<u32, ShopError> {
        self.open_shop_id()?;
        shop::sell(
            &self.content.items,
            &mut self.state.inventory,
            item_id,
            quantity,
            self.state.config.sell_ratio,
        )
    }

    /// # Errors
    ///
    /// Fails outside the shop phase.
    pub fn leave_shop(&mut self) -> Result<GamePhase, PhaseError> {
        self.require_phase(GamePhase::Shop, GamePhase::Exploring)?;
        let phase = self.go(GamePhase::Exploring)?;
        self.state.shop = None;
        self.stage_queued_battle();
        Ok(phase)
    }

    /// Pay for the requested inn stay and fully restore the party.
    ///
    /// # Errors
    ///
    /// Fails with [`ShopError::Closed`] when no stay is pending or the player
    /// is not exploring, or [`ShopError::InsufficientGold`].
    pub fn confirm_rest(&mut self) -> Result<u32, ShopError> {
        if self.state.phase() != GamePhase::Exploring {
            return Err(ShopError::Closed);
        }
        let Some(request) = self.state.ui.rest_request.clone() else {
            return Err(ShopError::Closed);
        };
        if !self.state.inventory.spend_gold(request.cost) {
            return Err(ShopError::InsufficientGold {
                cost: request.cost,
                held: self.state.inventory.gold,
            });
        }
        self.state.party.restore_all();
        self.state.ui.rest_request = None;
        log::info!("rested at {} for {} gold", request.event_id, request.cost);
        Ok(request.cost)
    }

    /// Close any open save or rest prompt.
    pub fn dismiss_requests(&mut self) {
        self.state.ui.clear_requests();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> GameSession {
        let content = Arc::new(GameContent::demo().expect("demo content"));
        GameSession::new_game(content, SessionConfig::default(), 42).expect("new game")
    }

    #[test]
    fn intro_steps_through_boot() {
        let mut game = session();
        assert!(game.finish_boot().is_err());
        game.finish_intro().unwrap();
        assert_eq!(game.finish_boot(), Ok(GamePhase::Exploring));
        assert!(game.finish_intro().is_err());
    }

    #[test]
    fn menu_only_opens_while_exploring() {
        let mut game = session();
        assert!(!game.toggle_menu());
        game.skip_intro().unwrap();
        assert!(game.toggle_menu());
        assert!(!game.toggle_menu());
    }

    #[test]
    fn play_time_stops_while_paused() {
        let mut game = session();
        game.tick(500);
        game.toggle_pause();
        game.tick(500);
        assert_eq!(game.state().play_time_ms, 500);
    }

    #[test]
    fn missing_dialogue_node_starts_nothing() {
        let mut game = session();
        game.skip_intro().unwrap();
        let outcome = game.start_dialogue("no_such_node");
        assert!(outcome.ended());
        assert_eq!(game.phase(), GamePhase::Exploring);
    }

    #[test]
    fn cutscene_round_trip() {
        let mut game = session();
        game.skip_intro().unwrap();
        game.start_cutscene("dawn").unwrap();
        assert_eq!(game.state().cutscene.as_deref(), Some("dawn"));
        game.end_cutscene().unwrap();
        assert_eq!(game.phase(), GamePhase::Exploring);
    }

    const ERRANDS: &str = r#"{
        "start": { "map_id": "yard", "x": 0, "y": 0, "character": "hero" },
        "characters": [{ "id": "hero", "name": "Hero", "hp": 30, "max_hp": 30 }],
        "items": [{ "id": "potion", "name": "Potion", "kind": "consumable", "price": 20, "max_stack": 5 }],
        "quests": [
            {
                "id": "errand", "title": "Errand",
                "objectives": [{ "id": "talk", "kind": "talk", "target": "cook" }],
                "rewards": { "items": [{ "item_id": "potion", "quantity": 4 }] }
            },
            {
                "id": "stockpile", "title": "Stockpile",
                "objectives": [{ "id": "hoard", "kind": "collect", "target": "potion", "quantity": 6 }]
            }
        ],
        "maps": [{ "id": "yard", "name": "Yard", "width": 2, "height": 2 }]
    }"#;

    #[test]
    fn reward_items_count_as_collected() {
        let content = Arc::new(GameContent::from_json(ERRANDS).expect("fixture"));
        let mut game = GameSession::new_game(content, SessionConfig::default(), 3).expect("new game");
        game.skip_intro().unwrap();
        game.state_mut().inventory.add("potion", 2, 5);
        game.start_quest("errand").unwrap();
        game.start_quest("stockpile").unwrap();
        game.drain_notifications();

        let payload = game.complete_quest("errand").expect("completes");
        assert_eq!(payload.items, vec![crate::items::ItemGrant::new("potion", 3)]);
        let progress = game.state().quests.progress("stockpile").unwrap();
        assert_eq!(progress.objective("hoard").unwrap().current_progress, 3);
        assert!(game.drain_notifications().contains(&Notification::ItemObtained {
            item_id: "potion".to_string(),
            quantity: 3,
        }));
    }

    #[test]
    fn unknown_quest_is_reported() {
        let mut game = session();
        assert_eq!(
            game.start_quest("nope"),
            Err(QuestError::UnknownQuest("nope".to_string()))
        );
    }
}
