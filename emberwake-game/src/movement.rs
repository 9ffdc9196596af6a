//! Step resolution: collision, blocking events, NPCs, and the teleports,
//! scripted battles and wild encounters a step can raise.

use std::sync::Arc;

use crate::constants::{MSG_NOTHING_HAPPENS, MSG_PATH_BLOCKED};
use crate::encounters::WildEncounter;
use crate::session::GameSession;
use crate::transition::{
    EncounterSource, PendingEncounter, PendingMapTransition, PendingTransition,
};
use crate::world::{Direction, EventKind, MapData, MapEvent, ScriptedBattle, TeleportGate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// A transition or encounter is already staged
    PendingTransition,
    Terrain,
    Event(String),
    Npc(String),
}

/// Result of a single step request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Not a unit step, or movement is not allowed right now
    Ignored,
    /// Only facing changed
    Blocked {
        facing: Direction,
        reason: BlockReason,
    },
    Moved {
        wild_encounter: Option<WildEncounter>,
    },
    /// Stepped onto a gate whose flags are unmet; its message is showing
    GateLocked { event_id: String, message: String },
    /// Stepped onto a gate; a map transition is pending
    Teleporting { map_id: String },
    /// Walked into a fight that is not available yet; its message is showing
    BattleLocked { event_id: String, message: String },
    /// Walked into a scripted fight, either staged directly or behind a
    /// pre-battle dialogue
    ScriptedBattle {
        event_id: String,
        dialogue: Option<String>,
    },
}

/// How a teleport gate responded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum GateResolution {
    Locked(String),
    Staged(String),
    Busy,
}

/// How a scripted battle event responded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BattleGate {
    /// Already fought or won
    Spent,
    Locked(String),
    Dialogue(String),
    Staged,
    Busy,
}

impl GameSession {
    /// Request a unit step of `(dx, dy)`.
    pub fn move_by(&mut self, dx: i32, dy: i32) -> MoveOutcome {
        let Some(facing) = Direction::from_delta(dx, dy) else {
            return MoveOutcome::Ignored;
        };
        if self.state.phase().blocks_movement() || self.state.ui.blocks_movement() {
            return MoveOutcome::Ignored;
        }
        self.state.position.facing = facing;
        let blocked = |reason| MoveOutcome::Blocked { facing, reason };
        if self.state.transition.in_flight() || self.state.queued_battle.is_some() {
            return blocked(BlockReason::PendingTransition);
        }

        let content = Arc::clone(&self.content);
        let Some(map) = content.maps.get(self.state.current_map_id()) else {
            log::warn!("current map {} not found", self.state.current_map_id());
            return blocked(BlockReason::Terrain);
        };
        let (x, y) = self.state.position.facing_tile();
        if map.is_solid(x, y) {
            return blocked(BlockReason::Terrain);
        }
        if let Some(event) = map.events_at(x, y).find(|e| self.event_blocks(e)) {
            return blocked(BlockReason::Event(event.id.clone()));
        }
        if let Some(npc) = map.npc_at(x, y, &self.state.flags) {
            return blocked(BlockReason::Npc(npc.id.clone()));
        }

        for event in map.events_at(x, y) {
            match &event.kind {
                EventKind::Teleport(gate) => {
                    self.commit_step(x, y);
                    return match self.resolve_teleport(event, gate) {
                        GateResolution::Locked(message) => MoveOutcome::GateLocked {
                            event_id: event.id.clone(),
                            message,
                        },
                        GateResolution::Staged(map_id) => MoveOutcome::Teleporting { map_id },
                        GateResolution::Busy => MoveOutcome::Moved {
                            wild_encounter: None,
                        },
                    };
                }
                EventKind::Battle(battle) => match self.resolve_scripted_battle(event, battle) {
                    BattleGate::Spent => {}
                    BattleGate::Locked(message) => {
                        return MoveOutcome::BattleLocked {
                            event_id: event.id.clone(),
                            message,
                        };
                    }
                    BattleGate::Dialogue(node) => {
                        return MoveOutcome::ScriptedBattle {
                            event_id: event.id.clone(),
                            dialogue: Some(node),
                        };
                    }
                    BattleGate::Staged => {
                        return MoveOutcome::ScriptedBattle {
                            event_id: event.id.clone(),
                            dialogue: None,
                        };
                    }
                    BattleGate::Busy => return blocked(BlockReason::PendingTransition),
                },
                _ => {}
            }
        }

        self.commit_step(x, y);
        let wild_encounter = self.roll_wild(map, x, y);
        MoveOutcome::Moved { wild_encounter }
    }

    /// Whether an event on the destination tile stops the step.
    fn event_blocks(&self, event: &MapEvent) -> bool {
        match &event.kind {
            EventKind::Treasure { .. } | EventKind::SavePoint | EventKind::Inn { .. } => true,
            EventKind::Collectible { required_quest, .. } => {
                !self.state.is_consumed(event)
                    && required_quest
                        .as_deref()
                        .is_none_or(|quest_id| self.state.quests.is_active(quest_id))
            }
            EventKind::Trigger(_) => !self.state.is_consumed(event),
            EventKind::Shop { .. } | EventKind::Battle(_) | EventKind::Teleport(_) => false,
        }
    }

    fn commit_step(&mut self, x: i32, y: i32) {
        self.state.position.x = x;
        self.state.position.y = y;
        self.state.ui.clear_requests();
    }

    fn roll_wild(&mut self, map: &MapData, x: i32, y: i32) -> Option<WildEncounter> {
        if !map.wild_encounters {
            return None;
        }
        let zone = map.zone_at(x, y)?;
        let encounter = self.state.roll_wild_encounter(zone)?;
        let staged = self.stage(PendingTransition::Encounter(PendingEncounter {
            roster: encounter.roster.clone(),
            victory_flag: None,
            source_event: None,
            source: EncounterSource::Wild,
        }));
        staged.then_some(encounter)
    }

    /// Gate check shared by stepping onto and interacting with a teleport.
    pub(crate) fn resolve_teleport(
        &mut self,
        event: &MapEvent,
        gate: &TeleportGate,
    ) -> GateResolution {
        if let Some(flag) = self.state.flags.first_missing(&gate.required_flags) {
            log::debug!("gate {} locked by {flag}", event.id);
            let message = gate
                .blocked_message
                .clone()
                .unwrap_or_else(|| MSG_PATH_BLOCKED.to_string());
            self.show_message(None, message.clone());
            return GateResolution::Locked(message);
        }
        let staged = self.stage(PendingTransition::Map(PendingMapTransition {
            destination: gate.destination.clone(),
            source_event: Some(event.id.clone()),
        }));
        if staged {
            GateResolution::Staged(gate.destination.map_id.clone())
        } else {
            GateResolution::Busy
        }
    }

    /// Gate check shared by walking into and interacting with a scripted
    /// battle. The player never steps onto the battle tile.
    pub(crate) fn resolve_scripted_battle(
        &mut self,
        event: &MapEvent,
        battle: &ScriptedBattle,
    ) -> BattleGate {
        if self.state.is_consumed(event) || self.state.flags.is_set(&battle.victory_flag) {
            return BattleGate::Spent;
        }
        if self.state.flags.first_missing(&battle.required_flags).is_some() {
            let message = battle
                .locked_message
                .clone()
                .unwrap_or_else(|| MSG_NOTHING_HAPPENS.to_string());
            self.show_message(None, message.clone());
            return BattleGate::Locked(message);
        }
        let encounter = PendingEncounter {
            roster: battle.enemies.clone(),
            victory_flag: Some(battle.victory_flag.clone()),
            source_event: Some(event.id.clone()),
            source: EncounterSource::Scripted,
        };
        if let Some(node) = &battle.pre_battle_dialogue {
            self.state.queued_battle = Some(encounter);
            if self.start_dialogue(node).node_id.is_some() {
                return BattleGate::Dialogue(node.clone());
            }
            // The dialogue never opened; fight straight away.
            return match self.state.queued_battle.take() {
                Some(encounter) => self.stage_battle(encounter),
                None => BattleGate::Staged,
            };
        }
        self.stage_battle(encounter)
    }

    fn stage_battle(&mut self, encounter: PendingEncounter) -> BattleGate {
        if self.stage(PendingTransition::Encounter(encounter)) {
            BattleGate::Staged
        } else {
            BattleGate::Busy
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::content::GameContent;
    use crate::phase::GamePhase;
    use crate::transition::AppliedTransition;

    const FIELD: &str = r#"{
        "start": { "map_id": "field", "x": 1, "y": 1, "character": "hero" },
        "characters": [{ "id": "hero", "name": "Hero", "hp": 30, "max_hp": 30 }],
        "enemies": [{ "id": "slime", "name": "Slime", "hp": 5, "experience": 4, "gold": 2 }],
        "dialogue": [{ "id": "warning", "text": "Turn back!" }],
        "maps": [
            {
                "id": "field", "name": "Field", "width": 6, "height": 4,
                "collision": [1,1,1,1,1,1, 1,0,0,0,0,1, 1,0,0,0,0,1, 1,1,1,1,1,1],
                "wild_encounters": false,
                "events": [
                    { "id": "chest", "x": 2, "y": 2, "type": "treasure", "gold": 5 },
                    { "id": "gate", "x": 3, "y": 1, "type": "teleport",
                      "destination": { "map_id": "cave", "x": 0, "y": 0 },
                      "required_flags": ["has_lamp"], "blocked_message": "Too dark." },
                    { "id": "ambush", "x": 4, "y": 2, "type": "battle",
                      "enemies": ["slime"], "victory_flag": "ambush_won" }
                ],
                "npcs": [{ "id": "guard", "name": "Guard", "x": 1, "y": 2, "dialogue": "warning" }]
            },
            { "id": "cave", "name": "Cave", "width": 2, "height": 2 }
        ]
    }"#;

    fn session() -> GameSession {
        let content = Arc::new(GameContent::from_json(FIELD).expect("fixture"));
        let mut game =
            GameSession::new_game(content, SessionConfig::default(), 5).expect("new game");
        game.skip_intro().expect("exploring");
        game
    }

    #[test]
    fn walls_and_npcs_only_turn_the_player() {
        let mut game = session();
        assert_eq!(
            game.move_by(0, -1),
            MoveOutcome::Blocked {
                facing: Direction::Up,
                reason: BlockReason::Terrain
            }
        );
        assert_eq!(
            game.move_by(0, 1),
            MoveOutcome::Blocked {
                facing: Direction::Down,
                reason: BlockReason::Npc("guard".to_string())
            }
        );
        let position = &game.state().position;
        assert_eq!((position.x, position.y, position.facing), (1, 1, Direction::Down));
    }

    #[test]
    fn diagonal_steps_are_ignored() {
        let mut game = session();
        assert_eq!(game.move_by(1, 1), MoveOutcome::Ignored);
        assert_eq!(game.state().position.facing, Direction::Down);
    }

    #[test]
    fn treasure_blocks_even_after_opening() {
        let mut game = session();
        game.move_by(1, 0);
        let outcome = game.move_by(0, 1);
        assert!(matches!(
            outcome,
            MoveOutcome::Blocked {
                reason: BlockReason::Event(ref id),
                ..
            } if id == "chest"
        ));
    }

    #[test]
    fn locked_gate_moves_player_and_shows_message() {
        let mut game = session();
        game.move_by(1, 0);
        let outcome = game.move_by(1, 0);
        assert_eq!(
            outcome,
            MoveOutcome::GateLocked {
                event_id: "gate".to_string(),
                message: "Too dark.".to_string()
            }
        );
        assert_eq!(game.state().position.x, 3);
        assert!(!game.state().transition.has_pending());
        assert_eq!(game.phase(), GamePhase::Dialogue);
    }

    #[test]
    fn open_gate_defers_map_change_to_midpoint() {
        let mut game = session();
        game.state_mut().flags.set("has_lamp");
        game.move_by(1, 0);
        assert_eq!(
            game.move_by(1, 0),
            MoveOutcome::Teleporting {
                map_id: "cave".to_string()
            }
        );
        assert_eq!(game.state().current_map_id(), "field");
        assert!(matches!(game.move_by(-1, 0), MoveOutcome::Blocked { .. }));

        assert_eq!(
            game.on_transition_midpoint(),
            Some(AppliedTransition::MapChanged {
                map_id: "cave".to_string()
            })
        );
        assert_eq!(game.on_transition_midpoint(), None);
        assert_eq!(game.state().current_map_id(), "cave");
        assert!(game.state().visited_maps.contains("cave"));
        assert!(game.on_transition_complete().is_some());
        assert!(game.on_transition_complete().is_none());
    }

    #[test]
    fn scripted_battle_is_staged_without_entering_the_tile() {
        let mut game = session();
        game.state_mut().position.x = 3;
        game.state_mut().position.y = 2;
        assert_eq!(
            game.move_by(1, 0),
            MoveOutcome::ScriptedBattle {
                event_id: "ambush".to_string(),
                dialogue: None
            }
        );
        assert_eq!(game.state().position.x, 3);
        assert!(game.state().transition.has_pending_encounter());

        assert!(matches!(
            game.on_transition_complete(),
            Some(AppliedTransition::BattleStarted { .. })
        ));
        assert_eq!(game.phase(), GamePhase::Combat);
        game.end_battle(true).expect("report");
        assert!(game.state().flags.is_set("ambush_won"));
        assert!(matches!(game.move_by(1, 0), MoveOutcome::Moved { .. }));
        assert_eq!(game.state().position.x, 4);
    }
}
