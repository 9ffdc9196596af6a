//! Static, read-only game content and its validation.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::battle::EnemyRegistry;
use crate::dialogue::{DialogueEffect, DialogueRegistry};
use crate::items::ItemCatalog;
use crate::party::Character;
use crate::quests::{ObjectiveKind, QuestBook};
use crate::shop::ShopRegistry;
use crate::world::{Direction, EventKind, MapRegistry, PlayerPosition};

const DEMO_WORLD_JSON: &str = include_str!("../data/demo_world.json");

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content JSON is invalid: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("{kind} {id} referenced by {referrer} does not exist")]
    Dangling {
        kind: &'static str,
        id: String,
        referrer: String,
    },
}

/// Where and with whom a new game begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingState {
    pub map_id: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub facing: Direction,
    pub character: String,
}

impl StartingState {
    #[must_use]
    pub fn position(&self) -> PlayerPosition {
        PlayerPosition::new(self.map_id.clone(), self.x, self.y, self.facing)
    }
}

/// Every static registry a session reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameContent {
    #[serde(default)]
    pub title: String,
    pub start: StartingState,
    /// Starting character and every recruitable character
    pub characters: Vec<Character>,
    pub maps: MapRegistry,
    #[serde(default)]
    pub quests: QuestBook,
    #[serde(default)]
    pub dialogue: DialogueRegistry,
    #[serde(default)]
    pub items: ItemCatalog,
    #[serde(default)]
    pub enemies: EnemyRegistry,
    #[serde(default)]
    pub shops: ShopRegistry,
}

impl GameContent {
    /// Parse content from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ContentError::Parse`] if the JSON does not match the schema.
    pub fn from_json(json: &str) -> Result<Self, ContentError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The bundled demo world.
    ///
    /// # Errors
    ///
    /// Returns an error if the bundled JSON fails to parse.
    pub fn demo() -> Result<Self, ContentError> {
        Self::from_json(DEMO_WORLD_JSON)
    }

    #[must_use]
    pub fn character(&self, character_id: &str) -> Option<&Character> {
        self.characters.iter().find(|c| c.id == character_id)
    }

    /// Check that every cross reference resolves.
    ///
    /// # Errors
    ///
    /// Returns the first dangling reference found.
    pub fn validate(&self) -> Result<(), ContentError> {
        match self.dangling_references().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Every reference to an id missing from its registry.
    #[must_use]
    pub fn dangling_references(&self) -> Vec<ContentError> {
        let mut refs = RefCheck::default();
        refs.map(&self.start.map_id, "start", self);
        if self.character(&self.start.character).is_none() {
            refs.push("character", &self.start.character, "start");
        }
        self.check_maps(&mut refs);
        self.check_quests(&mut refs);
        self.check_dialogue(&mut refs);
        for shop in self.shops.iter() {
            for line in &shop.stock {
                refs.item(&line.item_id, &shop.id, self);
            }
        }
        for enemy in self.enemies.iter() {
            for drop in &enemy.drops {
                refs.item(&drop.item_id, &enemy.id, self);
            }
        }
        refs.errors
    }

    fn check_maps(&self, refs: &mut RefCheck) {
        for map in self.maps.iter() {
            for event in &map.events {
                let referrer = format!("{}/{}", map.id, event.id);
                match &event.kind {
                    EventKind::Treasure { items, .. } => {
                        for grant in items {
                            refs.item(&grant.item_id, &referrer, self);
                        }
                    }
                    EventKind::Collectible {
                        item_id,
                        required_quest,
                        ..
                    } => {
                        refs.item(item_id, &referrer, self);
                        if let Some(quest_id) = required_quest {
                            refs.quest(quest_id, &referrer, self);
                        }
                    }
                    EventKind::Shop { shop_id, .. } => {
                        if self.shops.get(shop_id).is_none() {
                            refs.push("shop", shop_id, &referrer);
                        }
                    }
                    EventKind::Battle(battle) => {
                        for enemy in &battle.enemies {
                            refs.enemy(enemy, &referrer, self);
                        }
                        if let Some(node) = &battle.pre_battle_dialogue {
                            refs.node(node, &referrer, self);
                        }
                    }
                    EventKind::Teleport(gate) => {
                        refs.map(&gate.destination.map_id, &referrer, self);
                    }
                    EventKind::Trigger(trigger) => {
                        if let Some(objective) = &trigger.complete_objective {
                            refs.quest(&objective.quest_id, &referrer, self);
                        }
                        if let Some(grant) = &trigger.grant_item {
                            refs.item(&grant.item_id, &referrer, self);
                        }
                    }
                    EventKind::SavePoint | EventKind::Inn { .. } => {}
                }
            }
            for npc in &map.npcs {
                let referrer = format!("{}/{}", map.id, npc.id);
                refs.node(&npc.dialogue, &referrer, self);
                for variant in &npc.variants {
                    refs.node(&variant.node, &referrer, self);
                }
            }
            for zone in &map.encounter_zones {
                for enemy in &zone.enemies {
                    refs.enemy(enemy, &map.id, self);
                }
            }
        }
    }

    fn check_quests(&self, refs: &mut RefCheck) {
        for quest in self.quests.iter() {
            for required in &quest.prerequisites.required_quests {
                refs.quest(required, &quest.id, self);
            }
            for grant in &quest.rewards.items {
                refs.item(&grant.item_id, &quest.id, self);
            }
            if let Some(recruit) = &quest.rewards.recruit
                && self.character(recruit).is_none()
            {
                refs.push("character", recruit, &quest.id);
            }
            for objective in &quest.objectives {
                let Some(target) = &objective.target else {
                    continue;
                };
                match objective.kind {
                    ObjectiveKind::Collect | ObjectiveKind::Deliver => {
                        refs.item(target, &quest.id, self);
                    }
                    ObjectiveKind::Defeat => refs.enemy(target, &quest.id, self),
                    ObjectiveKind::Explore => refs.map(target, &quest.id, self),
                    ObjectiveKind::Talk => {}
                }
            }
        }
    }

    fn check_dialogue(&self, refs: &mut RefCheck) {
        for node in self.dialogue.iter() {
            let nexts = node
                .next
                .iter()
                .chain(node.choices.iter().filter_map(|c| c.next.as_ref()));
            for next in nexts {
                refs.node(next, &node.id, self);
            }
            let effects = node
                .on_enter
                .iter()
                .chain(&node.on_end)
                .chain(node.choices.iter().flat_map(|c| c.effects.iter()));
            for effect in effects {
                match effect {
                    DialogueEffect::StartQuest { quest_id }
                    | DialogueEffect::AdvanceObjective { quest_id, .. }
                    | DialogueEffect::CompleteObjective { quest_id, .. }
                    | DialogueEffect::CompleteQuest { quest_id }
                    | DialogueEffect::FailQuest { quest_id } => {
                        refs.quest(quest_id, &node.id, self);
                    }
                    DialogueEffect::GiveItem { item_id, .. }
                    | DialogueEffect::TakeItem { item_id, .. } => {
                        refs.item(item_id, &node.id, self);
                    }
                    DialogueEffect::OpenShop { shop_id, .. } => {
                        if self.shops.get(shop_id).is_none() {
                            refs.push("shop", shop_id, &node.id);
                        }
                    }
                    DialogueEffect::ScheduleBattle { enemies, .. } => {
                        for enemy in enemies {
                            refs.enemy(enemy, &node.id, self);
                        }
                    }
                    DialogueEffect::SetFlag { .. }
                    | DialogueEffect::ClearFlag { .. }
                    | DialogueEffect::GiveGold { .. }
                    | DialogueEffect::TakeGold { .. }
                    | DialogueEffect::RestoreParty => {}
                }
            }
        }
    }
}

#[derive(Default)]
struct RefCheck {
    errors: Vec<ContentError>,
}

impl RefCheck {
    fn push(&mut self, kind: &'static str, id: &str, referrer: &str) {
        self.errors.push(ContentError::Dangling {
            kind,
            id: id.to_string(),
            referrer: referrer.to_string(),
        });
    }

    fn map(&mut self, id: &str, referrer: &str, content: &GameContent) {
        if !content.maps.contains(id) {
            self.push("map", id, referrer);
        }
    }

    fn item(&mut self, id: &str, referrer: &str, content: &GameContent) {
        if !content.items.contains(id) {
            self.push("item", id, referrer);
        }
    }

    fn quest(&mut self, id: &str, referrer: &str, content: &GameContent) {
        if content.quests.get(id).is_none() {
            self.push("quest", id, referrer);
        }
    }

    fn node(&mut self, id: &str, referrer: &str, content: &GameContent) {
        if !content.dialogue.contains(id) {
            self.push("dialogue node", id, referrer);
        }
    }

    fn enemy(&mut self, id: &str, referrer: &str, content: &GameContent) {
        if !content.enemies.contains(id) {
            self.push("enemy", id, referrer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_world_parses_and_validates() {
        let content = GameContent::demo().expect("demo parses");
        let problems = content.dangling_references();
        assert!(problems.is_empty(), "{problems:?}");
        assert!(content.character(&content.start.character).is_some());
        assert!(content.maps.contains(&content.start.map_id));
    }

    #[test]
    fn dangling_teleport_is_reported() {
        let json = r#"{
            "start": { "map_id": "a", "x": 0, "y": 0, "character": "hero" },
            "characters": [{ "id": "hero", "name": "Hero", "hp": 10, "max_hp": 10 }],
            "maps": [{
                "id": "a", "name": "A", "width": 2, "height": 2,
                "events": [{ "id": "door", "x": 1, "y": 1, "type": "teleport",
                             "destination": { "map_id": "nowhere", "x": 0, "y": 0 } }]
            }]
        }"#;
        let content = GameContent::from_json(json).unwrap();
        let err = content.validate().unwrap_err();
        assert!(
            matches!(err, ContentError::Dangling { kind: "map", ref id, .. } if id == "nowhere")
        );
    }
}
