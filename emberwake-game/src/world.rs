//! Static map data: terrain, events, NPCs and encounter zones.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::constants::WILD_GROUP_MAX_DEFAULT;
use crate::dialogue::Condition;
use crate::flags::StoryFlags;
use crate::items::ItemGrant;
use crate::quests::{ObjectiveRef, QuestLedger};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    /// Direction of a unit step; `None` for zero or diagonal deltas.
    #[must_use]
    pub const fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Self::Up),
            (0, 1) => Some(Self::Down),
            (-1, 0) => Some(Self::Left),
            (1, 0) => Some(Self::Right),
            _ => None,
        }
    }

    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
            Self::Right => (1, 0),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub x: i32,
    pub y: i32,
    pub map_id: String,
    #[serde(default)]
    pub facing: Direction,
}

impl PlayerPosition {
    #[must_use]
    pub fn new(map_id: impl Into<String>, x: i32, y: i32, facing: Direction) -> Self {
        Self {
            x,
            y,
            map_id: map_id.into(),
            facing,
        }
    }

    #[must_use]
    pub const fn facing_tile(&self) -> (i32, i32) {
        let (dx, dy) = self.facing.delta();
        (self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

/// Where a teleport or door leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Destination {
    pub map_id: String,
    pub x: i32,
    pub y: i32,
    #[serde(default)]
    pub facing: Option<Direction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeleportGate {
    pub destination: Destination,
    #[serde(default)]
    pub required_flags: Vec<String>,
    #[serde(default)]
    pub blocked_message: Option<String>,
}

/// A one-time authored fight. Its `victory_flag` records that it was won.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptedBattle {
    pub enemies: Vec<String>,
    pub victory_flag: String,
    #[serde(default)]
    pub pre_battle_dialogue: Option<String>,
    #[serde(default)]
    pub required_flags: Vec<String>,
    #[serde(default)]
    pub locked_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub set_flags: Vec<String>,
    #[serde(default)]
    pub complete_objective: Option<ObjectiveRef>,
    #[serde(default)]
    pub grant_item: Option<ItemGrant>,
    #[serde(default)]
    pub required_flags: Vec<String>,
    #[serde(default = "enabled")]
    pub one_time: bool,
}

const fn enabled() -> bool {
    true
}

const fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Treasure {
        #[serde(default)]
        gold: u32,
        #[serde(default)]
        items: Vec<ItemGrant>,
    },
    Collectible {
        item_id: String,
        #[serde(default = "one")]
        quantity: u32,
        #[serde(default)]
        required_quest: Option<String>,
    },
    SavePoint,
    Shop {
        shop_id: String,
        #[serde(default)]
        unlock_flag: Option<String>,
        #[serde(default)]
        closed_message: Option<String>,
    },
    Inn {
        #[serde(default)]
        cost: Option<u32>,
    },
    Battle(ScriptedBattle),
    #[serde(alias = "door")]
    Teleport(TeleportGate),
    Trigger(TriggerEvent),
}

impl EventKind {
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Treasure { .. } => "treasure",
            Self::Collectible { .. } => "collectible",
            Self::SavePoint => "save_point",
            Self::Shop { .. } => "shop",
            Self::Inn { .. } => "inn",
            Self::Battle(_) => "battle",
            Self::Teleport(_) => "teleport",
            Self::Trigger(_) => "trigger",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapEvent {
    pub id: String,
    pub x: i32,
    pub y: i32,
    #[serde(flatten)]
    pub kind: EventKind,
    /// Authored as already consumed
    #[serde(default)]
    pub triggered: bool,
}

impl MapEvent {
    /// Events whose effect may be consumed at most once per save.
    #[must_use]
    pub const fn is_one_time(&self) -> bool {
        match &self.kind {
            EventKind::Treasure { .. } | EventKind::Collectible { .. } | EventKind::Battle(_) => {
                true
            }
            EventKind::Trigger(trigger) => trigger.one_time,
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_at(&self, x: i32, y: i32) -> bool {
        self.x == x && self.y == y
    }
}

/// A conditional dialogue entry point for an NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueVariant {
    pub node: String,
    #[serde(default)]
    pub when: Condition,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Npc {
    pub id: String,
    pub name: String,
    pub x: i32,
    pub y: i32,
    /// Default dialogue node
    pub dialogue: String,
    #[serde(default)]
    pub variants: Vec<DialogueVariant>,
    #[serde(default)]
    pub show_flag: Option<String>,
    #[serde(default)]
    pub hide_flag: Option<String>,
}

impl Npc {
    #[must_use]
    pub fn is_visible(&self, flags: &StoryFlags) -> bool {
        let shown = self.show_flag.as_deref().is_none_or(|flag| flags.is_set(flag));
        let hidden = self.hide_flag.as_deref().is_some_and(|flag| flags.is_set(flag));
        shown && !hidden
    }

    /// Start node: the first variant whose condition holds, else the default.
    #[must_use]
    pub fn dialogue_for(&self, flags: &StoryFlags, ledger: &QuestLedger) -> &str {
        self.variants
            .iter()
            .find(|variant| variant.when.holds(flags, ledger))
            .map_or(self.dialogue.as_str(), |variant| variant.node.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncounterZone {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub enemies: Vec<String>,
    /// Per-step probability; zones without one use the step counter.
    #[serde(default)]
    pub trigger_chance: Option<f32>,
    #[serde(default = "EncounterZone::default_max_group")]
    pub max_group: u8,
}

impl EncounterZone {
    const fn default_max_group() -> u8 {
        WILD_GROUP_MAX_DEFAULT
    }

    #[must_use]
    pub const fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x
            && y >= self.y
            && x < self.x.saturating_add(self.width)
            && y < self.y.saturating_add(self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    pub id: String,
    pub name: String,
    pub width: i32,
    pub height: i32,
    /// Row-major; non-zero cells are solid. Empty means fully walkable.
    #[serde(default)]
    pub collision: Vec<u8>,
    #[serde(default)]
    pub events: Vec<MapEvent>,
    #[serde(default)]
    pub npcs: Vec<Npc>,
    #[serde(default)]
    pub encounter_zones: Vec<EncounterZone>,
    #[serde(default = "enabled")]
    pub wild_encounters: bool,
}

impl MapData {
    #[must_use]
    pub const fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.width && y < self.height
    }

    /// Out-of-bounds tiles count as solid.
    #[must_use]
    pub fn is_solid(&self, x: i32, y: i32) -> bool {
        if !self.in_bounds(x, y) {
            return true;
        }
        let Some(idx) = y
            .checked_mul(self.width)
            .and_then(|row| row.checked_add(x))
            .and_then(|idx| usize::try_from(idx).ok())
        else {
            return true;
        };
        self.collision.get(idx).is_some_and(|cell| *cell != 0)
    }

    #[must_use]
    pub fn event(&self, event_id: &str) -> Option<&MapEvent> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn events_at(&self, x: i32, y: i32) -> impl Iterator<Item = &MapEvent> {
        self.events.iter().filter(move |event| event.is_at(x, y))
    }

    /// Visible NPC standing on a tile.
    #[must_use]
    pub fn npc_at(&self, x: i32, y: i32, flags: &StoryFlags) -> Option<&Npc> {
        self.npcs
            .iter()
            .find(|npc| npc.x == x && npc.y == y && npc.is_visible(flags))
    }

    #[must_use]
    pub fn zone_at(&self, x: i32, y: i32) -> Option<&EncounterZone> {
        self.encounter_zones.iter().find(|zone| zone.contains(x, y))
    }
}

/// Map registry keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<MapData>", into = "Vec<MapData>")]
pub struct MapRegistry {
    maps: BTreeMap<String, MapData>,
}

impl MapRegistry {
    #[must_use]
    pub fn get(&self, map_id: &str) -> Option<&MapData> {
        self.maps.get(map_id)
    }

    #[must_use]
    pub fn contains(&self, map_id: &str) -> bool {
        self.maps.contains_key(map_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MapData> {
        self.maps.values()
    }
}

impl From<Vec<MapData>> for MapRegistry {
    fn from(maps: Vec<MapData>) -> Self {
        Self {
            maps: maps.into_iter().map(|map| (map.id.clone(), map)).collect(),
        }
    }
}

impl From<MapRegistry> for Vec<MapData> {
    fn from(registry: MapRegistry) -> Self {
        registry.maps.into_values().collect()
    }
}
