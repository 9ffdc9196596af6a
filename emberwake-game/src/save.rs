//! Save slots: snapshot, schema migration, and restore.
//!
//! Records are stored as JSON text. Loading parses into a generic value first
//! so older schema versions can be back-filled before the typed decode.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::convert::Infallible;
use thiserror::Error;

use crate::SaveStorage;
use crate::constants::SAVE_VERSION;
use crate::flags::StoryFlags;
use crate::items::Inventory;
use crate::party::Party;
use crate::phase::GamePhase;
use crate::quests::{QuestLedger, QuestProgress};
use crate::session::GameSession;
use crate::world::PlayerPosition;

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("slot {slot} is out of range (1..={max})")]
    InvalidSlot { slot: u8, max: u8 },
    #[error("cannot save during {0}")]
    Busy(GamePhase),
    #[error("failed to encode save: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("save storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("slot {slot} is out of range (1..={max})")]
    InvalidSlot { slot: u8, max: u8 },
    #[error("slot {0} is empty")]
    NotFound(u8),
    #[error("save data is corrupt: {0}")]
    Corrupt(String),
    #[error("save version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("saved map {0} no longer exists")]
    UnknownMap(String),
    #[error("save storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuests {
    #[serde(default)]
    pub active: Vec<QuestProgress>,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub failed: Vec<String>,
}

/// One persisted slot at the current schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRecord {
    pub version: u32,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub play_time_ms: u64,
    pub location_name: String,
    pub party: Party,
    pub inventory: Inventory,
    pub story_flags: StoryFlags,
    pub quests: SavedQuests,
    pub opened_event_ids: Vec<String>,
    pub visited_map_ids: Vec<String>,
    pub current_map_id: String,
    pub player_position: PlayerPosition,
}

/// What the slot picker shows for an occupied slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSummary {
    pub slot: u8,
    pub location_name: String,
    pub play_time_ms: u64,
    pub timestamp: i64,
    pub lead_level: u32,
}

impl SlotSummary {
    fn of(slot: u8, record: &SaveRecord) -> Self {
        Self {
            slot,
            location_name: record.location_name.clone(),
            play_time_ms: record.play_time_ms,
            timestamp: record.timestamp,
            lead_level: record.party.leader().map_or(0, |c| c.level),
        }
    }
}

fn as_object<'a>(
    value: &'a mut Value,
    field: &str,
) -> Result<&'a mut serde_json::Map<String, Value>, LoadError> {
    value
        .as_object_mut()
        .ok_or_else(|| LoadError::Corrupt(format!("{field} is not an object")))
}

/// Bring a raw record up to [`SAVE_VERSION`].
///
/// Version 1 lacked `visitedMapIds` and `quests.failed`; version 2 lacked
/// `inventory.shards` and `playTimeMs`.
///
/// # Errors
///
/// Fails on records from a newer version or whose top-level shape is wrong.
pub fn migrate(mut raw: Value) -> Result<Value, LoadError> {
    let version = match raw.get("version") {
        None => 1,
        Some(v) => v
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| LoadError::Corrupt("version is not a number".to_string()))?,
    };
    if version > SAVE_VERSION {
        return Err(LoadError::UnsupportedVersion {
            found: version,
            supported: SAVE_VERSION,
        });
    }
    let record = as_object(&mut raw, "record")?;
    if version < 2 {
        log::info!("migrating save from v{version} to v2");
        let current = record
            .get("currentMapId")
            .and_then(Value::as_str)
            .map(|id| Value::String(id.to_string()));
        let visited = record
            .entry("visitedMapIds")
            .or_insert_with(|| json!([]));
        if let (Some(list), Some(map_id)) = (visited.as_array_mut(), current)
            && !list.contains(&map_id)
        {
            list.push(map_id);
        }
        let quests = record.entry("quests").or_insert_with(|| json!({}));
        as_object(quests, "quests")?
            .entry("failed")
            .or_insert_with(|| json!([]));
    }
    if version < 3 {
        log::info!("migrating save from v{} to v3", version.max(2));
        let inventory = record.entry("inventory").or_insert_with(|| json!({}));
        as_object(inventory, "inventory")?
            .entry("shards")
            .or_insert_with(|| json!(0));
        record.entry("playTimeMs").or_insert_with(|| json!(0));
    }
    record.insert("version".to_string(), json!(SAVE_VERSION));
    Ok(raw)
}

/// Parse stored text, migrating it to a current record.
///
/// # Errors
///
/// [`LoadError::Corrupt`] for unparseable text, plus any migration failure.
pub fn decode_record(text: &str) -> Result<SaveRecord, LoadError> {
    let raw: Value =
        serde_json::from_str(text).map_err(|err| LoadError::Corrupt(err.to_string()))?;
    let current = migrate(raw)?;
    serde_json::from_value(current).map_err(|err| LoadError::Corrupt(err.to_string()))
}

/// Slots kept in memory, for tests and headless runs.
#[derive(Debug, Default)]
pub struct MemorySlotStorage {
    slots: RefCell<BTreeMap<u8, String>>,
}

impl MemorySlotStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Put raw text into a slot, bypassing encoding.
    pub fn insert_raw(&self, slot: u8, text: impl Into<String>) {
        self.slots.borrow_mut().insert(slot, text.into());
    }

    #[must_use]
    pub fn raw(&self, slot: u8) -> Option<String> {
        self.slots.borrow().get(&slot).cloned()
    }
}

impl SaveStorage for MemorySlotStorage {
    type Error = Infallible;

    fn read_slot(&self, slot: u8) -> Result<Option<String>, Self::Error> {
        Ok(self.slots.borrow().get(&slot).cloned())
    }

    fn write_slot(&self, slot: u8, data: &str) -> Result<(), Self::Error> {
        self.slots.borrow_mut().insert(slot, data.to_string());
        Ok(())
    }

    fn delete_slot(&self, slot: u8) -> Result<(), Self::Error> {
        self.slots.borrow_mut().remove(&slot);
        Ok(())
    }
}

impl GameSession {
    const fn slot_bounds(&self, slot: u8) -> Result<(), (u8, u8)> {
        let max = self.state.config.save_slots;
        if slot == 0 || slot > max {
            Err((slot, max))
        } else {
            Ok(())
        }
    }

    /// Snapshot everything a save slot keeps.
    #[must_use]
    pub fn snapshot(&self) -> SaveRecord {
        let state = &self.state;
        let location_name = self
            .current_map()
            .map_or_else(|| state.current_map_id().to_string(), |map| map.name.clone());
        SaveRecord {
            version: SAVE_VERSION,
            timestamp: chrono::Utc::now().timestamp_millis(),
            play_time_ms: state.play_time_ms,
            location_name,
            party: state.party.clone(),
            inventory: state.inventory.clone(),
            story_flags: state.flags.clone(),
            quests: SavedQuests {
                active: state.quests.active().to_vec(),
                completed: state.quests.completed().to_vec(),
                failed: state.quests.failed().to_vec(),
            },
            opened_event_ids: state.opened_events.iter().cloned().collect(),
            visited_map_ids: state.visited_maps.iter().cloned().collect(),
            current_map_id: state.current_map_id().to_string(),
            player_position: state.position.clone(),
        }
    }

    /// Write the current session into `slot`. Only allowed while exploring
    /// with nothing in flight.
    ///
    /// # Errors
    ///
    /// Fails for an out-of-range slot, a busy session, or a storage error.
    pub fn save<S: SaveStorage>(
        &mut self,
        storage: &S,
        slot: u8,
    ) -> Result<SlotSummary, SaveError> {
        self.slot_bounds(slot)
            .map_err(|(slot, max)| SaveError::InvalidSlot { slot, max })?;
        if self.state.phase() != GamePhase::Exploring || self.state.transition.in_flight() {
            return Err(SaveError::Busy(self.state.phase()));
        }
        let record = self.snapshot();
        let text = serde_json::to_string(&record)?;
        storage
            .write_slot(slot, &text)
            .map_err(|err| SaveError::Storage(err.to_string()))?;
        self.state.ui.save_requested = false;
        log::info!("saved slot {slot} at {}", record.location_name);
        Ok(SlotSummary::of(slot, &record))
    }

    /// Replace the session with the record in `slot`. On any failure the
    /// session is left exactly as it was.
    ///
    /// # Errors
    ///
    /// Fails for an out-of-range or empty slot, unreadable or unsupported
    /// data, a map missing from content, or a storage error.
    pub fn load<S: SaveStorage>(
        &mut self,
        storage: &S,
        slot: u8,
    ) -> Result<SlotSummary, LoadError> {
        self.slot_bounds(slot)
            .map_err(|(slot, max)| LoadError::InvalidSlot { slot, max })?;
        let text = storage
            .read_slot(slot)
            .map_err(|err| LoadError::Storage(err.to_string()))?
            .ok_or(LoadError::NotFound(slot))?;
        let record = decode_record(&text)?;
        if !self.content.maps.contains(&record.current_map_id) {
            return Err(LoadError::UnknownMap(record.current_map_id));
        }
        let summary = SlotSummary::of(slot, &record);
        self.restore(record);
        log::info!("loaded slot {slot} at {}", summary.location_name);
        Ok(summary)
    }

    fn restore(&mut self, record: SaveRecord) {
        let state = &mut self.state;
        state.clear_transients();
        state.notifications.clear();
        state.position = record.player_position;
        state.position.map_id = record.current_map_id;
        state.party = record.party;
        state.inventory = record.inventory;
        state.flags = record.story_flags;
        state.quests = QuestLedger::from_parts(
            record.quests.active,
            record.quests.completed,
            record.quests.failed,
        );
        state.opened_events = record.opened_event_ids.into_iter().collect();
        let mut visited: BTreeSet<String> = record.visited_map_ids.into_iter().collect();
        visited.insert(state.position.map_id.clone());
        state.visited_maps = visited;
        state.play_time_ms = record.play_time_ms;
        state.phase_mut().restore(GamePhase::Exploring);
        let seed = state.seed;
        state.reseed(seed);
        state.reset_encounters();
    }

    /// Summaries of every occupied slot. Unreadable slots are skipped.
    ///
    /// # Errors
    ///
    /// Fails only when the storage itself fails.
    pub fn list_slots<S: SaveStorage>(
        &self,
        storage: &S,
    ) -> Result<Vec<SlotSummary>, LoadError> {
        let mut summaries = Vec::new();
        for slot in 1..=self.state.config.save_slots {
            let Some(text) = storage
                .read_slot(slot)
                .map_err(|err| LoadError::Storage(err.to_string()))?
            else {
                continue;
            };
            match decode_record(&text) {
                Ok(record) => summaries.push(SlotSummary::of(slot, &record)),
                Err(err) => log::warn!("slot {slot} unreadable: {err}"),
            }
        }
        Ok(summaries)
    }

    /// # Errors
    ///
    /// Fails for an out-of-range slot or a storage error.
    pub fn delete_slot<S: SaveStorage>(&self, storage: &S, slot: u8) -> Result<(), SaveError> {
        self.slot_bounds(slot)
            .map_err(|(slot, max)| SaveError::InvalidSlot { slot, max })?;
        storage
            .delete_slot(slot)
            .map_err(|err| SaveError::Storage(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v1_record_gains_visited_maps_and_failed_quests() {
        let raw = json!({
            "version": 1,
            "currentMapId": "village",
            "quests": { "active": [], "completed": ["intro"] },
            "inventory": { "gold": 10, "items": [] }
        });
        let migrated = migrate(raw).unwrap();
        assert_eq!(migrated["version"], json!(SAVE_VERSION));
        assert_eq!(migrated["visitedMapIds"], json!(["village"]));
        assert_eq!(migrated["quests"]["failed"], json!([]));
        assert_eq!(migrated["inventory"]["shards"], json!(0));
        assert_eq!(migrated["playTimeMs"], json!(0));
    }

    #[test]
    fn v2_keeps_existing_fields() {
        let raw = json!({
            "version": 2,
            "visitedMapIds": ["a", "b"],
            "inventory": { "gold": 3, "shards": 7 }
        });
        let migrated = migrate(raw).unwrap();
        assert_eq!(migrated["visitedMapIds"], json!(["a", "b"]));
        assert_eq!(migrated["inventory"]["shards"], json!(7));
    }

    #[test]
    fn newer_versions_are_refused() {
        let err = migrate(json!({ "version": SAVE_VERSION + 1 })).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedVersion { .. }));
    }

    #[test]
    fn garbage_is_corrupt() {
        assert!(matches!(
            decode_record("{ not json"),
            Err(LoadError::Corrupt(_))
        ));
        assert!(matches!(decode_record("[1, 2]"), Err(LoadError::Corrupt(_))));
    }

    #[test]
    fn memory_storage_round_trips_text() {
        let storage = MemorySlotStorage::new();
        storage.write_slot(1, "{}").unwrap();
        assert_eq!(storage.read_slot(1).unwrap().as_deref(), Some("{}"));
        storage.delete_slot(1).unwrap();
        assert!(storage.read_slot(1).unwrap().is_none());
    }
}
