//! The session aggregate: everything that changes during play.
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::battle::ActiveBattle;
use crate::config::SessionConfig;
use crate::dialogue::DialogueInterpreter;
use crate::encounters::{EncounterScheduler, WildEncounter, evaluate_step};
use crate::flags::StoryFlags;
use crate::items::Inventory;
use crate::party::{ExperienceCurve, LevelUp, Party};
use crate::phase::{GamePhase, PhaseController};
use crate::quests::{ObjectiveUpdate, QuestLedger, QuestRewardPayload};
use crate::transition::{PendingEncounter, TransitionState};
use crate::world::{EncounterZone, MapEvent, PlayerPosition};

/// An inn stay waiting for the player to confirm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestRequest {
    pub event_id: String,
    pub cost: u32,
}

/// A shop entry deferred until the current dialogue closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedShop {
    pub shop_id: String,
    pub delay_ms: u32,
}

/// Something the view should tell the player about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    QuestStarted(String),
    ObjectiveUpdated(ObjectiveUpdate),
    QuestCompleted(QuestRewardPayload),
    QuestFailed(String),
    LevelUp(LevelUp),
    ItemObtained { item_id: String, quantity: u32 },
    Recruited(String),
}

/// Overlay visibility and request toggles read by the view layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UiState {
    pub menu_open: bool,
    pub paused: bool,
    pub save_requested: bool,
    pub rest_request: Option<RestRequest>,
}

impl UiState {
    /// Whether an overlay currently swallows movement input.
    #[must_use]
    pub const fn blocks_movement(&self) -> bool {
        self.menu_open || self.paused
    }

    /// Drop any pending save or rest prompt.
    pub fn clear_requests(&mut self) {
        self.save_requested = false;
        self.rest_request = None;
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    phase: PhaseController,
    pub position: PlayerPosition,
    pub party: Party,
    pub inventory: Inventory,
    pub flags: StoryFlags,
    pub quests: QuestLedger,
    /// One-time events already consumed, across all maps
    pub opened_events: BTreeSet<String>,
    pub visited_maps: BTreeSet<String>,
    pub transition: TransitionState,
    pub dialogue: DialogueInterpreter,
    pub encounters: EncounterScheduler,
    pub battle: Option<ActiveBattle>,
    pub ui: UiState,
    pub queued_shop: Option<QueuedShop>,
    pub queued_battle: Option<PendingEncounter>,
    /// Shop currently open, while in the shop phase
    pub shop: Option<String>,
    pub cutscene: Option<String>,
    pub notifications: Vec<Notification>,
    pub play_time_ms: u64,
    pub seed: u64,
    pub config: SessionConfig,
    next_battle_id: u64,
    rng: ChaCha20Rng,
}

impl Session {
    pub(crate) fn new(
        position: PlayerPosition,
        party: Party,
        config: SessionConfig,
        seed: u64,
    ) -> Self {
        let mut rng = ChaCha20Rng::from_seed(Self::seed_bytes(seed));
        let encounters = EncounterScheduler::new(
            config.encounter_min_steps,
            config.encounter_max_steps,
            &mut rng,
        );
        let mut visited_maps = BTreeSet::new();
        visited_maps.insert(position.map_id.clone());
        Self {
            phase: PhaseController::new(GamePhase::IntroCinematic),
            position,
            party,
            inventory: Inventory::with_gold(config.starting_gold),
            flags: StoryFlags::new(),
            quests: QuestLedger::new(),
            opened_events: BTreeSet::new(),
            visited_maps,
            transition: TransitionState::default(),
            dialogue: DialogueInterpreter::default(),
            encounters,
            battle: None,
            ui: UiState::default(),
            queued_shop: None,
            queued_battle: None,
            shop: None,
            cutscene: None,
            notifications: Vec::new(),
            play_time_ms: 0,
            seed,
            config,
            next_battle_id: 1,
            rng,
        }
    }

    /// Spread the session seed over the 32-byte `ChaCha20` key.
    #[must_use]
    pub fn seed_bytes(seed: u64) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for (i, chunk) in bytes.chunks_mut(8).enumerate() {
            let lane = seed.rotate_left(u32::try_from(i * 16).unwrap_or(0));
            chunk.copy_from_slice(&lane.to_le_bytes());
        }
        bytes
    }

    #[must_use]
    pub const fn phase(&self) -> GamePhase {
        self.phase.current()
    }

    #[must_use]
    pub const fn phase_controller(&self) -> &PhaseController {
        &self.phase
    }

    pub(crate) const fn phase_mut(&mut self) -> &mut PhaseController {
        &mut self.phase
    }

    pub(crate) const fn rng(&mut self) -> &mut ChaCha20Rng {
        &mut self.rng
    }

    /// Re-seed randomness, as after a load.
    pub(crate) fn reseed(&mut self, seed: u64) {
        self.seed = seed;
        self.rng = ChaCha20Rng::from_seed(Self::seed_bytes(seed));
    }

    /// Count a step inside `zone` and roll for a wild encounter.
    pub(crate) fn roll_wild_encounter(&mut self, zone: &EncounterZone) -> Option<WildEncounter> {
        evaluate_step(&mut self.encounters, zone, &mut self.rng)
    }

    pub(crate) fn reset_encounters(&mut self) {
        self.encounters.reset(&mut self.rng);
    }

    pub(crate) const fn next_battle_id(&mut self) -> u64 {
        let id = self.next_battle_id;
        self.next_battle_id += 1;
        id
    }

    #[must_use]
    pub fn current_map_id(&self) -> &str {
        &self.position.map_id
    }

    /// Whether a one-time event has already been used up.
    #[must_use]
    pub fn is_consumed(&self, event: &MapEvent) -> bool {
        event.is_one_time() && (event.triggered || self.opened_events.contains(&event.id))
    }

    #[must_use]
    pub const fn experience_curve(&self) -> ExperienceCurve {
        ExperienceCurve::new(self.config.exp_curve_base, self.config.level_cap)
    }

    /// Drop every in-flight record: pending transitions, dialogue, battle,
    /// queued follow-ups and UI requests.
    pub(crate) fn clear_transients(&mut self) {
        self.transition.cancel();
        self.dialogue.clear();
        self.battle = None;
        self.queued_shop = None;
        self.queued_battle = None;
        self.shop = None;
        self.cutscene = None;
        self.ui = UiState::default();
    }
}
