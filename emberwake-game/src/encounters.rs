//! Wild encounter scheduling and roster selection.
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::world::EncounterZone;

/// Randomized step counter. An encounter fires once the in-zone step count
/// reaches a target rolled uniformly from `min..=max`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncounterScheduler {
    steps: u32,
    min: u32,
    max: u32,
    target: u32,
    battles_paused: bool,
}

impl EncounterScheduler {
    pub fn new<R: Rng>(min: u32, max: u32, rng: &mut R) -> Self {
        let min = min.max(1);
        let mut scheduler = Self {
            steps: 0,
            min,
            max: max.max(min),
            target: min,
            battles_paused: false,
        };
        scheduler.reset(rng);
        scheduler
    }

    #[must_use]
    pub const fn steps(&self) -> u32 {
        self.steps
    }

    #[must_use]
    pub const fn target(&self) -> u32 {
        self.target
    }

    #[must_use]
    pub const fn bounds(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    #[must_use]
    pub const fn battles_paused(&self) -> bool {
        self.battles_paused
    }

    pub const fn set_battles_paused(&mut self, paused: bool) {
        self.battles_paused = paused;
    }

    /// Zero the counter and roll a fresh target.
    pub fn reset<R: Rng>(&mut self, rng: &mut R) {
        self.steps = 0;
        let min = self.min.max(1);
        let max = self.max.max(min);
        self.target = min + rng.gen_range(0..=max - min);
    }

    /// Count one in-zone step. Returns `true` when the encounter fires, in
    /// which case the counter has already been reset.
    pub fn record_step<R: Rng>(&mut self, rng: &mut R) -> bool {
        if self.battles_paused {
            return false;
        }
        self.steps = self.steps.saturating_add(1);
        if self.steps < self.target {
            return false;
        }
        log::debug!("step counter fired at {} steps", self.steps);
        self.reset(rng);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WildTrigger {
    StepCounter,
    ZoneChance,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildEncounter {
    pub roster: Vec<String>,
    pub trigger: WildTrigger,
}

/// Evaluate one committed step inside `zone`.
///
/// Zones that author a `trigger_chance` roll independently each step; the
/// rest use the shared step counter.
pub fn evaluate_step<R: Rng>(
    scheduler: &mut EncounterScheduler,
    zone: &EncounterZone,
    rng: &mut R,
) -> Option<WildEncounter> {
    if scheduler.battles_paused() || zone.enemies.is_empty() {
        return None;
    }
    let trigger = if let Some(chance) = zone.trigger_chance {
        if rng.r#gen::<f32>() >= chance.clamp(0.0, 1.0) {
            return None;
        }
        scheduler.reset(rng);
        WildTrigger::ZoneChance
    } else if scheduler.record_step(rng) {
        WildTrigger::StepCounter
    } else {
        return None;
    };
    let roster = pick_roster(zone, rng);
    if roster.is_empty() {
        return None;
    }
    log::info!("wild encounter ({trigger:?}): {}", roster.join(", "));
    Some(WildEncounter { roster, trigger })
}

/// Group of one to `max_group` enemies drawn uniformly from the zone pool.
pub fn pick_roster<R: Rng>(zone: &EncounterZone, rng: &mut R) -> Vec<String> {
    let size = rng.gen_range(1..=zone.max_group.max(1));
    (0..size)
        .filter_map(|_| zone.enemies.choose(rng).cloned())
        .collect()
}
