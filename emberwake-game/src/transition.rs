//! Pending map transitions and encounters.
//!
//! A trigger stages a record without touching the world. The transition view
//! later reports its midpoint, where the record is consumed and its single
//! mutation applied, and its completion, where transient state clears. Each
//! record is consumed at most once no matter how often either signal fires.

use serde::{Deserialize, Serialize};

use crate::world::Destination;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingMapTransition {
    pub destination: Destination,
    pub source_event: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterSource {
    Wild,
    Scripted,
    Dialogue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingEncounter {
    pub roster: Vec<String>,
    /// Story flag set when this battle is won
    pub victory_flag: Option<String>,
    /// One-time map event that staged this battle
    pub source_event: Option<String>,
    pub source: EncounterSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingTransition {
    Map(PendingMapTransition),
    Encounter(PendingEncounter),
}

impl PendingTransition {
    #[must_use]
    pub const fn is_encounter(&self) -> bool {
        matches!(self, Self::Encounter(_))
    }
}

/// The mutation performed at a midpoint, remembered until completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AppliedTransition {
    MapChanged { map_id: String },
    BattleStarted { battle_id: u64 },
    /// The record was consumed but could not be applied
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransitionState {
    pending: Option<PendingTransition>,
    applied: Option<AppliedTransition>,
    visible: bool,
}

impl TransitionState {
    #[must_use]
    pub const fn pending(&self) -> Option<&PendingTransition> {
        self.pending.as_ref()
    }

    #[must_use]
    pub const fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub const fn has_pending_encounter(&self) -> bool {
        matches!(self.pending, Some(PendingTransition::Encounter(_)))
    }

    /// Whether a transition view should currently be on screen.
    #[must_use]
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Whether movement must wait: a record is staged, or one was applied and
    /// the view has not completed yet.
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        self.pending.is_some() || self.applied.is_some()
    }

    /// Stage a record. Refused while another transition is in flight.
    pub fn stage(&mut self, record: PendingTransition) -> bool {
        if self.in_flight() {
            log::debug!("transition already in flight; dropping {record:?}");
            return false;
        }
        log::debug!("staged {record:?}");
        self.pending = Some(record);
        self.visible = true;
        true
    }

    /// Consume the staged record at the view's midpoint. `None` when it was
    /// already consumed or cancelled.
    pub fn take_for_midpoint(&mut self) -> Option<PendingTransition> {
        self.pending.take()
    }

    pub fn mark_applied(&mut self, applied: AppliedTransition) {
        log::debug!("transition applied: {applied:?}");
        self.applied = Some(applied);
    }

    /// Clear transient state at the view's completion and report what the
    /// midpoint did, once.
    pub fn finish(&mut self) -> Option<AppliedTransition> {
        self.visible = false;
        self.applied.take()
    }

    /// Drop any staged record without applying it.
    pub fn cancel(&mut self) -> Option<PendingTransition> {
        self.visible = false;
        self.applied = None;
        let cancelled = self.pending.take();
        if let Some(record) = &cancelled {
            log::debug!("cancelled {record:?}");
        }
        cancelled
    }
}
