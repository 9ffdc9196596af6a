//! Quest definitions and the runtime quest ledger.
//!
//! A quest id lives in at most one of the ledger's active, completed or failed
//! collections. Active quests carry per-objective progress that only grows
//! and never exceeds the objective's target quantity. Completion is always an
//! explicit call; the ledger never infers it from objective state.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::constants::{FLAG_QUEST_COMPLETED_PREFIX, FLAG_QUEST_STARTED_PREFIX};
use crate::flags::StoryFlags;
use crate::items::{Inventory, ItemCatalog, ItemGrant};
use crate::party::{Character, ExperienceCurve, LevelUps, Party};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    Collect,
    Deliver,
    Talk,
    Defeat,
    Explore,
}

const fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub kind: ObjectiveKind,
    /// Item, NPC, enemy or map id depending on `kind`
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default = "one")]
    pub quantity: u32,
    /// Recipient NPC for deliver objectives
    #[serde(default)]
    pub deliver_to: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub optional: bool,
}

impl Objective {
    #[must_use]
    pub fn target_quantity(&self) -> u32 {
        self.quantity.max(1)
    }

    fn targets(&self, kind: ObjectiveKind, target: &str) -> bool {
        self.kind == kind && self.target.as_deref() == Some(target)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuestRewards {
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub shards: u32,
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub items: Vec<ItemGrant>,
    #[serde(default)]
    pub flags: Vec<String>,
    /// Character that joins the party on completion
    #[serde(default)]
    pub recruit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuestPrerequisites {
    #[serde(default)]
    pub required_flags: Vec<String>,
    #[serde(default)]
    pub required_quests: Vec<String>,
    #[serde(default)]
    pub required_level: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub objectives: Vec<Objective>,
    #[serde(default)]
    pub rewards: QuestRewards,
    #[serde(default)]
    pub prerequisites: QuestPrerequisites,
}

impl Quest {
    #[must_use]
    pub fn objective(&self, objective_id: &str) -> Option<&Objective> {
        self.objectives.iter().find(|o| o.id == objective_id)
    }
}

/// Quest definitions keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<Quest>", into = "Vec<Quest>")]
pub struct QuestBook {
    quests: BTreeMap<String, Quest>,
}

impl QuestBook {
    #[must_use]
    pub fn get(&self, quest_id: &str) -> Option<&Quest> {
        self.quests.get(quest_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Quest> {
        self.quests.values()
    }
}

impl From<Vec<Quest>> for QuestBook {
    fn from(quests: Vec<Quest>) -> Self {
        Self {
            quests: quests.into_iter().map(|q| (q.id.clone(), q)).collect(),
        }
    }
}

impl From<QuestBook> for Vec<Quest> {
    fn from(book: QuestBook) -> Self {
        book.quests.into_values().collect()
    }
}

/// Points at one objective of one quest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveRef {
    pub quest_id: String,
    pub objective_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    NotStarted,
    Active,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveProgress {
    pub objective_id: String,
    pub current_progress: u32,
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestProgress {
    pub quest_id: String,
    pub objectives: Vec<ObjectiveProgress>,
}

impl QuestProgress {
    fn fresh(quest: &Quest) -> Self {
        Self {
            quest_id: quest.id.clone(),
            objectives: quest
                .objectives
                .iter()
                .map(|objective| ObjectiveProgress {
                    objective_id: objective.id.clone(),
                    current_progress: 0,
                    is_complete: false,
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn objective(&self, objective_id: &str) -> Option<&ObjectiveProgress> {
        self.objectives
            .iter()
            .find(|o| o.objective_id == objective_id)
    }

    fn objective_mut(&mut self, objective_id: &str) -> Option<&mut ObjectiveProgress> {
        self.objectives
            .iter_mut()
            .find(|o| o.objective_id == objective_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuestError {
    #[error("quest {0} is not defined")]
    UnknownQuest(String),
    #[error("quest {0} is already active")]
    AlreadyActive(String),
    #[error("quest {0} is already completed")]
    AlreadyCompleted(String),
    #[error("quest {0} has already failed")]
    AlreadyFailed(String),
    #[error("quest {quest_id} requires flag {flag}")]
    MissingFlag { quest_id: String, flag: String },
    #[error("quest {quest_id} requires quest {required} to be completed")]
    MissingPrerequisite { quest_id: String, required: String },
    #[error("quest {quest_id} requires level {required} (party best {actual})")]
    LevelTooLow {
        quest_id: String,
        required: u32,
        actual: u32,
    },
}

/// One objective's progress change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveUpdate {
    pub quest_id: String,
    pub objective_id: String,
    pub progress: u32,
    pub target: u32,
    /// Set only on the update that completed the objective
    pub completed_now: bool,
}

pub type ObjectiveUpdates = SmallVec<[ObjectiveUpdate; 2]>;

/// Rewards actually granted by a quest completion, for UI notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestRewardPayload {
    pub quest_id: String,
    pub title: String,
    pub gold: u32,
    pub shards: u32,
    pub experience: u32,
    /// Quantities that fit in the inventory
    pub items: Vec<ItemGrant>,
    pub flags: Vec<String>,
    pub recruited: Option<String>,
    #[serde(skip)]
    pub level_ups: LevelUps,
}

/// Session slices that quest rewards may touch.
pub struct RewardTarget<'a> {
    pub flags: &'a mut StoryFlags,
    pub inventory: &'a mut Inventory,
    pub party: &'a mut Party,
    pub items: &'a ItemCatalog,
    pub recruits: &'a [Character],
    pub max_stack: u32,
    pub curve: ExperienceCurve,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct QuestLedger {
    #[serde(default)]
    active: Vec<QuestProgress>,
    #[serde(default)]
    completed: Vec<String>,
    #[serde(default)]
    failed: Vec<String>,
}

impl QuestLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a ledger from persisted parts. Ids that appear in more than
    /// one collection keep the strongest resolution (completed, then failed,
    /// then active).
    #[must_use]
    pub fn from_parts(
        active: Vec<QuestProgress>,
        completed: Vec<String>,
        failed: Vec<String>,
    ) -> Self {
        let mut ledger = Self::default();
        for id in completed {
            if !ledger.completed.contains(&id) {
                ledger.completed.push(id);
            }
        }
        for id in failed {
            if ledger.completed.contains(&id) || ledger.failed.contains(&id) {
                log::warn!("dropping duplicate failed quest {id}");
                continue;
            }
            ledger.failed.push(id);
        }
        for progress in active {
            if ledger.status(&progress.quest_id) != QuestStatus::NotStarted {
                log::warn!("dropping duplicate active quest {}", progress.quest_id);
                continue;
            }
            ledger.active.push(progress);
        }
        ledger
    }

    #[must_use]
    pub fn status(&self, quest_id: &str) -> QuestStatus {
        if self.completed.iter().any(|id| id == quest_id) {
            QuestStatus::Completed
        } else if self.failed.iter().any(|id| id == quest_id) {
            QuestStatus::Failed
        } else if self.progress(quest_id).is_some() {
            QuestStatus::Active
        } else {
            QuestStatus::NotStarted
        }
    }

    #[must_use]
    pub fn is_active(&self, quest_id: &str) -> bool {
        self.progress(quest_id).is_some()
    }

    #[must_use]
    pub fn is_completed(&self, quest_id: &str) -> bool {
        self.completed.iter().any(|id| id == quest_id)
    }

    #[must_use]
    pub fn progress(&self, quest_id: &str) -> Option<&QuestProgress> {
        self.active.iter().find(|p| p.quest_id == quest_id)
    }

    fn progress_mut(&mut self, quest_id: &str) -> Option<&mut QuestProgress> {
        self.active.iter_mut().find(|p| p.quest_id == quest_id)
    }

    #[must_use]
    pub fn active(&self) -> &[QuestProgress] {
        &self.active
    }

    #[must_use]
    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    #[must_use]
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.completed.is_empty() && self.failed.is_empty()
    }

    /// Check every start precondition without mutating anything.
    ///
    /// # Errors
    ///
    /// Returns the first unmet precondition.
    pub fn can_start(
        &self,
        quest: &Quest,
        flags: &StoryFlags,
        party_level: u32,
    ) -> Result<(), QuestError> {
        match self.status(&quest.id) {
            QuestStatus::Active => return Err(QuestError::AlreadyActive(quest.id.clone())),
            QuestStatus::Completed => return Err(QuestError::AlreadyCompleted(quest.id.clone())),
            QuestStatus::Failed => return Err(QuestError::AlreadyFailed(quest.id.clone())),
            QuestStatus::NotStarted => {}
        }
        let prereq = &quest.prerequisites;
        if let Some(flag) = flags.first_missing(&prereq.required_flags) {
            return Err(QuestError::MissingFlag {
                quest_id: quest.id.clone(),
                flag: flag.to_string(),
            });
        }
        if let Some(required) = prereq
            .required_quests
            .iter()
            .find(|required| !self.is_completed(required))
        {
            return Err(QuestError::MissingPrerequisite {
                quest_id: quest.id.clone(),
                required: required.clone(),
            });
        }
        if let Some(required) = prereq.required_level
            && party_level < required
        {
            return Err(QuestError::LevelTooLow {
                quest_id: quest.id.clone(),
                required,
                actual: party_level,
            });
        }
        Ok(())
    }

    /// Start a quest with every objective at zero and record the
    /// `quest_started:<id>` flag.
    ///
    /// # Errors
    ///
    /// Returns the unmet precondition; the ledger and flags are untouched.
    pub fn start_quest(
        &mut self,
        quest: &Quest,
        flags: &mut StoryFlags,
        party_level: u32,
    ) -> Result<(), QuestError> {
        self.can_start(quest, flags, party_level)?;
        self.active.push(QuestProgress::fresh(quest));
        flags.set(format!("{FLAG_QUEST_STARTED_PREFIX}{}", quest.id));
        log::info!("quest started: {}", quest.id);
        Ok(())
    }

    /// Move an objective to `value`, never backwards and never past target.
    pub fn set_objective_progress(
        &mut self,
        quest: &Quest,
        objective_id: &str,
        value: u32,
    ) -> Option<ObjectiveUpdate> {
        let target = quest.objective(objective_id)?.target_quantity();
        let progress = self.progress_mut(&quest.id)?;
        let objective = progress.objective_mut(objective_id)?;
        if objective.is_complete {
            return None;
        }
        let next = value.min(target).max(objective.current_progress);
        if next == objective.current_progress {
            return None;
        }
        objective.current_progress = next;
        objective.is_complete = next >= target;
        Some(ObjectiveUpdate {
            quest_id: quest.id.clone(),
            objective_id: objective_id.to_string(),
            progress: next,
            target,
            completed_now: objective.is_complete,
        })
    }

    /// Add `amount` to an objective, clamped to its target.
    pub fn advance_objective(
        &mut self,
        quest: &Quest,
        objective_id: &str,
        amount: u32,
    ) -> Option<ObjectiveUpdate> {
        let current = self
            .progress(&quest.id)?
            .objective(objective_id)?
            .current_progress;
        self.set_objective_progress(quest, objective_id, current.saturating_add(amount))
    }

    /// Mark an objective complete, snapping its progress to target.
    pub fn complete_objective(
        &mut self,
        quest: &Quest,
        objective_id: &str,
    ) -> Option<ObjectiveUpdate> {
        let target = quest.objective(objective_id)?.target_quantity();
        self.set_objective_progress(quest, objective_id, target)
    }

    #[must_use]
    pub fn is_objective_complete(&self, quest_id: &str, objective_id: &str) -> bool {
        self.progress(quest_id)
            .and_then(|p| p.objective(objective_id))
            .is_some_and(|o| o.is_complete)
    }

    /// Whether every non-optional objective of an active quest is complete.
    #[must_use]
    pub fn required_objectives_complete(&self, quest: &Quest) -> bool {
        let Some(progress) = self.progress(&quest.id) else {
            return false;
        };
        quest
            .objectives
            .iter()
            .filter(|o| !o.optional)
            .all(|o| progress.objective(&o.id).is_some_and(|p| p.is_complete))
    }

    /// Advance every active collect objective targeting `item_id`.
    pub fn on_item_collected(
        &mut self,
        book: &QuestBook,
        item_id: &str,
        quantity: u32,
    ) -> ObjectiveUpdates {
        self.record_action(book, ObjectiveKind::Collect, item_id, quantity)
    }

    /// Advance every active objective of `kind` aimed at `target`.
    pub fn record_action(
        &mut self,
        book: &QuestBook,
        kind: ObjectiveKind,
        target: &str,
        amount: u32,
    ) -> ObjectiveUpdates {
        let hits: Vec<(String, String)> = self
            .active
            .iter()
            .filter_map(|progress| book.get(&progress.quest_id))
            .flat_map(|quest| {
                quest
                    .objectives
                    .iter()
                    .filter(move |o| o.targets(kind, target))
                    .map(move |o| (quest.id.clone(), o.id.clone()))
            })
            .collect();
        let mut updates = ObjectiveUpdates::new();
        for (quest_id, objective_id) in hits {
            let Some(quest) = book.get(&quest_id) else {
                continue;
            };
            if let Some(update) = self.advance_objective(quest, &objective_id, amount) {
                log::debug!(
                    "objective {}/{} at {}/{}",
                    update.quest_id,
                    update.objective_id,
                    update.progress,
                    update.target
                );
                updates.push(update);
            }
        }
        updates
    }

    /// Hand over items for every open deliver objective addressed to `npc_id`.
    /// Partial deliveries count; items are only taken up to what is still owed.
    pub fn deliver_to(
        &mut self,
        book: &QuestBook,
        npc_id: &str,
        inventory: &mut Inventory,
    ) -> ObjectiveUpdates {
        let owed: Vec<(String, String, String, u32)> = self
            .active
            .iter()
            .filter_map(|progress| book.get(&progress.quest_id).map(|q| (q, progress)))
            .flat_map(|(quest, progress)| {
                quest.objectives.iter().filter_map(move |o| {
                    let open = progress.objective(&o.id).filter(|p| !p.is_complete)?;
                    if o.kind != ObjectiveKind::Deliver || o.deliver_to.as_deref() != Some(npc_id)
                    {
                        return None;
                    }
                    let item = o.target.clone()?;
                    let remaining = o.target_quantity().saturating_sub(open.current_progress);
                    Some((quest.id.clone(), o.id.clone(), item, remaining))
                })
            })
            .collect();
        let mut updates = ObjectiveUpdates::new();
        for (quest_id, objective_id, item_id, remaining) in owed {
            let handed = inventory.quantity(&item_id).min(remaining);
            if handed == 0 {
                continue;
            }
            let Some(quest) = book.get(&quest_id) else {
                continue;
            };
            if inventory.remove(&item_id, handed).is_ok()
                && let Some(update) = self.advance_objective(quest, &objective_id, handed)
            {
                updates.push(update);
            }
        }
        updates
    }

    /// Resolve an active quest as completed and grant its rewards.
    /// Returns `None` if the quest is not active.
    pub fn complete_quest(
        &mut self,
        quest: &Quest,
        target: RewardTarget<'_>,
    ) -> Option<QuestRewardPayload> {
        let idx = self.active.iter().position(|p| p.quest_id == quest.id)?;
        self.active.remove(idx);
        self.completed.push(quest.id.clone());

        let rewards = &quest.rewards;
        target.inventory.add_gold(rewards.gold);
        target.inventory.add_shards(rewards.shards);
        let mut granted = Vec::with_capacity(rewards.items.len());
        for grant in &rewards.items {
            let limit = target.items.stack_limit(&grant.item_id, target.max_stack);
            let result = target.inventory.add(&grant.item_id, grant.quantity, limit);
            if result.overflow > 0 {
                log::warn!(
                    "quest {} reward {} overflowed by {}",
                    quest.id,
                    grant.item_id,
                    result.overflow
                );
            }
            if result.added > 0 {
                granted.push(ItemGrant::new(grant.item_id.clone(), result.added));
            }
        }
        for flag in &rewards.flags {
            target.flags.set(flag.clone());
        }
        target
            .flags
            .set(format!("{FLAG_QUEST_COMPLETED_PREFIX}{}", quest.id));

        let recruited = rewards.recruit.as_ref().and_then(|recruit_id| {
            let recruit = target.recruits.iter().find(|c| &c.id == recruit_id);
            if recruit.is_none() {
                log::warn!("quest {} names unknown recruit {recruit_id}", quest.id);
            }
            recruit
                .filter(|c| target.party.recruit((*c).clone()))
                .map(|c| c.id.clone())
        });
        let level_ups = target
            .party
            .award_experience(rewards.experience, &target.curve);

        log::info!("quest completed: {}", quest.id);
        Some(QuestRewardPayload {
            quest_id: quest.id.clone(),
            title: quest.title.clone(),
            gold: rewards.gold,
            shards: rewards.shards,
            experience: rewards.experience,
            items: granted,
            flags: rewards.flags.clone(),
            recruited,
            level_ups,
        })
    }

    /// Resolve an active quest as failed. No rewards are granted.
    pub fn fail_quest(&mut self, quest_id: &str) -> bool {
        let Some(idx) = self.active.iter().position(|p| p.quest_id == quest_id) else {
            return false;
        };
        self.active.remove(idx);
        self.failed.push(quest_id.to_string());
        log::info!("quest failed: {quest_id}");
        true
    }
}
