//! Dialogue graph, data-driven side effects, and the node interpreter.
//!
//! The interpreter never touches session state. It resolves where a move in
//! the graph lands and hands back the effects attached to it; the session runs
//! those effects and only then commits the new node.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::flags::StoryFlags;
use crate::quests::{ObjectiveRef, ObjectiveUpdate, QuestLedger, QuestRewardPayload, QuestStatus};

const fn one() -> u32 {
    1
}

/// One side effect attached to a node, a choice, or a node's end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum DialogueEffect {
    SetFlag {
        flag: String,
    },
    ClearFlag {
        flag: String,
    },
    StartQuest {
        quest_id: String,
    },
    AdvanceObjective {
        quest_id: String,
        objective_id: String,
        #[serde(default = "one")]
        amount: u32,
    },
    CompleteObjective {
        quest_id: String,
        objective_id: String,
    },
    CompleteQuest {
        quest_id: String,
    },
    FailQuest {
        quest_id: String,
    },
    GiveItem {
        item_id: String,
        #[serde(default = "one")]
        quantity: u32,
    },
    TakeItem {
        item_id: String,
        #[serde(default = "one")]
        quantity: u32,
    },
    GiveGold {
        amount: u32,
    },
    TakeGold {
        amount: u32,
    },
    /// Enter the shop once the dialogue closes
    OpenShop {
        shop_id: String,
        #[serde(default)]
        delay_ms: u32,
    },
    /// Stage a battle that becomes pending once the dialogue closes
    ScheduleBattle {
        enemies: Vec<String>,
        #[serde(default)]
        victory_flag: Option<String>,
    },
    RestoreParty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueChoice {
    pub label: String,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub effects: Vec<DialogueEffect>,
    #[serde(default)]
    pub requires_flag: Option<String>,
}

impl DialogueChoice {
    #[must_use]
    pub fn is_available(&self, flags: &StoryFlags) -> bool {
        self.requires_flag
            .as_deref()
            .is_none_or(|flag| flags.is_set(flag))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: String,
    #[serde(default)]
    pub speaker: Option<String>,
    pub text: String,
    #[serde(default)]
    pub choices: Vec<DialogueChoice>,
    /// Implicit continuation when the node has no choices
    #[serde(default)]
    pub next: Option<String>,
    /// Run when the node is reached, before it becomes active
    #[serde(default)]
    pub on_enter: Vec<DialogueEffect>,
    /// Run when the dialogue ends on this node
    #[serde(default)]
    pub on_end: Vec<DialogueEffect>,
}

impl DialogueNode {
    #[must_use]
    pub fn has_choices(&self) -> bool {
        !self.choices.is_empty()
    }

    /// Choices whose gating flag holds, in authored order.
    pub fn available_choices<'a>(
        &'a self,
        flags: &'a StoryFlags,
    ) -> impl Iterator<Item = &'a DialogueChoice> + 'a {
        self.choices.iter().filter(|choice| choice.is_available(flags))
    }

    /// The `index`-th available choice.
    #[must_use]
    pub fn available_choice(&self, index: usize, flags: &StoryFlags) -> Option<&DialogueChoice> {
        self.choices
            .iter()
            .filter(|choice| choice.is_available(flags))
            .nth(index)
    }
}

/// Dialogue nodes keyed by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<DialogueNode>", into = "Vec<DialogueNode>")]
pub struct DialogueRegistry {
    nodes: BTreeMap<String, DialogueNode>,
}

impl DialogueRegistry {
    #[must_use]
    pub fn get(&self, node_id: &str) -> Option<&DialogueNode> {
        self.nodes.get(node_id)
    }

    #[must_use]
    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains_key(node_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DialogueNode> {
        self.nodes.values()
    }
}

impl From<Vec<DialogueNode>> for DialogueRegistry {
    fn from(nodes: Vec<DialogueNode>) -> Self {
        Self {
            nodes: nodes.into_iter().map(|n| (n.id.clone(), n)).collect(),
        }
    }
}

impl From<DialogueRegistry> for Vec<DialogueNode> {
    fn from(registry: DialogueRegistry) -> Self {
        registry.nodes.into_values().collect()
    }
}

/// Story and quest predicate used by NPC dialogue variants.
/// An empty condition always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Condition {
    #[serde(default)]
    pub flags_set: Vec<String>,
    #[serde(default)]
    pub flags_unset: Vec<String>,
    #[serde(default)]
    pub quests_active: Vec<String>,
    #[serde(default)]
    pub quests_completed: Vec<String>,
    #[serde(default)]
    pub quests_not_started: Vec<String>,
    #[serde(default)]
    pub objectives_complete: Vec<ObjectiveRef>,
}

impl Condition {
    #[must_use]
    pub fn holds(&self, flags: &StoryFlags, ledger: &QuestLedger) -> bool {
        let status_is = |ids: &Vec<String>, status: QuestStatus| {
            ids.iter().all(|id| ledger.status(id) == status)
        };
        flags.all_set(&self.flags_set)
            && self.flags_unset.iter().all(|flag| !flags.is_set(flag))
            && status_is(&self.quests_active, QuestStatus::Active)
            && status_is(&self.quests_completed, QuestStatus::Completed)
            && status_is(&self.quests_not_started, QuestStatus::NotStarted)
            && self
                .objectives_complete
                .iter()
                .all(|o| ledger.is_objective_complete(&o.quest_id, &o.objective_id))
    }
}

/// What the dialogue box is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveDialogue {
    Node {
        node_id: String,
    },
    /// A standalone blocking message that is not part of the graph
    Message {
        speaker: Option<String>,
        text: String,
    },
}

/// A resolved move through the dialogue graph, not yet applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueStep {
    Enter {
        node_id: String,
        effects: Vec<DialogueEffect>,
    },
    End {
        effects: Vec<DialogueEffect>,
    },
}

impl DialogueStep {
    #[must_use]
    pub fn effects(&self) -> &[DialogueEffect] {
        match self {
            Self::Enter { effects, .. } | Self::End { effects } => effects,
        }
    }
}

/// Holds at most one active node or message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DialogueInterpreter {
    active: Option<ActiveDialogue>,
}

impl DialogueInterpreter {
    #[must_use]
    pub const fn active(&self) -> Option<&ActiveDialogue> {
        self.active.as_ref()
    }

    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    #[must_use]
    pub fn current_node<'r>(&self, registry: &'r DialogueRegistry) -> Option<&'r DialogueNode> {
        match &self.active {
            Some(ActiveDialogue::Node { node_id }) => registry.get(node_id),
            _ => None,
        }
    }

    /// Resolve a move to `next`. `None`, or an id missing from the registry,
    /// ends the dialogue with the current node's end effects.
    #[must_use]
    pub fn plan(&self, registry: &DialogueRegistry, next: Option<&str>) -> DialogueStep {
        if let Some(node_id) = next {
            if let Some(node) = registry.get(node_id) {
                return DialogueStep::Enter {
                    node_id: node.id.clone(),
                    effects: node.on_enter.clone(),
                };
            }
            log::warn!("dialogue node {node_id} not found; ending dialogue");
        }
        DialogueStep::End {
            effects: self
                .current_node(registry)
                .map(|node| node.on_end.clone())
                .unwrap_or_default(),
        }
    }

    /// Apply a planned step once its effects have run.
    pub fn commit(&mut self, step: &DialogueStep) {
        match step {
            DialogueStep::Enter { node_id, .. } => {
                log::debug!("dialogue node {node_id}");
                self.active = Some(ActiveDialogue::Node {
                    node_id: node_id.clone(),
                });
            }
            DialogueStep::End { .. } => {
                self.active = None;
            }
        }
    }

    pub fn show_message(&mut self, speaker: Option<String>, text: impl Into<String>) {
        self.active = Some(ActiveDialogue::Message {
            speaker,
            text: text.into(),
        });
    }

    pub fn clear(&mut self) {
        self.active = None;
    }
}

/// Everything a batch of dialogue effects changed, for UI notification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EffectReport {
    pub started_quests: Vec<String>,
    pub objective_updates: Vec<ObjectiveUpdate>,
    pub completed_quests: Vec<QuestRewardPayload>,
    pub failed_quests: Vec<String>,
    pub items_given: Vec<(String, u32)>,
    /// Effects that could not apply (unmet quest preconditions, missing
    /// items, unknown ids)
    pub skipped: Vec<String>,
}

impl EffectReport {
    pub fn merge(&mut self, other: Self) {
        self.started_quests.extend(other.started_quests);
        self.objective_updates.extend(other.objective_updates);
        self.completed_quests.extend(other.completed_quests);
        self.failed_quests.extend(other.failed_quests);
        self.items_given.extend(other.items_given);
        self.skipped.extend(other.skipped);
    }
}

/// Outcome of a dialogue action: where the dialogue now stands and what the
/// effects along the way did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueOutcome {
    /// `None` once the dialogue has ended
    pub node_id: Option<String>,
    pub report: EffectReport,
}

impl DialogueOutcome {
    #[must_use]
    pub const fn ended(&self) -> bool {
        self.node_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, next: Option<&str>) -> DialogueNode {
        DialogueNode {
            id: id.to_string(),
            speaker: Some("Elder".to_string()),
            text: format!("{id} text"),
            choices: Vec::new(),
            next: next.map(str::to_string),
            on_enter: Vec::new(),
            on_end: Vec::new(),
        }
    }

    #[test]
    fn effects_parse_from_tagged_json() {
        let json = r#"[
            { "effect": "set_flag", "flag": "met_elder" },
            { "effect": "start_quest", "quest_id": "herbs" },
            { "effect": "give_item", "item_id": "potion" },
            { "effect": "open_shop", "shop_id": "general", "delay_ms": 300 },
            { "effect": "restore_party" }
        ]"#;
        let effects: Vec<DialogueEffect> = serde_json::from_str(json).unwrap();
        assert_eq!(
            effects[2],
            DialogueEffect::GiveItem {
                item_id: "potion".to_string(),
                quantity: 1
            }
        );
        assert_eq!(effects.len(), 5);
    }

    #[test]
    fn plan_enter_carries_on_enter_effects_without_committing() {
        let mut greet = node("greet", None);
        greet.on_enter.push(DialogueEffect::SetFlag {
            flag: "met".to_string(),
        });
        let registry = DialogueRegistry::from(vec![greet]);
        let mut interp = DialogueInterpreter::default();
        let step = interp.plan(&registry, Some("greet"));
        assert_eq!(step.effects().len(), 1);
        assert!(!interp.is_active());
        interp.commit(&step);
        assert_eq!(
            interp.active(),
            Some(&ActiveDialogue::Node {
                node_id: "greet".to_string()
            })
        );
    }

    #[test]
    fn missing_node_ends_with_current_end_effects() {
        let mut turn_in = node("turn_in", Some("ghost"));
        turn_in.on_end.push(DialogueEffect::CompleteQuest {
            quest_id: "herbs".to_string(),
        });
        let registry = DialogueRegistry::from(vec![turn_in]);
        let mut interp = DialogueInterpreter::default();
        let enter = interp.plan(&registry, Some("turn_in"));
        interp.commit(&enter);

        let step = interp.plan(&registry, Some("ghost"));
        assert!(matches!(step, DialogueStep::End { ref effects } if effects.len() == 1));
        interp.commit(&step);
        assert!(!interp.is_active());
    }

    #[test]
    fn gated_choices_are_hidden() {
        let mut ask = node("ask", None);
        ask.choices = vec![
            DialogueChoice {
                label: "Bribe".to_string(),
                next: None,
                effects: Vec::new(),
                requires_flag: Some("rich".to_string()),
            },
            DialogueChoice {
                label: "Leave".to_string(),
                next: None,
                effects: Vec::new(),
                requires_flag: None,
            },
        ];
        let flags = StoryFlags::new();
        assert_eq!(ask.available_choices(&flags).count(), 1);
        assert_eq!(ask.available_choice(0, &flags).unwrap().label, "Leave");
    }

    #[test]
    fn empty_condition_always_holds() {
        let ledger = QuestLedger::new();
        let flags = StoryFlags::new();
        assert!(Condition::default().holds(&flags, &ledger));
        let cond = Condition {
            quests_active: vec!["herbs".to_string()],
            ..Condition::default()
        };
        assert!(!cond.holds(&flags, &ledger));
        let cond = Condition {
            quests_not_started: vec!["herbs".to_string()],
            flags_unset: vec!["met".to_string()],
            ..Condition::default()
        };
        assert!(cond.holds(&flags, &ledger));
    }

    #[test]
    fn message_dialogue_ends_without_effects() {
        let registry = DialogueRegistry::default();
        let mut interp = DialogueInterpreter::default();
        interp.show_message(None, "The way is blocked.");
        let step = interp.plan(&registry, None);
        assert!(step.effects().is_empty());
        interp.commit(&step);
        assert!(interp.active().is_none());
    }
}
