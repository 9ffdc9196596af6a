//! The single contextual "interact" action.

use std::sync::Arc;

use crate::constants::{
    MSG_ALREADY_COLLECTED, MSG_CHEST_EMPTY, MSG_CHEST_NOTHING, MSG_NOTHING_HAPPENS,
    MSG_SHOP_CLOSED,
};
use crate::items::{ItemCatalog, ItemGrant};
use crate::movement::{BattleGate, GateResolution};
use crate::phase::GamePhase;
use crate::quests::{ObjectiveKind, ObjectiveUpdate};
use crate::session::GameSession;
use crate::shop::inn_price;
use crate::state::{QueuedShop, RestRequest};
use crate::world::{EventKind, MapEvent, Npc, TriggerEvent};

/// The one effect an interaction produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InteractionOutcome {
    /// Nothing to interact with, or interaction is not allowed right now
    Nothing,
    /// A one-time event that was already used; nothing changed
    AlreadyDone { event_id: String, message: String },
    Treasure {
        event_id: String,
        message: String,
        gold: u32,
        items: Vec<ItemGrant>,
    },
    Collected {
        event_id: String,
        item_id: String,
        quantity: u32,
        message: String,
    },
    Talk {
        npc_id: String,
        node_id: Option<String>,
        objective_updates: Vec<ObjectiveUpdate>,
    },
    ShopEntered { shop_id: String },
    ShopClosed { shop_id: String, message: String },
    SaveRequested,
    RestRequested { event_id: String, cost: u32 },
    Triggered {
        event_id: String,
        message: Option<String>,
        objective_updates: Vec<ObjectiveUpdate>,
    },
    GateLocked { event_id: String, message: String },
    Teleporting { map_id: String },
    BattleLocked { event_id: String, message: String },
    ScriptedBattle {
        event_id: String,
        dialogue: Option<String>,
    },
}

/// "Found: Potion, Herb x2, 50 Gold!"
fn found_message(items: &ItemCatalog, gold: u32, grants: &[ItemGrant]) -> String {
    let mut parts: Vec<String> = grants
        .iter()
        .filter(|grant| grant.quantity > 0)
        .map(|grant| {
            let name = items.display_name(&grant.item_id);
            if grant.quantity == 1 {
                name.to_string()
            } else {
                format!("{name} x{}", grant.quantity)
            }
        })
        .collect();
    if gold > 0 {
        parts.push(format!("{gold} Gold"));
    }
    if parts.is_empty() {
        MSG_CHEST_NOTHING.to_string()
    } else {
        format!("Found: {}!", parts.join(", "))
    }
}

impl GameSession {
    /// Resolve one interaction: a shop on the current tile first, then the
    /// faced NPC, then the faced event.
    pub fn interact(&mut self) -> InteractionOutcome {
        if self.state.phase() != GamePhase::Exploring
            || self.state.ui.blocks_movement()
            || self.state.transition.in_flight()
        {
            return InteractionOutcome::Nothing;
        }
        let content = Arc::clone(&self.content);
        let Some(map) = content.maps.get(self.state.current_map_id()) else {
            return InteractionOutcome::Nothing;
        };

        let (x, y) = (self.state.position.x, self.state.position.y);
        let (fx, fy) = self.state.position.facing_tile();
        let shop_here = map
            .events_at(x, y)
            .find(|event| matches!(event.kind, EventKind::Shop { .. }));
        if let Some(event) = shop_here {
            return self.interact_shop(event);
        }

        if let Some(npc) = map.npc_at(fx, fy, &self.state.flags) {
            return self.talk_to(npc);
        }
        let faced = map
            .events_at(fx, fy)
            .find(|event| !matches!(event.kind, EventKind::Shop { .. }));
        match faced {
            Some(event) => self.interact_event(event),
            None => InteractionOutcome::Nothing,
        }
    }

    fn interact_shop(&mut self, event: &MapEvent) -> InteractionOutcome {
        let EventKind::Shop {
            shop_id,
            unlock_flag,
            closed_message,
        } = &event.kind
        else {
            return InteractionOutcome::Nothing;
        };
        if let Some(flag) = unlock_flag
            && !self.state.flags.is_set(flag)
        {
            let message = closed_message
                .clone()
                .unwrap_or_else(|| MSG_SHOP_CLOSED.to_string());
            self.show_message(None, message.clone());
            return InteractionOutcome::ShopClosed {
                shop_id: shop_id.clone(),
                message,
            };
        }
        let queued = QueuedShop {
            shop_id: shop_id.clone(),
            delay_ms: 0,
        };
        if self.enter_shop(&queued) {
            InteractionOutcome::ShopEntered {
                shop_id: shop_id.clone(),
            }
        } else {
            InteractionOutcome::Nothing
        }
    }

    fn talk_to(&mut self, npc: &Npc) -> InteractionOutcome {
        let content = Arc::clone(&self.content);
        let mut objective_updates: Vec<ObjectiveUpdate> = self
            .state
            .quests
            .record_action(&content.quests, ObjectiveKind::Talk, &npc.id, 1)
            .into_vec();
        objective_updates.extend(self.state.quests.deliver_to(
            &content.quests,
            &npc.id,
            &mut self.state.inventory,
        ));
        self.notify_updates(&objective_updates);
        let node = npc.dialogue_for(&self.state.flags, &self.state.quests).to_string();
        log::debug!("talking to {} at node {node}", npc.id);
        let outcome = self.start_dialogue(&node);
        InteractionOutcome::Talk {
            npc_id: npc.id.clone(),
            node_id: outcome.node_id,
            objective_updates,
        }
    }

    fn interact_event(&mut self, event: &MapEvent) -> InteractionOutcome {
        let already_done = |message: &str| InteractionOutcome::AlreadyDone {
            event_id: event.id.clone(),
            message: message.to_string(),
        };
        match &event.kind {
            EventKind::Treasure { gold, items } => {
                if self.state.is_consumed(event) {
                    return already_done(MSG_CHEST_EMPTY);
                }
                self.open_treasure(event, *gold, items)
            }
            EventKind::Collectible {
                item_id,
                quantity,
                required_quest,
            } => {
                if self.state.is_consumed(event) {
                    return already_done(MSG_ALREADY_COLLECTED);
                }
                if let Some(quest_id) = required_quest
                    && !self.state.quests.is_active(quest_id)
                {
                    return InteractionOutcome::Nothing;
                }
                self.state.opened_events.insert(event.id.clone());
                let (result, _) = self.collect_item(item_id, *quantity);
                let message = found_message(
                    &self.content.items,
                    0,
                    &[ItemGrant::new(item_id.clone(), result.added)],
                );
                InteractionOutcome::Collected {
                    event_id: event.id.clone(),
                    item_id: item_id.clone(),
                    quantity: result.added,
                    message,
                }
            }
            EventKind::SavePoint => {
                self.state.ui.save_requested = true;
                InteractionOutcome::SaveRequested
            }
            EventKind::Inn { cost } => {
                let cost = inn_price(*cost, self.state.config.inn_cost);
                self.state.ui.rest_request = Some(RestRequest {
                    event_id: event.id.clone(),
                    cost,
                });
                InteractionOutcome::RestRequested {
                    event_id: event.id.clone(),
                    cost,
                }
            }
            EventKind::Trigger(trigger) => {
                if self.state.is_consumed(event) {
                    return already_done(MSG_NOTHING_HAPPENS);
                }
                self.fire_trigger(event, trigger)
            }
            EventKind::Teleport(gate) => match self.resolve_teleport(event, gate) {
                GateResolution::Locked(message) => InteractionOutcome::GateLocked {
                    event_id: event.id.clone(),
                    message,
                },
                GateResolution::Staged(map_id) => InteractionOutcome::Teleporting { map_id },
                GateResolution::Busy => InteractionOutcome::Nothing,
            },
            EventKind::Battle(battle) => match self.resolve_scripted_battle(event, battle) {
                BattleGate::Spent => already_done(MSG_NOTHING_HAPPENS),
                BattleGate::Locked(message) => InteractionOutcome::BattleLocked {
                    event_id: event.id.clone(),
                    message,
                },
                BattleGate::Dialogue(node) => InteractionOutcome::ScriptedBattle {
                    event_id: event.id.clone(),
                    dialogue: Some(node),
                },
                BattleGate::Staged => InteractionOutcome::ScriptedBattle {
                    event_id: event.id.clone(),
                    dialogue: None,
                },
                BattleGate::Busy => InteractionOutcome::Nothing,
            },
            EventKind::Shop { .. } => InteractionOutcome::Nothing,
        }
    }

    fn open_treasure(
        &mut self,
        event: &MapEvent,
        gold: u32,
        items: &[ItemGrant],
    ) -> InteractionOutcome {
        self.state.opened_events.insert(event.id.clone());
        self.state.inventory.add_gold(gold);
        let granted: Vec<ItemGrant> = items
            .iter()
            .map(|grant| {
                let (result, _) = self.collect_item(&grant.item_id, grant.quantity);
                ItemGrant::new(grant.item_id.clone(), result.added)
            })
            .collect();
        let message = found_message(&self.content.items, gold, &granted);
        log::info!("opened {}: {message}", event.id);
        InteractionOutcome::Treasure {
            event_id: event.id.clone(),
            message,
            gold,
            items: granted,
        }
    }

    fn fire_trigger(&mut self, event: &MapEvent, trigger: &TriggerEvent) -> InteractionOutcome {
        if self.state.flags.first_missing(&trigger.required_flags).is_some() {
            return InteractionOutcome::Nothing;
        }
        if trigger.one_time {
            self.state.opened_events.insert(event.id.clone());
        }
        for flag in &trigger.set_flags {
            self.state.flags.set(flag.clone());
        }
        let mut objective_updates = Vec::new();
        if let Some(objective) = &trigger.complete_objective
            && let Some(update) =
                self.complete_objective(&objective.quest_id, &objective.objective_id)
        {
            objective_updates.push(update);
        }
        if let Some(grant) = &trigger.grant_item {
            let (_, updates) = self.collect_item(&grant.item_id, grant.quantity);
            objective_updates.extend(updates);
        }
        if let Some(message) = &trigger.message {
            self.show_message(None, message.clone());
        }
        log::debug!("trigger {} fired", event.id);
        InteractionOutcome::Triggered {
            event_id: event.id.clone(),
            message: trigger.message.clone(),
            objective_updates,
        }
    }
}
