//! Battle boundary and the outcome mediator.
//!
//! Turn resolution belongs to a [`BattleSubsystem`]; this module only builds
//! the battle from a party snapshot and an enemy roster, computes rewards
//! exactly once per battle, and merges a victory back into session state.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::flags::StoryFlags;
use crate::items::{Inventory, ItemCatalog, ItemGrant};
use crate::party::{Character, ExperienceCurve, LevelUps, Party};
use crate::quests::ObjectiveUpdate;

const fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropEntry {
    pub item_id: String,
    /// Probability in `0.0..=1.0`
    pub chance: f32,
    #[serde(default = "one")]
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    pub id: String,
    pub name: String,
    pub hp: i32,
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub speed: i32,
    #[serde(default)]
    pub experience: u32,
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub drops: Vec<DropEntry>,
}

/// Enemy templates keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<EnemyTemplate>", into = "Vec<EnemyTemplate>")]
pub struct EnemyRegistry {
    enemies: BTreeMap<String, EnemyTemplate>,
}

impl EnemyRegistry {
    #[must_use]
    pub fn get(&self, enemy_id: &str) -> Option<&EnemyTemplate> {
        self.enemies.get(enemy_id)
    }

    #[must_use]
    pub fn contains(&self, enemy_id: &str) -> bool {
        self.enemies.contains_key(enemy_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnemyTemplate> {
        self.enemies.values()
    }

    /// Resolve a roster, skipping ids with no template.
    #[must_use]
    pub fn resolve(&self, roster: &[String]) -> Vec<EnemyTemplate> {
        roster
            .iter()
            .filter_map(|id| {
                let template = self.get(id);
                if template.is_none() {
                    log::warn!("enemy {id} not found; dropped from roster");
                }
                template.cloned()
            })
            .collect()
    }
}

impl From<Vec<EnemyTemplate>> for EnemyRegistry {
    fn from(enemies: Vec<EnemyTemplate>) -> Self {
        Self {
            enemies: enemies.into_iter().map(|e| (e.id.clone(), e)).collect(),
        }
    }
}

impl From<EnemyRegistry> for Vec<EnemyTemplate> {
    fn from(registry: EnemyRegistry) -> Self {
        registry.enemies.into_values().collect()
    }
}

/// One enemy on the field. Carries its reward data so reward math reads the
/// battle alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Combatant {
    pub template_id: String,
    pub name: String,
    pub hp: i32,
    pub max_hp: i32,
    pub attack: i32,
    pub defense: i32,
    pub speed: i32,
    pub experience: u32,
    pub gold: u32,
    pub drops: Vec<DropEntry>,
}

impl From<EnemyTemplate> for Combatant {
    fn from(template: EnemyTemplate) -> Self {
        Self {
            template_id: template.id,
            name: template.name,
            hp: template.hp,
            max_hp: template.hp,
            attack: template.attack,
            defense: template.defense,
            speed: template.speed,
            experience: template.experience,
            gold: template.gold,
            drops: template.drops,
        }
    }
}

impl Combatant {
    #[must_use]
    pub const fn is_defeated(&self) -> bool {
        self.hp <= 0
    }
}

/// The battle as seen by the battle subsystem. `party` holds copies of the
/// party members; damage lands on these, not on the session party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleState {
    pub id: u64,
    pub party: Vec<Character>,
    pub enemies: Vec<Combatant>,
    #[serde(default)]
    pub turn: u32,
}

impl BattleState {
    #[must_use]
    pub fn party_defeated(&self) -> bool {
        self.party.iter().all(|member| !member.is_conscious())
    }

    #[must_use]
    pub fn enemies_defeated(&self) -> bool {
        self.enemies.iter().all(Combatant::is_defeated)
    }
}

/// External turn-resolution engine.
pub trait BattleSubsystem {
    /// Build the battle for a party snapshot and an enemy roster.
    fn start_battle(
        &mut self,
        battle_id: u64,
        party: &[Character],
        roster: Vec<EnemyTemplate>,
    ) -> BattleState;
}

/// Field setup with no extra rules: party copies and fresh enemies.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardBattles;

impl BattleSubsystem for StandardBattles {
    fn start_battle(
        &mut self,
        battle_id: u64,
        party: &[Character],
        roster: Vec<EnemyTemplate>,
    ) -> BattleState {
        BattleState {
            id: battle_id,
            party: party.to_vec(),
            enemies: roster.into_iter().map(Combatant::from).collect(),
            turn: 0,
        }
    }
}

/// Fixed reward payload for one battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleRewards {
    pub battle_id: u64,
    pub experience: u32,
    pub gold: u32,
    pub drops: Vec<ItemGrant>,
    /// Template id of every enemy, for defeat objectives
    pub defeated: Vec<String>,
}

/// Sum experience and gold and roll each drop independently.
pub fn compute_rewards<R: Rng>(battle: &BattleState, rng: &mut R) -> BattleRewards {
    let mut drops: Vec<ItemGrant> = Vec::new();
    for enemy in &battle.enemies {
        for drop in &enemy.drops {
            if rng.r#gen::<f32>() >= drop.chance {
                continue;
            }
            if let Some(existing) = drops.iter_mut().find(|g| g.item_id == drop.item_id) {
                existing.quantity = existing.quantity.saturating_add(drop.quantity);
            } else {
                drops.push(ItemGrant::new(drop.item_id.clone(), drop.quantity));
            }
        }
    }
    BattleRewards {
        battle_id: battle.id,
        experience: battle.enemies.iter().map(|e| e.experience).sum(),
        gold: battle.enemies.iter().map(|e| e.gold).sum(),
        drops,
        defeated: battle
            .enemies
            .iter()
            .map(|e| e.template_id.clone())
            .collect(),
    }
}

/// A battle in progress plus the bookkeeping the session needs at its end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveBattle {
    pub state: BattleState,
    pub victory_flag: Option<String>,
    pub source_event: Option<String>,
    rewards: Option<BattleRewards>,
}

impl ActiveBattle {
    #[must_use]
    pub const fn new(
        state: BattleState,
        victory_flag: Option<String>,
        source_event: Option<String>,
    ) -> Self {
        Self {
            state,
            victory_flag,
            source_event,
            rewards: None,
        }
    }

    #[must_use]
    pub const fn rewards(&self) -> Option<&BattleRewards> {
        self.rewards.as_ref()
    }

    /// Compute rewards on first call; later calls return the same payload.
    pub fn finalize_rewards<R: Rng>(&mut self, rng: &mut R) -> &BattleRewards {
        let state = &self.state;
        self.rewards.get_or_insert_with(|| {
            let rewards = compute_rewards(state, rng);
            log::debug!(
                "battle {} rewards finalized: {} exp, {} gold, {} drop(s)",
                rewards.battle_id,
                rewards.experience,
                rewards.gold,
                rewards.drops.len()
            );
            rewards
        })
    }

    /// Take the rewards, computing them now if nobody finalized them yet.
    pub fn into_rewards<R: Rng>(mut self, rng: &mut R) -> (BattleState, BattleRewards) {
        let rewards = self
            .rewards
            .take()
            .unwrap_or_else(|| compute_rewards(&self.state, rng));
        (self.state, rewards)
    }
}

/// Session slices a victory writes to.
pub struct VictoryTarget<'a> {
    pub party: &'a mut Party,
    pub inventory: &'a mut Inventory,
    pub flags: &'a mut StoryFlags,
    pub opened_events: &'a mut BTreeSet<String>,
    pub items: &'a ItemCatalog,
    pub max_stack: u32,
    pub curve: ExperienceCurve,
}

/// Applied result of a victory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VictorySpoils {
    pub level_ups: LevelUps,
    /// Drops discarded because their stacks were full
    pub overflow: Vec<ItemGrant>,
}

/// Merge a won battle into the session: vitals from the battle copies,
/// experience and leveling, gold, drops with stack clamping, the victory flag
/// and the source event's one-time marker.
pub fn apply_victory(
    battle: &BattleState,
    victory_flag: Option<&str>,
    source_event: Option<&str>,
    rewards: &BattleRewards,
    target: VictoryTarget<'_>,
) -> VictorySpoils {
    for member in target.party.members_mut() {
        if let Some(copy) = battle.party.iter().find(|c| c.id == member.id) {
            member.carry_vitals_from(copy);
        }
        member.hp = member.hp.max(1);
    }
    let level_ups = target
        .party
        .award_experience(rewards.experience, &target.curve);
    target.inventory.add_gold(rewards.gold);
    let mut overflow = Vec::new();
    for grant in &rewards.drops {
        let limit = target.items.stack_limit(&grant.item_id, target.max_stack);
        let result = target.inventory.add(&grant.item_id, grant.quantity, limit);
        if result.overflow > 0 {
            overflow.push(ItemGrant::new(grant.item_id.clone(), result.overflow));
        }
    }
    if let Some(flag) = victory_flag {
        target.flags.set(flag);
    }
    if let Some(event_id) = source_event {
        target.opened_events.insert(event_id.to_string());
    }
    log::info!(
        "battle {} won: {} exp, {} gold",
        rewards.battle_id,
        rewards.experience,
        rewards.gold
    );
    VictorySpoils {
        level_ups,
        overflow,
    }
}

/// What `end_battle` did, for the results screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BattleReport {
    pub battle_id: u64,
    pub victory: bool,
    /// `None` on defeat
    pub rewards: Option<BattleRewards>,
    pub level_ups: LevelUps,
    pub overflow: Vec<ItemGrant>,
    pub objective_updates: Vec<ObjectiveUpdate>,
}

impl BattleReport {
    #[must_use]
    pub fn defeat(battle_id: u64) -> Self {
        Self {
            battle_id,
            victory: false,
            rewards: None,
            level_ups: LevelUps::new(),
            overflow: Vec::new(),
            objective_updates: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn slime() -> EnemyTemplate {
        EnemyTemplate {
            id: "slime".to_string(),
            name: "Slime".to_string(),
            hp: 8,
            attack: 3,
            defense: 1,
            speed: 2,
            experience: 30,
            gold: 6,
            drops: vec![
                DropEntry {
                    item_id: "jelly".to_string(),
                    chance: 0.5,
                    quantity: 1,
                },
                DropEntry {
                    item_id: "potion".to_string(),
                    chance: 1.0,
                    quantity: 1,
                },
            ],
        }
    }

    fn hero() -> Character {
        Character {
            id: "hero".to_string(),
            name: "Aren".to_string(),
            level: 1,
            experience: 0,
            hp: 30,
            max_hp: 30,
            mp: 10,
            max_mp: 10,
            attack: 6,
            defense: 4,
            magic: 3,
            speed: 5,
            equipment: Vec::new(),
        }
    }

    fn battle() -> ActiveBattle {
        let state = StandardBattles.start_battle(1, &[hero()], vec![slime(), slime()]);
        ActiveBattle::new(state, Some("slimes_cleared".to_string()), Some("ambush".to_string()))
    }

    #[test]
    fn finalize_twice_returns_identical_payload() {
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let mut active = battle();
        let first = active.finalize_rewards(&mut rng).clone();
        let second = active.finalize_rewards(&mut rng).clone();
        assert_eq!(first, second);
        assert_eq!(first.experience, 60);
        assert_eq!(first.gold, 12);
        let potions = first.drops.iter().find(|g| g.item_id == "potion").unwrap();
        assert_eq!(potions.quantity, 2);
    }

    #[test]
    fn into_rewards_reuses_finalized_payload() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let mut active = battle();
        let shown = active.finalize_rewards(&mut rng).clone();
        let (_, applied) = active.into_rewards(&mut rng);
        assert_eq!(shown, applied);
    }

    #[test]
    fn victory_carries_battle_vitals_and_sets_flag() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let mut active = battle();
        active.state.party[0].hp = 0;
        active.state.party[0].mp = 4;
        let rewards = active.finalize_rewards(&mut rng).clone();

        let mut party = Party::new(vec![hero()]);
        let mut inventory = Inventory::default();
        let mut flags = StoryFlags::new();
        let mut opened = BTreeSet::new();
        let items = ItemCatalog::default();
        let spoils = apply_victory(
            &active.state,
            active.victory_flag.as_deref(),
            active.source_event.as_deref(),
            &rewards,
            VictoryTarget {
                party: &mut party,
                inventory: &mut inventory,
                flags: &mut flags,
                opened_events: &mut opened,
                items: &items,
                max_stack: 99,
                curve: ExperienceCurve::new(50, 50),
            },
        );
        let member = party.leader().unwrap();
        assert_eq!(member.level, 2);
        // leveling restores, so vitals are full after the level-up
        assert_eq!(member.hp, member.max_hp);
        assert_eq!(spoils.level_ups.len(), 1);
        assert_eq!(inventory.gold, 12);
        assert!(flags.is_set("slimes_cleared"));
        assert!(opened.contains("ambush"));
    }

    #[test]
    fn fainted_member_wakes_with_one_hp() {
        let mut party = Party::new(vec![hero()]);
        let mut copy = hero();
        copy.hp = 0;
        let state = BattleState {
            id: 3,
            party: vec![copy],
            enemies: Vec::new(),
            turn: 4,
        };
        let rewards = BattleRewards {
            battle_id: 3,
            experience: 0,
            gold: 0,
            drops: Vec::new(),
            defeated: Vec::new(),
        };
        apply_victory(
            &state,
            None,
            None,
            &rewards,
            VictoryTarget {
                party: &mut party,
                inventory: &mut Inventory::default(),
                flags: &mut StoryFlags::new(),
                opened_events: &mut BTreeSet::new(),
                items: &ItemCatalog::default(),
                max_stack: 99,
                curve: ExperienceCurve::new(50, 50),
            },
        );
        assert_eq!(party.leader().unwrap().hp, 1);
    }
}
