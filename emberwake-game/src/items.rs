//! Items, the item catalog, and the party inventory.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    #[default]
    Consumable,
    Weapon,
    Armor,
    Accessory,
    KeyItem,
    Material,
}

impl ItemKind {
    #[must_use]
    pub const fn is_equipment(self) -> bool {
        matches!(self, Self::Weapon | Self::Armor | Self::Accessory)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

/// Stat bonuses granted while an item is equipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EquipStats {
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub magic: i32,
    #[serde(default)]
    pub speed: i32,
}

/// The one item shape used everywhere. Equipment is an item with `equip`
/// populated; sockets and rarity are optional extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub kind: ItemKind,
    /// Base shop price in gold
    #[serde(default)]
    pub price: u32,
    #[serde(default)]
    pub max_stack: Option<u32>,
    #[serde(default)]
    pub equip: Option<EquipStats>,
    #[serde(default)]
    pub sockets: u8,
    #[serde(default)]
    pub rarity: Option<Rarity>,
}

impl Item {
    #[must_use]
    pub fn is_equippable(&self) -> bool {
        self.equip.is_some() || self.kind.is_equipment()
    }

    /// Stack limit after applying the session-wide cap.
    #[must_use]
    pub fn stack_limit(&self, global_cap: u32) -> u32 {
        self.max_stack.map_or(global_cap, |cap| cap.min(global_cap)).max(1)
    }
}

/// A quantity of one item, as authored in content (chest contents, rewards).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemGrant {
    pub item_id: String,
    #[serde(default = "ItemGrant::default_quantity")]
    pub quantity: u32,
}

impl ItemGrant {
    const fn default_quantity() -> u32 {
        1
    }

    #[must_use]
    pub fn new(item_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            item_id: item_id.into(),
            quantity,
        }
    }
}

/// Static item registry keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<Item>", into = "Vec<Item>")]
pub struct ItemCatalog {
    items: BTreeMap<String, Item>,
}

impl ItemCatalog {
    #[must_use]
    pub fn from_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: items
                .into_iter()
                .map(|item| (item.id.clone(), item))
                .collect(),
        }
    }

    #[must_use]
    pub fn get(&self, item_id: &str) -> Option<&Item> {
        self.items.get(item_id)
    }

    #[must_use]
    pub fn contains(&self, item_id: &str) -> bool {
        self.items.contains_key(item_id)
    }

    /// Display name, falling back to the raw id for items missing from content.
    #[must_use]
    pub fn display_name<'a>(&'a self, item_id: &'a str) -> &'a str {
        self.get(item_id).map_or(item_id, |item| item.name.as_str())
    }

    #[must_use]
    pub fn stack_limit(&self, item_id: &str, global_cap: u32) -> u32 {
        self.get(item_id)
            .map_or(global_cap, |item| item.stack_limit(global_cap))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}

impl From<Vec<Item>> for ItemCatalog {
    fn from(items: Vec<Item>) -> Self {
        Self::from_items(items)
    }
}

impl From<ItemCatalog> for Vec<Item> {
    fn from(catalog: ItemCatalog) -> Self {
        catalog.items.into_values().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item_id: String,
    pub quantity: u32,
}

/// Result of adding items to the inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StackResult {
    pub added: u32,
    /// Units dropped because the stack was full
    pub overflow: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsufficientItems {
    pub held: u32,
    pub requested: u32,
}

impl fmt::Display for InsufficientItems {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "requested {} but only {} held", self.requested, self.held)
    }
}

/// Party inventory: currencies plus ordered item stacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Inventory {
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub shards: u32,
    #[serde(default)]
    pub items: Vec<ItemStack>,
}

impl Inventory {
    #[must_use]
    pub fn with_gold(gold: u32) -> Self {
        Self {
            gold,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn quantity(&self, item_id: &str) -> u32 {
        self.items
            .iter()
            .find(|stack| stack.item_id == item_id)
            .map_or(0, |stack| stack.quantity)
    }

    #[must_use]
    pub fn has(&self, item_id: &str, quantity: u32) -> bool {
        self.quantity(item_id) >= quantity
    }

    /// Add `quantity` units, clamping the stack to `limit`.
    pub fn add(&mut self, item_id: &str, quantity: u32, limit: u32) -> StackResult {
        if quantity == 0 {
            return StackResult::default();
        }
        let stack = if let Some(idx) = self.items.iter().position(|s| s.item_id == item_id) {
            &mut self.items[idx]
        } else {
            self.items.push(ItemStack {
                item_id: item_id.to_string(),
                quantity: 0,
            });
            let last = self.items.len() - 1;
            &mut self.items[last]
        };
        let room = limit.saturating_sub(stack.quantity);
        let added = quantity.min(room);
        stack.quantity += added;
        if stack.quantity == 0 {
            self.items.retain(|s| s.item_id != item_id);
        }
        StackResult {
            added,
            overflow: quantity - added,
        }
    }

    /// Remove `quantity` units. Nothing changes when fewer are held.
    ///
    /// # Errors
    ///
    /// Returns [`InsufficientItems`] if the inventory holds fewer units.
    pub fn remove(&mut self, item_id: &str, quantity: u32) -> Result<(), InsufficientItems> {
        let held = self.quantity(item_id);
        if held < quantity {
            return Err(InsufficientItems {
                held,
                requested: quantity,
            });
        }
        if let Some(stack) = self.items.iter_mut().find(|s| s.item_id == item_id) {
            stack.quantity -= quantity;
        }
        self.items.retain(|s| s.quantity > 0);
        Ok(())
    }

    pub fn add_gold(&mut self, amount: u32) {
        self.gold = self.gold.saturating_add(amount);
    }

    /// Spend gold if enough is held.
    pub fn spend_gold(&mut self, amount: u32) -> bool {
        if self.gold < amount {
            return false;
        }
        self.gold -= amount;
        true
    }

    pub fn add_shards(&mut self, amount: u32) {
        self.shards = self.shards.saturating_add(amount);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn potion() -> Item {
        Item {
            id: "potion".to_string(),
            name: "Potion".to_string(),
            description: String::new(),
            kind: ItemKind::Consumable,
            price: 20,
            max_stack: Some(10),
            equip: None,
            sockets: 0,
            rarity: None,
        }
    }

    #[test]
    fn add_clamps_to_stack_limit() {
        let catalog = ItemCatalog::from_items([potion()]);
        let limit = catalog.stack_limit("potion", 99);
        assert_eq!(limit, 10);

        let mut inv = Inventory::default();
        assert_eq!(inv.add("potion", 7, limit).added, 7);
        let second = inv.add("potion", 7, limit);
        assert_eq!(second.added, 3);
        assert_eq!(second.overflow, 4);
        assert_eq!(inv.quantity("potion"), 10);
    }

    #[test]
    fn remove_is_all_or_nothing() {
        let mut inv = Inventory::default();
        inv.add("herb", 2, 99);
        assert_eq!(
            inv.remove("herb", 3),
            Err(InsufficientItems {
                held: 2,
                requested: 3
            })
        );
        assert_eq!(inv.quantity("herb"), 2);
        inv.remove("herb", 2).unwrap();
        assert!(inv.items.is_empty());
    }

    #[test]
    fn global_cap_wins_over_item_cap() {
        let item = potion();
        assert_eq!(item.stack_limit(5), 5);
        assert_eq!(item.stack_limit(99), 10);
    }

    #[test]
    fn spend_gold_refuses_overdraft() {
        let mut inv = Inventory::with_gold(30);
        assert!(!inv.spend_gold(31));
        assert_eq!(inv.gold, 30);
        assert!(inv.spend_gold(30));
        assert_eq!(inv.gold, 0);
    }

    #[test]
    fn equipment_shape_is_the_same_item_type() {
        let json = r#"{ "id": "sword", "name": "Bronze Sword", "kind": "weapon",
            "price": 80, "equip": { "attack": 5 }, "sockets": 1, "rarity": "uncommon" }"#;
        let sword: Item = serde_json::from_str(json).unwrap();
        assert!(sword.is_equippable());
        assert_eq!(sword.equip.unwrap().attack, 5);
        assert_eq!(sword.sockets, 1);
    }
}
