//! Shops, shopping carts, selling, and inn pricing.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::items::{Inventory, ItemCatalog, ItemKind};

/// A single line of a shop's stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShopStock {
    pub item_id: String,
    /// Overrides the item's base price
    #[serde(default)]
    pub price: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shop {
    pub id: String,
    pub name: String,
    pub stock: Vec<ShopStock>,
    /// Percentage knocked off every listed price
    #[serde(default)]
    pub discount_pct: f64,
}

impl Shop {
    #[must_use]
    pub fn stock_line(&self, item_id: &str) -> Option<&ShopStock> {
        self.stock.iter().find(|line| line.item_id == item_id)
    }

    /// Unit price for an item this shop sells, after overrides and discount.
    #[must_use]
    pub fn unit_price(&self, items: &ItemCatalog, item_id: &str) -> Option<u32> {
        let line = self.stock_line(item_id)?;
        let base = line.price.or_else(|| items.get(item_id).map(|item| item.price))?;
        Some(calculate_effective_price(base, self.discount_pct))
    }
}

/// Shops keyed by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(from = "Vec<Shop>", into = "Vec<Shop>")]
pub struct ShopRegistry {
    shops: BTreeMap<String, Shop>,
}

impl ShopRegistry {
    #[must_use]
    pub fn get(&self, shop_id: &str) -> Option<&Shop> {
        self.shops.get(shop_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Shop> {
        self.shops.values()
    }
}

impl From<Vec<Shop>> for ShopRegistry {
    fn from(shops: Vec<Shop>) -> Self {
        Self {
            shops: shops.into_iter().map(|s| (s.id.clone(), s)).collect(),
        }
    }
}

impl From<ShopRegistry> for Vec<Shop> {
    fn from(registry: ShopRegistry) -> Self {
        registry.shops.into_values().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShopError {
    #[error("shop {0} does not exist")]
    UnknownShop(String),
    #[error("item {0} does not exist")]
    UnknownItem(String),
    #[error("{item_id} is not sold here")]
    NotInShop { item_id: String },
    #[error("need {cost} gold but only {held} held")]
    InsufficientGold { cost: u32, held: u32 },
    #[error("no room for {requested} more {item_id} (room for {room})")]
    StackFull {
        item_id: String,
        requested: u32,
        room: u32,
    },
    #[error("only {held} {item_id} held")]
    NotEnoughItems { item_id: String, held: u32 },
    #[error("{0} cannot be sold")]
    NotSellable(String),
    #[error("no shop is open")]
    Closed,
}

/// A line item in the shopping cart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub item_id: String,
    pub quantity: u32,
}

/// Items picked for purchase, checked out all at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(item_id: &str, quantity: u32) -> Self {
        let mut cart = Self::new();
        cart.add_item(item_id, quantity);
        cart
    }

    /// Add quantity to an item in the cart.
    /// Returns the new quantity for that item.
    pub fn add_item(&mut self, item_id: &str, quantity: u32) -> u32 {
        if let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item_id) {
            line.quantity = line.quantity.saturating_add(quantity);
            line.quantity
        } else {
            self.lines.push(CartLine {
                item_id: item_id.to_string(),
                quantity,
            });
            quantity
        }
    }

    /// Remove quantity from an item in the cart.
    /// Returns the new quantity (0 if line is removed).
    pub fn remove_item(&mut self, item_id: &str, quantity: u32) -> u32 {
        let Some(line) = self.lines.iter_mut().find(|l| l.item_id == item_id) else {
            return 0;
        };
        line.quantity = line.quantity.saturating_sub(quantity);
        let left = line.quantity;
        if left == 0 {
            self.lines.retain(|l| l.item_id != item_id);
        }
        left
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| line.quantity == 0)
    }
}

/// Calculate the effective price after a percentage discount, rounded up.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn calculate_effective_price(base_price: u32, discount_pct: f64) -> u32 {
    if discount_pct <= 0.0 {
        return base_price;
    }
    let multiplier = (1.0 - discount_pct / 100.0).max(0.0);
    (f64::from(base_price) * multiplier).ceil() as u32
}

/// Gold credited for selling one unit, rounded down.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn sell_price(base_price: u32, sell_ratio: f32) -> u32 {
    (f64::from(base_price) * f64::from(sell_ratio.clamp(0.0, 1.0))).floor() as u32
}

/// Total cost of a cart in `shop`.
///
/// # Errors
///
/// Returns [`ShopError::NotInShop`] for any line the shop does not stock.
pub fn cart_total(cart: &Cart, shop: &Shop, items: &ItemCatalog) -> Result<u32, ShopError> {
    cart.lines.iter().try_fold(0u32, |total, line| {
        let unit = shop
            .unit_price(items, &line.item_id)
            .ok_or_else(|| ShopError::NotInShop {
                item_id: line.item_id.clone(),
            })?;
        Ok(total.saturating_add(unit.saturating_mul(line.quantity)))
    })
}

/// Receipt for a completed checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub total: u32,
    pub lines: Vec<CartLine>,
}

/// Buy everything in the cart or nothing.
///
/// # Errors
///
/// Returns the first reason the cart cannot be bought; the inventory is
/// unchanged in that case.
pub fn checkout(
    cart: &Cart,
    shop: &Shop,
    items: &ItemCatalog,
    inventory: &mut Inventory,
    max_stack: u32,
) -> Result<Purchase, ShopError> {
    let mut requested: BTreeMap<&str, u32> = BTreeMap::new();
    for line in &cart.lines {
        if !items.contains(&line.item_id) {
            return Err(ShopError::UnknownItem(line.item_id.clone()));
        }
        let wanted = requested.entry(line.item_id.as_str()).or_default();
        *wanted = wanted.saturating_add(line.quantity);
    }
    for (&item_id, &quantity) in &requested {
        let room = items
            .stack_limit(item_id, max_stack)
            .saturating_sub(inventory.quantity(item_id));
        if quantity > room {
            return Err(ShopError::StackFull {
                item_id: item_id.to_string(),
                requested: quantity,
                room,
            });
        }
    }
    let total = cart_total(cart, shop, items)?;
    if !inventory.spend_gold(total) {
        return Err(ShopError::InsufficientGold {
            cost: total,
            held: inventory.gold,
        });
    }
    for line in &cart.lines {
        let limit = items.stack_limit(&line.item_id, max_stack);
        inventory.add(&line.item_id, line.quantity, limit);
    }
    log::debug!("checkout at {} for {total} gold", shop.id);
    Ok(Purchase {
        total,
        lines: cart.lines.clone(),
    })
}

/// Sell `quantity` units back for `sell_ratio` of the base price.
///
/// # Errors
///
/// Key items cannot be sold, and the inventory must hold enough units.
pub fn sell(
    items: &ItemCatalog,
    inventory: &mut Inventory,
    item_id: &str,
    quantity: u32,
    sell_ratio: f32,
) -> Result<u32, ShopError> {
    let item = items
        .get(item_id)
        .ok_or_else(|| ShopError::UnknownItem(item_id.to_string()))?;
    if item.kind == ItemKind::KeyItem {
        return Err(ShopError::NotSellable(item_id.to_string()));
    }
    inventory
        .remove(item_id, quantity)
        .map_err(|err| ShopError::NotEnoughItems {
            item_id: item_id.to_string(),
            held: err.held,
        })?;
    let credit = sell_price(item.price, sell_ratio).saturating_mul(quantity);
    inventory.add_gold(credit);
    Ok(credit)
}

/// Inn price: the event's own cost, else the configured default.
#[must_use]
pub fn inn_price(event_cost: Option<u32>, default_cost: u32) -> u32 {
    event_cost.unwrap_or(default_cost)
}
