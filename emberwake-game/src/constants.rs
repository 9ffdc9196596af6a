//! Centralized tuning constants and message keys for Emberwake session logic.
//!
//! Balance values that content authors may override live in
//! [`crate::config::SessionConfig`]; the values here are the fallbacks and the
//! fixed rules of the orchestrator.

// Encounter scheduling -----------------------------------------------------
pub(crate) const ENCOUNTER_MIN_STEPS: u32 = 8;
pub(crate) const ENCOUNTER_MAX_STEPS: u32 = 20;
pub(crate) const WILD_GROUP_MAX_DEFAULT: u8 = 3;

// Inventory ---------------------------------------------------------------
pub(crate) const MAX_STACK_DEFAULT: u32 = 99;
pub(crate) const STARTING_GOLD_DEFAULT: u32 = 100;
pub(crate) const SELL_RATIO_DEFAULT: f32 = 0.5;
pub(crate) const INN_COST_DEFAULT: u32 = 10;

// Leveling ----------------------------------------------------------------
pub(crate) const EXP_CURVE_BASE_DEFAULT: u32 = 50;
pub(crate) const LEVEL_CAP_DEFAULT: u32 = 50;
pub(crate) const GROWTH_HP: i32 = 12;
pub(crate) const GROWTH_MP: i32 = 4;
pub(crate) const GROWTH_ATTACK: i32 = 3;
pub(crate) const GROWTH_DEFENSE: i32 = 2;
pub(crate) const GROWTH_MAGIC: i32 = 2;
pub(crate) const GROWTH_SPEED: i32 = 1;

// Persistence -------------------------------------------------------------
pub const SAVE_VERSION: u32 = 3;
pub(crate) const SAVE_SLOT_COUNT_DEFAULT: u8 = 3;

// Story flag prefixes -----------------------------------------------------
pub(crate) const FLAG_QUEST_STARTED_PREFIX: &str = "quest_started:";
pub(crate) const FLAG_QUEST_COMPLETED_PREFIX: &str = "quest_completed:";

// Player-facing messages --------------------------------------------------
pub(crate) const MSG_CHEST_EMPTY: &str = "The chest is empty.";
pub(crate) const MSG_CHEST_NOTHING: &str = "Found nothing.";
pub(crate) const MSG_ALREADY_COLLECTED: &str = "Nothing else here.";
pub(crate) const MSG_PATH_BLOCKED: &str = "The way is blocked.";
pub(crate) const MSG_SHOP_CLOSED: &str = "The shop is closed.";
pub(crate) const MSG_NOTHING_HAPPENS: &str = "Nothing happens.";
