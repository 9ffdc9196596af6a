//! Emberwake Game Engine
//!
//! Platform-agnostic session orchestration for the Emberwake story RPG: the
//! phase machine, movement and interaction, quests, dialogue, encounters,
//! battle outcomes and save slots. Rendering, transition effects and battle
//! turn resolution live outside this crate.

pub mod battle;
pub mod config;
pub mod constants;
pub mod content;
pub mod dialogue;
pub mod encounters;
pub mod flags;
pub mod interact;
pub mod items;
pub mod movement;
pub mod party;
pub mod phase;
pub mod quests;
pub mod save;
pub mod session;
pub mod shop;
pub mod state;
pub mod transition;
pub mod world;

use std::sync::Arc;

// Re-export commonly used types
pub use battle::{
    ActiveBattle, BattleReport, BattleRewards, BattleState, BattleSubsystem, Combatant,
    EnemyRegistry, EnemyTemplate, StandardBattles, compute_rewards,
};
pub use config::{SessionConfig, SessionConfigError};
pub use content::{ContentError, GameContent, StartingState};
pub use dialogue::{
    ActiveDialogue, Condition, DialogueChoice, DialogueEffect, DialogueInterpreter,
    DialogueNode, DialogueOutcome, DialogueRegistry, DialogueStep, EffectReport,
};
pub use encounters::{EncounterScheduler, WildEncounter, WildTrigger};
pub use flags::StoryFlags;
pub use interact::InteractionOutcome;
pub use items::{Inventory, Item, ItemCatalog, ItemGrant, ItemKind, StackResult};
pub use movement::{BlockReason, MoveOutcome};
pub use party::{Character, ExperienceCurve, LevelUp, Party};
pub use phase::{GamePhase, PhaseController, PhaseError};
pub use quests::{
    ObjectiveKind, ObjectiveUpdate, Quest, QuestBook, QuestError, QuestLedger, QuestProgress,
    QuestRewardPayload, QuestStatus,
};
pub use save::{LoadError, MemorySlotStorage, SaveError, SaveRecord, SlotSummary};
pub use session::{GameSession, SessionError};
pub use shop::{Cart, CartLine, Purchase, Shop, ShopError, calculate_effective_price};
pub use state::{Notification, Session};
pub use transition::{AppliedTransition, PendingTransition};
pub use world::{Direction, MapData, MapEvent, PlayerPosition};

/// Name under which [`ContentLoader::load_config`] finds the session tuning.
pub const SESSION_CONFIG_NAME: &str = "session";

/// Trait for abstracting content loading operations
/// Platform-specific implementations should provide this
pub trait ContentLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the static game content
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be loaded.
    fn load_content(&self) -> Result<GameContent, Self::Error>;

    /// Load configuration data for a specific system
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded or parsed.
    fn load_config<T>(&self, config_name: &str) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned;
}

/// Trait for abstracting save slot storage
/// Platform-specific implementations should provide this
pub trait SaveStorage {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the raw record in a slot, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read.
    fn read_slot(&self, slot: u8) -> Result<Option<String>, Self::Error>;

    /// Write a raw record into a slot
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be written.
    fn write_slot(&self, slot: u8, data: &str) -> Result<(), Self::Error>;

    /// Empty a slot
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be deleted.
    fn delete_slot(&self, slot: u8) -> Result<(), Self::Error>;
}

/// Loads the bundled demo world with default tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct DemoContentLoader;

impl ContentLoader for DemoContentLoader {
    type Error = ContentError;

    fn load_content(&self) -> Result<GameContent, Self::Error> {
        GameContent::demo()
    }

    fn load_config<T>(&self, _config_name: &str) -> Result<T, Self::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(serde_json::from_str("{}")?)
    }
}

/// Main game engine binding content and save storage to sessions
pub struct GameEngine<L, S>
where
    L: ContentLoader,
    S: SaveStorage,
{
    content_loader: L,
    storage: S,
}

impl<L, S> GameEngine<L, S>
where
    L: ContentLoader,
    S: SaveStorage,
{
    /// Create a new game engine with the provided content loader and storage
    pub const fn new(content_loader: L, storage: S) -> Self {
        Self {
            content_loader,
            storage,
        }
    }

    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Start a new game with the specified seed
    ///
    /// # Errors
    ///
    /// Returns an error if content or configuration cannot be loaded, the
    /// content has dangling references, or the session cannot start.
    pub fn new_game(&self, seed: u64) -> Result<GameSession, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
    {
        let content = self.content_loader.load_content().map_err(Into::into)?;
        content.validate()?;
        let config: SessionConfig = self
            .content_loader
            .load_config(SESSION_CONFIG_NAME)
            .map_err(Into::into)?;
        Ok(GameSession::new_game(Arc::new(content), config, seed)?)
    }

    /// Save a session into a slot
    ///
    /// # Errors
    ///
    /// Returns an error if the session cannot be saved.
    pub fn save_game(&self, session: &mut GameSession, slot: u8) -> Result<SlotSummary, SaveError> {
        session.save(&self.storage, slot)
    }

    /// Load a slot into a fresh session
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be loaded or the slot holds
    /// unreadable data.
    pub fn load_game(&self, slot: u8, seed: u64) -> Result<Option<GameSession>, anyhow::Error>
    where
        L::Error: Into<anyhow::Error>,
    {
        let mut session = self.new_game(seed)?;
        match session.load(&self.storage, slot) {
            Ok(_) => Ok(Some(session)),
            Err(LoadError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
