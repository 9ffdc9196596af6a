//! Party members, experience, and leveling.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::{
    GROWTH_ATTACK, GROWTH_DEFENSE, GROWTH_HP, GROWTH_MAGIC, GROWTH_MP, GROWTH_SPEED,
};

/// Level-ups produced by a single experience award; a party rarely exceeds four.
pub type LevelUps = SmallVec<[LevelUp; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    #[serde(default = "Character::default_level")]
    pub level: u32,
    /// Cumulative experience
    #[serde(default)]
    pub experience: u32,
    pub hp: i32,
    pub max_hp: i32,
    #[serde(default)]
    pub mp: i32,
    #[serde(default)]
    pub max_mp: i32,
    #[serde(default)]
    pub attack: i32,
    #[serde(default)]
    pub defense: i32,
    #[serde(default)]
    pub magic: i32,
    #[serde(default)]
    pub speed: i32,
    #[serde(default)]
    pub equipment: Vec<String>,
}

impl Character {
    const fn default_level() -> u32 {
        1
    }

    #[must_use]
    pub const fn is_conscious(&self) -> bool {
        self.hp > 0
    }

    pub fn restore(&mut self) {
        self.hp = self.max_hp;
        self.mp = self.max_mp;
    }

    /// Copy HP/MP from a battle-side copy of this character, clamped to the
    /// character's own maxima.
    pub fn carry_vitals_from(&mut self, battle_copy: &Self) {
        self.hp = battle_copy.hp.clamp(0, self.max_hp);
        self.mp = battle_copy.mp.clamp(0, self.max_mp);
    }

    /// Award experience and run leveling.
    pub fn gain_experience(&mut self, amount: u32, curve: &ExperienceCurve) -> Option<LevelUp> {
        if amount == 0 {
            return None;
        }
        self.experience = self.experience.saturating_add(amount);
        let from_level = self.level;
        while self.level < curve.level_cap
            && self.experience >= curve.experience_for_level(self.level + 1)
        {
            self.level += 1;
            self.max_hp += GROWTH_HP;
            self.max_mp += GROWTH_MP;
            self.attack += GROWTH_ATTACK;
            self.defense += GROWTH_DEFENSE;
            self.magic += GROWTH_MAGIC;
            self.speed += GROWTH_SPEED;
        }
        if self.level == from_level {
            return None;
        }
        self.restore();
        let gained = i32::try_from(self.level - from_level).unwrap_or(i32::MAX);
        Some(LevelUp {
            character_id: self.id.clone(),
            from_level,
            to_level: self.level,
            hp_gain: GROWTH_HP.saturating_mul(gained),
            mp_gain: GROWTH_MP.saturating_mul(gained),
        })
    }
}

/// Quadratic experience curve: reaching level `n` takes `base * (n-1)^2`
/// cumulative experience.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExperienceCurve {
    pub base: u32,
    pub level_cap: u32,
}

impl ExperienceCurve {
    #[must_use]
    pub const fn new(base: u32, level_cap: u32) -> Self {
        Self { base, level_cap }
    }

    #[must_use]
    pub fn experience_for_level(&self, level: u32) -> u32 {
        let steps = level.saturating_sub(1);
        self.base.saturating_mul(steps.saturating_mul(steps))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelUp {
    pub character_id: String,
    pub from_level: u32,
    pub to_level: u32,
    pub hp_gain: i32,
    pub mp_gain: i32,
}

/// Ordered party; the first member leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Party {
    members: Vec<Character>,
}

impl Party {
    #[must_use]
    pub fn new(members: Vec<Character>) -> Self {
        Self { members }
    }

    #[must_use]
    pub fn members(&self) -> &[Character] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [Character] {
        &mut self.members
    }

    #[must_use]
    pub fn leader(&self) -> Option<&Character> {
        self.members.first()
    }

    #[must_use]
    pub fn get(&self, character_id: &str) -> Option<&Character> {
        self.members.iter().find(|c| c.id == character_id)
    }

    #[must_use]
    pub fn contains(&self, character_id: &str) -> bool {
        self.get(character_id).is_some()
    }

    /// Highest level among members; zero for an empty party.
    #[must_use]
    pub fn max_level(&self) -> u32 {
        self.members.iter().map(|c| c.level).max().unwrap_or(0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Add a member unless someone with the same id is already present.
    pub fn recruit(&mut self, character: Character) -> bool {
        if self.contains(&character.id) {
            return false;
        }
        self.members.push(character);
        true
    }

    pub fn restore_all(&mut self) {
        for member in &mut self.members {
            member.restore();
        }
    }

    /// Award the same experience to every member.
    pub fn award_experience(&mut self, amount: u32, curve: &ExperienceCurve) -> LevelUps {
        self.members
            .iter_mut()
            .filter_map(|member| member.gain_experience(amount, curve))
            .collect()
    }
}
