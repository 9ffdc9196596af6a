//! Session tuning configuration.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    ENCOUNTER_MAX_STEPS, ENCOUNTER_MIN_STEPS, EXP_CURVE_BASE_DEFAULT, INN_COST_DEFAULT,
    LEVEL_CAP_DEFAULT, MAX_STACK_DEFAULT, SAVE_SLOT_COUNT_DEFAULT, SELL_RATIO_DEFAULT,
    STARTING_GOLD_DEFAULT,
};

/// Errors raised when session configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum SessionConfigError {
    #[error("encounter step minimum {min} exceeds maximum {max}")]
    EncounterStepsInverted { min: u32, max: u32 },
    #[error("{field} must be at least {min} (got {value})")]
    MinViolation {
        field: &'static str,
        min: u32,
        value: u32,
    },
    #[error("sell ratio must be between 0.00 and 1.00 (got {0:.2})")]
    SellRatio(f32),
}

/// Balance knobs for a play session. Every field falls back to a default so
/// partial JSON overrides are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_encounter_min_steps")]
    pub encounter_min_steps: u32,
    #[serde(default = "SessionConfig::default_encounter_max_steps")]
    pub encounter_max_steps: u32,
    #[serde(default = "SessionConfig::default_max_stack")]
    pub max_stack: u32,
    #[serde(default = "SessionConfig::default_save_slots")]
    pub save_slots: u8,
    #[serde(default = "SessionConfig::default_sell_ratio")]
    pub sell_ratio: f32,
    #[serde(default = "SessionConfig::default_exp_curve_base")]
    pub exp_curve_base: u32,
    #[serde(default = "SessionConfig::default_level_cap")]
    pub level_cap: u32,
    #[serde(default = "SessionConfig::default_inn_cost")]
    pub inn_cost: u32,
    #[serde(default = "SessionConfig::default_starting_gold")]
    pub starting_gold: u32,
}

impl SessionConfig {
    const fn default_encounter_min_steps() -> u32 {
        ENCOUNTER_MIN_STEPS
    }

    const fn default_encounter_max_steps() -> u32 {
        ENCOUNTER_MAX_STEPS
    }

    const fn default_max_stack() -> u32 {
        MAX_STACK_DEFAULT
    }

    const fn default_save_slots() -> u8 {
        SAVE_SLOT_COUNT_DEFAULT
    }

    const fn default_sell_ratio() -> f32 {
        SELL_RATIO_DEFAULT
    }

    const fn default_exp_curve_base() -> u32 {
        EXP_CURVE_BASE_DEFAULT
    }

    const fn default_level_cap() -> u32 {
        LEVEL_CAP_DEFAULT
    }

    const fn default_inn_cost() -> u32 {
        INN_COST_DEFAULT
    }

    const fn default_starting_gold() -> u32 {
        STARTING_GOLD_DEFAULT
    }

    #[must_use]
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Parse a configuration override from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Check the cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), SessionConfigError> {
        if self.encounter_min_steps > self.encounter_max_steps {
            return Err(SessionConfigError::EncounterStepsInverted {
                min: self.encounter_min_steps,
                max: self.encounter_max_steps,
            });
        }
        if self.encounter_min_steps == 0 {
            return Err(SessionConfigError::MinViolation {
                field: "encounter_min_steps",
                min: 1,
                value: 0,
            });
        }
        if self.max_stack == 0 {
            return Err(SessionConfigError::MinViolation {
                field: "max_stack",
                min: 1,
                value: 0,
            });
        }
        if self.save_slots == 0 {
            return Err(SessionConfigError::MinViolation {
                field: "save_slots",
                min: 1,
                value: 0,
            });
        }
        if !(0.0..=1.0).contains(&self.sell_ratio) {
            return Err(SessionConfigError::SellRatio(self.sell_ratio));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            encounter_min_steps: Self::default_encounter_min_steps(),
            encounter_max_steps: Self::default_encounter_max_steps(),
            max_stack: Self::default_max_stack(),
            save_slots: Self::default_save_slots(),
            sell_ratio: Self::default_sell_ratio(),
            exp_curve_base: Self::default_exp_curve_base(),
            level_cap: Self::default_level_cap(),
            inn_cost: Self::default_inn_cost(),
            starting_gold: Self::default_starting_gold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = SessionConfig::from_json(r#"{ "encounter_min_steps": 4 }"#).unwrap();
        assert_eq!(cfg.encounter_min_steps, 4);
        assert_eq!(cfg.encounter_max_steps, ENCOUNTER_MAX_STEPS);
        assert_eq!(cfg.max_stack, MAX_STACK_DEFAULT);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn inverted_step_bounds_rejected() {
        let cfg = SessionConfig {
            encounter_min_steps: 30,
            encounter_max_steps: 10,
            ..SessionConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(SessionConfigError::EncounterStepsInverted { min: 30, max: 10 })
        );
    }

    #[test]
    fn sell_ratio_out_of_range_rejected() {
        let cfg = SessionConfig {
            sell_ratio: 1.5,
            ..SessionConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SessionConfigError::SellRatio(_))
        ));
    }
}
