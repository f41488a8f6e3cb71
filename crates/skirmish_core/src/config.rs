//! Simulation configuration.
//!
//! Loaded from RON. Every section and field has a default, so a config file
//! only needs to list what it changes:
//!
//! ```ron
//! (
//!     tick_rate: 30,
//!     combat: (hit_chance: 1.0),
//!     production: (time_to_spawn_unit: 2.0),
//! )
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::combat::{ChaseTuning, CombatDefaults};
use crate::economy::EconomyConfig;
use crate::error::{GameError, Result};
use crate::health::HealthSpeedTable;
use crate::math::{decimal_serde, decimal_vec2_serde, Fixed, Vec2Fixed};
use crate::movement::MovementTuning;
use crate::production::ProductionConfig;

/// Default simulation tick rate in Hz.
pub const DEFAULT_TICK_RATE: u32 = 20;

/// Default RNG seed.
pub const DEFAULT_SEED: u64 = 0xD00D_FEED;

/// Largest accepted `world_extent`.
///
/// Squared distances across the whole map must stay inside `I32F32`.
pub const MAX_WORLD_EXTENT: i32 = 10_000;

/// Base stats for every spawned unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitDefaults {
    /// Move speed in units per second.
    #[serde(with = "decimal_serde")]
    pub move_speed: Fixed,
    /// Rotation interpolation rate per second.
    #[serde(with = "decimal_serde")]
    pub rotation_speed: Fixed,
}

impl Default for UnitDefaults {
    fn default() -> Self {
        Self {
            move_speed: Fixed::from_num(5),
            rotation_speed: Fixed::from_num(5),
        }
    }
}

/// Forces granted to a player on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartConfig {
    /// Units spawned in a line at the base.
    pub unit_count: u32,
    /// Gap between those units.
    #[serde(with = "decimal_serde")]
    pub unit_spacing: Fixed,
    /// Offset of the production building from the base position.
    #[serde(with = "decimal_vec2_serde")]
    pub building_offset: Vec2Fixed,
    /// Bases are placed uniformly in `[-base_extent, base_extent)` per axis.
    #[serde(with = "decimal_serde")]
    pub base_extent: Fixed,
}

impl Default for StartConfig {
    fn default() -> Self {
        Self {
            unit_count: 5,
            unit_spacing: Fixed::ONE,
            building_offset: Vec2Fixed::new(Fixed::ZERO, Fixed::from_num(5)),
            base_extent: Fixed::from_num(10),
        }
    }
}

/// Complete simulation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Ticks per second.
    pub tick_rate: u32,
    /// Seed for [`crate::rng::SimRng`].
    pub seed: u64,
    /// Half-size of the square playable area centred on the origin.
    #[serde(with = "decimal_serde")]
    pub world_extent: Fixed,
    /// Unit base stats.
    pub unit: UnitDefaults,
    /// Movement resolver tunables.
    pub movement: MovementTuning,
    /// Combat authoring defaults.
    pub combat: CombatDefaults,
    /// Chase geometry.
    pub chase: ChaseTuning,
    /// Stage to speed table. `None` leaves every unit at full speed.
    pub health_speed_table: Option<HealthSpeedTable>,
    /// Production settings.
    pub production: ProductionConfig,
    /// Ledger settings.
    pub economy: EconomyConfig,
    /// Join-time forces.
    pub start: StartConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            seed: DEFAULT_SEED,
            world_extent: Fixed::from_num(1000),
            unit: UnitDefaults::default(),
            movement: MovementTuning::default(),
            combat: CombatDefaults::default(),
            chase: ChaseTuning::default(),
            health_speed_table: Some(HealthSpeedTable::default()),
            production: ProductionConfig::default(),
            economy: EconomyConfig::default(),
            start: StartConfig::default(),
        }
    }
}

impl SimConfig {
    /// Duration of one tick in seconds.
    #[must_use]
    pub fn timestep(&self) -> Fixed {
        Fixed::ONE / Fixed::from_num(self.tick_rate.max(1))
    }

    /// Whether `position` lies inside the playable area (edges included).
    #[must_use]
    pub fn in_world(&self, position: Vec2Fixed) -> bool {
        let extent = self.world_extent;
        (-extent..=extent).contains(&position.x) && (-extent..=extent).contains(&position.y)
    }

    /// Copy with a different seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parse from a RON string and validate.
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let config: Self = ron::from_str(source).map_err(|e| GameError::ConfigParse {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        config.validated()
    }

    /// Load from a RON file and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| GameError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = ron::from_str(&source).map_err(|e| GameError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        tracing::info!(path = %path.display(), "Loaded simulation config");
        config.validated()
    }

    /// Serialize to pretty RON.
    pub fn to_ron_string(&self) -> Result<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize config: {e}")))
    }

    fn validated(self) -> Result<Self> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(GameError::ConfigInvalid(errors))
        }
    }

    /// Validate the config, returning a list of problems.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.tick_rate == 0 {
            errors.push("tick_rate must be positive".to_string());
        }
        if self.world_extent <= Fixed::ZERO
            || self.world_extent > Fixed::from_num(MAX_WORLD_EXTENT)
        {
            errors.push(format!(
                "world_extent must be in (0, {MAX_WORLD_EXTENT}], got {}",
                self.world_extent
            ));
        } else if self.start.base_extent > self.world_extent {
            errors.push("start.base_extent must not exceed world_extent".to_string());
        }
        if self.unit.move_speed < Fixed::ZERO || self.unit.rotation_speed < Fixed::ZERO {
            errors.push("unit speeds must not be negative".to_string());
        }
        if self.combat.attack_range < Fixed::ZERO {
            errors.push("combat.attack_range must not be negative".to_string());
        }
        if self.start.unit_spacing < Fixed::ZERO || self.start.base_extent < Fixed::ZERO {
            errors.push("start spacing and extent must not be negative".to_string());
        }
        if let Some(table) = &self.health_speed_table {
            errors.extend(table.validate());
        }
        errors.extend(self.production.validate());
        errors.extend(self.economy.validate());
        errors
    }
}
