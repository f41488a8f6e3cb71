//! Staged health model.
//!
//! Units do not carry hit points. Damage moves a unit along a short,
//! ordered ladder of stages from [`HealthStage::Healthy`] to
//! [`HealthStage::Dead`]. Attackers accumulate a signed delta during the
//! combat phase and the health phase folds it into the stage exactly once
//! per tick.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, UnitModifiers};
use crate::math::{decimal_serde, Fixed};

/// Health stage, ordered from healthiest to deadest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum HealthStage {
    /// Undamaged.
    #[default]
    Healthy = 0,
    /// Lightly hurt.
    Grazed = 1,
    /// Badly hurt.
    Wounded = 2,
    /// One step from death.
    Critical = 3,
    /// Dead, removed at the end of the health phase.
    Dead = 4,
}

impl HealthStage {
    /// All stages in ladder order.
    pub const ALL: [Self; 5] = [
        Self::Healthy,
        Self::Grazed,
        Self::Wounded,
        Self::Critical,
        Self::Dead,
    ];

    /// Position on the ladder, 0 for `Healthy`.
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    /// Stage at a ladder position.
    #[must_use]
    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(usize::from(index)).copied()
    }

    /// Apply a delta on the full `Healthy..=Dead` ladder.
    #[must_use]
    pub fn apply(self, delta: i32) -> Self {
        apply_delta(self, delta, Self::Dead, Self::Healthy)
    }

    /// Whether this is the dead stage.
    #[must_use]
    pub const fn is_dead(self) -> bool {
        matches!(self, Self::Dead)
    }
}

/// Map a stage and a signed delta to a new stage.
///
/// Negative deltas move toward `dead` by `|delta|` steps, positive deltas
/// heal toward `healthy`. The result is clamped to `healthy..=dead`. This
/// function is total and side-effect free, so clients may call it to
/// predict a stage without touching replicated state.
#[must_use]
pub fn apply_delta(
    current: HealthStage,
    delta: i32,
    dead: HealthStage,
    healthy: HealthStage,
) -> HealthStage {
    debug_assert!(healthy <= dead, "stage bounds are inverted");

    let low = i64::from(healthy.index());
    let high = i64::from(dead.index());
    let next = (i64::from(current.index()) - i64::from(delta)).clamp(low, high);

    u8::try_from(next)
        .ok()
        .and_then(HealthStage::from_index)
        .unwrap_or(dead)
}

/// Per-unit health state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct HealthState {
    /// Stage after the last health phase.
    pub current_stage: HealthStage,
    /// Stage before the last transition.
    pub previous_stage: HealthStage,
    /// Delta accumulated during this tick, consumed by the health phase.
    pub health_change: i32,
}

impl HealthState {
    /// Create a state at the given stage with no pending delta.
    #[must_use]
    pub const fn at(stage: HealthStage) -> Self {
        Self {
            current_stage: stage,
            previous_stage: stage,
            health_change: 0,
        }
    }

    /// Whether the unit counts as alive for targeting.
    #[must_use]
    pub const fn is_alive(&self) -> bool {
        !self.current_stage.is_dead()
    }
}

/// A stage change produced by the health phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    /// Unit that changed.
    pub entity: EntityId,
    /// Stage before.
    pub from: HealthStage,
    /// Stage after.
    pub to: HealthStage,
}

/// One row of the stage to speed table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSpeed {
    /// Stage this row applies to.
    pub stage: HealthStage,
    /// Movement multiplier while in that stage.
    #[serde(with = "decimal_serde")]
    pub multiplier: Fixed,
}

/// Data-driven table mapping health stages to movement multipliers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSpeedTable {
    /// Table rows. Stages without a row move at full speed.
    pub entries: Vec<StageSpeed>,
}

impl Default for HealthSpeedTable {
    fn default() -> Self {
        let row = |stage, multiplier: f64| StageSpeed {
            stage,
            multiplier: Fixed::from_num(multiplier),
        };
        Self {
            entries: vec![
                row(HealthStage::Healthy, 1.0),
                row(HealthStage::Grazed, 0.85),
                row(HealthStage::Wounded, 0.65),
                row(HealthStage::Critical, 0.4),
                row(HealthStage::Dead, 0.0),
            ],
        }
    }
}

impl HealthSpeedTable {
    /// Multiplier for a stage, 1.0 when the table has no row for it.
    #[must_use]
    pub fn multiplier(&self, stage: HealthStage) -> Fixed {
        self.entries
            .iter()
            .find(|row| row.stage == stage)
            .map_or(Fixed::ONE, |row| row.multiplier)
    }

    /// Validate the table, returning a list of problems.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        for (i, row) in self.entries.iter().enumerate() {
            if row.multiplier < Fixed::ZERO {
                errors.push(format!("speed multiplier for {:?} is negative", row.stage));
            }
            if self.entries[..i].iter().any(|r| r.stage == row.stage) {
                errors.push(format!("duplicate speed row for {:?}", row.stage));
            }
        }
        errors
    }
}

/// Movement multiplier for a stage given an optional table.
#[must_use]
pub fn speed_multiplier(table: Option<&HealthSpeedTable>, stage: HealthStage) -> Fixed {
    table.map_or(Fixed::ONE, |t| t.multiplier(stage))
}

/// Fold the pending delta into the stage.
///
/// Returns the transition when the delta was nonzero. The delta is zeroed
/// either way, so calling this twice in one tick is harmless.
pub fn resolve_health(entity: EntityId, state: &mut HealthState) -> Option<StageTransition> {
    if state.health_change == 0 {
        return None;
    }

    let from = state.current_stage;
    let to = apply_delta(from, state.health_change, HealthStage::Dead, HealthStage::Healthy);
    state.previous_stage = from;
    state.current_stage = to;
    state.health_change = 0;

    Some(StageTransition { entity, from, to })
}

/// Health system: resolve pending deltas and refresh speed multipliers.
///
/// Returns stage transitions and the ids of units that reached `Dead`, in
/// input order. Multipliers are refreshed for every unit, changed or not.
pub fn health_stage_system(
    units: &mut [(EntityId, &mut HealthState, Option<&mut UnitModifiers>)],
    table: Option<&HealthSpeedTable>,
) -> (Vec<StageTransition>, Vec<EntityId>) {
    let mut transitions = Vec::new();
    let mut deaths = Vec::new();

    for (id, state, modifiers) in units.iter_mut() {
        if let Some(transition) = resolve_health(*id, state) {
            transitions.push(transition);
            if transition.to.is_dead() {
                deaths.push(*id);
            }
        }

        if let Some(modifiers) = modifiers {
            modifiers.move_speed_multiplier = speed_multiplier(table, state.current_stage);
        }
    }

    (transitions, deaths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_delta_moves_toward_dead() {
        assert_eq!(HealthStage::Healthy.apply(-1), HealthStage::Grazed);
        assert_eq!(HealthStage::Grazed.apply(-2), HealthStage::Critical);
        assert_eq!(HealthStage::Healthy.apply(-4), HealthStage::Dead);
    }

    #[test]
    fn test_clamps_at_both_ends() {
        assert_eq!(HealthStage::Healthy.apply(-100), HealthStage::Dead);
        assert_eq!(HealthStage::Critical.apply(100), HealthStage::Healthy);
        assert_eq!(HealthStage::Healthy.apply(i32::MAX), HealthStage::Healthy);
        assert_eq!(HealthStage::Dead.apply(i32::MIN), HealthStage::Dead);
    }

    #[test]
    fn test_custom_bounds() {
        let stage = apply_delta(
            HealthStage::Grazed,
            -5,
            HealthStage::Critical,
            HealthStage::Grazed,
        );
        assert_eq!(stage, HealthStage::Critical);
        let healed = apply_delta(
            HealthStage::Critical,
            5,
            HealthStage::Critical,
            HealthStage::Grazed,
        );
        assert_eq!(healed, HealthStage::Grazed);
    }

    #[test]
    fn test_resolve_zeroes_delta_once() {
        let mut state = HealthState::at(HealthStage::Healthy);
        state.health_change = -2;

        let transition = resolve_health(7, &mut state).unwrap();
        assert_eq!(transition.from, HealthStage::Healthy);
        assert_eq!(transition.to, HealthStage::Wounded);
        assert_eq!(state.previous_stage, HealthStage::Healthy);
        assert_eq!(state.health_change, 0);

        assert!(resolve_health(7, &mut state).is_none());
        assert_eq!(state.current_stage, HealthStage::Wounded);
    }

    #[test]
    fn test_speed_table_lookup_defaults_to_one() {
        let table = HealthSpeedTable {
            entries: vec![StageSpeed {
                stage: HealthStage::Dead,
                multiplier: Fixed::ZERO,
            }],
        };
        assert_eq!(table.multiplier(HealthStage::Wounded), Fixed::ONE);
        assert_eq!(table.multiplier(HealthStage::Dead), Fixed::ZERO);
        assert_eq!(speed_multiplier(None, HealthStage::Critical), Fixed::ONE);
    }

    #[test]
    fn test_system_refreshes_every_multiplier() {
        let table = HealthSpeedTable::default();
        let mut hurt = HealthState::at(HealthStage::Wounded);
        let mut lethal = HealthState::at(HealthStage::Healthy);
        lethal.health_change = -4;
        let mut hurt_mods = UnitModifiers::default();
        let mut lethal_mods = UnitModifiers::default();

        let (transitions, deaths) = {
            let mut units = vec![
                (1, &mut hurt, Some(&mut hurt_mods)),
                (2, &mut lethal, Some(&mut lethal_mods)),
            ];
            health_stage_system(&mut units, Some(&table))
        };

        assert_eq!(transitions.len(), 1);
        assert_eq!(deaths, vec![2]);
        assert_eq!(
            hurt_mods.move_speed_multiplier,
            table.multiplier(HealthStage::Wounded)
        );
        assert_eq!(lethal_mods.move_speed_multiplier, Fixed::ZERO);
    }

    #[test]
    fn test_table_validation() {
        let mut table = HealthSpeedTable::default();
        assert!(table.validate().is_empty());
        table.entries.push(StageSpeed {
            stage: HealthStage::Grazed,
            multiplier: Fixed::from_num(-1),
        });
        assert_eq!(table.validate().len(), 2);
    }
}
