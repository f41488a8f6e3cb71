//! Movement resolver.
//!
//! Converts a unit's [`UnitMover`] intent into a velocity and a facing
//! update. There is no physics engine: the simulation integrates the
//! returned velocity directly into the position.

use serde::{Deserialize, Serialize};

use crate::components::{Transform, Unit, Velocity};
use crate::math::{
    decimal_serde, fixed_serde, wrap_angle, yaw_towards, Fixed, Vec2Fixed, ONE_DEGREE,
};

/// Per-unit movement intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UnitMover {
    /// Destination.
    pub target_position: Vec2Fixed,
    /// Facing to settle into on arrival.
    #[serde(with = "fixed_serde")]
    pub target_rotation: Fixed,
    /// Whether an order is being executed.
    pub active_target: bool,
    /// Whether the order asked for running speed.
    pub is_running: bool,
    /// Highest client move sequence applied to this unit.
    pub last_applied_sequence: u32,
}

impl UnitMover {
    /// Mover that holds a position and facing.
    #[must_use]
    pub const fn holding(position: Vec2Fixed, yaw: Fixed) -> Self {
        Self {
            target_position: position,
            target_rotation: yaw,
            active_target: false,
            is_running: false,
            last_applied_sequence: 0,
        }
    }
}

/// A client move order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveOrder {
    /// Destination.
    pub target_position: Vec2Fixed,
    /// Facing on arrival.
    #[serde(with = "fixed_serde")]
    pub target_rotation: Fixed,
    /// Run instead of walk.
    pub running: bool,
    /// Client sequence number, strictly increasing per unit.
    pub sequence: u32,
}

/// Apply a client order if its sequence is newer than the last applied one.
///
/// Returns `false` and leaves the mover untouched for stale or repeated
/// sequences.
pub fn apply_move_order(mover: &mut UnitMover, order: &MoveOrder) -> bool {
    if order.sequence <= mover.last_applied_sequence {
        return false;
    }

    mover.target_position = order.target_position;
    mover.target_rotation = wrap_angle(order.target_rotation);
    mover.is_running = order.running;
    mover.active_target = true;
    mover.last_applied_sequence = order.sequence;
    true
}

/// One-shot order to walk to the producing building's rally point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MoveToRallyPoint {
    /// Rally position.
    pub target: Vec2Fixed,
}

/// Point the mover at a rally point. Sequence numbers are not touched.
pub fn apply_rally_order(mover: &mut UnitMover, from: Vec2Fixed, rally: &MoveToRallyPoint) {
    let heading = rally.target - from;
    if heading != Vec2Fixed::ZERO {
        mover.target_rotation = yaw_towards(heading);
    }
    mover.target_position = rally.target;
    mover.is_running = false;
    mover.active_target = true;
}

/// Tunables for the movement resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementTuning {
    /// Squared distance at which an active order counts as arrived.
    #[serde(with = "decimal_serde")]
    pub arrive_threshold_sq: Fixed,
    /// Squared distance under which an idle unit stops drifting.
    #[serde(with = "decimal_serde")]
    pub idle_threshold_sq: Fixed,
    /// Speed factor for running orders.
    #[serde(with = "decimal_serde")]
    pub run_multiplier: Fixed,
    /// Speed factor for idle drift back to the last target.
    #[serde(with = "decimal_serde")]
    pub idle_multiplier: Fixed,
    /// Squared length below which a direction is treated as zero.
    #[serde(with = "decimal_serde")]
    pub min_direction_sq: Fixed,
}

impl Default for MovementTuning {
    fn default() -> Self {
        Self {
            arrive_threshold_sq: Fixed::from_num(0.05),
            idle_threshold_sq: Fixed::from_num(0.5),
            run_multiplier: Fixed::from_num(1.5),
            idle_multiplier: Fixed::from_num(0.5),
            min_direction_sq: Fixed::from_bits(1 << 12),
        }
    }
}

/// Result of resolving one unit for one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MovementUpdate {
    /// Linear velocity for this tick.
    pub velocity: Vec2Fixed,
    /// Facing after this tick.
    pub yaw: Fixed,
    /// The active order finished: position reached and facing settled.
    pub completed: bool,
}

/// Turn `current` toward `target` by `dt * rate` of the remaining arc.
///
/// Snaps onto the target once less than a degree remains. Returns the new
/// yaw and whether it snapped.
#[must_use]
pub fn rotate_towards(current: Fixed, target: Fixed, rate: Fixed, dt: Fixed) -> (Fixed, bool) {
    let diff = wrap_angle(target - current);
    if diff.abs() < ONE_DEGREE {
        return (wrap_angle(target), true);
    }
    let t = (dt * rate).clamp(Fixed::ZERO, Fixed::ONE);
    (wrap_angle(current + diff * t), false)
}

/// Resolve one unit's velocity and facing.
///
/// `multiplier` comes from the health stage table; zero or below freezes
/// the unit regardless of its order.
#[must_use]
pub fn resolve_movement(
    transform: &Transform,
    mover: &UnitMover,
    unit: &Unit,
    multiplier: Fixed,
    tuning: &MovementTuning,
    dt: Fixed,
) -> MovementUpdate {
    let frozen = MovementUpdate {
        velocity: Vec2Fixed::ZERO,
        yaw: transform.yaw,
        completed: false,
    };
    if multiplier <= Fixed::ZERO {
        return frozen;
    }

    let to_target = mover.target_position - transform.position;
    let dist_sq = to_target.length_squared();

    let (threshold_sq, behavior) = if mover.active_target {
        let behavior = if mover.is_running {
            tuning.run_multiplier
        } else {
            Fixed::ONE
        };
        (tuning.arrive_threshold_sq, behavior)
    } else {
        (tuning.idle_threshold_sq, tuning.idle_multiplier)
    };

    if dist_sq < threshold_sq {
        let (yaw, settled) =
            rotate_towards(transform.yaw, mover.target_rotation, unit.rotation_speed, dt);
        return MovementUpdate {
            velocity: Vec2Fixed::ZERO,
            yaw,
            completed: mover.active_target && settled,
        };
    }

    let direction = to_target.normalize_or_zero(tuning.min_direction_sq);
    if direction == Vec2Fixed::ZERO {
        return frozen;
    }

    let (yaw, _) = rotate_towards(
        transform.yaw,
        yaw_towards(direction),
        unit.rotation_speed,
        dt,
    );

    let mut speed = unit.move_speed * behavior * multiplier;
    if dt > Fixed::ZERO {
        // Do not step past the destination in a single tick.
        speed = speed.min(to_target.length() / dt);
    }

    MovementUpdate {
        velocity: direction.scale(speed),
        yaw,
        completed: false,
    }
}

/// Resolve and integrate one unit for a tick.
///
/// Returns `true` when the unit's active order completed this tick.
pub fn step_unit(
    transform: &mut Transform,
    velocity: &mut Velocity,
    mover: &mut UnitMover,
    unit: &Unit,
    multiplier: Fixed,
    tuning: &MovementTuning,
    dt: Fixed,
) -> bool {
    let update = resolve_movement(transform, mover, unit, multiplier, tuning, dt);
    velocity.linear = update.velocity;
    transform.yaw = update.yaw;
    transform.position += update.velocity.scale(dt);
    if update.completed {
        mover.active_target = false;
    }
    update.completed
}
