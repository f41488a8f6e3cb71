//! Building-based unit production.
//!
//! Each producing building owns a [`BuildingSpawnQueue`]. Requests become
//! [`QueuedUnitSpawn`] records; at most one of them per building is promoted
//! to a [`PendingUnitSpawn`] countdown at a time. When the countdown
//! finishes the unit is created and the next queued record may be promoted
//! on the following tick.
//!
//! ```text
//! Empty -> Queued(N) -> Spawning (1 pending, N-1 queued) -> Queued(N-1) | Empty
//! ```

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, PlayerId};
use crate::economy::ResourceCost;
use crate::math::{
    decimal_serde, decimal_vec2_list_serde, fixed_serde, Fixed, Vec2Fixed, TIMER_EPSILON,
};

/// Marker for structures that can produce units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Building;

/// Production state of one building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildingSpawnQueue {
    /// Requests waiting for promotion.
    pub units_in_queue: u32,
    /// Whether a pending spawn is counting down.
    pub is_currently_spawning: bool,
    /// Countdown length for each unit.
    #[serde(with = "fixed_serde")]
    pub time_to_spawn_unit: Fixed,
}

impl BuildingSpawnQueue {
    /// Create an empty queue.
    #[must_use]
    pub const fn new(time_to_spawn_unit: Fixed) -> Self {
        Self {
            units_in_queue: 0,
            is_currently_spawning: false,
            time_to_spawn_unit,
        }
    }

    /// Record one more waiting request.
    pub fn enqueue(&mut self) {
        self.units_in_queue = self.units_in_queue.saturating_add(1);
    }

    /// Whether a queued request may start counting down.
    #[must_use]
    pub const fn can_promote(&self) -> bool {
        self.units_in_queue > 0 && !self.is_currently_spawning
    }

    /// Move one request from waiting to in progress.
    ///
    /// Returns `false` without changing anything if promotion is not
    /// allowed.
    pub fn promote(&mut self) -> bool {
        if !self.can_promote() {
            return false;
        }
        self.units_in_queue -= 1;
        self.is_currently_spawning = true;
        true
    }

    /// Finish the in-progress unit.
    ///
    /// Returns `true` when nothing is left waiting and the queue component
    /// should be removed.
    pub fn complete(&mut self) -> bool {
        self.is_currently_spawning = false;
        self.units_in_queue == 0
    }
}

/// Rally point of a building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BuildingRallyPoint {
    /// Rally destination.
    pub rally_position: Vec2Fixed,
    /// Whether a rally point has been set.
    pub has_rally_point: bool,
}

impl BuildingRallyPoint {
    /// The rally destination, if set.
    #[must_use]
    pub const fn get(&self) -> Option<Vec2Fixed> {
        if self.has_rally_point {
            Some(self.rally_position)
        } else {
            None
        }
    }
}

/// A production request waiting for its building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueuedUnitSpawn {
    /// Producing building.
    pub building: EntityId,
    /// Owner of the unit to be produced.
    pub owner: PlayerId,
    /// Where the unit will appear.
    pub spawn_position: Vec2Fixed,
}

/// A production request counting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PendingUnitSpawn {
    /// Producing building.
    pub building: EntityId,
    /// Owner of the unit to be produced.
    pub owner: PlayerId,
    /// Where the unit will appear.
    pub spawn_position: Vec2Fixed,
    /// Seconds left.
    #[serde(with = "fixed_serde")]
    pub time_remaining: Fixed,
    /// Full countdown length.
    #[serde(with = "fixed_serde")]
    pub total_time: Fixed,
}

impl PendingUnitSpawn {
    /// Promote a queued request with the given countdown.
    #[must_use]
    pub const fn from_queued(queued: &QueuedUnitSpawn, total_time: Fixed) -> Self {
        Self {
            building: queued.building,
            owner: queued.owner,
            spawn_position: queued.spawn_position,
            time_remaining: total_time,
            total_time,
        }
    }

    /// Advance the countdown. Returns `true` once it has run out.
    pub fn tick(&mut self, dt: Fixed) -> bool {
        self.time_remaining -= dt;
        self.time_remaining <= TIMER_EPSILON
    }

    /// Completed fraction in `[0, 1]`.
    #[must_use]
    pub fn progress(&self) -> Fixed {
        if self.total_time <= Fixed::ZERO || self.time_remaining <= TIMER_EPSILON {
            return Fixed::ONE;
        }
        (Fixed::ONE - self.time_remaining / self.total_time).clamp(Fixed::ZERO, Fixed::ONE)
    }
}

/// Production settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductionConfig {
    /// Countdown per produced unit in seconds.
    #[serde(with = "decimal_serde")]
    pub time_to_spawn_unit: Fixed,
    /// Candidate offsets from the building, in priority order.
    #[serde(with = "decimal_vec2_list_serde")]
    pub spawn_offsets: Vec<Vec2Fixed>,
    /// Minimum distance between a spawn slot and anything already there.
    #[serde(with = "decimal_serde")]
    pub spawn_clearance: Fixed,
    /// Optional price per unit, spent when the request is queued.
    pub unit_cost: Option<ResourceCost>,
}

impl Default for ProductionConfig {
    fn default() -> Self {
        let o = |x: i32, y: i32| Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y));
        Self {
            time_to_spawn_unit: Fixed::from_num(3),
            spawn_offsets: vec![
                o(4, 0),
                o(-4, 0),
                o(0, 4),
                o(0, -4),
                o(4, 4),
                o(-4, 4),
                o(4, -4),
                o(-4, -4),
            ],
            spawn_clearance: Fixed::ONE,
            unit_cost: None,
        }
    }
}

impl ProductionConfig {
    /// Validate settings, returning a list of problems.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.time_to_spawn_unit < Fixed::ZERO {
            errors.push("time_to_spawn_unit must not be negative".to_string());
        }
        if self.spawn_offsets.is_empty() {
            errors.push("spawn_offsets must not be empty".to_string());
        }
        if self.spawn_clearance < Fixed::ZERO {
            errors.push("spawn_clearance must not be negative".to_string());
        }
        errors
    }
}

/// Pick where a produced unit appears.
///
/// Offsets are tried in order; the first one with nothing in `occupied`
/// closer than `clearance` wins. If every slot is taken the first offset
/// is used anyway.
#[must_use]
pub fn choose_spawn_position(
    building: Vec2Fixed,
    offsets: &[Vec2Fixed],
    occupied: &[Vec2Fixed],
    clearance: Fixed,
) -> Vec2Fixed {
    let clearance_sq = clearance * clearance;
    offsets
        .iter()
        .map(|offset| building + *offset)
        .find(|slot| {
            occupied
                .iter()
                .all(|p| p.distance_squared(*slot) >= clearance_sq)
        })
        .or_else(|| offsets.first().map(|offset| building + *offset))
        .unwrap_or(building)
}

/// Events generated by the production phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEvent {
    /// A request was accepted.
    Queued {
        /// Producing building.
        building: EntityId,
        /// Requesting player.
        owner: PlayerId,
    },
    /// A queued request started counting down.
    Started {
        /// Producing building.
        building: EntityId,
    },
    /// A unit was produced.
    UnitSpawned {
        /// Producing building.
        building: EntityId,
        /// New unit.
        unit: EntityId,
    },
    /// A request was dropped because its building is gone.
    Discarded {
        /// Missing building.
        building: EntityId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    #[test]
    fn test_queue_state_machine() {
        let mut queue = BuildingSpawnQueue::new(Fixed::from_num(3));
        assert!(!queue.can_promote());
        assert!(!queue.promote());

        queue.enqueue();
        queue.enqueue();
        assert!(queue.promote());
        assert_eq!(queue.units_in_queue, 1);
        assert!(queue.is_currently_spawning);
        assert!(!queue.promote(), "only one unit may be in progress");

        assert!(!queue.complete());
        assert!(queue.promote());
        assert!(queue.complete());
        assert_eq!(queue.units_in_queue, 0);
    }

    #[test]
    fn test_pending_countdown_and_progress() {
        let queued = QueuedUnitSpawn {
            building: 1,
            owner: 0,
            spawn_position: Vec2Fixed::ZERO,
        };
        let mut pending = PendingUnitSpawn::from_queued(&queued, Fixed::from_num(3));
        assert_eq!(pending.progress(), Fixed::ZERO);

        let dt = Fixed::ONE / Fixed::from_num(20);
        let mut ticks = 0;
        while !pending.tick(dt) {
            ticks += 1;
        }
        assert_eq!(ticks + 1, 60);
        assert_eq!(pending.progress(), Fixed::ONE);
    }

    #[test]
    fn test_zero_length_countdown_is_complete() {
        let queued = QueuedUnitSpawn {
            building: 1,
            owner: 0,
            spawn_position: Vec2Fixed::ZERO,
        };
        let mut pending = PendingUnitSpawn::from_queued(&queued, Fixed::ZERO);
        assert_eq!(pending.progress(), Fixed::ONE);
        assert!(pending.tick(Fixed::ZERO));
    }

    #[test]
    fn test_spawn_position_priority_order() {
        let offsets = ProductionConfig::default().spawn_offsets;
        let base = v(10, 10);
        assert_eq!(choose_spawn_position(base, &offsets, &[], Fixed::ONE), v(14, 10));

        let occupied = [v(14, 10), v(6, 10)];
        assert_eq!(
            choose_spawn_position(base, &offsets, &occupied, Fixed::ONE),
            v(10, 14)
        );
    }

    #[test]
    fn test_spawn_position_falls_back_to_first() {
        let offsets = [v(1, 0)];
        let occupied = [v(1, 0)];
        assert_eq!(
            choose_spawn_position(Vec2Fixed::ZERO, &offsets, &occupied, Fixed::ONE),
            v(1, 0)
        );
        assert_eq!(
            choose_spawn_position(v(3, 3), &[], &occupied, Fixed::ONE),
            v(3, 3)
        );
    }

    #[test]
    fn test_rally_point_accessor() {
        let mut rally = BuildingRallyPoint::default();
        assert_eq!(rally.get(), None);
        rally.rally_position = v(1, 2);
        rally.has_rally_point = true;
        assert_eq!(rally.get(), Some(v(1, 2)));
    }
}
