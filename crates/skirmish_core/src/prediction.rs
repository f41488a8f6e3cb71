//! Client-side prediction helpers.
//!
//! A client issues sequenced move intents and shows their effect before the
//! server replicates it. Prediction only ever runs on copies; combat is
//! never predicted.

use std::collections::BTreeMap;

use crate::components::{EntityId, Transform, Unit, Velocity};
use crate::formation::{plan_group_move, FormationSettings};
use crate::health::{HealthStage, HealthState};
use crate::intents::PlayerIntent;
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{apply_move_order, step_unit, MoveOrder, MovementTuning, UnitMover};

/// Issues move intents and remembers which ones the server has not echoed
/// back yet.
#[derive(Debug, Clone, Default)]
pub struct MoveRequestTracker {
    last_sequence: u32,
    pending: BTreeMap<EntityId, MoveOrder>,
}

impl MoveRequestTracker {
    /// Create a tracker. The first issued sequence is 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a move intent with the next sequence number and remember it.
    pub fn issue(
        &mut self,
        unit: EntityId,
        target_position: Vec2Fixed,
        target_rotation: Fixed,
        running: bool,
    ) -> PlayerIntent {
        self.last_sequence = self.last_sequence.wrapping_add(1).max(1);
        let order = MoveOrder {
            target_position,
            target_rotation,
            running,
            sequence: self.last_sequence,
        };
        self.pending.insert(unit, order);
        PlayerIntent::MoveUnit { unit, order }
    }

    /// Issue orders for a group, one formation slot per unit.
    ///
    /// `units` pairs each unit with its current position.
    pub fn issue_group(
        &mut self,
        settings: &FormationSettings,
        units: &[(EntityId, Vec2Fixed)],
        anchor: Vec2Fixed,
        drag_end: Option<Vec2Fixed>,
        running: bool,
    ) -> Vec<PlayerIntent> {
        let positions: Vec<Vec2Fixed> = units.iter().map(|(_, p)| *p).collect();
        plan_group_move(settings, &positions, anchor, drag_end)
            .into_iter()
            .filter_map(|slot| {
                let (unit, _) = units.get(slot.unit_index)?;
                Some(self.issue(*unit, slot.position, slot.yaw, running))
            })
            .collect()
    }

    /// Clear the pending request once the replicated sequence has caught up
    /// with it. Returns `true` if a request was cleared.
    pub fn acknowledge(&mut self, unit: EntityId, replicated_last_applied: u32) -> bool {
        match self.pending.get(&unit) {
            Some(order) if replicated_last_applied >= order.sequence => {
                self.pending.remove(&unit);
                true
            }
            _ => false,
        }
    }

    /// The unacknowledged order for a unit.
    #[must_use]
    pub fn pending(&self, unit: EntityId) -> Option<&MoveOrder> {
        self.pending.get(&unit)
    }

    /// Number of unacknowledged orders.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Stage the server will report once the pending delta is resolved.
#[must_use]
pub fn predict_stage(state: &HealthState) -> HealthStage {
    state.current_stage.apply(state.health_change)
}

/// Predict one tick of movement for a replicated unit.
///
/// The pending order, if any, is applied to a copy of the mover first.
#[must_use]
pub fn predict_movement(
    transform: &Transform,
    mover: &UnitMover,
    unit: &Unit,
    multiplier: Fixed,
    tuning: &MovementTuning,
    dt: Fixed,
    pending: Option<&MoveOrder>,
) -> (Transform, UnitMover) {
    let mut transform = *transform;
    let mut mover = *mover;
    if let Some(order) = pending {
        apply_move_order(&mut mover, order);
    }
    let mut velocity = Velocity::ZERO;
    step_unit(
        &mut transform,
        &mut velocity,
        &mut mover,
        unit,
        multiplier,
        tuning,
        dt,
    );
    (transform, mover)
}
