//! Read-only views for hosts and clients.
//!
//! Views are plain serializable copies; nothing handed out here can
//! mutate the simulation.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, PlayerId};
use crate::economy::PlayerResources;
use crate::health::HealthStage;
use crate::math::{Fixed, Vec2Fixed};

/// What collaborators may observe about a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitView {
    /// Entity id.
    pub id: EntityId,
    /// Owner.
    pub owner: PlayerId,
    /// Position.
    pub position: Vec2Fixed,
    /// Facing in radians.
    #[serde(with = "crate::math::fixed_serde")]
    pub yaw: Fixed,
    /// Health stage.
    pub stage: HealthStage,
    /// Whether a movement order is active.
    pub active_target: bool,
    /// Highest applied client move sequence.
    pub last_applied_sequence: u32,
    /// Swing counter for animation triggers.
    pub attack_tick: u32,
    /// Whether the unit is chasing on its own.
    pub auto_chasing: bool,
}

/// What collaborators may observe about a production building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingView {
    /// Entity id.
    pub id: EntityId,
    /// Owner.
    pub owner: PlayerId,
    /// Position.
    pub position: Vec2Fixed,
    /// Requests waiting for promotion.
    pub units_in_queue: u32,
    /// Whether a unit is counting down.
    pub is_spawning: bool,
    /// Progress of the unit in production, zero when idle.
    #[serde(with = "crate::math::fixed_serde")]
    pub spawn_progress: Fixed,
    /// Rally point, if set.
    pub rally_point: Option<Vec2Fixed>,
}

/// A player's ledger totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerView {
    /// Player.
    pub player: PlayerId,
    /// Stockpile.
    pub resources: PlayerResources,
}

/// Everything observable after a tick.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WorldView {
    /// Ticks simulated so far.
    pub tick: u64,
    /// Units in id order.
    pub units: Vec<UnitView>,
    /// Buildings in id order.
    pub buildings: Vec<BuildingView>,
    /// Players in id order.
    pub players: Vec<PlayerView>,
    /// State hash for desync checks.
    pub state_hash: u64,
}

impl WorldView {
    /// Find a unit by id.
    #[must_use]
    pub fn unit(&self, id: EntityId) -> Option<&UnitView> {
        self.units.iter().find(|u| u.id == id)
    }

    /// Find a building by id.
    #[must_use]
    pub fn building(&self, id: EntityId) -> Option<&BuildingView> {
        self.buildings.iter().find(|b| b.id == id)
    }

    /// Units owned by a player.
    pub fn units_of(&self, player: PlayerId) -> impl Iterator<Item = &UnitView> {
        self.units.iter().filter(move |u| u.owner == player)
    }
}
