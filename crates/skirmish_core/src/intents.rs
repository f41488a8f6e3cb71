//! Player intents.
//!
//! Everything a client may ask of the simulation. Intents are tagged with
//! the submitting player's id by the host, never by the client, and every
//! ownership check is made against that id.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, PlayerId};
use crate::economy::ResourceCost;
use crate::math::Vec2Fixed;
use crate::movement::MoveOrder;

/// A request from a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerIntent {
    /// Spawn a unit directly, owned by the caller or by nobody.
    SpawnUnit {
        /// Spawn position.
        position: Vec2Fixed,
        /// Create a neutral unit instead of one owned by the caller.
        neutral: bool,
    },
    /// Queue a unit at one of the caller's buildings.
    QueueUnit {
        /// Producing building.
        building: EntityId,
    },
    /// Set where the building's new units walk to.
    SetRallyPoint {
        /// Building.
        building: EntityId,
        /// Rally destination.
        position: Vec2Fixed,
    },
    /// Move one of the caller's units.
    MoveUnit {
        /// Unit.
        unit: EntityId,
        /// Sequenced order.
        order: MoveOrder,
    },
    /// Credit the caller's ledger.
    AddResources {
        /// Amount to add.
        amount: ResourceCost,
    },
}

/// An intent with the id of the player that sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmittedIntent {
    /// Sender.
    pub player: PlayerId,
    /// Request.
    pub intent: PlayerIntent,
}

/// Result of an accepted intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentOutcome {
    /// State changed.
    Applied,
    /// Valid but stale, nothing changed.
    Ignored,
}

/// An intent that failed validation during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedIntent {
    /// Sender.
    pub player: PlayerId,
    /// Request.
    pub intent: PlayerIntent,
    /// Reason, from the validation error.
    pub reason: String,
}
