//! Shared component definitions.
//!
//! Components are plain data attached to an [`Entity`](crate::world::Entity).
//! Domain-specific components live next to the system that owns them:
//! [`crate::health`], [`crate::movement`], [`crate::combat`] and
//! [`crate::production`].

use serde::{Deserialize, Serialize};

use crate::math::{fixed_serde, Fixed, Vec2Fixed};

/// Unique identifier for entities, assigned in creation order.
pub type EntityId = u64;

/// Player identifier. Negative ids are not real players.
pub type PlayerId = i32;

/// Owner id of units that belong to no player.
pub const NEUTRAL_OWNER: PlayerId = -1;

/// Position and facing on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Transform {
    /// World position.
    pub position: Vec2Fixed,
    /// Facing in radians, 0 faces +y.
    #[serde(with = "fixed_serde")]
    pub yaw: Fixed,
}

impl Transform {
    /// Create a transform facing +y.
    #[must_use]
    pub const fn at(position: Vec2Fixed) -> Self {
        Self {
            position,
            yaw: Fixed::ZERO,
        }
    }
}

/// Linear velocity in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Velocity {
    /// Velocity vector.
    pub linear: Vec2Fixed,
}

impl Velocity {
    /// Zero velocity.
    pub const ZERO: Self = Self {
        linear: Vec2Fixed::ZERO,
    };
}

/// Owning player of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Owner {
    /// Owning player id, [`NEUTRAL_OWNER`] for unowned entities.
    pub player: PlayerId,
}

impl Owner {
    /// Create an owner component.
    #[must_use]
    pub const fn new(player: PlayerId) -> Self {
        Self { player }
    }

    /// Neutral owner.
    #[must_use]
    pub const fn neutral() -> Self {
        Self {
            player: NEUTRAL_OWNER,
        }
    }

    /// Whether this entity belongs to no player.
    #[must_use]
    pub const fn is_neutral(self) -> bool {
        self.player == NEUTRAL_OWNER
    }

    /// Whether an entity with this owner may attack one owned by `other`.
    ///
    /// Owners are hostile exactly when their ids differ. Two neutral
    /// entities share an id and therefore never fight each other.
    #[must_use]
    pub const fn is_hostile_to(self, other: Self) -> bool {
        self.player != other.player
    }
}

/// Marker plus base stats for mobile units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Unit {
    /// Base move speed in units per second.
    #[serde(with = "fixed_serde")]
    pub move_speed: Fixed,
    /// Turn rate used as the per-second interpolation factor.
    #[serde(with = "fixed_serde")]
    pub rotation_speed: Fixed,
}

/// Multipliers derived from other systems each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UnitModifiers {
    /// Movement speed multiplier. Zero or below freezes the unit.
    #[serde(with = "fixed_serde")]
    pub move_speed_multiplier: Fixed,
}

impl Default for UnitModifiers {
    fn default() -> Self {
        Self {
            move_speed_multiplier: Fixed::ONE,
        }
    }
}

/// RGBA display colour assigned at spawn from the owner id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerColor(pub [u8; 4]);

impl PlayerColor {
    const PALETTE: [[u8; 4]; 8] = [
        [220, 50, 47, 255],
        [38, 139, 210, 255],
        [133, 153, 0, 255],
        [181, 137, 0, 255],
        [211, 54, 130, 255],
        [42, 161, 152, 255],
        [203, 75, 22, 255],
        [108, 113, 196, 255],
    ];

    /// Neutral grey.
    pub const NEUTRAL: Self = Self([128, 128, 128, 255]);

    /// Colour for an owner id. Palette entries repeat every eight players.
    #[must_use]
    pub fn for_owner(player: PlayerId) -> Self {
        match usize::try_from(player) {
            Ok(index) => Self(Self::PALETTE[index % Self::PALETTE.len()]),
            Err(_) => Self::NEUTRAL,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostility_is_owner_inequality() {
        let a = Owner::new(0);
        let b = Owner::new(1);
        assert!(a.is_hostile_to(b));
        assert!(!a.is_hostile_to(a));
        assert!(Owner::neutral().is_hostile_to(a));
        assert!(!Owner::neutral().is_hostile_to(Owner::neutral()));
    }

    #[test]
    fn test_player_colors() {
        assert_eq!(PlayerColor::for_owner(NEUTRAL_OWNER), PlayerColor::NEUTRAL);
        assert_eq!(PlayerColor::for_owner(0), PlayerColor::for_owner(8));
        assert_ne!(PlayerColor::for_owner(0), PlayerColor::for_owner(1));
    }
}
