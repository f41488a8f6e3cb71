//! Error types for the simulation core.

use thiserror::Error;

use crate::components::{EntityId, PlayerId};
use crate::math::Fixed;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all simulation errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Entity exists but lacks a component the operation needs.
    #[error("Entity {entity} has no {component} component")]
    MissingComponent {
        /// Entity that was addressed.
        entity: EntityId,
        /// Name of the missing component.
        component: &'static str,
    },

    /// Requester does not own the addressed entity.
    #[error("Player {player} does not own entity {entity} (owner {owner})")]
    NotOwner {
        /// Player that issued the request.
        player: PlayerId,
        /// Entity that was addressed.
        entity: EntityId,
        /// Actual owner of the entity.
        owner: PlayerId,
    },

    /// Player has no ledger entry.
    #[error("Unknown player: {0}")]
    UnknownPlayer(PlayerId),

    /// Player already joined the simulation.
    #[error("Player {0} has already joined")]
    PlayerAlreadyJoined(PlayerId),

    /// Insufficient resources.
    #[error("Insufficient resources: need {required} {resource}, have {available}")]
    InsufficientResources {
        /// Resource name.
        resource: &'static str,
        /// Amount required.
        required: i64,
        /// Amount available.
        available: i64,
    },

    /// Position outside the playable area.
    #[error("Position ({x}, {y}) is outside the world extent {extent}")]
    OutOfBounds {
        /// Requested x.
        x: Fixed,
        /// Requested y.
        y: Fixed,
        /// Configured half-size of the world.
        extent: Fixed,
    },

    /// Negative or otherwise invalid resource amount.
    #[error("Invalid resource amount: {0}")]
    InvalidAmount(i64),

    /// Config file parsing error.
    #[error("Failed to parse config '{path}': {message}")]
    ConfigParse {
        /// Path to the file that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// Config values failed validation.
    #[error("Invalid config: {0:?}")]
    ConfigInvalid(Vec<String>),

    /// Filesystem error.
    #[error("IO error on '{path}': {source}")]
    Io {
        /// Path being read or written.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid simulation state.
    #[error("Invalid simulation state: {0}")]
    InvalidState(String),

    /// Replay written by an incompatible format version.
    #[error("Replay version mismatch: expected {expected}, got {found}")]
    ReplayVersion {
        /// Version this build understands.
        expected: u32,
        /// Version found in the file.
        found: u32,
    },

    /// Desync detected between two runs of the same timeline.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, remote hash {remote_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Local simulation hash.
        local_hash: u64,
        /// Remote simulation hash.
        remote_hash: u64,
    },
}
