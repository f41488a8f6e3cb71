//! # Skirmish Core
//!
//! Server-authoritative simulation core for a small real-time skirmish:
//! staged health, formations, sequenced movement orders, melee combat with
//! wind-ups and auto-chase, building production with rally points, and a
//! per-player resource ledger.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No network transport
//! - No system randomness
//! - No floating-point math in the simulation (uses fixed-point)
//!
//! ## Crate Structure
//!
//! - [`components`] - Shared component definitions
//! - [`health`], [`formation`], [`movement`], [`combat`], [`production`],
//!   [`economy`] - Pure resolvers for each game rule
//! - [`simulation`] - Entity storage, tick loop and intent application
//! - [`prediction`] - Client-side move tracking and local prediction
//! - [`replay`] - Recording and verifying matches
//! - [`math`] - Fixed-point math utilities

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod combat;
pub mod components;
pub mod config;
pub mod economy;
pub mod error;
pub mod formation;
pub mod health;
pub mod intents;
pub mod math;
pub mod movement;
pub mod prediction;
pub mod production;
pub mod replay;
pub mod rng;
pub mod simulation;
pub mod view;
pub mod world;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::combat::{CombatEvent, Combatant};
    pub use crate::components::*;
    pub use crate::config::SimConfig;
    pub use crate::economy::{EconomyEvent, PlayerResources, ResourceCost, ResourceLedger};
    pub use crate::error::{GameError, Result};
    pub use crate::formation::{FormationKind, FormationSettings};
    pub use crate::health::{HealthStage, HealthState};
    pub use crate::intents::{IntentOutcome, PlayerIntent};
    pub use crate::math::{Fixed, Vec2Fixed};
    pub use crate::movement::{MoveOrder, UnitMover};
    pub use crate::production::ProductionEvent;
    pub use crate::simulation::{Simulation, TickEvents};
    pub use crate::view::{BuildingView, PlayerView, UnitView, WorldView};
}
