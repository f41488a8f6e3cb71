//! Test fixtures and helpers.
//!
//! Small constructors for numbers, positions and ready-made scenarios so
//! tests read in world units instead of raw fixed-point calls.

use fixed::types::I32F32;
use skirmish_core::combat::{CombatDefaults, Combatant};
use skirmish_core::components::{EntityId, Owner, PlayerId};
use skirmish_core::config::SimConfig;
use skirmish_core::math::Vec2Fixed;
use skirmish_core::simulation::Simulation;

/// Create a fixed-point number from an integer.
#[must_use]
pub fn fixed(n: i32) -> I32F32 {
    I32F32::from_num(n)
}

/// Create a fixed-point number from a float (for tests only).
///
/// Note: In real simulation code, never use floats.
/// This is only for convenient test setup.
#[must_use]
pub fn fixed_f(n: f64) -> I32F32 {
    I32F32::from_num(n)
}

/// Position from float coordinates.
#[must_use]
pub fn vec2(x: f64, y: f64) -> Vec2Fixed {
    Vec2Fixed::new(fixed_f(x), fixed_f(y))
}

/// Config with combat that always hits.
#[must_use]
pub fn sure_hit_config() -> SimConfig {
    let mut config = SimConfig::default();
    config.combat.hit_chance = I32F32::ONE;
    config
}

/// Spawn a unit owned by `player`.
pub fn spawn_unit(sim: &mut Simulation, player: PlayerId, x: f64, y: f64) -> EntityId {
    sim.spawn_unit(vec2(x, y), Owner::new(player))
}

/// Spawn a neutral unit.
pub fn spawn_neutral(sim: &mut Simulation, x: f64, y: f64) -> EntityId {
    sim.spawn_unit(vec2(x, y), Owner::neutral())
}

/// Spawn a production building owned by `player`.
pub fn spawn_building(sim: &mut Simulation, player: PlayerId, x: f64, y: f64) -> EntityId {
    sim.spawn_building(vec2(x, y), Owner::new(player))
}

/// A combatant built from explicit stats.
#[must_use]
pub fn combatant(attack_range: f64, attacks_per_second: f64, hit_delay: f64, hit_chance: f64) -> Combatant {
    Combatant::from_defaults(&CombatDefaults {
        detect_radius: fixed(6),
        attack_range: fixed_f(attack_range),
        hit_chance: fixed_f(hit_chance),
        attacks_per_second: fixed_f(attacks_per_second),
        hit_delay_seconds: fixed_f(hit_delay),
    })
}

/// Two opposing units `distance` apart on the x axis, with sure hits.
///
/// Returns the simulation and the ids of player 0's and player 1's unit.
#[must_use]
pub fn duel(distance: f64) -> (Simulation, EntityId, EntityId) {
    let mut sim = Simulation::new(sure_hit_config());
    let a = spawn_unit(&mut sim, 0, 0.0, 0.0);
    let b = spawn_unit(&mut sim, 1, distance, 0.0);
    (sim, a, b)
}
