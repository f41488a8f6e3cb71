//! Targeting and combat resolver.
//!
//! Every attacker runs an implicit state machine each tick:
//!
//! - **Idle**: no valid target in detection range.
//! - **Engaging, out of range**: the resolver may issue a chase order.
//! - **Engaging, in range**: faces the target, swings when the cooldown
//!   allows.
//! - **Winding up**: a swing was triggered; its hit resolves when the
//!   wind-up timer expires, even if the attacker has since moved.
//!
//! The swing trigger bumps a replicated counter immediately so clients can
//! start an animation, while the hit lands later on the server only.
//!
//! All candidate targets are captured once per tick in a [`TargetSnapshot`].
//! Hits write into the target's pending health delta; the health phase
//! turns that into a stage change afterwards, so a killing blow is only
//! visible to other attackers on the next tick.

use serde::{Deserialize, Serialize};

use crate::components::{EntityId, Owner};
use crate::health::HealthState;
use crate::math::{
    decimal_serde, fixed_serde, saturate, yaw_towards, Fixed, Vec2Fixed, TIMER_EPSILON,
};
use crate::movement::UnitMover;
use crate::rng::SimRng;

// =============================================================================
// Components
// =============================================================================

/// Detection sensor used for target acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProximitySensor {
    /// Radius within which hostiles are acquired and kept.
    #[serde(with = "fixed_serde")]
    pub detect_radius: Fixed,
}

/// Attack characteristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttackStats {
    /// Maximum swing distance.
    #[serde(with = "fixed_serde")]
    pub attack_range: Fixed,
    /// Probability in `[0, 1]` that a resolved swing hits.
    #[serde(with = "fixed_serde")]
    pub hit_chance: Fixed,
    /// Swings per second.
    #[serde(with = "fixed_serde")]
    pub attacks_per_second: Fixed,
    /// Delay between swing trigger and hit resolution.
    #[serde(with = "fixed_serde")]
    pub hit_delay_seconds: Fixed,
}

impl AttackStats {
    /// Time between swings.
    #[must_use]
    pub fn swing_period(&self) -> Fixed {
        Fixed::ONE / self.attacks_per_second.max(min_attacks_per_second())
    }
}

fn min_attacks_per_second() -> Fixed {
    Fixed::from_num(0.01)
}

/// Current target, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttackTarget {
    /// Targeted entity. May refer to an entity that no longer exists.
    pub target: Option<EntityId>,
}

/// Time until the next swing may start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttackCooldown {
    /// Remaining seconds, never negative.
    #[serde(with = "fixed_serde")]
    pub time_left_seconds: Fixed,
}

/// A committed swing waiting for its impact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttackWindup {
    /// Whether a swing is pending.
    pub active: bool,
    /// Seconds until the hit resolves.
    #[serde(with = "fixed_serde")]
    pub time_left_seconds: Fixed,
    /// Target captured when the swing started.
    pub target: Option<EntityId>,
}

/// Replicated swing counter used by clients to trigger animations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AttackAnimationState {
    /// Incremented once per swing.
    pub attack_tick: u32,
}

/// Whether the unit's current movement order was issued by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AutoChaseState {
    /// Movement is an AI chase that player orders may override.
    pub is_auto_chasing: bool,
}

/// All combat state of one attacker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Combatant {
    /// Detection sensor.
    pub sensor: ProximitySensor,
    /// Attack stats.
    pub stats: AttackStats,
    /// Current target.
    pub target: AttackTarget,
    /// Swing cooldown.
    pub cooldown: AttackCooldown,
    /// Pending swing.
    pub windup: AttackWindup,
    /// Swing counter.
    pub animation: AttackAnimationState,
    /// Chase ownership flag.
    pub auto_chase: AutoChaseState,
}

impl Combatant {
    /// Build a combatant from authored values.
    ///
    /// Hit chance is saturated, swing rate floored at 0.01 per second, hit
    /// delay floored at zero and the detection radius widened to at least
    /// the attack range.
    #[must_use]
    pub fn from_defaults(defaults: &CombatDefaults) -> Self {
        let attack_range = defaults.attack_range.max(Fixed::ZERO);
        Self {
            sensor: ProximitySensor {
                detect_radius: defaults.detect_radius.max(attack_range),
            },
            stats: AttackStats {
                attack_range,
                hit_chance: saturate(defaults.hit_chance),
                attacks_per_second: defaults.attacks_per_second.max(min_attacks_per_second()),
                hit_delay_seconds: defaults.hit_delay_seconds.max(Fixed::ZERO),
            },
            target: AttackTarget::default(),
            cooldown: AttackCooldown::default(),
            windup: AttackWindup::default(),
            animation: AttackAnimationState::default(),
            auto_chase: AutoChaseState::default(),
        }
    }

    /// Count down the cooldown.
    fn decay_cooldown(&mut self, dt: Fixed) {
        self.cooldown.time_left_seconds = (self.cooldown.time_left_seconds - dt).max(Fixed::ZERO);
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Authoring defaults for combat units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatDefaults {
    /// Detection radius.
    #[serde(with = "decimal_serde")]
    pub detect_radius: Fixed,
    /// Attack range.
    #[serde(with = "decimal_serde")]
    pub attack_range: Fixed,
    /// Hit chance.
    #[serde(with = "decimal_serde")]
    pub hit_chance: Fixed,
    /// Swings per second.
    #[serde(with = "decimal_serde")]
    pub attacks_per_second: Fixed,
    /// Swing to impact delay.
    #[serde(with = "decimal_serde")]
    pub hit_delay_seconds: Fixed,
}

impl Default for CombatDefaults {
    fn default() -> Self {
        Self {
            detect_radius: Fixed::from_num(6),
            attack_range: Fixed::from_num(2),
            hit_chance: Fixed::from_num(0.75),
            attacks_per_second: Fixed::ONE,
            hit_delay_seconds: Fixed::from_num(0.33),
        }
    }
}

/// Chase geometry used by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaseTuning {
    /// Slack added to the attack range before a chase starts, and the
    /// tolerance used when a wind-up resolves.
    #[serde(with = "decimal_serde")]
    pub hysteresis: Fixed,
    /// How far inside the attack range a chase aims to stop.
    #[serde(with = "decimal_serde")]
    pub stop_buffer: Fixed,
    /// Closest a chase will try to get.
    #[serde(with = "decimal_serde")]
    pub min_stop_distance: Fixed,
}

impl Default for ChaseTuning {
    fn default() -> Self {
        Self {
            hysteresis: Fixed::from_num(0.25),
            stop_buffer: Fixed::from_num(0.5),
            min_stop_distance: Fixed::from_num(0.3),
        }
    }
}

// =============================================================================
// Events
// =============================================================================

/// Something the resolver did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombatEvent {
    /// A new target was selected.
    TargetAcquired {
        /// Attacker.
        attacker: EntityId,
        /// New target.
        target: EntityId,
    },
    /// A chase order was issued.
    ChaseStarted {
        /// Attacker.
        attacker: EntityId,
        /// Chased target.
        target: EntityId,
    },
    /// A swing started and a wind-up was armed.
    SwingStarted {
        /// Attacker.
        attacker: EntityId,
        /// Snapshotted target.
        target: EntityId,
        /// Attack counter after the increment.
        attack_tick: u32,
    },
    /// A wind-up resolved as a hit.
    Hit {
        /// Attacker.
        attacker: EntityId,
        /// Damaged target.
        target: EntityId,
    },
    /// A wind-up resolved against a valid target but the roll failed.
    Miss {
        /// Attacker.
        attacker: EntityId,
        /// Intended target.
        target: EntityId,
    },
}

// =============================================================================
// Snapshot
// =============================================================================

/// One potential target as seen at the start of the combat phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetCandidate {
    /// Entity id.
    pub id: EntityId,
    /// Position.
    pub position: Vec2Fixed,
    /// Owner.
    pub owner: Owner,
    /// Whether the unit was alive when captured.
    pub alive: bool,
}

/// Read-only view of all candidates, sorted by entity id.
#[derive(Debug, Clone, Default)]
pub struct TargetSnapshot {
    candidates: Vec<TargetCandidate>,
}

impl TargetSnapshot {
    /// Build a snapshot. Input order does not matter.
    #[must_use]
    pub fn new(mut candidates: Vec<TargetCandidate>) -> Self {
        candidates.sort_by_key(|c| c.id);
        Self { candidates }
    }

    /// Look up a candidate by id.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&TargetCandidate> {
        self.candidates
            .binary_search_by_key(&id, |c| c.id)
            .ok()
            .map(|i| &self.candidates[i])
    }

    /// Candidates in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &TargetCandidate> {
        self.candidates.iter()
    }

    /// Number of candidates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Whether the snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Nearest alive hostile within `radius`, excluding `attacker` itself.
    ///
    /// Equidistant candidates resolve to the lowest id, i.e. the oldest
    /// entity.
    #[must_use]
    pub fn nearest_hostile(
        &self,
        attacker: EntityId,
        owner: Owner,
        position: Vec2Fixed,
        radius: Fixed,
    ) -> Option<EntityId> {
        let radius_sq = radius * radius;
        let mut best: Option<(Fixed, EntityId)> = None;

        for c in &self.candidates {
            if c.id == attacker || !c.alive || !owner.is_hostile_to(c.owner) {
                continue;
            }
            let dist_sq = position.distance_squared(c.position);
            if dist_sq > radius_sq {
                continue;
            }
            if best.map_or(true, |(d, _)| dist_sq < d) {
                best = Some((dist_sq, c.id));
            }
        }

        best.map(|(_, id)| id)
    }

    /// Whether `target` is a live hostile of `owner` within `radius`.
    #[must_use]
    pub fn is_valid_target(
        &self,
        attacker: EntityId,
        owner: Owner,
        position: Vec2Fixed,
        target: EntityId,
        radius: Fixed,
    ) -> bool {
        target != attacker
            && self.get(target).is_some_and(|c| {
                c.alive
                    && owner.is_hostile_to(c.owner)
                    && position.distance_squared(c.position) <= radius * radius
            })
    }
}

// =============================================================================
// Resolver
// =============================================================================

/// Copy of one unit's combat-relevant state for a tick.
///
/// The resolver works on copies and the simulation writes them back
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatUnit {
    /// Entity id.
    pub id: EntityId,
    /// Position at the start of the phase.
    pub position: Vec2Fixed,
    /// Owner.
    pub owner: Owner,
    /// Health, if the unit can be damaged.
    pub health: Option<HealthState>,
    /// Combat state, if the unit can attack.
    pub combatant: Option<Combatant>,
    /// Movement intent, if the unit can move.
    pub mover: Option<UnitMover>,
}

impl CombatUnit {
    fn is_alive(&self) -> bool {
        self.health.map_or(true, |h| h.is_alive())
    }
}

/// Build the per-tick snapshot of damageable units.
#[must_use]
pub fn snapshot_targets(units: &[CombatUnit]) -> TargetSnapshot {
    TargetSnapshot::new(
        units
            .iter()
            .filter_map(|u| {
                u.health.map(|h| TargetCandidate {
                    id: u.id,
                    position: u.position,
                    owner: u.owner,
                    alive: h.is_alive(),
                })
            })
            .collect(),
    )
}

/// Run the resolver for one attacker.
///
/// Hits are returned as events; the caller applies them to the targets'
/// health so that every attacker reads the same snapshot.
#[allow(clippy::too_many_lines)]
pub fn resolve_attacker(
    unit: &CombatUnit,
    combatant: &mut Combatant,
    mut mover: Option<&mut UnitMover>,
    snapshot: &TargetSnapshot,
    tuning: &ChaseTuning,
    rng: &mut SimRng,
    dt: Fixed,
    events: &mut Vec<CombatEvent>,
) {
    if !unit.is_alive() {
        return;
    }

    let detect = combatant.sensor.detect_radius;

    // Keep the current target while it stays valid, otherwise re-acquire.
    let kept = combatant.target.target.filter(|&t| {
        snapshot.is_valid_target(unit.id, unit.owner, unit.position, t, detect)
    });
    let target = match kept {
        Some(t) => Some(t),
        None => {
            let acquired = snapshot.nearest_hostile(unit.id, unit.owner, unit.position, detect);
            if let Some(t) = acquired {
                if combatant.target.target != Some(t) {
                    events.push(CombatEvent::TargetAcquired {
                        attacker: unit.id,
                        target: t,
                    });
                }
            }
            acquired
        }
    };
    combatant.target.target = target;

    let Some(target_id) = target else {
        combatant.decay_cooldown(dt);
        if combatant.windup.active {
            combatant.windup.time_left_seconds -= dt;
            if combatant.windup.time_left_seconds <= TIMER_EPSILON {
                // Without any target in detection range the captured one
                // cannot be within striking distance either.
                combatant.windup = AttackWindup::default();
            }
        }
        combatant.auto_chase.is_auto_chasing = false;
        return;
    };

    let strike_radius = combatant.stats.attack_range + tuning.hysteresis;

    if combatant.windup.active {
        combatant.windup.time_left_seconds -= dt;
        if combatant.windup.time_left_seconds <= TIMER_EPSILON {
            if let Some(struck) = combatant.windup.target {
                if snapshot.is_valid_target(unit.id, unit.owner, unit.position, struck, strike_radius)
                {
                    let roll = rng.next_unit();
                    events.push(if roll <= saturate(combatant.stats.hit_chance) {
                        CombatEvent::Hit {
                            attacker: unit.id,
                            target: struck,
                        }
                    } else {
                        CombatEvent::Miss {
                            attacker: unit.id,
                            target: struck,
                        }
                    });
                }
            }
            combatant.windup = AttackWindup::default();
        }
    }

    let Some(target_pos) = snapshot.get(target_id).map(|c| c.position) else {
        return;
    };
    let offset = target_pos - unit.position;
    let direction = offset.normalize();

    if offset.length_squared() > strike_radius * strike_radius {
        if let Some(mover) = mover.as_deref_mut() {
            let manual = mover.active_target && !combatant.auto_chase.is_auto_chasing;
            if !manual {
                let stop = (combatant.stats.attack_range - tuning.stop_buffer)
                    .max(tuning.min_stop_distance);
                mover.target_position = target_pos - direction.scale(stop);
                mover.target_rotation = yaw_towards(direction);
                mover.active_target = true;
                mover.is_running = true;
                if !combatant.auto_chase.is_auto_chasing {
                    events.push(CombatEvent::ChaseStarted {
                        attacker: unit.id,
                        target: target_id,
                    });
                }
                combatant.auto_chase.is_auto_chasing = true;
            }
        }
        combatant.decay_cooldown(dt);
        return;
    }

    if let Some(mover) = mover.as_deref_mut() {
        if combatant.auto_chase.is_auto_chasing {
            mover.active_target = false;
            combatant.auto_chase.is_auto_chasing = false;
        }
        if direction != Vec2Fixed::ZERO {
            mover.target_rotation = yaw_towards(direction);
        }
    }

    let remaining = combatant.cooldown.time_left_seconds - dt;
    if remaining > TIMER_EPSILON {
        combatant.cooldown.time_left_seconds = remaining;
        return;
    }
    if combatant.windup.active {
        combatant.cooldown.time_left_seconds = Fixed::ZERO;
        return;
    }

    combatant.animation.attack_tick = combatant.animation.attack_tick.wrapping_add(1);
    combatant.windup = AttackWindup {
        active: true,
        time_left_seconds: combatant.stats.hit_delay_seconds,
        target: Some(target_id),
    };
    combatant.cooldown.time_left_seconds = combatant.stats.swing_period();
    events.push(CombatEvent::SwingStarted {
        attacker: unit.id,
        target: target_id,
        attack_tick: combatant.animation.attack_tick,
    });
}

/// Combat system over a set of units.
///
/// Attackers run in ascending id order. Each hit lowers the target's pending
/// health delta by one step, unless the target is already dead.
pub fn combat_system(
    units: &mut [CombatUnit],
    tuning: &ChaseTuning,
    rng: &mut SimRng,
    dt: Fixed,
) -> Vec<CombatEvent> {
    let snapshot = snapshot_targets(units);
    let mut order: Vec<usize> = (0..units.len()).collect();
    order.sort_by_key(|&i| units[i].id);

    let mut events = Vec::new();
    for i in order {
        let unit = units[i];
        let Some(mut combatant) = unit.combatant else {
            continue;
        };
        let mut mover = unit.mover;
        let first_new = events.len();

        resolve_attacker(
            &unit,
            &mut combatant,
            mover.as_mut(),
            &snapshot,
            tuning,
            rng,
            dt,
            &mut events,
        );

        units[i].combatant = Some(combatant);
        units[i].mover = mover;

        for event in &events[first_new..] {
            if let CombatEvent::Hit { target, .. } = *event {
                if let Some(victim) = units.iter_mut().find(|u| u.id == target) {
                    if let Some(health) = victim.health.as_mut() {
                        if health.is_alive() {
                            health.health_change -= 1;
                        }
                    }
                }
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthStage;

    fn v(x: f64, y: f64) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    fn soldier(id: EntityId, owner: i32, position: Vec2Fixed, defaults: &CombatDefaults) -> CombatUnit {
        CombatUnit {
            id,
            position,
            owner: Owner::new(owner),
            health: Some(HealthState::at(HealthStage::Healthy)),
            combatant: Some(Combatant::from_defaults(defaults)),
            mover: Some(UnitMover::holding(position, Fixed::ZERO)),
        }
    }

    fn sure_hit() -> CombatDefaults {
        CombatDefaults {
            hit_chance: Fixed::ONE,
            hit_delay_seconds: Fixed::from_num(0.33),
            attacks_per_second: Fixed::ONE,
            ..CombatDefaults::default()
        }
    }

    fn dummy(id: EntityId, owner: i32, position: Vec2Fixed) -> CombatUnit {
        CombatUnit {
            id,
            position,
            owner: Owner::new(owner),
            health: Some(HealthState::at(HealthStage::Healthy)),
            combatant: None,
            mover: None,
        }
    }

    #[test]
    fn test_authoring_normalization() {
        let c = Combatant::from_defaults(&CombatDefaults {
            detect_radius: Fixed::ONE,
            attack_range: Fixed::from_num(3),
            hit_chance: Fixed::from_num(4),
            attacks_per_second: Fixed::ZERO,
            hit_delay_seconds: Fixed::from_num(-1),
        });
        assert_eq!(c.sensor.detect_radius, Fixed::from_num(3));
        assert_eq!(c.stats.hit_chance, Fixed::ONE);
        assert_eq!(c.stats.attacks_per_second, Fixed::from_num(0.01));
        assert_eq!(c.stats.hit_delay_seconds, Fixed::ZERO);
    }

    #[test]
    fn test_nearest_hostile_prefers_lowest_id_on_tie() {
        let snapshot = TargetSnapshot::new(vec![
            TargetCandidate {
                id: 9,
                position: v(1.0, 0.0),
                owner: Owner::new(1),
                alive: true,
            },
            TargetCandidate {
                id: 4,
                position: v(-1.0, 0.0),
                owner: Owner::new(1),
                alive: true,
            },
        ]);
        let pick = snapshot.nearest_hostile(1, Owner::new(0), Vec2Fixed::ZERO, Fixed::from_num(6));
        assert_eq!(pick, Some(4));
    }

    #[test]
    fn test_acquisition_skips_friends_self_and_dead() {
        let mut dead = dummy(3, 1, v(0.5, 0.0));
        dead.health = Some(HealthState::at(HealthStage::Dead));
        let units = vec![
            soldier(1, 0, Vec2Fixed::ZERO, &sure_hit()),
            dummy(2, 0, v(0.2, 0.0)),
            dead,
            dummy(4, 1, v(5.0, 0.0)),
        ];
        let snapshot = snapshot_targets(&units);
        assert_eq!(
            snapshot.nearest_hostile(1, Owner::new(0), Vec2Fixed::ZERO, Fixed::from_num(6)),
            Some(4)
        );
    }

    #[test]
    fn test_swing_then_hit_after_delay() {
        let mut units = vec![
            soldier(1, 0, Vec2Fixed::ZERO, &sure_hit()),
            dummy(2, 1, v(1.0, 0.0)),
        ];
        let tuning = ChaseTuning::default();
        let mut rng = SimRng::new(1);

        let events = combat_system(&mut units, &tuning, &mut rng, Fixed::from_num(0.05));
        assert!(events.iter().any(|e| matches!(e, CombatEvent::SwingStarted { target: 2, .. })));
        assert_eq!(units[1].health.unwrap().health_change, 0);

        let step = Fixed::from_num(0.11);
        for _ in 0..2 {
            combat_system(&mut units, &tuning, &mut rng, step);
            assert_eq!(units[1].health.unwrap().health_change, 0);
        }
        let events = combat_system(&mut units, &tuning, &mut rng, step);
        assert!(events.contains(&CombatEvent::Hit {
            attacker: 1,
            target: 2
        }));
        assert_eq!(units[1].health.unwrap().health_change, -1);
    }

    #[test]
    fn test_no_overlapping_swings() {
        let defaults = CombatDefaults {
            attacks_per_second: Fixed::from_num(100),
            hit_delay_seconds: Fixed::ONE,
            ..sure_hit()
        };
        let mut units = vec![soldier(1, 0, Vec2Fixed::ZERO, &defaults), dummy(2, 1, v(1.0, 0.0))];
        let mut rng = SimRng::new(1);
        let dt = Fixed::from_num(0.05);

        let mut swings = 0;
        for _ in 0..10 {
            let events = combat_system(&mut units, &ChaseTuning::default(), &mut rng, dt);
            swings += events
                .iter()
                .filter(|e| matches!(e, CombatEvent::SwingStarted { .. }))
                .count();
            let c = units[0].combatant.unwrap();
            if c.windup.active && c.windup.time_left_seconds > Fixed::ZERO {
                assert!(swings <= 1);
            }
        }
        assert_eq!(swings, 1);
    }

    #[test]
    fn test_chase_when_out_of_range() {
        let mut units = vec![
            soldier(1, 0, Vec2Fixed::ZERO, &sure_hit()),
            dummy(2, 1, v(5.0, 0.0)),
        ];
        let events = combat_system(
            &mut units,
            &ChaseTuning::default(),
            &mut SimRng::new(1),
            Fixed::from_num(0.05),
        );
        assert!(events.contains(&CombatEvent::ChaseStarted {
            attacker: 1,
            target: 2
        }));
        let mover = units[0].mover.unwrap();
        let c = units[0].combatant.unwrap();
        assert!(mover.active_target && mover.is_running);
        assert!(c.auto_chase.is_auto_chasing);
        // Stops 1.5 short of the target: attack range 2 minus the buffer.
        assert!((mover.target_position.x - Fixed::from_num(3.5)).abs() < Fixed::from_num(1e-4));
        assert_eq!(c.animation.attack_tick, 0);
    }

    #[test]
    fn test_manual_move_is_not_overridden() {
        let mut attacker = soldier(1, 0, Vec2Fixed::ZERO, &sure_hit());
        let mut mover = attacker.mover.unwrap();
        mover.target_position = v(-20.0, 0.0);
        mover.active_target = true;
        attacker.mover = Some(mover);
        let mut units = vec![attacker, dummy(2, 1, v(5.0, 0.0))];

        let events = combat_system(
            &mut units,
            &ChaseTuning::default(),
            &mut SimRng::new(1),
            Fixed::from_num(0.05),
        );
        assert!(events
            .iter()
            .all(|e| !matches!(e, CombatEvent::ChaseStarted { .. })));
        assert_eq!(units[0].mover.unwrap().target_position, v(-20.0, 0.0));
    }

    #[test]
    fn test_reaching_range_releases_chase() {
        let mut attacker = soldier(1, 0, Vec2Fixed::ZERO, &sure_hit());
        let mut combatant = attacker.combatant.unwrap();
        combatant.auto_chase.is_auto_chasing = true;
        attacker.combatant = Some(combatant);
        let mut mover = attacker.mover.unwrap();
        mover.active_target = true;
        attacker.mover = Some(mover);
        let mut units = vec![attacker, dummy(2, 1, v(1.0, 0.0))];

        combat_system(
            &mut units,
            &ChaseTuning::default(),
            &mut SimRng::new(1),
            Fixed::from_num(0.05),
        );
        assert!(!units[0].combatant.unwrap().auto_chase.is_auto_chasing);
        assert!(!units[0].mover.unwrap().active_target);
    }

    #[test]
    fn test_committed_swing_lands_after_attacker_moves() {
        let mut units = vec![
            soldier(1, 0, Vec2Fixed::ZERO, &sure_hit()),
            dummy(2, 1, v(1.0, 0.0)),
        ];
        let mut rng = SimRng::new(1);
        let tuning = ChaseTuning::default();
        combat_system(&mut units, &tuning, &mut rng, Fixed::from_num(0.05));

        // Attacker steps back but stays within the strike tolerance.
        units[0].position = v(-1.2, 0.0);
        combat_system(&mut units, &tuning, &mut rng, Fixed::from_num(0.4));
        assert_eq!(units[1].health.unwrap().health_change, -1);
    }

    #[test]
    fn test_dead_attacker_does_nothing() {
        let mut attacker = soldier(1, 0, Vec2Fixed::ZERO, &sure_hit());
        attacker.health = Some(HealthState::at(HealthStage::Dead));
        let mut units = vec![attacker, dummy(2, 1, v(1.0, 0.0))];
        let events = combat_system(
            &mut units,
            &ChaseTuning::default(),
            &mut SimRng::new(1),
            Fixed::from_num(0.05),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_neutral_units_ignore_each_other() {
        let mut units = vec![
            soldier(1, -1, Vec2Fixed::ZERO, &sure_hit()),
            soldier(2, -1, v(1.0, 0.0), &sure_hit()),
        ];
        let events = combat_system(
            &mut units,
            &ChaseTuning::default(),
            &mut SimRng::new(1),
            Fixed::from_num(0.05),
        );
        assert!(events.is_empty());
        assert!(units.iter().all(|u| u.combatant.unwrap().target.target.is_none()));
    }

    #[test]
    fn test_windup_survives_target_death_and_holds_next_swing() {
        // Cooldown far shorter than the wind-up, so only the wind-up gates swings.
        let defaults = CombatDefaults {
            attacks_per_second: Fixed::from_num(100),
            ..sure_hit()
        };
        let mut units = vec![
            soldier(1, 0, Vec2Fixed::ZERO, &defaults),
            dummy(2, 1, v(1.0, 0.0)),
            dummy(3, 1, v(1.5, 0.0)),
        ];
        let tuning = ChaseTuning::default();
        let mut rng = SimRng::new(7);
        let dt = Fixed::from_num(0.05);

        let events = combat_system(&mut units, &tuning, &mut rng, dt);
        assert!(events.iter().any(|e| matches!(e, CombatEvent::SwingStarted { target: 2, .. })));
        units[1].health = Some(HealthState::at(HealthStage::Dead));

        let mut expired_at = None;
        for tick in 2..=20 {
            let before = rng;
            let events = combat_system(&mut units, &tuning, &mut rng, dt);
            assert!(!events.iter().any(|e| matches!(
                e,
                CombatEvent::Hit { target: 2, .. } | CombatEvent::Miss { target: 2, .. }
            )));

            let combatant = units[0].combatant.unwrap();
            if combatant.windup.target != Some(2) {
                // Expired without a roll, then the next swing goes to the survivor.
                assert_eq!(rng, before);
                assert!(events.iter().any(|e| matches!(e, CombatEvent::SwingStarted { target: 3, .. })));
                expired_at = Some(tick);
                break;
            }
            assert!(combatant.windup.active);
            assert_eq!(combatant.target.target, Some(3));
            assert_eq!(combatant.cooldown.time_left_seconds, Fixed::ZERO);
            assert!(!events.iter().any(|e| matches!(e, CombatEvent::SwingStarted { .. })));
        }
        assert_eq!(expired_at, Some(8));
        assert_eq!(units[1].health.unwrap().health_change, 0);
    }

    #[test]
    fn test_windup_cleared_without_roll_when_target_leaves_detection() {
        let mut units = vec![
            soldier(1, 0, Vec2Fixed::ZERO, &sure_hit()),
            dummy(2, 1, v(1.0, 0.0)),
        ];
        let tuning = ChaseTuning::default();
        let mut rng = SimRng::new(7);
        let dt = Fixed::from_num(0.05);
        combat_system(&mut units, &tuning, &mut rng, dt);
        assert!(units[0].combatant.unwrap().windup.active);

        units[1].position = v(50.0, 0.0);
        let before = rng;
        for _ in 0..10 {
            let events = combat_system(&mut units, &tuning, &mut rng, dt);
            assert!(!events
                .iter()
                .any(|e| matches!(e, CombatEvent::Hit { .. } | CombatEvent::Miss { .. })));
        }

        let combatant = units[0].combatant.unwrap();
        assert!(!combatant.windup.active);
        assert_eq!(combatant.windup.target, None);
        assert_eq!(combatant.target.target, None);
        assert_eq!(rng, before);
        assert_eq!(units[1].health.unwrap().health_change, 0);
    }
}
