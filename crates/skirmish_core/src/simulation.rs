//! Core simulation loop.
//!
//! The simulation runs at a fixed tick rate and processes all game logic
//! deterministically. It owns every entity, the ledger and the random
//! number generator, and runs the systems in a fixed order each tick.
//!
//! # Determinism
//!
//! - No floating-point math (uses fixed-point via [`Fixed`])
//! - All randomness comes from the serialized [`SimRng`]
//! - Consistent iteration order (sorted entity IDs)
//! - Same config, seed and intents always produce the same state hash
//!
//! # Example
//!
//! ```
//! use skirmish_core::config::SimConfig;
//! use skirmish_core::intents::PlayerIntent;
//! use skirmish_core::simulation::Simulation;
//!
//! let mut sim = Simulation::new(SimConfig::default());
//! let ids = sim.add_player(0).unwrap();
//! let building = *ids.last().unwrap();
//!
//! sim.submit(0, PlayerIntent::QueueUnit { building });
//! let events = sim.tick();
//! assert_eq!(events.intents_applied, 1);
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::combat::{combat_system, CombatEvent, CombatUnit, Combatant};
use crate::components::{
    EntityId, Owner, PlayerColor, PlayerId, Transform, Unit, UnitModifiers, Velocity,
    NEUTRAL_OWNER,
};
use crate::config::SimConfig;
use crate::economy::{EconomyEvent, ResourceCost, ResourceLedger};
use crate::error::{GameError, Result};
use crate::health::{
    health_stage_system, speed_multiplier, HealthStage, HealthState, StageTransition,
};
use crate::intents::{IntentOutcome, PlayerIntent, RejectedIntent, SubmittedIntent};
use crate::math::{Fixed, Vec2Fixed};
use crate::movement::{apply_move_order, apply_rally_order, step_unit, MoveOrder, MoveToRallyPoint, UnitMover};
use crate::production::{
    choose_spawn_position, Building, BuildingRallyPoint, BuildingSpawnQueue, PendingUnitSpawn,
    ProductionEvent, QueuedUnitSpawn,
};
use crate::rng::SimRng;
use crate::view::{BuildingView, PlayerView, UnitView, WorldView};
use crate::world::{CommandBuffer, Entity, EntityStorage};

/// Events generated during a simulation tick.
///
/// Hosts use these for logging, effects and replication; the simulation
/// itself never reads them back.
#[derive(Debug, Clone, Default)]
pub struct TickEvents {
    /// Tick number after the tick completed.
    pub tick: u64,
    /// Intents that changed state.
    pub intents_applied: u32,
    /// Intents that were valid but stale.
    pub intents_ignored: u32,
    /// Intents that failed validation.
    pub rejected: Vec<RejectedIntent>,
    /// Combat resolver output.
    pub combat: Vec<CombatEvent>,
    /// Health stage changes.
    pub stage_transitions: Vec<StageTransition>,
    /// Entities that died and were removed this tick.
    pub deaths: Vec<EntityId>,
    /// Production progress.
    pub production: Vec<ProductionEvent>,
    /// Ledger changes.
    pub economy: Vec<EconomyEvent>,
    /// Units created this tick.
    pub spawned: Vec<EntityId>,
}

impl TickEvents {
    /// Number of hits landed this tick.
    #[must_use]
    pub fn hit_count(&self) -> usize {
        self.combat
            .iter()
            .filter(|e| matches!(e, CombatEvent::Hit { .. }))
            .count()
    }
}

/// The authoritative game simulation.
///
/// # System Execution Order
///
/// Each tick, systems run in this order:
/// 1. **Intents** - Apply submitted player intents, then rally one-shots
/// 2. **Movement** - Resolve movers and integrate positions
/// 3. **Combat** - Acquire, chase, swing and resolve wind-ups
/// 4. **Health** - Apply stage deltas, remove the dead, refresh speed
/// 5. **Production** - Promote queued units, count down, spawn
/// 6. **Ledger** - Passive resource generation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    /// Current simulation tick.
    tick: u64,
    /// All entities in the simulation.
    entities: EntityStorage,
    /// Tunables.
    config: SimConfig,
    /// Source of every random roll.
    rng: SimRng,
    /// Per-player resources.
    ledger: ResourceLedger,
    /// Intents waiting for the next intent phase.
    pending_intents: Vec<SubmittedIntent>,
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(SimConfig::default())
    }
}

impl Simulation {
    /// Create an empty simulation at tick 0.
    #[must_use]
    pub fn new(config: SimConfig) -> Self {
        Self {
            tick: 0,
            entities: EntityStorage::new(),
            rng: SimRng::new(config.seed),
            ledger: ResourceLedger::new(&config.economy),
            config,
            pending_intents: Vec::new(),
        }
    }

    /// Get the current tick number.
    #[must_use]
    pub const fn get_tick(&self) -> u64 {
        self.tick
    }

    /// Get a reference to the entity storage.
    #[must_use]
    pub fn entities(&self) -> &EntityStorage {
        &self.entities
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get_entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Resource ledger.
    #[must_use]
    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }

    /// Intents submitted but not yet applied.
    #[must_use]
    pub fn pending_intents(&self) -> &[SubmittedIntent] {
        &self.pending_intents
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance the simulation by one configured timestep.
    pub fn tick(&mut self) -> TickEvents {
        self.advance(self.config.timestep())
    }

    /// Advance the simulation by `dt` seconds.
    ///
    /// Runs all systems in deterministic order and increments the tick
    /// counter. Failures are isolated per intent and never abort the tick.
    pub fn advance(&mut self, dt: Fixed) -> TickEvents {
        let mut events = TickEvents::default();

        // 1. Intents
        self.run_intent_phase(&mut events);

        // 2. Movement
        self.run_movement_system(dt);

        // 3. Combat
        events.combat = self.run_combat_system(dt);

        // 4. Health
        self.run_health_system(&mut events);

        // 5. Production
        self.run_production_system(dt, &mut events);

        // 6. Ledger
        events
            .economy
            .extend(self.ledger.tick(&self.config.economy, dt));

        self.tick += 1;
        events.tick = self.tick;

        #[cfg(feature = "debug-validation")]
        for violation in self.invariant_violations() {
            tracing::error!(tick = self.tick, %violation, "Invariant violated");
        }

        #[cfg(debug_assertions)]
        {
            let hash = self.state_hash();
            tracing::debug!(tick = self.tick, state_hash = hash, "Simulation state hash");
        }

        events
    }

    fn run_intent_phase(&mut self, events: &mut TickEvents) {
        // Rally one-shots from last tick's production go first so that a
        // player order in the same tick wins.
        for id in self.entities.sorted_ids() {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            let Some(rally) = entity.rally_order.take() else {
                continue;
            };
            if let (Some(transform), Some(mover)) = (entity.transform, entity.mover.as_mut()) {
                apply_rally_order(mover, transform.position, &rally);
                tracing::trace!(entity = id, "Rally order applied");
            }
        }

        let intents = std::mem::take(&mut self.pending_intents);
        for SubmittedIntent { player, intent } in intents {
            match self.dispatch_intent(player, &intent, events) {
                Ok(IntentOutcome::Applied) => events.intents_applied += 1,
                Ok(IntentOutcome::Ignored) => {
                    events.intents_ignored += 1;
                    tracing::trace!(player, ?intent, "Ignored stale intent");
                }
                Err(error) => {
                    tracing::warn!(player, ?intent, %error, "Rejected intent");
                    events.rejected.push(RejectedIntent {
                        player,
                        intent,
                        reason: error.to_string(),
                    });
                }
            }
        }
    }

    fn run_movement_system(&mut self, dt: Fixed) {
        let tuning = self.config.movement;
        for id in self.entities.sorted_ids() {
            let Some(entity) = self.entities.get_mut(id) else {
                continue;
            };
            let Entity {
                transform: Some(transform),
                mover: Some(mover),
                unit: Some(unit),
                velocity,
                modifiers,
                ..
            } = entity
            else {
                continue;
            };

            let multiplier = modifiers
                .as_ref()
                .map_or(Fixed::ONE, |m| m.move_speed_multiplier);
            let velocity = velocity.get_or_insert(Velocity::ZERO);
            if step_unit(transform, velocity, mover, unit, multiplier, &tuning, dt) {
                tracing::trace!(entity = id, "Move order completed");
            }
        }
    }

    fn run_combat_system(&mut self, dt: Fixed) -> Vec<CombatEvent> {
        let mut units: Vec<CombatUnit> = self
            .entities
            .iter_sorted()
            .filter_map(|e| {
                e.unit.as_ref()?;
                Some(CombatUnit {
                    id: e.id,
                    position: e.position()?,
                    owner: e.owner?,
                    health: e.health,
                    combatant: e.combatant,
                    mover: e.mover,
                })
            })
            .collect();
        if units.is_empty() {
            return Vec::new();
        }

        let events = combat_system(&mut units, &self.config.chase, &mut self.rng, dt);

        for unit in &units {
            if let Some(entity) = self.entities.get_mut(unit.id) {
                entity.health = unit.health;
                entity.combatant = unit.combatant;
                entity.mover = unit.mover;
            }
        }

        for event in &events {
            match *event {
                CombatEvent::SwingStarted {
                    attacker,
                    target,
                    attack_tick,
                } => tracing::debug!(attacker, target, attack_tick, "Swing started"),
                CombatEvent::Hit { attacker, target } => {
                    tracing::debug!(attacker, target, "Hit");
                }
                _ => {}
            }
        }

        events
    }

    fn run_health_system(&mut self, events: &mut TickEvents) {
        let table = self.config.health_speed_table.as_ref();
        let mut units: Vec<(EntityId, &mut HealthState, Option<&mut UnitModifiers>)> = self
            .entities
            .iter_mut()
            .filter_map(|(id, entity)| {
                let Entity {
                    health, modifiers, ..
                } = entity;
                let modifiers = modifiers.as_mut();
                health.as_mut().map(move |h| (*id, h, modifiers))
            })
            .collect();
        units.sort_unstable_by_key(|(id, _, _)| *id);

        let (transitions, deaths) = health_stage_system(&mut units, table);
        drop(units);

        let mut buffer = CommandBuffer::new();
        for id in &deaths {
            tracing::debug!(entity = *id, "Unit destroyed");
            buffer.despawn(*id);
        }
        buffer.playback(&mut self.entities);

        events.stage_transitions = transitions;
        events.deaths = deaths;
    }

    fn run_production_system(&mut self, dt: Fixed, events: &mut TickEvents) {
        // Promotion: the first queued request of each idle building starts.
        let mut buffer = CommandBuffer::new();
        for id in self.entities.sorted_ids() {
            let Some(queued) = self.entities.get(id).and_then(|e| e.queued_spawn) else {
                continue;
            };
            let Some(queue) = self
                .entities
                .get_mut(queued.building)
                .and_then(|b| b.spawn_queue.as_mut())
            else {
                tracing::warn!(
                    entity = id,
                    building = queued.building,
                    "Discarding queued unit, building no longer exists"
                );
                buffer.despawn(id);
                events.production.push(ProductionEvent::Discarded {
                    building: queued.building,
                });
                continue;
            };
            if !queue.promote() {
                continue;
            }

            let pending = PendingUnitSpawn::from_queued(&queued, queue.time_to_spawn_unit);
            buffer.despawn(id);
            buffer.spawn(Entity {
                pending_spawn: Some(pending),
                ..Entity::default()
            });
            events.production.push(ProductionEvent::Started {
                building: queued.building,
            });
            tracing::debug!(building = queued.building, "Unit production started");
        }
        buffer.playback(&mut self.entities);

        // Countdown: completed spawns become units.
        let mut buffer = CommandBuffer::new();
        let mut producers = Vec::new();
        for id in self.entities.sorted_ids() {
            let Some(mut pending) = self.entities.get(id).and_then(|e| e.pending_spawn) else {
                continue;
            };
            let Some(building) = self
                .entities
                .get(pending.building)
                .filter(|b| b.building.is_some())
            else {
                tracing::warn!(
                    entity = id,
                    building = pending.building,
                    "Discarding pending unit, building no longer exists"
                );
                buffer.despawn(id);
                events.production.push(ProductionEvent::Discarded {
                    building: pending.building,
                });
                continue;
            };
            let rally = building.rally_point.and_then(|r| r.get());

            let done = pending.tick(dt);
            if let Some(entity) = self.entities.get_mut(id) {
                entity.pending_spawn = Some(pending);
            }
            if !done {
                continue;
            }

            let remove_queue = self
                .entities
                .get_mut(pending.building)
                .and_then(|b| b.spawn_queue.as_mut())
                .map_or(false, BuildingSpawnQueue::complete);
            if remove_queue {
                buffer.remove_spawn_queue(pending.building);
            }

            let mut unit = self.make_unit(pending.spawn_position, Owner::new(pending.owner));
            unit.rally_order = rally.map(|target| MoveToRallyPoint { target });
            buffer.despawn(id);
            buffer.spawn(unit);
            producers.push(pending.building);
        }

        let spawned = buffer.playback(&mut self.entities);
        for (building, unit) in producers.into_iter().zip(spawned) {
            tracing::debug!(building, unit, "Unit produced");
            events
                .production
                .push(ProductionEvent::UnitSpawned { building, unit });
            events.spawned.push(unit);
        }
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Queue an intent for the next tick's intent phase.
    ///
    /// `player` must come from the host's authenticated session, never from
    /// the client payload.
    pub fn submit(&mut self, player: PlayerId, intent: PlayerIntent) {
        self.pending_intents.push(SubmittedIntent { player, intent });
    }

    /// Apply an intent immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity is missing, not owned by `player`,
    /// lacks the required component, or the ledger refuses the amount.
    pub fn apply_intent(&mut self, player: PlayerId, intent: &PlayerIntent) -> Result<IntentOutcome> {
        let mut scratch = TickEvents::default();
        self.dispatch_intent(player, intent, &mut scratch)
    }

    fn dispatch_intent(
        &mut self,
        player: PlayerId,
        intent: &PlayerIntent,
        events: &mut TickEvents,
    ) -> Result<IntentOutcome> {
        match *intent {
            PlayerIntent::SpawnUnit { position, neutral } => {
                let owner = if neutral {
                    Owner::neutral()
                } else {
                    Owner::new(player)
                };
                self.check_in_world(position)?;
                let id = self.spawn_unit(position, owner);
                events.spawned.push(id);
                Ok(IntentOutcome::Applied)
            }
            PlayerIntent::QueueUnit { building } => {
                self.enqueue_unit(player, building, events)?;
                Ok(IntentOutcome::Applied)
            }
            PlayerIntent::SetRallyPoint { building, position } => {
                self.set_rally_point(player, building, position)?;
                Ok(IntentOutcome::Applied)
            }
            PlayerIntent::MoveUnit { unit, order } => self.move_unit(player, unit, &order),
            PlayerIntent::AddResources { amount } => {
                events.economy.push(self.ledger.add(player, amount)?);
                Ok(IntentOutcome::Applied)
            }
        }
    }

    fn check_in_world(&self, position: Vec2Fixed) -> Result<()> {
        if self.config.in_world(position) {
            Ok(())
        } else {
            Err(GameError::OutOfBounds {
                x: position.x,
                y: position.y,
                extent: self.config.world_extent,
            })
        }
    }

    fn owned_entity(&mut self, player: PlayerId, id: EntityId) -> Result<&mut Entity> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(GameError::EntityNotFound(id))?;
        let owner = entity.owner_id().ok_or(GameError::MissingComponent {
            entity: id,
            component: "Owner",
        })?;
        if owner != player {
            return Err(GameError::NotOwner {
                player,
                entity: id,
                owner,
            });
        }
        Ok(entity)
    }

    /// Queue one unit at a building owned by `player`.
    ///
    /// Returns the id of the queued request.
    ///
    /// # Errors
    ///
    /// Fails if the building is missing, not owned by `player`, or the
    /// configured unit cost cannot be paid.
    pub fn queue_unit(&mut self, player: PlayerId, building: EntityId) -> Result<EntityId> {
        let mut scratch = TickEvents::default();
        self.enqueue_unit(player, building, &mut scratch)
    }

    fn enqueue_unit(
        &mut self,
        player: PlayerId,
        building: EntityId,
        events: &mut TickEvents,
    ) -> Result<EntityId> {
        let entity = self.owned_entity(player, building)?;
        if entity.building.is_none() {
            return Err(GameError::MissingComponent {
                entity: building,
                component: "Building",
            });
        }
        let position = entity.position().ok_or(GameError::MissingComponent {
            entity: building,
            component: "Transform",
        })?;

        if let Some(cost) = self.config.production.unit_cost {
            events.economy.push(self.ledger.try_spend(player, cost)?);
        }

        let occupied = self.occupied_positions();
        let production = &self.config.production;
        let spawn_position = choose_spawn_position(
            position,
            &production.spawn_offsets,
            &occupied,
            production.spawn_clearance,
        );
        let time_to_spawn = production.time_to_spawn_unit;

        if let Some(entity) = self.entities.get_mut(building) {
            entity
                .spawn_queue
                .get_or_insert(BuildingSpawnQueue::new(time_to_spawn))
                .enqueue();
        }
        let id = self.entities.insert(Entity {
            queued_spawn: Some(QueuedUnitSpawn {
                building,
                owner: player,
                spawn_position,
            }),
            ..Entity::default()
        });

        events.production.push(ProductionEvent::Queued {
            building,
            owner: player,
        });
        tracing::debug!(player, building, "Unit queued");
        Ok(id)
    }

    /// Positions a new spawn slot must keep clear of.
    fn occupied_positions(&self) -> Vec<Vec2Fixed> {
        self.entities
            .iter_sorted()
            .filter_map(|e| {
                if e.unit.is_some() {
                    e.position()
                } else if let Some(q) = e.queued_spawn {
                    Some(q.spawn_position)
                } else {
                    e.pending_spawn.map(|p| p.spawn_position)
                }
            })
            .collect()
    }

    /// Set the rally point of a building owned by `player`.
    ///
    /// # Errors
    ///
    /// Fails if the position is outside the world, or the building is
    /// missing or not owned by `player`.
    pub fn set_rally_point(
        &mut self,
        player: PlayerId,
        building: EntityId,
        position: Vec2Fixed,
    ) -> Result<()> {
        self.check_in_world(position)?;
        let entity = self.owned_entity(player, building)?;
        if entity.building.is_none() {
            return Err(GameError::MissingComponent {
                entity: building,
                component: "Building",
            });
        }
        entity.rally_point = Some(BuildingRallyPoint {
            rally_position: position,
            has_rally_point: true,
        });
        Ok(())
    }

    /// Apply a sequenced move order to a unit owned by `player`.
    ///
    /// # Errors
    ///
    /// Fails if the target is outside the world, or the unit is missing,
    /// not owned by `player`, or cannot move.
    pub fn move_unit(
        &mut self,
        player: PlayerId,
        unit: EntityId,
        order: &MoveOrder,
    ) -> Result<IntentOutcome> {
        self.check_in_world(order.target_position)?;
        let entity = self.owned_entity(player, unit)?;
        let mover = entity.mover.as_mut().ok_or(GameError::MissingComponent {
            entity: unit,
            component: "UnitMover",
        })?;
        if !apply_move_order(mover, order) {
            return Ok(IntentOutcome::Ignored);
        }
        if let Some(combatant) = entity.combatant.as_mut() {
            combatant.auto_chase.is_auto_chasing = false;
        }
        Ok(IntentOutcome::Applied)
    }

    /// Credit a player's ledger.
    ///
    /// # Errors
    ///
    /// Fails for unknown players and negative amounts.
    pub fn add_resources(&mut self, player: PlayerId, amount: ResourceCost) -> Result<()> {
        self.ledger.add(player, amount).map(|_| ())
    }

    // =========================================================================
    // Spawning
    // =========================================================================

    /// Register a player and spawn their starting forces.
    ///
    /// Returns the starting unit ids followed by the building id.
    ///
    /// # Errors
    ///
    /// Fails if the player already joined or the id is negative.
    pub fn add_player(&mut self, player: PlayerId) -> Result<Vec<EntityId>> {
        if player < 0 {
            return Err(GameError::InvalidState(format!(
                "Player id {player} is reserved"
            )));
        }
        self.ledger.register(player, &self.config.economy)?;

        let start = self.config.start;
        let base = Vec2Fixed::new(
            self.rng.next_range(-start.base_extent, start.base_extent),
            self.rng.next_range(-start.base_extent, start.base_extent),
        );
        let owner = Owner::new(player);

        let mut ids = Vec::with_capacity(start.unit_count as usize + 1);
        for i in 0..start.unit_count {
            let offset = Vec2Fixed::new(start.unit_spacing * Fixed::from_num(i), Fixed::ZERO);
            ids.push(self.spawn_unit(base + offset, owner));
        }
        ids.push(self.spawn_building(base + start.building_offset, owner));

        tracing::info!(player, x = %base.x, y = %base.y, "Player joined");
        Ok(ids)
    }

    fn make_unit(&self, position: Vec2Fixed, owner: Owner) -> Entity {
        let stage = HealthStage::Healthy;
        Entity {
            transform: Some(Transform::at(position)),
            velocity: Some(Velocity::ZERO),
            owner: Some(owner),
            unit: Some(Unit {
                move_speed: self.config.unit.move_speed,
                rotation_speed: self.config.unit.rotation_speed,
            }),
            modifiers: Some(UnitModifiers {
                move_speed_multiplier: speed_multiplier(
                    self.config.health_speed_table.as_ref(),
                    stage,
                ),
            }),
            health: Some(HealthState::at(stage)),
            mover: Some(UnitMover::holding(position, Fixed::ZERO)),
            combatant: Some(Combatant::from_defaults(&self.config.combat)),
            color: Some(PlayerColor::for_owner(owner.player)),
            ..Entity::default()
        }
    }

    /// Spawn a combat unit.
    pub fn spawn_unit(&mut self, position: Vec2Fixed, owner: Owner) -> EntityId {
        let entity = self.make_unit(position, owner);
        let id = self.entities.insert(entity);
        tracing::debug!(entity = id, owner = owner.player, "Unit spawned");
        id
    }

    /// Spawn a production building.
    pub fn spawn_building(&mut self, position: Vec2Fixed, owner: Owner) -> EntityId {
        let id = self.entities.insert(Entity {
            transform: Some(Transform::at(position)),
            owner: Some(owner),
            building: Some(Building),
            rally_point: Some(BuildingRallyPoint::default()),
            color: Some(PlayerColor::for_owner(owner.player)),
            ..Entity::default()
        });
        tracing::debug!(entity = id, owner = owner.player, "Building spawned");
        id
    }

    /// Remove an entity from the simulation.
    ///
    /// # Errors
    ///
    /// Returns an error if the entity doesn't exist.
    pub fn despawn(&mut self, id: EntityId) -> Result<()> {
        self.entities
            .remove(id)
            .map(|_| ())
            .ok_or(GameError::EntityNotFound(id))
    }

    /// Add to a unit's pending health delta, resolved in the next health
    /// phase.
    ///
    /// # Errors
    ///
    /// Fails if the entity is missing or has no health.
    pub fn apply_health_change(&mut self, id: EntityId, delta: i32) -> Result<()> {
        let entity = self
            .entities
            .get_mut(id)
            .ok_or(GameError::EntityNotFound(id))?;
        let health = entity.health.as_mut().ok_or(GameError::MissingComponent {
            entity: id,
            component: "HealthState",
        })?;
        health.health_change = health.health_change.saturating_add(delta);
        Ok(())
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Observable state of a unit.
    #[must_use]
    pub fn unit_view(&self, id: EntityId) -> Option<UnitView> {
        let entity = self.entities.get(id)?;
        entity.unit.as_ref()?;
        let transform = entity.transform?;
        Some(UnitView {
            id,
            owner: entity.owner_id().unwrap_or(NEUTRAL_OWNER),
            position: transform.position,
            yaw: transform.yaw,
            stage: entity
                .health
                .map_or(HealthStage::Healthy, |h| h.current_stage),
            active_target: entity.mover.is_some_and(|m| m.active_target),
            last_applied_sequence: entity.mover.map_or(0, |m| m.last_applied_sequence),
            attack_tick: entity.combatant.map_or(0, |c| c.animation.attack_tick),
            auto_chasing: entity
                .combatant
                .is_some_and(|c| c.auto_chase.is_auto_chasing),
        })
    }

    /// Observable state of a building.
    #[must_use]
    pub fn building_view(&self, id: EntityId) -> Option<BuildingView> {
        let entity = self.entities.get(id)?;
        entity.building.as_ref()?;
        let spawn_progress = self
            .entities
            .iter_sorted()
            .filter_map(|e| e.pending_spawn)
            .find(|p| p.building == id)
            .map_or(Fixed::ZERO, |p| p.progress());
        Some(BuildingView {
            id,
            owner: entity.owner_id().unwrap_or(NEUTRAL_OWNER),
            position: entity.position()?,
            units_in_queue: entity.spawn_queue.map_or(0, |q| q.units_in_queue),
            is_spawning: entity
                .spawn_queue
                .is_some_and(|q| q.is_currently_spawning),
            spawn_progress,
            rally_point: entity.rally_point.and_then(|r| r.get()),
        })
    }

    /// A player's resources.
    #[must_use]
    pub fn player_view(&self, player: PlayerId) -> Option<PlayerView> {
        self.ledger
            .balance(player)
            .map(|resources| PlayerView { player, resources })
    }

    /// Everything observable, in id order.
    #[must_use]
    pub fn world_view(&self) -> WorldView {
        let ids = self.entities.sorted_ids();
        WorldView {
            tick: self.tick,
            units: ids.iter().filter_map(|&id| self.unit_view(id)).collect(),
            buildings: ids.iter().filter_map(|&id| self.building_view(id)).collect(),
            players: self
                .ledger
                .iter()
                .map(|(player, resources)| PlayerView {
                    player,
                    resources: *resources,
                })
                .collect(),
            state_hash: self.state_hash(),
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Compute a hash of the current simulation state.
    ///
    /// Used for desync detection. Two simulations with identical state
    /// produce identical hashes.
    #[must_use]
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.tick.hash(&mut hasher);
        self.rng.hash(&mut hasher);
        self.ledger.hash(&mut hasher);
        self.pending_intents.hash(&mut hasher);

        // Entities in deterministic order
        self.entities.len().hash(&mut hasher);
        for entity in self.entities.iter_sorted() {
            entity.hash(&mut hasher);
        }

        hasher.finish()
    }

    /// Serialize the simulation state for replay or network sync.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self)
            .map_err(|e| GameError::InvalidState(format!("Failed to serialize simulation: {e}")))
    }

    /// Deserialize simulation state from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if deserialization fails.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(|e| {
            GameError::InvalidState(format!("Failed to deserialize simulation: {e}"))
        })
    }

    /// Check the production and health bookkeeping.
    ///
    /// Returns one message per broken rule; an empty list means the state
    /// is consistent.
    #[must_use]
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut violations = Vec::new();

        for entity in self.entities.iter_sorted() {
            if let Some(health) = entity.health {
                if health.current_stage.is_dead() {
                    violations.push(format!("entity {} is dead but not removed", entity.id));
                }
                if health.health_change != 0 {
                    violations.push(format!("entity {} has an unresolved delta", entity.id));
                }
            }

            if entity.building.is_none() {
                continue;
            }
            let queued = self
                .entities
                .iter_sorted()
                .filter(|e| e.queued_spawn.is_some_and(|q| q.building == entity.id))
                .count();
            let pending = self
                .entities
                .iter_sorted()
                .filter(|e| e.pending_spawn.is_some_and(|p| p.building == entity.id))
                .count();
            if pending > 1 {
                violations.push(format!(
                    "building {} has {pending} spawns in progress",
                    entity.id
                ));
            }
            let (in_queue, spawning) = entity
                .spawn_queue
                .map_or((0, false), |q| (q.units_in_queue as usize, q.is_currently_spawning));
            if in_queue != queued {
                violations.push(format!(
                    "building {} counts {in_queue} queued units but has {queued}",
                    entity.id
                ));
            }
            if spawning != (pending == 1) {
                violations.push(format!(
                    "building {} spawning flag disagrees with {pending} pending",
                    entity.id
                ));
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: i32, y: i32) -> Vec2Fixed {
        Vec2Fixed::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    fn order(x: i32, y: i32, sequence: u32) -> MoveOrder {
        MoveOrder {
            target_position: v(x, y),
            target_rotation: Fixed::ZERO,
            running: false,
            sequence,
        }
    }

    #[test]
    fn test_simulation_new() {
        let sim = Simulation::default();
        assert_eq!(sim.get_tick(), 0);
        assert!(sim.entities().is_empty());
    }

    #[test]
    fn test_tick_increments() {
        let mut sim = Simulation::default();
        let events = sim.tick();
        assert_eq!(events.tick, 1);
        sim.tick();
        assert_eq!(sim.get_tick(), 2);
    }

    #[test]
    fn test_add_player_spawns_line_and_building() {
        let mut sim = Simulation::default();
        let ids = sim.add_player(0).unwrap();
        assert_eq!(ids.len(), 6);

        let building = sim.building_view(ids[5]).unwrap();
        let first = sim.unit_view(ids[0]).unwrap();
        let second = sim.unit_view(ids[1]).unwrap();
        assert_eq!(second.position - first.position, v(1, 0));
        assert_eq!(building.position - first.position, v(0, 5));

        let extent = Fixed::from_num(10);
        assert!(first.position.x >= -extent && first.position.x < extent);
        assert_eq!(sim.player_view(0).unwrap().resources.resource1, 100);

        assert!(matches!(
            sim.add_player(0),
            Err(GameError::PlayerAlreadyJoined(0))
        ));
        assert!(sim.add_player(-1).is_err());
    }

    #[test]
    fn test_intents_apply_on_next_tick() {
        let mut sim = Simulation::default();
        sim.submit(
            2,
            PlayerIntent::SpawnUnit {
                position: v(1, 1),
                neutral: false,
            },
        );
        assert!(sim.entities().is_empty());
        assert_eq!(sim.pending_intents().len(), 1);

        let events = sim.tick();
        assert_eq!(events.intents_applied, 1);
        assert_eq!(events.spawned.len(), 1);
        assert_eq!(sim.unit_view(events.spawned[0]).unwrap().owner, 2);
        assert!(sim.pending_intents().is_empty());
    }

    #[test]
    fn test_ownership_checked() {
        let mut sim = Simulation::default();
        let ids = sim.add_player(0).unwrap();
        sim.add_player(1).unwrap();

        let err = sim.move_unit(1, ids[0], &order(3, 3, 1)).unwrap_err();
        assert!(matches!(err, GameError::NotOwner { owner: 0, .. }));
        assert!(sim.queue_unit(1, ids[5]).is_err());
        assert!(sim.set_rally_point(1, ids[5], v(0, 0)).is_err());
        assert!(matches!(
            sim.queue_unit(0, ids[0]),
            Err(GameError::MissingComponent {
                component: "Building",
                ..
            })
        ));

        sim.submit(1, PlayerIntent::QueueUnit { building: ids[5] });
        let events = sim.tick();
        assert_eq!(events.rejected.len(), 1);
        assert_eq!(events.intents_applied, 0);
        assert!(sim.invariant_violations().is_empty());
    }

    #[test]
    fn test_stale_sequence_ignored() {
        let mut sim = Simulation::default();
        let unit = sim.spawn_unit(v(0, 0), Owner::new(0));
        assert_eq!(
            sim.move_unit(0, unit, &order(5, 0, 5)).unwrap(),
            IntentOutcome::Applied
        );
        assert_eq!(
            sim.move_unit(0, unit, &order(-5, 0, 3)).unwrap(),
            IntentOutcome::Ignored
        );
        let mover = sim.get_entity(unit).unwrap().mover.unwrap();
        assert_eq!(mover.target_position, v(5, 0));
        assert_eq!(mover.last_applied_sequence, 5);
    }

    #[test]
    fn test_movement_integration() {
        let mut sim = Simulation::default();
        let unit = sim.spawn_unit(v(0, 0), Owner::new(0));
        sim.move_unit(0, unit, &order(0, 10, 1)).unwrap();

        for _ in 0..20 {
            sim.tick();
        }
        let view = sim.unit_view(unit).unwrap();
        // Five units per second for one second.
        assert!(view.position.y > Fixed::from_num(4.9));
        assert!(view.position.y <= Fixed::from_num(5.01));

        for _ in 0..40 {
            sim.tick();
        }
        let view = sim.unit_view(unit).unwrap();
        assert!(!view.active_target);
        assert!(view.position.distance_squared(v(0, 10)) < Fixed::from_num(0.05));
    }

    #[test]
    fn test_health_system_removes_dead() {
        let mut sim = Simulation::default();
        let unit = sim.spawn_unit(v(0, 0), Owner::new(0));
        sim.apply_health_change(unit, -4).unwrap();

        let events = sim.tick();
        assert_eq!(events.deaths, vec![unit]);
        assert!(sim.get_entity(unit).is_none());
        assert_eq!(events.stage_transitions[0].to, HealthStage::Dead);
    }

    #[test]
    fn test_wounded_unit_slows_down() {
        let mut sim = Simulation::default();
        let unit = sim.spawn_unit(v(0, 0), Owner::new(0));
        sim.apply_health_change(unit, -2).unwrap();
        sim.tick();

        let entity = sim.get_entity(unit).unwrap();
        assert_eq!(entity.health.unwrap().current_stage, HealthStage::Wounded);
        assert_eq!(
            entity.modifiers.unwrap().move_speed_multiplier,
            Fixed::from_num(0.65)
        );
    }

    #[test]
    fn test_queue_and_rally() {
        let mut sim = Simulation::default();
        let building = sim.spawn_building(v(0, 0), Owner::new(0));
        sim.set_rally_point(0, building, v(0, 20)).unwrap();
        sim.queue_unit(0, building).unwrap();

        let view = sim.building_view(building).unwrap();
        assert_eq!(view.units_in_queue, 1);
        assert_eq!(view.rally_point, Some(v(0, 20)));

        sim.tick();
        let view = sim.building_view(building).unwrap();
        assert!(view.is_spawning);
        assert_eq!(view.units_in_queue, 0);
        assert!(view.spawn_progress > Fixed::ZERO);

        let mut spawned = Vec::new();
        for _ in 0..60 {
            spawned.extend(sim.tick().spawned);
        }
        assert_eq!(spawned.len(), 1);
        assert!(sim.get_entity(building).unwrap().spawn_queue.is_none());

        let unit = sim.get_entity(spawned[0]).unwrap();
        assert!(unit.rally_order.is_none());
        let mover = unit.mover.unwrap();
        assert_eq!(mover.target_position, v(0, 20));
        assert_eq!(mover.last_applied_sequence, 0);
        assert!(sim.invariant_violations().is_empty());
    }

    #[test]
    fn test_spawn_slots_are_distinct() {
        let mut sim = Simulation::default();
        let building = sim.spawn_building(v(0, 0), Owner::new(0));
        for _ in 0..3 {
            sim.queue_unit(0, building).unwrap();
        }
        let slots: Vec<Vec2Fixed> = sim
            .entities()
            .iter_sorted()
            .filter_map(|e| e.queued_spawn.map(|q| q.spawn_position))
            .collect();
        assert_eq!(slots, vec![v(4, 0), v(-4, 0), v(0, 4)]);
    }

    #[test]
    fn test_pending_discarded_when_building_destroyed() {
        let mut sim = Simulation::default();
        let building = sim.spawn_building(v(0, 0), Owner::new(0));
        sim.queue_unit(0, building).unwrap();
        sim.queue_unit(0, building).unwrap();
        sim.tick();
        sim.despawn(building).unwrap();

        let events = sim.tick();
        let discarded = events
            .production
            .iter()
            .filter(|e| matches!(e, ProductionEvent::Discarded { .. }))
            .count();
        assert_eq!(discarded, 2);
        assert!(sim
            .entities()
            .iter_sorted()
            .all(|e| e.pending_spawn.is_none() && e.queued_spawn.is_none()));
    }

    #[test]
    fn test_unit_cost_gates_queue() {
        let mut config = SimConfig::default();
        config.production.unit_cost = Some(ResourceCost::new(60, 0));
        let mut sim = Simulation::new(config);
        let ids = sim.add_player(0).unwrap();
        let building = ids[5];

        sim.queue_unit(0, building).unwrap();
        assert!(matches!(
            sim.queue_unit(0, building),
            Err(GameError::InsufficientResources { .. })
        ));
        assert_eq!(sim.player_view(0).unwrap().resources.resource1, 40);

        sim.add_resources(0, ResourceCost::new(20, 0)).unwrap();
        sim.queue_unit(0, building).unwrap();
        assert_eq!(sim.building_view(building).unwrap().units_in_queue, 2);
    }

    #[test]
    fn test_deterministic_hash() {
        let run = || {
            let mut sim = Simulation::default();
            sim.add_player(0).unwrap();
            sim.add_player(1).unwrap();
            for _ in 0..50 {
                sim.tick();
            }
            sim.state_hash()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let mut sim = Simulation::default();
        let ids = sim.add_player(0).unwrap();
        sim.submit(0, PlayerIntent::QueueUnit { building: ids[5] });
        sim.tick();

        let bytes = sim.serialize().unwrap();
        let restored = Simulation::deserialize(&bytes).unwrap();
        assert_eq!(restored.state_hash(), sim.state_hash());
        assert_eq!(restored.get_tick(), 1);
        assert!(Simulation::deserialize(&[1, 2, 3]).is_err());
    }

    #[test]
    fn test_world_view_lists_everything() {
        let mut sim = Simulation::default();
        sim.add_player(0).unwrap();
        sim.add_player(1).unwrap();
        let view = sim.world_view();
        assert_eq!(view.units.len(), 10);
        assert_eq!(view.buildings.len(), 2);
        assert_eq!(view.players.len(), 2);
        assert_eq!(view.units_of(1).count(), 5);
        assert_eq!(view.state_hash, sim.state_hash());
    }
}
