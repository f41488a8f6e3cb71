//! Entity storage and deferred structural changes.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::combat::Combatant;
use crate::components::{EntityId, Owner, PlayerColor, Transform, Unit, UnitModifiers, Velocity};
use crate::health::HealthState;
use crate::movement::{MoveToRallyPoint, UnitMover};
use crate::production::{
    Building, BuildingRallyPoint, BuildingSpawnQueue, PendingUnitSpawn, QueuedUnitSpawn,
};

/// An entity with optional components.
///
/// Only components that are `Some` are present. Systems select the
/// entities they care about by the components they need.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier for this entity.
    pub id: EntityId,
    /// Position and facing.
    pub transform: Option<Transform>,
    /// Velocity from the last movement phase.
    pub velocity: Option<Velocity>,
    /// Owning player.
    pub owner: Option<Owner>,
    /// Mobile unit stats.
    pub unit: Option<Unit>,
    /// Derived multipliers.
    pub modifiers: Option<UnitModifiers>,
    /// Staged health.
    pub health: Option<HealthState>,
    /// Movement intent.
    pub mover: Option<UnitMover>,
    /// One-shot rally order consumed by the next intent phase.
    pub rally_order: Option<MoveToRallyPoint>,
    /// Combat state.
    pub combatant: Option<Combatant>,
    /// Production building marker.
    pub building: Option<Building>,
    /// Building rally point.
    pub rally_point: Option<BuildingRallyPoint>,
    /// Building production state.
    pub spawn_queue: Option<BuildingSpawnQueue>,
    /// Waiting production request.
    pub queued_spawn: Option<QueuedUnitSpawn>,
    /// Production request in progress.
    pub pending_spawn: Option<PendingUnitSpawn>,
    /// Display colour.
    pub color: Option<PlayerColor>,
}

impl Entity {
    /// Create a new entity with the given ID and no components.
    #[must_use]
    pub fn new(id: EntityId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Position, if the entity has a transform.
    #[must_use]
    pub fn position(&self) -> Option<crate::math::Vec2Fixed> {
        self.transform.map(|t| t.position)
    }

    /// Owning player, if any.
    #[must_use]
    pub fn owner_id(&self) -> Option<crate::components::PlayerId> {
        self.owner.map(|o| o.player)
    }
}

/// Storage for all entities in the simulation.
///
/// Uses a `HashMap` for O(1) lookup by ID, with deterministic iteration via
/// sorted keys when processing systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStorage {
    /// Map of entity ID to entity data.
    entities: HashMap<EntityId, Entity>,
    /// Next entity ID to assign.
    next_id: EntityId,
}

impl Default for EntityStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStorage {
    /// Create empty entity storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            next_id: 1,
        }
    }

    /// Insert a new entity and return its ID.
    pub fn insert(&mut self, mut entity: Entity) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        entity.id = id;
        self.entities.insert(id, entity);
        id
    }

    /// Remove an entity by ID.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    /// Get an entity by ID.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Get a mutable reference to an entity by ID.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Check if an entity exists.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Get the number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if storage is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Id the next inserted entity will receive.
    #[must_use]
    pub const fn next_id(&self) -> EntityId {
        self.next_id
    }

    /// Get sorted entity IDs for deterministic iteration.
    #[must_use]
    pub fn sorted_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Entities in ascending id order.
    pub fn iter_sorted(&self) -> impl Iterator<Item = &Entity> {
        self.sorted_ids()
            .into_iter()
            .filter_map(move |id| self.entities.get(&id))
    }

    /// Iterate over all entities in unspecified order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&EntityId, &mut Entity)> {
        self.entities.iter_mut()
    }
}

/// A structural change recorded during a read pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeferredCommand {
    /// Insert a new entity.
    Spawn(Box<Entity>),
    /// Remove an entity if it still exists.
    Despawn(EntityId),
    /// Drop a building's spawn queue component.
    RemoveSpawnQueue(EntityId),
}

/// Structural changes applied in order at the end of a phase.
#[derive(Debug, Clone, Default)]
pub struct CommandBuffer {
    commands: Vec<DeferredCommand>,
}

impl CommandBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an entity insertion.
    pub fn spawn(&mut self, entity: Entity) {
        self.commands.push(DeferredCommand::Spawn(Box::new(entity)));
    }

    /// Queue an entity removal.
    pub fn despawn(&mut self, id: EntityId) {
        self.commands.push(DeferredCommand::Despawn(id));
    }

    /// Queue removal of a spawn queue component.
    pub fn remove_spawn_queue(&mut self, id: EntityId) {
        self.commands.push(DeferredCommand::RemoveSpawnQueue(id));
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Apply every command and return the ids of spawned entities in
    /// insertion order. Commands against missing entities are skipped.
    pub fn playback(self, storage: &mut EntityStorage) -> Vec<EntityId> {
        let mut spawned = Vec::new();
        for command in self.commands {
            match command {
                DeferredCommand::Spawn(entity) => spawned.push(storage.insert(*entity)),
                DeferredCommand::Despawn(id) => {
                    storage.remove(id);
                }
                DeferredCommand::RemoveSpawnQueue(id) => {
                    if let Some(entity) = storage.get_mut(id) {
                        entity.spawn_queue = None;
                    }
                }
            }
        }
        spawned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let mut storage = EntityStorage::new();
        let a = storage.insert(Entity::default());
        let b = storage.insert(Entity::default());
        storage.remove(a);
        let c = storage.insert(Entity::default());
        assert!(a < b && b < c);
        assert_eq!(storage.sorted_ids(), vec![b, c]);
    }

    #[test]
    fn test_playback_order_and_missing_targets() {
        let mut storage = EntityStorage::new();
        let building = storage.insert(Entity {
            spawn_queue: Some(BuildingSpawnQueue::new(crate::math::Fixed::ONE)),
            ..Entity::default()
        });

        let mut buffer = CommandBuffer::new();
        buffer.spawn(Entity::default());
        buffer.despawn(999);
        buffer.remove_spawn_queue(building);
        buffer.spawn(Entity::default());
        assert_eq!(buffer.len(), 4);

        let spawned = buffer.playback(&mut storage);
        assert_eq!(spawned, vec![building + 1, building + 2]);
        assert!(storage.get(building).unwrap().spawn_queue.is_none());
        assert_eq!(storage.len(), 3);
    }
}
