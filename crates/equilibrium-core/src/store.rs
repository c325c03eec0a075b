// ─────────────────────────────────────────────────────────────────────
// Equilibrium Kernel — Entity Store
// ─────────────────────────────────────────────────────────────────────
//! Insertion-ordered entity store with a snapshot/commit boundary.
//!
//! Membership is fixed at construction. The convergence loop never
//! mutates entities in place: it reads a snapshot, builds a complete
//! next-state buffer, and swaps it in with [`EntityStore::commit`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use equilibrium_types::{Entity, EntityId, EquilibriumError, EquilibriumResult};

#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: Vec<Entity>,
    index: HashMap<EntityId, usize>,
    generation: u64,
}

impl EntityStore {
    /// Build a store, rejecting repeated ids.
    pub fn new(entities: Vec<Entity>) -> EquilibriumResult<Self> {
        let mut index = HashMap::with_capacity(entities.len());
        for (i, entity) in entities.iter().enumerate() {
            if index.insert(entity.id.clone(), i).is_some() {
                return Err(EquilibriumError::DuplicateEntity(entity.id.clone()));
            }
        }
        Ok(Self {
            entities,
            index,
            generation: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &EntityId) -> EquilibriumResult<&Entity> {
        self.index
            .get(id)
            .map(|&i| &self.entities[i])
            .ok_or_else(|| EquilibriumError::NotFound(id.clone()))
    }

    /// Entities in insertion order.
    pub fn list(&self) -> &[Entity] {
        &self.entities
    }

    pub fn update(&mut self, id: &EntityId, new_state: f64) -> EquilibriumResult<()> {
        let i = *self
            .index
            .get(id)
            .ok_or_else(|| EquilibriumError::NotFound(id.clone()))?;
        self.entities[i].state = new_state;
        self.generation += 1;
        Ok(())
    }

    pub fn snapshot(&self) -> Vec<Entity> {
        self.entities.clone()
    }

    /// Replace every state at once. `states` is in store order.
    pub fn commit(&mut self, states: &[f64]) -> EquilibriumResult<()> {
        if states.len() != self.entities.len() {
            return Err(EquilibriumError::BufferMismatch {
                expected: self.entities.len(),
                actual: states.len(),
            });
        }
        for (entity, &state) in self.entities.iter_mut().zip(states) {
            entity.state = state;
        }
        self.generation += 1;
        Ok(())
    }

    /// Incremented on every update or commit.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Store shared between the engine and its readers.
///
/// Only the convergence loop commits. Readers get a [`StoreReader`]
/// and only ever see whole committed generations: commits happen under
/// the write lock.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<EntityStore>>,
}

impl SharedStore {
    pub fn new(store: EntityStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Read-only handle for other subsystems.
    pub fn reader(&self) -> StoreReader {
        StoreReader {
            inner: Arc::clone(&self.inner),
        }
    }

    pub fn get(&self, id: &EntityId) -> EquilibriumResult<Entity> {
        self.inner.read().get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Entity> {
        self.inner.read().snapshot()
    }

    pub fn commit(&self, states: &[f64]) -> EquilibriumResult<()> {
        self.inner.write().commit(states)
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation()
    }
}

/// Read side of a [`SharedStore`]. Has no way to mutate entities.
#[derive(Debug, Clone)]
pub struct StoreReader {
    inner: Arc<RwLock<EntityStore>>,
}

impl StoreReader {
    pub fn read<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> R {
        f(&self.inner.read())
    }

    pub fn get(&self, id: &EntityId) -> EquilibriumResult<Entity> {
        self.inner.read().get(id).cloned()
    }

    pub fn snapshot(&self) -> Vec<Entity> {
        self.inner.read().snapshot()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Number of commits so far.
    pub fn generation(&self) -> u64 {
        self.inner.read().generation()
    }
}
