//! Indexed, ordered collection of entities of one type.

use std::collections::HashMap;

use crate::entity::Entity;
use crate::types::EntityId;

/// Entities of a single type in arrival order, indexed by id.
///
/// Invariant: `index[id]` is the position of the entity with that id in
/// `entities`, and ids are unique within the collection.
#[derive(Debug, Clone)]
pub struct EntityCollection {
    entity_type: String,
    entities: Vec<Entity>,
    index: HashMap<EntityId, usize>,
}

impl EntityCollection {
    /// Creates an empty collection for `entity_type`.
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Builds a collection from hydrated entities. A later entity with an
    /// id already present replaces the earlier one in place.
    #[must_use]
    pub fn from_entities(
        entity_type: impl Into<String>,
        entities: impl IntoIterator<Item = Entity>,
    ) -> Self {
        let mut collection = Self::new(entity_type);
        for entity in entities {
            collection.insert(entity);
        }
        collection
    }

    /// Entity type of every member.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns `true` if the collection holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity with `id`, through the index.
    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.index.get(&id).map(|&pos| &self.entities[pos])
    }

    /// Mutable access to the entity with `id`.
    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.index.get(&id).map(|&pos| &mut self.entities[pos])
    }

    /// Whether an entity with `id` is present.
    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.index.contains_key(&id)
    }

    /// Inserts `entity`, replacing any entity with the same id. Returns the
    /// replaced entity.
    pub fn insert(&mut self, entity: Entity) -> Option<Entity> {
        debug_assert_eq!(entity.entity_type(), self.entity_type);
        if let Some(&pos) = self.index.get(&entity.id()) {
            return Some(std::mem::replace(&mut self.entities[pos], entity));
        }
        self.index.insert(entity.id(), self.entities.len());
        self.entities.push(entity);
        None
    }

    /// Removes the entity with `id`, preserving the order of the rest.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        let pos = self.index.remove(&id)?;
        let removed = self.entities.remove(pos);
        for slot in self.index.values_mut() {
            if *slot > pos {
                *slot -= 1;
            }
        }
        Some(removed)
    }

    /// Moves the entry indexed under `old` to `new` without changing its
    /// position. Returns `false` if `old` is absent or `new` is taken.
    pub(crate) fn rekey(&mut self, old: EntityId, new: EntityId) -> bool {
        if old == new {
            return self.index.contains_key(&old);
        }
        if self.index.contains_key(&new) {
            return false;
        }
        let Some(pos) = self.index.remove(&old) else {
            return false;
        };
        self.index.insert(new, pos);
        true
    }

    /// Iterates entities in collection order.
    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter()
    }

    /// Ids in collection order.
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.entities.iter().map(Entity::id)
    }
}

impl<'a> IntoIterator for &'a EntityCollection {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
