//! Runtime entity records.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

use crate::error::CoreError;
use crate::schema::{value_to_json, EntitySchema};
use crate::types::{is_temporary_id, EntityId, Value};

/// Raw wire/storage payload of one entity: a JSON object carrying the id
/// and field values by name.
pub type RawEntity = serde_json::Map<String, serde_json::Value>;

/// Key the id is written under in a [`RawEntity`].
pub const ID_KEY: &str = "ID";

/// Reads the entity id from a raw payload. `"ID"`, `"Id"` and `"id"` are
/// accepted.
#[must_use]
pub fn raw_id(raw: &RawEntity) -> Option<EntityId> {
    ["ID", "Id", "id"]
        .iter()
        .find_map(|key| raw.get(*key))
        .and_then(serde_json::Value::as_i64)
}

/// One record of a given entity type.
///
/// Two entities are equal when their `(entity_type, id)` pairs are equal;
/// field values do not take part in identity.
#[derive(Debug, Clone)]
pub struct Entity {
    entity_type: String,
    id: EntityId,
    fields: BTreeMap<String, Value>,
    dirty: BTreeSet<String>,
}

impl Entity {
    /// A fresh, unsaved entity. `temp_id` should be `<= 0`; a positive id
    /// would make the instance indistinguishable from a persisted one.
    #[must_use]
    pub fn new_unsaved(entity_type: impl Into<String>, temp_id: EntityId) -> Self {
        debug_assert!(is_temporary_id(temp_id), "unsaved entity with persisted id");
        Self {
            entity_type: entity_type.into(),
            id: temp_id,
            fields: BTreeMap::new(),
            dirty: BTreeSet::new(),
        }
    }

    /// A clean entity with the given field values, as produced by hydration.
    #[must_use]
    pub fn hydrated(
        entity_type: impl Into<String>,
        id: EntityId,
        fields: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            fields,
            dirty: BTreeSet::new(),
        }
    }

    /// Entity type name, fixed at construction.
    #[must_use]
    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    /// Current id; temporary (`<= 0`) until the server assigns one.
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Whether the server has not assigned a permanent id yet.
    #[must_use]
    pub fn is_new(&self) -> bool {
        is_temporary_id(self.id)
    }

    /// Field value, or `None` if the field was never set.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Sets a field and marks it dirty.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownField`] if `schema` has no such field, or
    /// [`CoreError::TypeMismatch`] if `value` is the wrong kind for it.
    pub fn set(
        &mut self,
        schema: &EntitySchema,
        field: &str,
        value: Value,
    ) -> Result<(), CoreError> {
        let field_schema = schema.field(field)?;
        if !field_schema.accepts(&value) {
            return Err(CoreError::TypeMismatch {
                entity_type: self.entity_type.clone(),
                field: field.to_string(),
                found: value.kind().to_string(),
            });
        }
        self.fields.insert(field.to_string(), value);
        self.dirty.insert(field.to_string());
        Ok(())
    }

    /// Names of the fields this entity carries, in name order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Whether any field changed since the last save.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    /// Fields changed since the last save, in name order.
    pub fn dirty_fields(&self) -> impl Iterator<Item = &str> {
        self.dirty.iter().map(String::as_str)
    }

    /// Clears the dirty set after a successful save.
    pub fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    /// Replaces the id after the server acknowledged a create.
    pub(crate) fn assign_id(&mut self, id: EntityId) {
        self.id = id;
    }

    /// Serializes back to the raw payload form, id under [`ID_KEY`].
    #[must_use]
    pub fn to_raw(&self) -> RawEntity {
        let mut raw = RawEntity::new();
        raw.insert(ID_KEY.to_string(), serde_json::Value::from(self.id));
        for (name, value) in &self.fields {
            raw.insert(name.clone(), value_to_json(value));
        }
        raw
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type == other.entity_type && self.id == other.id
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity_type.hash(state);
        self.id.hash(state);
    }
}
