//! Name-to-hydrator registry.
//!
//! Sources turn raw payloads into typed [`Entity`] values through the
//! hydrator registered for the payload's type name. The register is an
//! ordinary object: callers share it through `Arc<TypeRegister>` rather than
//! a process global, so independent caches and tests never see each other's
//! registrations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::entity::{raw_id, Entity, RawEntity, ID_KEY};
use crate::error::CoreError;
use crate::schema::EntitySchema;

/// Turns one raw payload into a typed entity.
pub trait Hydrate: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CoreError::MalformedPayload`] or
    /// [`CoreError::TypeMismatch`] when `raw` does not fit the type.
    fn hydrate(&self, entity_type: &str, raw: &RawEntity) -> Result<Entity, CoreError>;
}

impl<F> Hydrate for F
where
    F: Fn(&str, &RawEntity) -> Result<Entity, CoreError> + Send + Sync,
{
    fn hydrate(&self, entity_type: &str, raw: &RawEntity) -> Result<Entity, CoreError> {
        self(entity_type, raw)
    }
}

/// Hydrates payloads field by field according to an [`EntitySchema`].
///
/// Fields absent from the payload are left unset; payload keys that are not
/// fields of the schema (other than the id) are rejected.
#[derive(Debug, Clone)]
pub struct SchemaHydrator {
    schema: Arc<EntitySchema>,
}

impl SchemaHydrator {
    /// Creates a hydrator for `schema`.
    #[must_use]
    pub fn new(schema: Arc<EntitySchema>) -> Self {
        Self { schema }
    }

    /// The schema payloads are hydrated against.
    #[must_use]
    pub fn schema(&self) -> &Arc<EntitySchema> {
        &self.schema
    }
}

impl Hydrate for SchemaHydrator {
    fn hydrate(&self, entity_type: &str, raw: &RawEntity) -> Result<Entity, CoreError> {
        let id = raw_id(raw).ok_or_else(|| CoreError::MalformedPayload {
            entity_type: entity_type.to_string(),
            reason: format!("missing numeric `{ID_KEY}`"),
        })?;

        let mut fields = BTreeMap::new();
        for (name, json) in raw {
            if name.eq_ignore_ascii_case(ID_KEY) {
                continue;
            }
            let field = self.schema.field(name)?;
            fields.insert(name.clone(), field.value_from_json(entity_type, json)?);
        }
        Ok(Entity::hydrated(entity_type, id, fields))
    }
}

struct Registration {
    hydrator: Arc<dyn Hydrate>,
    schema: Option<Arc<EntitySchema>>,
}

/// Registry mapping entity type names to hydrators (and, when registered
/// through [`register_schema`](Self::register_schema), to their schemas).
#[derive(Default)]
pub struct TypeRegister {
    types: RwLock<HashMap<String, Registration>>,
}

impl std::fmt::Debug for TypeRegister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegister")
            .field("types", &self.names())
            .finish()
    }
}

impl TypeRegister {
    /// Creates an empty register.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `hydrator` for `name`. Registering a name again replaces
    /// the previous hydrator.
    pub fn register(&self, name: impl Into<String>, hydrator: Arc<dyn Hydrate>) {
        self.insert(
            name.into(),
            Registration {
                hydrator,
                schema: None,
            },
        );
    }

    /// Registers a [`SchemaHydrator`] under the schema's name and keeps the
    /// schema available through [`schema`](Self::schema).
    pub fn register_schema(&self, schema: EntitySchema) {
        let schema = Arc::new(schema);
        self.insert(
            schema.name().to_string(),
            Registration {
                hydrator: Arc::new(SchemaHydrator::new(schema.clone())),
                schema: Some(schema),
            },
        );
    }

    fn insert(&self, name: String, registration: Registration) {
        let mut types = self.types.write();
        if types.insert(name.clone(), registration).is_some() {
            tracing::debug!(entity_type = %name, "hydrator re-registered");
        }
    }

    /// Returns the hydrator registered for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnregisteredType`] if nothing is registered
    /// under `name`.
    pub fn from_name(&self, name: &str) -> Result<Arc<dyn Hydrate>, CoreError> {
        self.types
            .read()
            .get(name)
            .map(|r| r.hydrator.clone())
            .ok_or_else(|| CoreError::UnregisteredType {
                name: name.to_string(),
            })
    }

    /// Schema of `name`, if it was registered with one.
    #[must_use]
    pub fn schema(&self, name: &str) -> Option<Arc<EntitySchema>> {
        self.types
            .read()
            .get(name)
            .and_then(|r| r.schema.clone())
    }

    /// Whether anything is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.types.read().contains_key(name)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.types.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Hydrates `raw` with the hydrator registered for `entity_type`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnregisteredType`] or the hydrator's error.
    pub fn hydrate(&self, entity_type: &str, raw: &RawEntity) -> Result<Entity, CoreError> {
        let entity = self.from_name(entity_type)?.hydrate(entity_type, raw)?;
        if entity.entity_type() != entity_type {
            return Err(CoreError::MalformedPayload {
                entity_type: entity_type.to_string(),
                reason: format!("hydrator produced `{}`", entity.entity_type()),
            });
        }
        Ok(entity)
    }
}
