//! Source backed by the local [`Repository`], for offline use.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{raw_id, Entity, EntityCollection, EntityId, TypeRegister};

use super::{dedupe_types, EntityListSource, EntityLists, SourceError};
use crate::cancel::CancelToken;
use crate::repository::{Mutation, Repository};

/// Reads entity lists from a local repository and hydrates them through the
/// [`TypeRegister`]. Wrap it in a [`ClientSource`](super::ClientSource) to
/// cache the lists in memory.
pub struct LocalSource {
    repository: Arc<dyn Repository>,
    register: Arc<TypeRegister>,
}

impl LocalSource {
    /// Creates a source reading `repository`.
    #[must_use]
    pub fn new(repository: Arc<dyn Repository>, register: Arc<TypeRegister>) -> Self {
        Self {
            repository,
            register,
        }
    }

    /// The repository records are read from.
    #[must_use]
    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    /// Writes each collection back as the complete stored list of its type:
    /// every entity is put, and stored records whose ids are no longer in
    /// the collection are deleted. All writes go out as a single batch.
    ///
    /// # Errors
    ///
    /// Returns the repository failure. Whether earlier writes of the batch
    /// survive depends on the backend's
    /// [`BatchMode`](crate::repository::BatchMode).
    pub async fn store_lists(&self, lists: &EntityLists) -> Result<(), SourceError> {
        let mut batch = Vec::new();
        for (entity_type, collection) in lists {
            let keep: HashSet<EntityId> = collection.ids().collect();
            let stored = self.repository.get_all(entity_type).await?;
            batch.extend(
                stored
                    .iter()
                    .filter_map(raw_id)
                    .filter(|id| !keep.contains(id))
                    .map(|id| Mutation::Delete {
                        entity_type: entity_type.clone(),
                        id,
                    }),
            );
            batch.extend(collection.iter().map(|entity| Mutation::Put {
                entity_type: entity_type.clone(),
                id: entity.id(),
                record: entity.to_raw(),
            }));
        }
        let writes = batch.len();
        self.repository.apply(batch).await?;
        tracing::debug!(
            backend = self.repository.name(),
            types = lists.len(),
            writes,
            "stored entity lists locally"
        );
        Ok(())
    }
}

#[async_trait]
impl EntityListSource for LocalSource {
    async fn get_entity_lists(
        &self,
        types: &[String],
        cancel: &CancelToken,
    ) -> Result<EntityLists, SourceError> {
        let types = dedupe_types(types);
        let mut lists = EntityLists::with_capacity(types.len());
        for entity_type in types {
            self.register.from_name(&entity_type)?;
            let records = cancel.run(self.repository.get_all(&entity_type)).await??;
            let entities = records
                .iter()
                .map(|raw| self.register.hydrate(&entity_type, raw))
                .collect::<Result<Vec<_>, _>>()?;
            let collection = EntityCollection::from_entities(entity_type.clone(), entities);
            lists.insert(entity_type, Arc::new(collection));
        }
        Ok(lists)
    }

    async fn get_entity(
        &self,
        entity_type: &str,
        id: EntityId,
        cancel: &CancelToken,
    ) -> Result<Option<Entity>, SourceError> {
        self.register.from_name(entity_type)?;
        let record = cancel.run(self.repository.get(entity_type, id)).await??;
        record
            .map(|raw| self.register.hydrate(entity_type, &raw))
            .transpose()
            .map_err(SourceError::from)
    }
}
