//! Concrete [`Repository`] backends.
//!
//! Every backend stores records in a [`NativeStore`] under
//! `"<database>/<entity type>/<id>"` keys through [`StoreRepository`]; the
//! backends differ in how they probe for and obtain the store, and in
//! whether they apply batches atomically.

mod indexed_db;
mod legacy;
mod web_sql;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{EntityId, RawEntity};

pub use indexed_db::IndexedDbBackend;
pub use legacy::LegacyBackend;
pub use web_sql::WebSqlBackend;

use super::environment::StorageEnvironment;
use super::native::NativeStore;
use super::{BatchMode, Mutation, Repository, RepositoryError};

/// A selectable local-storage backend.
#[async_trait]
pub trait RepositoryBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Pure capability probe against `env`.
    fn is_supported(&self, env: &StorageEnvironment) -> bool;

    /// Builds an (unopened) repository for `database_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unsupported`] if `env` lacks the facility,
    /// or a backend-specific construction failure.
    async fn create(
        &self,
        database_name: &str,
        env: &StorageEnvironment,
    ) -> Result<Arc<dyn Repository>, RepositoryError>;
}

const META_KEY: &str = "__meta__";

/// [`Repository`] over a [`NativeStore`], shared by all backends.
pub struct StoreRepository {
    backend: &'static str,
    database: String,
    store: Arc<dyn NativeStore>,
    mode: BatchMode,
    open: AtomicBool,
}

impl StoreRepository {
    /// Creates an unopened repository for `database` over `store`.
    #[must_use]
    pub fn new(
        backend: &'static str,
        database: impl Into<String>,
        store: Arc<dyn NativeStore>,
        mode: BatchMode,
    ) -> Self {
        Self {
            backend,
            database: database.into(),
            store,
            mode,
            open: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), RepositoryError> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RepositoryError::NotOpen {
                database: self.database.clone(),
            })
        }
    }

    fn storage(&self, source: anyhow::Error) -> RepositoryError {
        RepositoryError::Storage {
            backend: self.backend,
            source,
        }
    }

    fn type_prefix(&self, entity_type: &str) -> Result<String, RepositoryError> {
        if entity_type.is_empty() || entity_type.contains('/') || entity_type == META_KEY {
            return Err(RepositoryError::InvalidKey {
                component: entity_type.to_string(),
            });
        }
        Ok(format!("{}/{entity_type}/", self.database))
    }

    fn record_key(&self, entity_type: &str, id: EntityId) -> Result<String, RepositoryError> {
        Ok(format!("{}{id}", self.type_prefix(entity_type)?))
    }

    fn decode(key: &str, raw: &str) -> Result<RawEntity, RepositoryError> {
        serde_json::from_str(raw).map_err(|e| RepositoryError::Corrupt {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    fn encode(record: &RawEntity) -> String {
        serde_json::Value::Object(record.clone()).to_string()
    }

    /// Ids stored for `entity_type`, ascending.
    fn ids(&self, entity_type: &str) -> Result<Vec<(EntityId, String)>, RepositoryError> {
        let prefix = self.type_prefix(entity_type)?;
        let keys = self
            .store
            .keys_with_prefix(&prefix)
            .map_err(|e| self.storage(e))?;
        let mut ids = keys
            .into_iter()
            .map(|key| {
                let parsed = key
                    .strip_prefix(prefix.as_str())
                    .ok_or_else(|| format!("key outside prefix `{prefix}`"))
                    .and_then(|rest| rest.parse::<EntityId>().map_err(|e| e.to_string()));
                match parsed {
                    Ok(id) => Ok((id, key)),
                    Err(reason) => Err(RepositoryError::Corrupt { key, reason }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort_unstable_by_key(|(id, _)| *id);
        Ok(ids)
    }

    /// Applies one mutation, returning the key and its previous value.
    fn apply_one(&self, mutation: &Mutation) -> Result<(String, Option<String>), RepositoryError> {
        match mutation {
            Mutation::Put {
                entity_type,
                id,
                record,
            } => {
                let key = self.record_key(entity_type, *id)?;
                let previous = self
                    .store
                    .put(&key, Self::encode(record))
                    .map_err(|e| self.storage(e))?;
                Ok((key, previous))
            }
            Mutation::Delete { entity_type, id } => {
                let key = self.record_key(entity_type, *id)?;
                let previous = self.store.remove(&key).map_err(|e| self.storage(e))?;
                Ok((key, previous))
            }
        }
    }

    /// Restores `undo` entries in reverse order after a failed atomic batch.
    fn roll_back(&self, undo: Vec<(String, Option<String>)>) {
        for (key, previous) in undo.into_iter().rev() {
            let restored = match previous {
                Some(value) => self.store.put(&key, value).map(|_| ()),
                None => self.store.remove(&key).map(|_| ()),
            };
            if let Err(e) = restored {
                tracing::error!(
                    backend = self.backend,
                    key = %key,
                    error = %e,
                    "rollback could not restore record"
                );
            }
        }
    }
}

#[async_trait]
impl Repository for StoreRepository {
    fn name(&self) -> &'static str {
        self.backend
    }

    fn database_name(&self) -> &str {
        &self.database
    }

    fn batch_mode(&self) -> BatchMode {
        self.mode
    }

    async fn open(&self) -> Result<(), RepositoryError> {
        let meta_key = format!("{}/{META_KEY}", self.database);
        if self
            .store
            .get(&meta_key)
            .map_err(|e| self.storage(e))?
            .is_none()
        {
            let meta = serde_json::json!({ "database": self.database, "version": 1 });
            self.store
                .put(&meta_key, meta.to_string())
                .map_err(|e| self.storage(e))?;
            tracing::debug!(backend = self.backend, database = %self.database, "database created");
        }
        self.open.store(true, Ordering::Release);
        Ok(())
    }

    async fn get(
        &self,
        entity_type: &str,
        id: EntityId,
    ) -> Result<Option<RawEntity>, RepositoryError> {
        self.ensure_open()?;
        let key = self.record_key(entity_type, id)?;
        self.store
            .get(&key)
            .map_err(|e| self.storage(e))?
            .map(|raw| Self::decode(&key, &raw))
            .transpose()
    }

    async fn put(
        &self,
        entity_type: &str,
        id: EntityId,
        record: &RawEntity,
    ) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        let key = self.record_key(entity_type, id)?;
        self.store
            .put(&key, Self::encode(record))
            .map_err(|e| self.storage(e))?;
        Ok(())
    }

    async fn delete(&self, entity_type: &str, id: EntityId) -> Result<bool, RepositoryError> {
        self.ensure_open()?;
        let key = self.record_key(entity_type, id)?;
        Ok(self
            .store
            .remove(&key)
            .map_err(|e| self.storage(e))?
            .is_some())
    }

    async fn get_all(&self, entity_type: &str) -> Result<Vec<RawEntity>, RepositoryError> {
        self.ensure_open()?;
        let mut records = Vec::new();
        for (_, key) in self.ids(entity_type)? {
            // Keys removed between listing and reading are skipped.
            if let Some(raw) = self.store.get(&key).map_err(|e| self.storage(e))? {
                records.push(Self::decode(&key, &raw)?);
            }
        }
        Ok(records)
    }

    async fn clear_type(&self, entity_type: &str) -> Result<usize, RepositoryError> {
        self.ensure_open()?;
        let mut removed = 0;
        for (_, key) in self.ids(entity_type)? {
            if self.store.remove(&key).map_err(|e| self.storage(e))?.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn apply(&self, batch: Vec<Mutation>) -> Result<(), RepositoryError> {
        self.ensure_open()?;
        let mut undo = Vec::with_capacity(batch.len());
        for (index, mutation) in batch.iter().enumerate() {
            match self.apply_one(mutation) {
                Ok(entry) => undo.push(entry),
                Err(source) => {
                    let applied = match self.mode {
                        BatchMode::Atomic => {
                            tracing::warn!(
                                backend = self.backend,
                                index,
                                error = %source,
                                "batch failed; rolling back"
                            );
                            self.roll_back(undo);
                            0
                        }
                        BatchMode::BestEffort => index,
                    };
                    return Err(RepositoryError::BatchFailed {
                        index,
                        applied,
                        source: Box::new(source),
                    });
                }
            }
        }
        Ok(())
    }
}
