//! Local persistent repositories.
//!
//! Provides the trait hierarchy and shared types for the local storage tier:
//!
//! - **Host layer** ([`NativeStore`]): whatever the environment persists to
//! - **Backends** ([`RepositoryBackend`]): IndexedDB, WebSQL and the legacy
//!   plugin database, each turning a native store into a [`Repository`]
//! - **Selection** ([`RepositoryProvider`]): picks the first supported
//!   backend and memoizes the repository it builds

pub mod backends;
pub mod environment;
pub mod native;
pub mod provider;

use async_trait::async_trait;
use strata_core::{EntityId, RawEntity};

pub use backends::{IndexedDbBackend, LegacyBackend, RepositoryBackend, WebSqlBackend};
pub use environment::{LegacyInstaller, StorageEnvironment};
pub use native::{MemoryStore, NativeStore};
pub use provider::RepositoryProvider;

/// Errors reported by repositories and their selection.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("no local storage backend is supported in this environment")]
    Unsupported,
    #[error("legacy storage install failed: {0}")]
    InstallFailed(anyhow::Error),
    #[error("legacy storage install did not finish within {timeout_ms}ms")]
    InstallTimeout { timeout_ms: u64 },
    #[error("database `{database}` is not open")]
    NotOpen { database: String },
    #[error("invalid storage key component `{component}`")]
    InvalidKey { component: String },
    #[error("stored record `{key}` is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("{backend} storage error: {source}")]
    Storage {
        backend: &'static str,
        #[source]
        source: anyhow::Error,
    },
    #[error("batch failed at mutation {index} ({applied} applied): {source}")]
    BatchFailed {
        index: usize,
        /// Mutations left applied. Always 0 for atomic backends.
        applied: usize,
        #[source]
        source: Box<RepositoryError>,
    },
}

/// One mutation of a batch passed to [`Repository::apply`].
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Put {
        entity_type: String,
        id: EntityId,
        record: RawEntity,
    },
    Delete {
        entity_type: String,
        id: EntityId,
    },
}

/// Whether a backend applies batches all-or-nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// A failing mutation rolls back the whole batch.
    Atomic,
    /// Mutations before a failure stay applied.
    BestEffort,
}

/// Uniform CRUD contract over whichever local backend was selected.
///
/// Records are keyed by `(entity_type, id)`. Every operation except
/// [`open`](Repository::open) fails with [`RepositoryError::NotOpen`] until
/// the database is opened. Used as `Arc<dyn Repository>`.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Backend name (`"indexeddb"`, `"websql"`, `"legacy"`).
    fn name(&self) -> &'static str;

    fn database_name(&self) -> &str;

    fn batch_mode(&self) -> BatchMode;

    /// Opens the database, creating it if it does not exist. Idempotent.
    async fn open(&self) -> Result<(), RepositoryError>;

    async fn get(
        &self,
        entity_type: &str,
        id: EntityId,
    ) -> Result<Option<RawEntity>, RepositoryError>;

    /// Stores `record` under `(entity_type, id)`, replacing any previous one.
    async fn put(
        &self,
        entity_type: &str,
        id: EntityId,
        record: &RawEntity,
    ) -> Result<(), RepositoryError>;

    /// Deletes a record. Returns whether it existed.
    async fn delete(&self, entity_type: &str, id: EntityId) -> Result<bool, RepositoryError>;

    /// All records of `entity_type`, ordered by id.
    async fn get_all(&self, entity_type: &str) -> Result<Vec<RawEntity>, RepositoryError>;

    /// Deletes every record of `entity_type`. Returns how many were removed.
    async fn clear_type(&self, entity_type: &str) -> Result<usize, RepositoryError>;

    /// Applies `batch` in order, atomically where [`batch_mode`] is
    /// [`BatchMode::Atomic`].
    ///
    /// [`batch_mode`]: Repository::batch_mode
    async fn apply(&self, batch: Vec<Mutation>) -> Result<(), RepositoryError>;
}
