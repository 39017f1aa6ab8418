//! IndexedDB backend: the preferred store wherever the host exposes one.

use std::sync::Arc;

use async_trait::async_trait;

use super::{RepositoryBackend, StoreRepository};
use crate::repository::environment::StorageEnvironment;
use crate::repository::{BatchMode, Repository, RepositoryError};

/// Backend over the host's IndexedDB. Batches run in one read-write
/// transaction, so they are atomic.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexedDbBackend;

#[async_trait]
impl RepositoryBackend for IndexedDbBackend {
    fn name(&self) -> &'static str {
        "indexeddb"
    }

    fn is_supported(&self, env: &StorageEnvironment) -> bool {
        env.indexed_db().is_some()
    }

    async fn create(
        &self,
        database_name: &str,
        env: &StorageEnvironment,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        let store = env.indexed_db().ok_or(RepositoryError::Unsupported)?;
        Ok(Arc::new(StoreRepository::new(
            self.name(),
            database_name,
            store.clone(),
            BatchMode::Atomic,
        )))
    }
}
