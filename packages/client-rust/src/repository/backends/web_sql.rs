//! WebSQL backend: fallback for hosts without IndexedDB.

use std::sync::Arc;

use async_trait::async_trait;

use super::{RepositoryBackend, StoreRepository};
use crate::repository::environment::StorageEnvironment;
use crate::repository::{BatchMode, Repository, RepositoryError};

/// Backend over the host's WebSQL database. Batches run inside one SQL
/// transaction and are atomic.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSqlBackend;

#[async_trait]
impl RepositoryBackend for WebSqlBackend {
    fn name(&self) -> &'static str {
        "websql"
    }

    fn is_supported(&self, env: &StorageEnvironment) -> bool {
        env.web_sql().is_some()
    }

    async fn create(
        &self,
        database_name: &str,
        env: &StorageEnvironment,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        let store = env.web_sql().ok_or(RepositoryError::Unsupported)?;
        Ok(Arc::new(StoreRepository::new(
            self.name(),
            database_name,
            store.clone(),
            BatchMode::Atomic,
        )))
    }
}
