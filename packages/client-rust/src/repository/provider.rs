//! Selection and memoization of the local [`Repository`].
//!
//! [`RepositoryProvider`] is the dependency injection point for local
//! storage: it probes the registered backends in priority order, builds and
//! opens the first supported one, and hands the same instance to every
//! later caller.

use std::sync::Arc;

use tokio::sync::OnceCell;

use super::backends::{IndexedDbBackend, LegacyBackend, RepositoryBackend, WebSqlBackend};
use super::environment::StorageEnvironment;
use super::{Repository, RepositoryError};
use crate::config::ClientConfig;

/// Picks one local-storage backend and memoizes the repository it builds.
///
/// The first successful [`get_repository`](Self::get_repository) fixes the
/// repository for the provider's lifetime; later calls return the same
/// `Arc` whatever database name they pass. Concurrent first calls are
/// serialized, so only one backend instance is ever built. A failed
/// selection is not memoized and is retried on the next call.
pub struct RepositoryProvider {
    env: StorageEnvironment,
    backends: Vec<Arc<dyn RepositoryBackend>>,
    repository: OnceCell<Arc<dyn Repository>>,
}

impl RepositoryProvider {
    /// Creates a provider with the default priority order: IndexedDB,
    /// WebSQL, then the legacy plugin database.
    #[must_use]
    pub fn new(env: StorageEnvironment, config: &ClientConfig) -> Self {
        Self::with_backends(
            env,
            vec![
                Arc::new(IndexedDbBackend),
                Arc::new(WebSqlBackend),
                Arc::new(LegacyBackend::new(config.install_timeout)),
            ],
        )
    }

    /// Creates a provider probing `backends` in the given order.
    #[must_use]
    pub fn with_backends(
        env: StorageEnvironment,
        backends: Vec<Arc<dyn RepositoryBackend>>,
    ) -> Self {
        Self {
            env,
            backends,
            repository: OnceCell::new(),
        }
    }

    /// Name of the backend that would be selected, without building it.
    #[must_use]
    pub fn preferred_backend(&self) -> Option<&'static str> {
        self.backends
            .iter()
            .find(|b| b.is_supported(&self.env))
            .map(|b| b.name())
    }

    /// Returns the memoized repository, selecting and opening one first if
    /// none exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Unsupported`] when no backend is supported,
    /// or the selected backend's construction/open failure.
    pub async fn get_repository(
        &self,
        database_name: &str,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        self.repository
            .get_or_try_init(|| self.select(database_name))
            .await
            .cloned()
    }

    /// The memoized repository, if selection already happened.
    #[must_use]
    pub fn current(&self) -> Option<Arc<dyn Repository>> {
        self.repository.get().cloned()
    }

    /// Replaces the memoized repository, bypassing selection. Test hook.
    pub fn set_repository(&mut self, repository: Arc<dyn Repository>) {
        self.repository = OnceCell::from(repository);
    }

    async fn select(&self, database_name: &str) -> Result<Arc<dyn Repository>, RepositoryError> {
        let backend = self
            .backends
            .iter()
            .find(|b| b.is_supported(&self.env))
            .ok_or_else(|| {
                tracing::warn!(env = ?self.env, "no local storage backend supported");
                RepositoryError::Unsupported
            })?;

        let repository = backend.create(database_name, &self.env).await?;
        repository.open().await?;
        tracing::info!(
            backend = backend.name(),
            database = %database_name,
            "local repository selected"
        );
        Ok(repository)
    }
}
