//! Description of the storage facilities a host exposes.

use std::sync::Arc;

use async_trait::async_trait;

use super::native::{MemoryStore, NativeStore};

/// Installs the legacy plugin database on demand.
///
/// The legacy backend can only be constructed after
/// [`install`](LegacyInstaller::install) completes; the store it returns is
/// the plugin's database.
#[async_trait]
pub trait LegacyInstaller: Send + Sync {
    /// Runs the install. May take arbitrarily long; callers bound it.
    ///
    /// # Errors
    ///
    /// Returns the host's install failure.
    async fn install(&self) -> anyhow::Result<Arc<dyn NativeStore>>;
}

/// Storage facilities available in the running environment.
///
/// Capability probes on this struct are pure: they only look at what the
/// host registered.
#[derive(Clone, Default)]
pub struct StorageEnvironment {
    indexed_db: Option<Arc<dyn NativeStore>>,
    web_sql: Option<Arc<dyn NativeStore>>,
    legacy: Option<Arc<dyn LegacyInstaller>>,
}

impl std::fmt::Debug for StorageEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEnvironment")
            .field("indexed_db", &self.indexed_db.is_some())
            .field("web_sql", &self.web_sql.is_some())
            .field("legacy", &self.legacy.is_some())
            .finish()
    }
}

impl StorageEnvironment {
    /// An environment with no storage facilities at all.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// An environment exposing an in-memory IndexedDB.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::empty().with_indexed_db(Arc::new(MemoryStore::new()))
    }

    /// Exposes `store` as the host's IndexedDB.
    #[must_use]
    pub fn with_indexed_db(mut self, store: Arc<dyn NativeStore>) -> Self {
        self.indexed_db = Some(store);
        self
    }

    /// Exposes `store` as the host's WebSQL database.
    #[must_use]
    pub fn with_web_sql(mut self, store: Arc<dyn NativeStore>) -> Self {
        self.web_sql = Some(store);
        self
    }

    /// Makes the legacy plugin installable through `installer`.
    #[must_use]
    pub fn with_legacy(mut self, installer: Arc<dyn LegacyInstaller>) -> Self {
        self.legacy = Some(installer);
        self
    }

    /// The IndexedDB store, if the host has one.
    #[must_use]
    pub fn indexed_db(&self) -> Option<&Arc<dyn NativeStore>> {
        self.indexed_db.as_ref()
    }

    /// The WebSQL store, if the host has one.
    #[must_use]
    pub fn web_sql(&self) -> Option<&Arc<dyn NativeStore>> {
        self.web_sql.as_ref()
    }

    /// The legacy plugin installer, if the host offers one.
    #[must_use]
    pub fn legacy(&self) -> Option<&Arc<dyn LegacyInstaller>> {
        self.legacy.as_ref()
    }
}
