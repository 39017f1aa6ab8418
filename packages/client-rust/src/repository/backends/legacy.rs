//! Legacy plugin database backend.
//!
//! The plugin is installed on demand; the repository is only built once the
//! install completes. The install is bounded by a timeout so an environment
//! whose install never finishes fails instead of leaving callers waiting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::{RepositoryBackend, StoreRepository};
use crate::repository::environment::StorageEnvironment;
use crate::repository::{BatchMode, Repository, RepositoryError};

/// Backend over the legacy plugin database. The plugin has no multi-record
/// transactions, so batches are best-effort.
#[derive(Debug, Clone, Copy)]
pub struct LegacyBackend {
    install_timeout: Duration,
}

impl LegacyBackend {
    /// Creates the backend; installs taking longer than `install_timeout` fail.
    #[must_use]
    pub fn new(install_timeout: Duration) -> Self {
        Self { install_timeout }
    }
}

#[async_trait]
impl RepositoryBackend for LegacyBackend {
    fn name(&self) -> &'static str {
        "legacy"
    }

    fn is_supported(&self, env: &StorageEnvironment) -> bool {
        env.legacy().is_some()
    }

    async fn create(
        &self,
        database_name: &str,
        env: &StorageEnvironment,
    ) -> Result<Arc<dyn Repository>, RepositoryError> {
        let installer = env.legacy().ok_or(RepositoryError::Unsupported)?;
        tracing::info!(database = %database_name, "installing legacy storage plugin");

        let store = match tokio::time::timeout(self.install_timeout, installer.install()).await {
            Ok(Ok(store)) => store,
            Ok(Err(e)) => return Err(RepositoryError::InstallFailed(e)),
            Err(_) => {
                let timeout_ms =
                    u64::try_from(self.install_timeout.as_millis()).unwrap_or(u64::MAX);
                return Err(RepositoryError::InstallTimeout { timeout_ms });
            }
        };

        Ok(Arc::new(StoreRepository::new(
            self.name(),
            database_name,
            store,
            BatchMode::BestEffort,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::repository::environment::LegacyInstaller;
    use crate::repository::native::{MemoryStore, NativeStore};

    struct SlowInstaller {
        delay: Duration,
        installs: AtomicUsize,
    }

    #[async_trait]
    impl LegacyInstaller for SlowInstaller {
        async fn install(&self) -> anyhow::Result<Arc<dyn NativeStore>> {
            tokio::time::sleep(self.delay).await;
            self.installs.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MemoryStore::new()))
        }
    }

    struct BrokenInstaller;

    #[async_trait]
    impl LegacyInstaller for BrokenInstaller {
        async fn install(&self) -> anyhow::Result<Arc<dyn NativeStore>> {
            anyhow::bail!("plugin download refused")
        }
    }

    fn env_with(installer: Arc<dyn LegacyInstaller>) -> StorageEnvironment {
        StorageEnvironment::empty().with_legacy(installer)
    }

    #[tokio::test(start_paused = true)]
    async fn builds_after_install_completes() {
        let installer = Arc::new(SlowInstaller {
            delay: Duration::from_secs(2),
            installs: AtomicUsize::new(0),
        });
        let backend = LegacyBackend::new(Duration::from_secs(5));
        let repo = backend
            .create("crm", &env_with(installer.clone()))
            .await
            .unwrap();
        assert_eq!(installer.installs.load(Ordering::SeqCst), 1);
        assert_eq!(repo.name(), "legacy");
        assert_eq!(repo.batch_mode(), BatchMode::BestEffort);
    }

    #[tokio::test(start_paused = true)]
    async fn install_timeout_is_an_error() {
        let installer = Arc::new(SlowInstaller {
            delay: Duration::from_secs(60),
            installs: AtomicUsize::new(0),
        });
        let backend = LegacyBackend::new(Duration::from_secs(1));
        let result = backend.create("crm", &env_with(installer)).await;
        assert!(matches!(
            result,
            Err(RepositoryError::InstallTimeout { timeout_ms: 1000 })
        ));
    }

    #[tokio::test]
    async fn install_failure_is_reported() {
        let backend = LegacyBackend::new(Duration::from_secs(1));
        let result = backend.create("crm", &env_with(Arc::new(BrokenInstaller))).await;
        let Err(RepositoryError::InstallFailed(e)) = result else {
            panic!("expected install failure");
        };
        assert_eq!(e.to_string(), "plugin download refused");
    }
}
