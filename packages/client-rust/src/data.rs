//! Consumer entry point: picks cached or direct server access.

use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{Entity, EntityId, TypeRegister};

use crate::cancel::CancelToken;
use crate::config::ClientConfig;
use crate::source::{
    ClientSource, EntityListSource, EntityLists, HttpTransport, ServerSource, SourceError,
};

/// Facade over the source tiers.
///
/// With `server_sync` on, requests go through a [`ClientSource`] cache in
/// front of the server; with it off, every request goes straight to the
/// [`ServerSource`]. The mode is fixed at construction.
pub struct Data {
    source: Arc<dyn EntityListSource>,
    client: Option<Arc<ClientSource>>,
    server_sync: bool,
}

impl Data {
    /// Wraps `server` in a [`ClientSource`] when `server_sync` is set.
    #[must_use]
    pub fn new(server_sync: bool, server: ServerSource) -> Self {
        let server: Arc<dyn EntityListSource> = Arc::new(server);
        if server_sync {
            let client = Arc::new(ClientSource::new(server));
            Self {
                source: client.clone(),
                client: Some(client),
                server_sync,
            }
        } else {
            Self {
                source: server,
                client: None,
                server_sync,
            }
        }
    }

    /// Builds the HTTP transport and the source tiers from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(
        config: &ClientConfig,
        register: Arc<TypeRegister>,
    ) -> Result<Self, SourceError> {
        let transport =
            HttpTransport::from_config(config).map_err(|e| SourceError::transport(&e))?;
        tracing::info!(
            endpoint = %transport.endpoint(),
            server_sync = config.server_sync,
            "data facade configured"
        );
        Ok(Self::new(
            config.server_sync,
            ServerSource::new(Arc::new(transport), register),
        ))
    }

    /// Whether requests go through the client-side cache.
    #[must_use]
    pub fn is_server_sync(&self) -> bool {
        self.server_sync
    }

    /// The cache tier, present only in server-sync mode.
    #[must_use]
    pub fn client_source(&self) -> Option<&Arc<ClientSource>> {
        self.client.as_ref()
    }
}

#[async_trait]
impl EntityListSource for Data {
    async fn get_entity_lists(
        &self,
        types: &[String],
        cancel: &CancelToken,
    ) -> Result<EntityLists, SourceError> {
        self.source.get_entity_lists(types, cancel).await
    }

    async fn get_entity(
        &self,
        entity_type: &str,
        id: EntityId,
        cancel: &CancelToken,
    ) -> Result<Option<Entity>, SourceError> {
        self.source.get_entity(entity_type, id, cancel).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use strata_core::{EntitySchema, FieldSchema};

    use super::*;
    use crate::source::transport::{RawLists, StaticTransport};

    fn register() -> Arc<TypeRegister> {
        let register = TypeRegister::new();
        register.register_schema(EntitySchema::new(
            "User",
            [FieldSchema::string("Name", 0).unwrap()],
        ));
        Arc::new(register)
    }

    fn transport() -> Arc<StaticTransport> {
        Arc::new(StaticTransport::new(RawLists::from([(
            "User".to_string(),
            vec![json!({"ID": 1, "Name": "Ada"}).as_object().cloned().unwrap()],
        )])))
    }

    fn users() -> Vec<String> {
        vec!["User".to_string()]
    }

    #[tokio::test]
    async fn server_sync_caches_lists() {
        let transport = transport();
        let data = Data::new(true, ServerSource::new(transport.clone(), register()));
        let cancel = CancelToken::never();
        assert!(data.is_server_sync());

        data.get_entity_lists(&users(), &cancel).await.unwrap();
        let user = data.get_entity("User", 1, &cancel).await.unwrap();

        assert_eq!(user.map(|u| u.id()), Some(1));
        assert_eq!(transport.calls(), 1);
        assert!(data.client_source().unwrap().is_cached("User"));
    }

    #[tokio::test]
    async fn direct_mode_always_hits_server() {
        let transport = transport();
        let data = Data::new(false, ServerSource::new(transport.clone(), register()));
        let cancel = CancelToken::never();
        assert!(!data.is_server_sync());
        assert!(data.client_source().is_none());

        data.get_entity_lists(&users(), &cancel).await.unwrap();
        data.get_entity_lists(&users(), &cancel).await.unwrap();
        assert_eq!(transport.calls(), 2);
    }

    #[test]
    fn from_config_follows_server_sync_flag() {
        let config = ClientConfig {
            server_sync: false,
            ..ClientConfig::default()
        };
        let data = Data::from_config(&config, register()).unwrap();
        assert!(!data.is_server_sync());
        assert!(Data::from_config(&ClientConfig::default(), register())
            .unwrap()
            .is_server_sync());
    }
}
