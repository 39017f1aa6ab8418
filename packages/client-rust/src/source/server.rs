//! Remote source: fetches raw payloads and hydrates them into entities.

use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{EntityCollection, TypeRegister};

use super::transport::Transport;
use super::{dedupe_types, EntityListSource, EntityLists, SourceError};
use crate::cancel::CancelToken;

/// Fetches entity lists from the server and hydrates every payload through
/// the [`TypeRegister`].
///
/// Every requested type must be registered; the check runs before any
/// network traffic. A type the server leaves out of its response comes back
/// as an empty collection.
pub struct ServerSource {
    transport: Arc<dyn Transport>,
    register: Arc<TypeRegister>,
}

impl ServerSource {
    /// Creates a source fetching through `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, register: Arc<TypeRegister>) -> Self {
        Self {
            transport,
            register,
        }
    }

    /// The register payloads are hydrated with.
    #[must_use]
    pub fn register(&self) -> &Arc<TypeRegister> {
        &self.register
    }
}

#[async_trait]
impl EntityListSource for ServerSource {
    async fn get_entity_lists(
        &self,
        types: &[String],
        cancel: &CancelToken,
    ) -> Result<EntityLists, SourceError> {
        let types = dedupe_types(types);
        if types.is_empty() {
            return Ok(EntityLists::new());
        }
        for entity_type in &types {
            self.register.from_name(entity_type)?;
        }

        let mut payload = cancel
            .run(self.transport.fetch(&types))
            .await?
            .map_err(|e| {
                tracing::warn!(types = ?types, error = %e, "server fetch failed");
                SourceError::transport(&e)
            })?;

        let mut lists = EntityLists::with_capacity(types.len());
        for entity_type in types {
            let raws = payload.remove(&entity_type).unwrap_or_default();
            let entities = raws
                .iter()
                .map(|raw| self.register.hydrate(&entity_type, raw))
                .collect::<Result<Vec<_>, _>>()?;
            tracing::debug!(
                entity_type = %entity_type,
                count = entities.len(),
                "hydrated entity list"
            );
            let collection = EntityCollection::from_entities(entity_type.clone(), entities);
            lists.insert(entity_type, Arc::new(collection));
        }
        if !payload.is_empty() {
            tracing::debug!(
                extra = ?payload.keys().collect::<Vec<_>>(),
                "ignoring unrequested types in server response"
            );
        }
        Ok(lists)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use strata_core::{EntitySchema, FieldSchema, RawEntity, Value};

    use super::*;
    use crate::cancel::CancelHandle;
    use crate::source::transport::{RawLists, StaticTransport};

    fn raw(value: serde_json::Value) -> RawEntity {
        value.as_object().cloned().unwrap()
    }

    fn register() -> Arc<TypeRegister> {
        let register = TypeRegister::new();
        register.register_schema(EntitySchema::new(
            "User",
            [FieldSchema::string("Name", 0).unwrap()],
        ));
        register.register_schema(EntitySchema::new(
            "Order",
            [FieldSchema::number("Total").unwrap()],
        ));
        Arc::new(register)
    }

    fn types(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn transport() -> Arc<StaticTransport> {
        Arc::new(StaticTransport::new(RawLists::from([
            (
                "User".to_string(),
                vec![
                    raw(json!({"ID": 1, "Name": "Ada"})),
                    raw(json!({"ID": 2, "Name": "Bo"})),
                ],
            ),
            ("Order".to_string(), vec![raw(json!({"ID": 3, "Total": 9.5}))]),
        ])))
    }

    #[tokio::test]
    async fn hydrates_each_requested_type() {
        let transport = transport();
        let source = ServerSource::new(transport.clone(), register());

        let lists = source
            .get_entity_lists(
                &types(&["User", "Order", "User"]),
                &CancelToken::never(),
            )
            .await
            .unwrap();

        assert_eq!(lists.len(), 2);
        assert_eq!(lists["User"].len(), 2);
        assert_eq!(
            lists["User"].get(1).and_then(|u| u.get("Name")),
            Some(&Value::from("Ada"))
        );
        assert_eq!(
            lists["Order"].get(3).and_then(|o| o.get("Total")),
            Some(&Value::Float(9.5))
        );
        assert_eq!(transport.requests(), vec![types(&["User", "Order"])]);
    }

    #[tokio::test]
    async fn unregistered_type_fails_before_fetching() {
        let transport = transport();
        let source = ServerSource::new(transport.clone(), register());

        let err = source
            .get_entity_lists(&types(&["User", "Ghost"]), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Core(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test]
    async fn missing_type_in_response_is_empty() {
        let transport = Arc::new(StaticTransport::default());
        let source = ServerSource::new(transport, register());
        let lists = source
            .get_entity_lists(&types(&["User"]), &CancelToken::never())
            .await
            .unwrap();
        assert!(lists["User"].is_empty());
    }

    #[tokio::test]
    async fn transport_failure_surfaces() {
        let transport = transport();
        transport.set_failure(Some("connection reset"));
        let source = ServerSource::new(transport, register());
        let err = source
            .get_entity_lists(&types(&["User"]), &CancelToken::never())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SourceError::Transport {
                message: "connection reset".to_string()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_abandons_fetch() {
        let transport = Arc::new(
            StaticTransport::new(RawLists::new()).with_delay(Duration::from_secs(30)),
        );
        let source = Arc::new(ServerSource::new(transport, register()));
        let handle = CancelHandle::new();
        let token = handle.token();

        let task = tokio::spawn({
            let source = source.clone();
            async move { source.get_entity_lists(&types(&["User"]), &token).await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        handle.cancel();
        assert_eq!(task.await.unwrap().unwrap_err(), SourceError::Cancelled);
    }
}
