//! In-memory entity cache in front of an upstream source.
//!
//! A cached type is fully loaded: it is served from memory on every later
//! request and never re-fetched by the same [`ClientSource`]. Entries are
//! never evicted internally; callers drop or replace them explicitly when
//! server data changes.
//!
//! Concurrent requests for the same uncached type share one upstream fetch.
//! The first request claims the type by registering a `watch` channel in
//! the in-flight table; later requests wait on that channel instead of
//! fetching again. If the claiming request fails, is cancelled or is dropped
//! before publishing, its claim is released and the waiters retry their own
//! types, so a failure only reaches the request that made the fetch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use strata_core::{CoreError, Entity, EntityCollection, EntityId, TransactionResult};
use tokio::sync::watch;

use super::{dedupe_types, EntityListSource, EntityLists, SourceError};
use crate::cancel::CancelToken;

/// Collection fetched by an in-flight claim; `None` until published.
type Published = Option<Arc<EntityCollection>>;
type InFlight = Arc<Mutex<HashMap<String, watch::Receiver<Published>>>>;

/// Releases in-flight claims that were never published, e.g. when the
/// claiming future is dropped mid-fetch.
struct ClaimGuard {
    in_flight: InFlight,
    claims: Vec<(String, watch::Receiver<Published>)>,
}

impl ClaimGuard {
    fn disarm(mut self) {
        self.claims.clear();
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        if self.claims.is_empty() {
            return;
        }
        let mut in_flight = self.in_flight.lock();
        for (entity_type, ours) in self.claims.drain(..) {
            if in_flight
                .get(&entity_type)
                .is_some_and(|current| current.same_channel(&ours))
            {
                in_flight.remove(&entity_type);
            }
        }
    }
}

/// Caching [`EntityListSource`] wrapping an upstream source.
pub struct ClientSource {
    upstream: Arc<dyn EntityListSource>,
    cache: RwLock<HashMap<String, Arc<EntityCollection>>>,
    in_flight: InFlight,
}

impl ClientSource {
    /// Creates an empty cache in front of `upstream`.
    #[must_use]
    pub fn new(upstream: Arc<dyn EntityListSource>) -> Self {
        Self {
            upstream,
            cache: RwLock::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Whether `entity_type` is fully loaded in memory.
    #[must_use]
    pub fn is_cached(&self, entity_type: &str) -> bool {
        self.cache.read().contains_key(entity_type)
    }

    /// Cached type names, sorted.
    #[must_use]
    pub fn cached_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.cache.read().keys().cloned().collect();
        types.sort();
        types
    }

    /// The cached collection for `entity_type`, without fetching.
    #[must_use]
    pub fn collection(&self, entity_type: &str) -> Option<Arc<EntityCollection>> {
        self.cache.read().get(entity_type).cloned()
    }

    /// Drops the cached list so the next request fetches it again. Returns
    /// whether the type was cached.
    pub fn invalidate(&self, entity_type: &str) -> bool {
        self.cache.write().remove(entity_type).is_some()
    }

    /// Installs `collection` as the fully loaded list of its type.
    pub fn replace(&self, collection: EntityCollection) {
        self.cache
            .write()
            .insert(collection.entity_type().to_string(), Arc::new(collection));
    }

    /// Drops every cached list.
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Reconciles the cached list of `entity_type` with server
    /// acknowledgements: created entities move to their permanent ids,
    /// deleted ones are dropped.
    ///
    /// Returns the failures (validation errors or mismatched results) for
    /// the caller to surface; successful results are applied regardless.
    /// Readers holding the previous `Arc` keep their snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::NotCached`] if `entity_type` is not cached.
    pub fn apply_transaction_results(
        &self,
        entity_type: &str,
        results: &[TransactionResult],
    ) -> Result<Vec<CoreError>, SourceError> {
        let mut cache = self.cache.write();
        let entry = cache
            .get_mut(entity_type)
            .ok_or_else(|| SourceError::NotCached {
                entity_type: entity_type.to_string(),
            })?;
        let collection = Arc::make_mut(entry);

        let mut failures = Vec::new();
        for result in results {
            if let Err(e) = result.apply_to(collection) {
                tracing::warn!(
                    entity_type = %entity_type,
                    client_id = result.client_id,
                    error = %e,
                    "persist not reconciled"
                );
                failures.push(e);
            }
        }
        Ok(failures)
    }

    /// One pass over `types`: serves cached types, fetches the types nobody
    /// is fetching, and waits for the rest. Returns the types whose fetch
    /// was abandoned by another caller and must be retried.
    async fn load_round(
        &self,
        types: Vec<String>,
        lists: &mut EntityLists,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, SourceError> {
        let mut waiting = Vec::new();
        let mut claimed = Vec::new();
        {
            let cache = self.cache.read();
            let mut in_flight = self.in_flight.lock();
            for entity_type in types {
                if let Some(collection) = cache.get(&entity_type) {
                    lists.insert(entity_type, collection.clone());
                } else if let Some(rx) = in_flight.get(&entity_type) {
                    waiting.push((entity_type, rx.clone()));
                } else {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(entity_type.clone(), rx.clone());
                    claimed.push((entity_type, tx, rx));
                }
            }
        }

        if waiting.is_empty() && claimed.is_empty() {
            tracing::debug!(types = lists.len(), "served entity lists from cache");
            return Ok(Vec::new());
        }
        if !claimed.is_empty() {
            self.fetch_claimed(claimed, lists, cancel).await?;
        }

        let mut retry = Vec::new();
        for (entity_type, rx) in waiting {
            match cancel.run(wait_published(rx)).await? {
                Some(collection) => {
                    lists.insert(entity_type, collection);
                }
                None => retry.push(entity_type),
            }
        }
        Ok(retry)
    }

    async fn fetch_claimed(
        &self,
        claimed: Vec<(String, watch::Sender<Published>, watch::Receiver<Published>)>,
        lists: &mut EntityLists,
        cancel: &CancelToken,
    ) -> Result<(), SourceError> {
        let guard = ClaimGuard {
            in_flight: self.in_flight.clone(),
            claims: claimed
                .iter()
                .map(|(t, _, rx)| (t.clone(), rx.clone()))
                .collect(),
        };
        let names: Vec<String> = claimed.iter().map(|(t, _, _)| t.clone()).collect();
        tracing::debug!(types = ?names, "cache miss; fetching upstream");

        match self.upstream.get_entity_lists(&names, cancel).await {
            Ok(mut fetched) => {
                let mut cache = self.cache.write();
                let mut in_flight = self.in_flight.lock();
                for (entity_type, tx, _) in claimed {
                    let collection = fetched
                        .remove(&entity_type)
                        .unwrap_or_else(|| Arc::new(EntityCollection::new(entity_type.clone())));
                    cache.insert(entity_type.clone(), collection.clone());
                    in_flight.remove(&entity_type);
                    tx.send_replace(Some(collection.clone()));
                    lists.insert(entity_type, collection);
                }
                drop(in_flight);
                drop(cache);
                guard.disarm();
                Ok(())
            }
            // Waiters see the channel close and retry on their own.
            Err(SourceError::Cancelled) => Err(SourceError::Cancelled),
            Err(e) => {
                tracing::warn!(types = ?names, error = %e, "upstream fetch failed");
                Err(e)
            }
        }
    }
}

/// Waits until the claiming caller publishes. `None` means the claim was
/// abandoned without a result.
async fn wait_published(mut rx: watch::Receiver<Published>) -> Published {
    loop {
        if let Some(published) = rx.borrow_and_update().clone() {
            return Some(published);
        }
        if rx.changed().await.is_err() {
            return rx.borrow().clone();
        }
    }
}

#[async_trait]
impl EntityListSource for ClientSource {
    /// Returns every requested type: cached types straight from memory,
    /// the rest after one upstream fetch that also populates the cache.
    async fn get_entity_lists(
        &self,
        types: &[String],
        cancel: &CancelToken,
    ) -> Result<EntityLists, SourceError> {
        let mut pending = dedupe_types(types);
        let mut lists = EntityLists::with_capacity(pending.len());
        while !pending.is_empty() {
            pending = self.load_round(pending, &mut lists, cancel).await?;
        }
        Ok(lists)
    }

    /// Looks the entity up by id in the cached list, loading the list first
    /// if needed.
    async fn get_entity(
        &self,
        entity_type: &str,
        id: EntityId,
        cancel: &CancelToken,
    ) -> Result<Option<Entity>, SourceError> {
        let collection = match self.collection(entity_type) {
            Some(collection) => collection,
            None => {
                let mut lists = self
                    .get_entity_lists(&[entity_type.to_string()], cancel)
                    .await?;
                match lists.remove(entity_type) {
                    Some(collection) => collection,
                    None => return Ok(None),
                }
            }
        };
        Ok(collection.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use strata_core::{EntitySchema, FieldSchema, RawEntity, TypeRegister, Value};

    use super::*;
    use crate::cancel::CancelHandle;
    use crate::source::server::ServerSource;
    use crate::source::transport::{RawLists, StaticTransport};

    fn raw(value: serde_json::Value) -> RawEntity {
        value.as_object().cloned().unwrap()
    }

    fn types(names: &[&str]) -> Vec<String> {
        names.iter().map(ToString::to_string).collect()
    }

    fn register() -> Arc<TypeRegister> {
        let register = TypeRegister::new();
        for name in ["User", "Order"] {
            register.register_schema(EntitySchema::new(
                name,
                [FieldSchema::string("Name", 0).unwrap().nullable()],
            ));
        }
        Arc::new(register)
    }

    fn fixture() -> RawLists {
        RawLists::from([
            (
                "User".to_string(),
                vec![
                    raw(json!({"ID": 1, "Name": "e1"})),
                    raw(json!({"ID": 2, "Name": "e2"})),
                ],
            ),
            ("Order".to_string(), vec![raw(json!({"ID": 3, "Name": "e3"}))]),
        ])
    }

    fn client(transport: Arc<StaticTransport>) -> ClientSource {
        ClientSource::new(Arc::new(ServerSource::new(transport, register())))
    }

    #[tokio::test]
    async fn empty_cache_fetches_and_returns_every_type() {
        let transport = Arc::new(StaticTransport::new(fixture()));
        let source = client(transport.clone());

        let lists = source
            .get_entity_lists(&types(&["User", "Order"]), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(source.cached_types(), vec!["Order", "User"]);
        assert_eq!(lists.len(), 2);
        assert_eq!(lists["User"].ids().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(lists["Order"].ids().collect::<Vec<_>>(), vec![3]);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn cached_types_are_never_refetched() {
        let transport = Arc::new(StaticTransport::new(fixture()));
        let source = client(transport.clone());
        let cancel = CancelToken::never();

        let first = source
            .get_entity_lists(&types(&["User"]), &cancel)
            .await
            .unwrap();
        let second = source
            .get_entity_lists(&types(&["User"]), &cancel)
            .await
            .unwrap();

        assert_eq!(transport.calls(), 1);
        assert!(Arc::ptr_eq(&first["User"], &second["User"]));
    }

    #[tokio::test]
    async fn pre_populated_cache_answers_without_upstream() {
        let transport = Arc::new(StaticTransport::new(fixture()));
        let source = client(transport.clone());
        source.replace(EntityCollection::from_entities(
            "User",
            [Entity::hydrated("User", 10, Default::default())],
        ));

        let lists = source
            .get_entity_lists(&types(&["User"]), &CancelToken::never())
            .await
            .unwrap();

        assert_eq!(transport.calls(), 0);
        assert_eq!(lists["User"].ids().collect::<Vec<_>>(), vec![10]);
    }

    #[tokio::test]
    async fn mixed_request_fetches_only_missing_types() {
        let transport = Arc::new(StaticTransport::new(fixture()));
        let source = client(transport.clone());
        let cancel = CancelToken::never();
        source
            .get_entity_lists(&types(&["User"]), &cancel)
            .await
            .unwrap();

        let lists = source
            .get_entity_lists(&types(&["User", "Order", "Order"]), &cancel)
            .await
            .unwrap();

        assert_eq!(lists.len(), 2);
        assert_eq!(
            transport.requests(),
            vec![types(&["User"]), types(&["Order"])]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_share_one_fetch() {
        let transport =
            Arc::new(StaticTransport::new(fixture()).with_delay(Duration::from_millis(100)));
        let source = Arc::new(client(transport.clone()));

        let spawn = |names: Vec<String>| {
            let source = source.clone();
            tokio::spawn(async move {
                source
                    .get_entity_lists(&names, &CancelToken::never())
                    .await
            })
        };
        let a = spawn(types(&["User"]));
        let b = spawn(types(&["User", "Order"]));

        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert!(Arc::ptr_eq(&a["User"], &b["User"]));
        assert_eq!(b["Order"].len(), 1);
        let users_fetched = transport
            .requests()
            .iter()
            .filter(|r| r.contains(&"User".to_string()))
            .count();
        assert_eq!(users_fetched, 1);
    }

    #[tokio::test]
    async fn upstream_failure_caches_nothing() {
        let transport = Arc::new(StaticTransport::new(fixture()));
        transport.set_failure(Some("offline"));
        let source = client(transport.clone());
        let cancel = CancelToken::never();

        let err = source
            .get_entity_lists(&types(&["User"]), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::Transport { .. }));
        assert!(!source.is_cached("User"));

        transport.set_failure(None);
        let lists = source
            .get_entity_lists(&types(&["User"]), &cancel)
            .await
            .unwrap();
        assert_eq!(lists["User"].len(), 2);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_claim_lets_waiter_fetch() {
        let transport =
            Arc::new(StaticTransport::new(fixture()).with_delay(Duration::from_millis(100)));
        let source = Arc::new(client(transport.clone()));
        let handle = CancelHandle::new();

        let first = tokio::spawn({
            let source = source.clone();
            let token = handle.token();
            async move { source.get_entity_lists(&types(&["User"]), &token).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tokio::spawn({
            let source = source.clone();
            async move {
                source
                    .get_entity_lists(&types(&["User"]), &CancelToken::never())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        assert_eq!(first.await.unwrap().unwrap_err(), SourceError::Cancelled);
        let lists = second.await.unwrap().unwrap();
        assert_eq!(lists["User"].len(), 2);
        assert_eq!(transport.calls(), 2);
        assert!(source.is_cached("User"));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_fetch_does_not_fail_waiters_for_other_types() {
        let transport =
            Arc::new(StaticTransport::new(fixture()).with_delay(Duration::from_millis(100)));
        transport.set_list("Order", vec![raw(json!({"ID": 3, "Bogus": 1}))]);
        let source = Arc::new(client(transport.clone()));

        let both = tokio::spawn({
            let source = source.clone();
            async move {
                source
                    .get_entity_lists(&types(&["User", "Order"]), &CancelToken::never())
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let users_only = tokio::spawn({
            let source = source.clone();
            async move {
                source
                    .get_entity_lists(&types(&["User"]), &CancelToken::never())
                    .await
            }
        });

        assert!(matches!(
            both.await.unwrap(),
            Err(SourceError::Core(CoreError::UnknownField { .. }))
        ));
        let lists = users_only.await.unwrap().unwrap();
        assert_eq!(lists["User"].len(), 2);
        assert_eq!(
            transport.requests(),
            vec![types(&["User", "Order"]), types(&["User"])]
        );
        assert!(source.is_cached("User"));
        assert!(!source.is_cached("Order"));
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let transport = Arc::new(StaticTransport::new(fixture()));
        let source = client(transport.clone());
        let cancel = CancelToken::never();
        source
            .get_entity_lists(&types(&["User"]), &cancel)
            .await
            .unwrap();

        assert!(source.invalidate("User"));
        assert!(!source.invalidate("User"));
        source
            .get_entity_lists(&types(&["User"]), &cancel)
            .await
            .unwrap();
        assert_eq!(transport.calls(), 2);

        source.clear();
        assert!(source.cached_types().is_empty());
    }

    #[tokio::test]
    async fn get_entity_uses_cached_index() {
        let transport = Arc::new(StaticTransport::new(fixture()));
        let source = client(transport.clone());
        let cancel = CancelToken::never();

        let user = source.get_entity("User", 2, &cancel).await.unwrap();
        assert_eq!(
            user.and_then(|u| u.get("Name").cloned()),
            Some(Value::from("e2"))
        );
        assert!(source.get_entity("User", 99, &cancel).await.unwrap().is_none());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn transaction_results_reconcile_cached_list() {
        let source = client(Arc::new(StaticTransport::default()));
        source.replace(EntityCollection::from_entities(
            "User",
            [
                Entity::new_unsaved("User", -1),
                Entity::new_unsaved("User", -2),
                Entity::hydrated("User", 5, Default::default()),
            ],
        ));
        let before = source.collection("User").unwrap();

        let failures = source
            .apply_transaction_results(
                "User",
                &[
                    TransactionResult {
                        client_id: -1,
                        id: 501,
                        is_create: true,
                        ..TransactionResult::default()
                    },
                    TransactionResult {
                        client_id: -2,
                        is_create: true,
                        errors: vec!["Name is required".to_string()],
                        ..TransactionResult::default()
                    },
                    TransactionResult {
                        client_id: 5,
                        id: 5,
                        is_delete: true,
                        ..TransactionResult::default()
                    },
                ],
            )
            .unwrap();

        assert_eq!(
            failures,
            vec![CoreError::Validation {
                errors: vec!["Name is required".to_string()]
            }]
        );
        let after = source.collection("User").unwrap();
        assert_eq!(after.ids().collect::<Vec<_>>(), vec![501, -2]);
        assert_eq!(before.ids().collect::<Vec<_>>(), vec![-1, -2, 5]);

        assert!(matches!(
            source.apply_transaction_results("Order", &[]),
            Err(SourceError::NotCached { .. })
        ));
    }
}
