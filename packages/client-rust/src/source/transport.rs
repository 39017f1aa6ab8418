//! Wire transports used by [`ServerSource`](super::ServerSource).
//!
//! The request is a set of type names; the response maps each type name to
//! the raw payloads of that type.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use strata_core::RawEntity;

use crate::config::ClientConfig;

/// Raw server response: type name -> payloads.
pub type RawLists = HashMap<String, Vec<RawEntity>>;

/// Fetches raw entity payloads for a set of type names.
#[async_trait]
pub trait Transport: Send + Sync {
    /// # Errors
    ///
    /// Returns the network or decoding failure.
    async fn fetch(&self, types: &[String]) -> anyhow::Result<RawLists>;
}

/// HTTP transport: `GET {base}/entities?types=A,B` answered with a JSON
/// object of type name -> payload array.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        Self::new(config.server_url.clone(), config.request_timeout)
    }

    /// Full URL of the entity-list endpoint.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("{}/entities", self.base_url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, types: &[String]) -> anyhow::Result<RawLists> {
        let endpoint = self.endpoint();
        tracing::debug!(endpoint = %endpoint, types = ?types, "fetching entity lists");
        let lists = self
            .client
            .get(&endpoint)
            .query(&[("types", types.join(","))])
            .send()
            .await?
            .error_for_status()?
            .json::<RawLists>()
            .await?;
        Ok(lists)
    }
}

/// In-memory transport serving fixed payloads. Records every request, and
/// can be delayed or made to fail, for exercising the tiers above it.
#[derive(Default)]
pub struct StaticTransport {
    lists: Mutex<RawLists>,
    requests: Mutex<Vec<Vec<String>>>,
    calls: AtomicUsize,
    delay: Option<Duration>,
    failure: Mutex<Option<String>>,
}

impl StaticTransport {
    /// Serves `lists` with no delay and no failure.
    #[must_use]
    pub fn new(lists: RawLists) -> Self {
        Self {
            lists: Mutex::new(lists),
            ..Self::default()
        }
    }

    /// Delays every response by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replaces the payloads served for `entity_type`.
    pub fn set_list(&self, entity_type: impl Into<String>, payloads: Vec<RawEntity>) {
        self.lists.lock().insert(entity_type.into(), payloads);
    }

    /// Makes subsequent fetches fail with `message` (`None` restores).
    pub fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock() = message.map(ToString::to_string);
    }

    /// Number of fetches served so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Type names of every fetch, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<Vec<String>> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Transport for StaticTransport {
    async fn fetch(&self, types: &[String]) -> anyhow::Result<RawLists> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(types.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failure.lock().clone() {
            anyhow::bail!(message);
        }
        let lists = self.lists.lock();
        Ok(types
            .iter()
            .filter_map(|t| lists.get(t).map(|payloads| (t.clone(), payloads.clone())))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn endpoint_trims_trailing_slash() {
        let transport =
            HttpTransport::new("http://example.test/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(transport.endpoint(), "http://example.test/api/entities");
    }

    #[test]
    fn from_config_uses_server_url() {
        let config = ClientConfig {
            server_url: "http://crm.test".to_string(),
            ..ClientConfig::default()
        };
        let transport = HttpTransport::from_config(&config).unwrap();
        assert_eq!(transport.endpoint(), "http://crm.test/entities");
    }

    #[tokio::test]
    async fn static_transport_serves_requested_types_only() {
        let user = json!({"ID": 1}).as_object().cloned().unwrap();
        let transport = StaticTransport::new(RawLists::from([
            ("User".to_string(), vec![user.clone()]),
            ("Order".to_string(), Vec::new()),
        ]));

        let lists = transport.fetch(&["User".to_string()]).await.unwrap();
        assert_eq!(lists.len(), 1);
        assert_eq!(lists["User"], vec![user]);
        assert_eq!(transport.calls(), 1);
        assert_eq!(transport.requests(), vec![vec!["User".to_string()]]);
    }

    #[tokio::test]
    async fn static_transport_failure_toggle() {
        let transport = StaticTransport::default();
        transport.set_failure(Some("503 Service Unavailable"));
        let err = transport.fetch(&["User".to_string()]).await.unwrap_err();
        assert_eq!(err.to_string(), "503 Service Unavailable");

        transport.set_failure(None);
        assert!(transport.fetch(&["User".to_string()]).await.unwrap().is_empty());
    }
}
