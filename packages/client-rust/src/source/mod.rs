//! Entity-list sources: the fetch/cache tier.
//!
//! Every tier implements [`EntityListSource`]:
//!
//! - [`ServerSource`]: hydrates payloads fetched through a [`Transport`]
//! - [`ClientSource`]: in-memory cache in front of any other source
//! - [`LocalSource`]: reads the local [`Repository`](crate::repository::Repository)
//!
//! Single-entity lookup comes for free through [`fetch_single_entity`];
//! sources with a cheaper path override [`EntityListSource::get_entity`].

pub mod client;
pub mod local;
pub mod server;
pub mod transport;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use strata_core::{CoreError, Entity, EntityCollection, EntityId};

pub use client::ClientSource;
pub use local::LocalSource;
pub use server::ServerSource;
pub use transport::{HttpTransport, StaticTransport, Transport};

use crate::cancel::CancelToken;
use crate::repository::RepositoryError;

/// Entity lists keyed by type name.
pub type EntityLists = HashMap<String, Arc<EntityCollection>>;

/// Errors from list and entity fetches.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error("transport error: {message}")]
    Transport { message: String },
    #[error("repository error: {message}")]
    Repository { message: String },
    #[error("entity type `{entity_type}` is not cached")]
    NotCached { entity_type: String },
    #[error("request cancelled")]
    Cancelled,
}

impl SourceError {
    pub(crate) fn transport(error: &anyhow::Error) -> Self {
        SourceError::Transport {
            message: format!("{error:#}"),
        }
    }
}

impl From<RepositoryError> for SourceError {
    fn from(error: RepositoryError) -> Self {
        SourceError::Repository {
            message: error.to_string(),
        }
    }
}

/// A tier that can fetch whole entity lists by type name.
#[async_trait]
pub trait EntityListSource: Send + Sync {
    /// Fetches one collection per distinct type in `types`. Duplicates are
    /// collapsed before dispatch.
    ///
    /// # Errors
    ///
    /// Returns the tier's fetch or hydration failure, or
    /// [`SourceError::Cancelled`].
    async fn get_entity_lists(
        &self,
        types: &[String],
        cancel: &CancelToken,
    ) -> Result<EntityLists, SourceError>;

    /// Fetches one entity, `None` if the type's list does not contain `id`.
    ///
    /// # Errors
    ///
    /// As [`get_entity_lists`](Self::get_entity_lists).
    async fn get_entity(
        &self,
        entity_type: &str,
        id: EntityId,
        cancel: &CancelToken,
    ) -> Result<Option<Entity>, SourceError> {
        fetch_single_entity(self, entity_type, id, cancel).await
    }
}

/// Derives a single-entity lookup from list fetching: fetches the type's
/// list and scans it for `id`.
///
/// # Errors
///
/// As [`EntityListSource::get_entity_lists`].
pub async fn fetch_single_entity<S>(
    source: &S,
    entity_type: &str,
    id: EntityId,
    cancel: &CancelToken,
) -> Result<Option<Entity>, SourceError>
where
    S: EntityListSource + ?Sized,
{
    let lists = source
        .get_entity_lists(&[entity_type.to_string()], cancel)
        .await?;
    Ok(lists
        .get(entity_type)
        .and_then(|list| list.iter().find(|e| e.id() == id))
        .cloned())
}

/// Removes duplicate type names, keeping first-occurrence order.
#[must_use]
pub fn dedupe_types(types: &[String]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(types.len());
    types
        .iter()
        .filter(|t| seen.insert(t.as_str()))
        .cloned()
        .collect()
}
