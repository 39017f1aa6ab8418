//! Server acknowledgements of persisted entities and optimistic-id
//! reconciliation.
//!
//! A client creates entities with temporary ids `<= 0`. When the server
//! acknowledges the persist it returns one [`TransactionResult`] per entity
//! carrying the temporary id (`ClientID`) and the permanent one (`ID`).

use serde::{Deserialize, Serialize};

use crate::collection::EntityCollection;
use crate::entity::Entity;
use crate::error::CoreError;
use crate::types::EntityId;

/// Acknowledgement of one entity persist, in the server's wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TransactionResult {
    #[serde(rename = "ClientID")]
    pub client_id: EntityId,
    #[serde(rename = "ID")]
    pub id: EntityId,
    #[serde(default)]
    pub is_delete: bool,
    #[serde(default)]
    pub is_create: bool,
    /// Validation failures. Non-empty means the persist failed.
    #[serde(default)]
    pub errors: Vec<String>,
}

/// What a [`TransactionResult`] reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    Created { client_id: EntityId, id: EntityId },
    Updated { id: EntityId },
    Deleted { id: EntityId },
    Failed { errors: Vec<String> },
}

impl TransactionResult {
    /// Classifies the result. Errors win over the create/delete flags, and
    /// delete wins over create when a server sets both; such a delete
    /// targets the entity's local id, since it was never stored under the
    /// permanent one.
    #[must_use]
    pub fn outcome(&self) -> TransactionOutcome {
        if !self.errors.is_empty() {
            TransactionOutcome::Failed {
                errors: self.errors.clone(),
            }
        } else if self.is_delete {
            TransactionOutcome::Deleted {
                id: self.local_id(),
            }
        } else if self.is_create {
            TransactionOutcome::Created {
                client_id: self.client_id,
                id: self.id,
            }
        } else {
            TransactionOutcome::Updated { id: self.id }
        }
    }

    /// Id the acknowledged entity carries locally before reconciliation.
    #[must_use]
    pub fn local_id(&self) -> EntityId {
        if self.is_create {
            self.client_id
        } else {
            self.id
        }
    }

    /// Applies this acknowledgement to a single entity.
    ///
    /// A create replaces the temporary id with the permanent one; create and
    /// update clear the dirty set. Field values are never touched.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] (entity untouched) when the server
    /// rejected the persist, or [`CoreError::ReconcileMismatch`] when the
    /// result belongs to another entity.
    pub fn reconcile(&self, entity: &mut Entity) -> Result<TransactionOutcome, CoreError> {
        let outcome = self.outcome();
        if let TransactionOutcome::Failed { errors } = outcome {
            return Err(CoreError::Validation { errors });
        }
        if entity.id() != self.local_id() {
            return Err(CoreError::ReconcileMismatch {
                client_id: self.local_id(),
                entity_id: entity.id(),
            });
        }
        match outcome {
            TransactionOutcome::Created { id, .. } => {
                entity.assign_id(id);
                entity.mark_clean();
            }
            TransactionOutcome::Updated { .. } => entity.mark_clean(),
            TransactionOutcome::Deleted { .. } | TransactionOutcome::Failed { .. } => {}
        }
        Ok(outcome)
    }

    /// Applies this acknowledgement to the collection owning the entity:
    /// creates are re-indexed under the permanent id, deletes drop the
    /// entity.
    ///
    /// # Errors
    ///
    /// As [`reconcile`](Self::reconcile); additionally
    /// [`CoreError::ReconcileMismatch`] when the entity is not in the
    /// collection or the permanent id is already taken.
    pub fn apply_to(
        &self,
        collection: &mut EntityCollection,
    ) -> Result<TransactionOutcome, CoreError> {
        let local_id = self.local_id();
        let mismatch = || CoreError::ReconcileMismatch {
            client_id: local_id,
            entity_id: self.id,
        };

        if let TransactionOutcome::Failed { errors } = self.outcome() {
            return Err(CoreError::Validation { errors });
        }
        if self.is_create && self.id != local_id && collection.contains(self.id) {
            return Err(mismatch());
        }
        let entity = collection.get_mut(local_id).ok_or_else(mismatch)?;
        let outcome = self.reconcile(entity)?;
        match &outcome {
            TransactionOutcome::Created { client_id, id } => {
                collection.rekey(*client_id, *id);
            }
            TransactionOutcome::Deleted { id } => {
                collection.remove(*id);
            }
            TransactionOutcome::Updated { .. } | TransactionOutcome::Failed { .. } => {}
        }
        Ok(outcome)
    }
}
