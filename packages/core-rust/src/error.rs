//! Errors raised by the entity model.
//!
//! Everything here except [`CoreError::Validation`] is a wiring defect
//! (unregistered type, unknown field, malformed schema). Callers propagate
//! these with `?` and never retry.

use crate::types::EntityId;

/// Errors from schema construction, hydration, and reconciliation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("entity type `{name}` is not registered")]
    UnregisteredType { name: String },
    #[error("entity type `{entity_type}` has no field `{field}`")]
    UnknownField { entity_type: String, field: String },
    #[error("invalid field schema `{field}`: {reason}")]
    InvalidFieldSchema { field: String, reason: String },
    #[error("field `{field}` of `{entity_type}` cannot hold {found}")]
    TypeMismatch {
        entity_type: String,
        field: String,
        found: String,
    },
    #[error("payload for `{entity_type}` is malformed: {reason}")]
    MalformedPayload { entity_type: String, reason: String },
    #[error("transaction result for client id {client_id} does not match entity {entity_id}")]
    ReconcileMismatch {
        client_id: EntityId,
        entity_id: EntityId,
    },
    #[error("persist rejected: {}", errors.join("; "))]
    Validation { errors: Vec<String> },
}
