//! Strata Core — entity values, schemas, indexed collections, the type
//! register, and transaction acknowledgements.

pub mod collection;
pub mod entity;
pub mod error;
pub mod register;
pub mod schema;
pub mod transaction;
pub mod types;

pub use collection::EntityCollection;
pub use entity::{raw_id, Entity, RawEntity, ID_KEY};
pub use error::CoreError;
pub use register::{Hydrate, SchemaHydrator, TypeRegister};
pub use schema::{EntitySchema, EntityTypeRef, FieldSchema, FieldType, ValidationResult};
pub use transaction::{TransactionOutcome, TransactionResult};
pub use types::{is_temporary_id, EntityId, Value};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
