use serde::{Deserialize, Serialize};

/// Numeric entity identity. Values `<= 0` mark a new, unsaved entity whose
/// id is a client-assigned placeholder.
pub type EntityId = i64;

/// Returns `true` if `id` denotes an entity the server has not persisted yet.
#[must_use]
pub fn is_temporary_id(id: EntityId) -> bool {
    id <= 0
}

/// Runtime value of one entity field.
///
/// The variant set mirrors the field type vocabulary of
/// [`FieldType`](crate::schema::FieldType): relationships carry the target
/// id, enumerations carry the member value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Absent value. Only legal for fields with `allow_null`.
    Null,
    Bool(bool),
    /// Whole number.
    Int(i64),
    /// Fractional number.
    Float(f64),
    String(String),
    /// Milliseconds since the Unix epoch.
    Date(i64),
    /// Id of the related entity.
    Ref(EntityId),
    /// Member value of an enumeration.
    Enum(i64),
}

impl Value {
    /// Short name of the variant, used in error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Date(_) => "date",
            Value::Ref(_) => "relationship",
            Value::Enum(_) => "enum",
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The string payload, for [`Value::String`].
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temporary_ids_are_non_positive() {
        assert!(is_temporary_id(0));
        assert!(is_temporary_id(-7));
        assert!(!is_temporary_id(1));
    }

    #[test]
    fn kind_names_every_variant() {
        assert_eq!(Value::Null.kind(), "null");
        assert_eq!(Value::Ref(3).kind(), "relationship");
        assert_eq!(Value::from("x").kind(), "string");
        assert_eq!(Value::from(2.5).kind(), "float");
    }

    #[test]
    fn as_str_only_for_strings() {
        assert_eq!(Value::from("abc").as_str(), Some("abc"));
        assert_eq!(Value::Int(1).as_str(), None);
    }
}
