//! Static metadata describing entity types.
//!
//! An [`EntitySchema`] names a type and owns one [`FieldSchema`] per field.
//! Field schemas are validated at construction: a relationship must name its
//! target type, an enumeration must carry its members, and no other field
//! type may carry either.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::CoreError;
use crate::types::Value;

/// Field type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Bool,
    Date,
    Relationship,
    Enum,
}

impl FieldType {
    /// Whether this field type requires an [`EntityTypeRef`].
    #[must_use]
    pub fn needs_entity_type(self) -> bool {
        matches!(self, FieldType::Relationship | FieldType::Enum)
    }
}

/// Target of a relationship or member table of an enumeration.
///
/// Serializes as a bare string or as a `{ "value": "name" }` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum EntityTypeRef {
    /// Name of the related entity type.
    Related(String),
    /// Enumeration member value -> display name.
    Enumeration(BTreeMap<i64, String>),
}

/// Schema of a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FieldSchemaDef")]
pub struct FieldSchema {
    name: String,
    field_type: FieldType,
    entity_type: Option<EntityTypeRef>,
    allow_null: bool,
    /// Maximum string length in characters. 0 = unbounded.
    length: usize,
}

/// Unchecked wire form of [`FieldSchema`]; deserialization goes through
/// [`FieldSchema::new`].
#[derive(Deserialize)]
struct FieldSchemaDef {
    name: String,
    field_type: FieldType,
    #[serde(default)]
    entity_type: Option<serde_json::Value>,
    #[serde(default)]
    allow_null: bool,
    #[serde(default)]
    length: usize,
}

impl TryFrom<FieldSchemaDef> for FieldSchema {
    type Error = CoreError;

    fn try_from(def: FieldSchemaDef) -> Result<Self, Self::Error> {
        let entity_type = match def.entity_type {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(target)) => Some(EntityTypeRef::Related(target)),
            Some(serde_json::Value::Object(members)) => {
                let mut parsed = BTreeMap::new();
                for (value, name) in members {
                    let (Ok(value), serde_json::Value::String(name)) = (value.parse::<i64>(), name)
                    else {
                        return Err(CoreError::InvalidFieldSchema {
                            field: def.name,
                            reason: "enum members must map integers to names".to_string(),
                        });
                    };
                    parsed.insert(value, name);
                }
                Some(EntityTypeRef::Enumeration(parsed))
            }
            Some(_) => {
                return Err(CoreError::InvalidFieldSchema {
                    field: def.name,
                    reason: "entity type must be a type name or a member map".to_string(),
                })
            }
        };
        FieldSchema::new(
            def.name,
            def.field_type,
            entity_type,
            def.allow_null,
            def.length,
        )
    }
}

impl FieldSchema {
    /// Builds a field schema, rejecting inconsistent combinations.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidFieldSchema`] when `entity_type` is present
    /// for a plain field, absent (or empty) for a relationship/enumeration,
    /// of the wrong shape for the field type, or when a non-string field
    /// declares a length.
    pub fn new(
        name: impl Into<String>,
        field_type: FieldType,
        entity_type: Option<EntityTypeRef>,
        allow_null: bool,
        length: usize,
    ) -> Result<Self, CoreError> {
        let name = name.into();
        let invalid = |reason: &str| CoreError::InvalidFieldSchema {
            field: name.clone(),
            reason: reason.to_string(),
        };

        if name.is_empty() {
            return Err(invalid("field name is empty"));
        }
        match (field_type, &entity_type) {
            (FieldType::Relationship, Some(EntityTypeRef::Related(target))) => {
                if target.is_empty() {
                    return Err(invalid("relationship target type is empty"));
                }
            }
            (FieldType::Enum, Some(EntityTypeRef::Enumeration(members))) => {
                if members.is_empty() {
                    return Err(invalid("enumeration has no members"));
                }
            }
            (FieldType::Relationship, _) => {
                return Err(invalid("relationship requires a target entity type"));
            }
            (FieldType::Enum, _) => return Err(invalid("enum requires a member map")),
            (_, Some(_)) => {
                return Err(invalid("only relationship and enum fields carry an entity type"));
            }
            (_, None) => {}
        }
        if length > 0 && field_type != FieldType::String {
            return Err(invalid("length applies to string fields only"));
        }

        Ok(Self {
            name,
            field_type,
            entity_type,
            allow_null,
            length,
        })
    }

    /// A string field. `length == 0` means unbounded.
    ///
    /// # Errors
    ///
    /// See [`FieldSchema::new`].
    pub fn string(name: impl Into<String>, length: usize) -> Result<Self, CoreError> {
        Self::new(name, FieldType::String, None, false, length)
    }

    /// # Errors
    ///
    /// See [`FieldSchema::new`].
    pub fn number(name: impl Into<String>) -> Result<Self, CoreError> {
        Self::new(name, FieldType::Number, None, false, 0)
    }

    /// # Errors
    ///
    /// See [`FieldSchema::new`].
    pub fn bool(name: impl Into<String>) -> Result<Self, CoreError> {
        Self::new(name, FieldType::Bool, None, false, 0)
    }

    /// # Errors
    ///
    /// See [`FieldSchema::new`].
    pub fn date(name: impl Into<String>) -> Result<Self, CoreError> {
        Self::new(name, FieldType::Date, None, false, 0)
    }

    /// A relationship to `target` entities.
    ///
    /// # Errors
    ///
    /// See [`FieldSchema::new`].
    pub fn relationship(
        name: impl Into<String>,
        target: impl Into<String>,
    ) -> Result<Self, CoreError> {
        Self::new(
            name,
            FieldType::Relationship,
            Some(EntityTypeRef::Related(target.into())),
            false,
            0,
        )
    }

    /// An enumeration with the given `value -> name` members.
    ///
    /// # Errors
    ///
    /// See [`FieldSchema::new`].
    pub fn enumeration<I, S>(name: impl Into<String>, members: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        let members = members.into_iter().map(|(v, n)| (v, n.into())).collect();
        Self::new(
            name,
            FieldType::Enum,
            Some(EntityTypeRef::Enumeration(members)),
            false,
            0,
        )
    }

    /// Returns the same schema with `allow_null` set.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.allow_null = true;
        self
    }

    /// Field name, unique within its entity type.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared field type.
    #[must_use]
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    /// Related type or enumeration members, if the field type has one.
    #[must_use]
    pub fn entity_type(&self) -> Option<&EntityTypeRef> {
        self.entity_type.as_ref()
    }

    /// Whether the field may hold `Null`.
    #[must_use]
    pub fn allow_null(&self) -> bool {
        self.allow_null
    }

    /// Maximum string length in characters; `0` is unbounded.
    #[must_use]
    pub fn length(&self) -> usize {
        self.length
    }

    /// Name of the related type, for relationship fields.
    #[must_use]
    pub fn related_type(&self) -> Option<&str> {
        match &self.entity_type {
            Some(EntityTypeRef::Related(target)) => Some(target),
            _ => None,
        }
    }

    /// Display name of an enumeration member.
    #[must_use]
    pub fn enum_name(&self, value: i64) -> Option<&str> {
        match &self.entity_type {
            Some(EntityTypeRef::Enumeration(members)) => members.get(&value).map(String::as_str),
            _ => None,
        }
    }

    /// Whether `value` is the right kind for this field. `Null` always
    /// passes here; nullability is checked by [`EntitySchema::validate`].
    #[must_use]
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self.field_type, value),
            (_, Value::Null)
                | (FieldType::String, Value::String(_))
                | (FieldType::Number, Value::Int(_) | Value::Float(_))
                | (FieldType::Bool, Value::Bool(_))
                | (FieldType::Date, Value::Date(_))
                | (FieldType::Relationship, Value::Ref(_))
                | (FieldType::Enum, Value::Enum(_))
        )
    }

    /// Converts a raw JSON payload value into a typed [`Value`].
    ///
    /// Dates are accepted as epoch milliseconds or in the `"/Date(ms)/"`
    /// string form.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TypeMismatch`] when the JSON shape does not fit.
    pub fn value_from_json(
        &self,
        entity_type: &str,
        json: &serde_json::Value,
    ) -> Result<Value, CoreError> {
        use serde_json::Value as Json;

        let value = match (self.field_type, json) {
            (_, Json::Null) => Some(Value::Null),
            (FieldType::String, Json::String(s)) => Some(Value::String(s.clone())),
            (FieldType::Number, Json::Number(n)) => n
                .as_i64()
                .map(Value::Int)
                .or_else(|| n.as_f64().map(Value::Float)),
            (FieldType::Bool, Json::Bool(b)) => Some(Value::Bool(*b)),
            (FieldType::Date, Json::Number(n)) => n.as_i64().map(Value::Date),
            (FieldType::Date, Json::String(s)) => parse_wire_date(s).map(Value::Date),
            (FieldType::Relationship, Json::Number(n)) => n.as_i64().map(Value::Ref),
            (FieldType::Enum, Json::Number(n)) => n.as_i64().map(Value::Enum),
            _ => None,
        };

        value.ok_or_else(|| CoreError::TypeMismatch {
            entity_type: entity_type.to_string(),
            field: self.name.clone(),
            found: json_kind(json).to_string(),
        })
    }
}

/// Converts a typed [`Value`] back into its JSON payload form.
#[must_use]
pub fn value_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(n) | Value::Date(n) | Value::Ref(n) | Value::Enum(n) => Json::from(*n),
        Value::Float(f) => serde_json::Number::from_f64(*f).map_or(Json::Null, Json::Number),
        Value::String(s) => Json::String(s.clone()),
    }
}

/// Parses the `"/Date(1700000000000)/"` wire form, with optional timezone
/// suffix (`"/Date(1700000000000+0100)/"`), which is ignored.
fn parse_wire_date(s: &str) -> Option<i64> {
    let inner = s.strip_prefix("/Date(")?.strip_suffix(")/")?;
    let end = inner
        .char_indices()
        .skip(1)
        .find(|(_, c)| *c == '+' || *c == '-')
        .map_or(inner.len(), |(i, _)| i);
    inner[..end].parse().ok()
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Result of validating an entity against its schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// The entity conforms to the schema.
    Valid,
    /// The entity violates one or more field constraints.
    Invalid {
        /// Human-readable descriptions of each failure, in field-name order.
        errors: Vec<String>,
    },
}

impl ValidationResult {
    /// Returns `true` for [`ValidationResult::Valid`].
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }
}

/// Schema of one entity type.
///
/// Every field schema is keyed by its own name; deserialization rejects a
/// map whose keys disagree with the field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "EntitySchemaDef")]
pub struct EntitySchema {
    name: String,
    field_schemas: BTreeMap<String, FieldSchema>,
}

#[derive(Deserialize)]
struct EntitySchemaDef {
    name: String,
    #[serde(default)]
    field_schemas: BTreeMap<String, FieldSchema>,
}

impl TryFrom<EntitySchemaDef> for EntitySchema {
    type Error = CoreError;

    fn try_from(def: EntitySchemaDef) -> Result<Self, Self::Error> {
        if let Some((key, field)) = def.field_schemas.iter().find(|(k, f)| **k != f.name) {
            return Err(CoreError::InvalidFieldSchema {
                field: key.clone(),
                reason: format!("keyed under `{key}` but named `{}`", field.name),
            });
        }
        Ok(EntitySchema::new(def.name, def.field_schemas.into_values()))
    }
}

impl EntitySchema {
    /// Builds a schema from its field list. A later field with the same name
    /// replaces an earlier one.
    #[must_use]
    pub fn new(name: impl Into<String>, fields: impl IntoIterator<Item = FieldSchema>) -> Self {
        Self {
            name: name.into(),
            field_schemas: fields
                .into_iter()
                .map(|f| (f.name.clone(), f))
                .collect(),
        }
    }

    /// Entity type name this schema describes.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Looks up a field schema.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownField`] if the type has no such field.
    pub fn field(&self, field: &str) -> Result<&FieldSchema, CoreError> {
        self.field_schemas
            .get(field)
            .ok_or_else(|| CoreError::UnknownField {
                entity_type: self.name.clone(),
                field: field.to_string(),
            })
    }

    /// Iterates field schemas in name order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldSchema> {
        self.field_schemas.values()
    }

    /// Checks every field of `entity` against this schema: nullability,
    /// value kind, string length and enumeration membership. Fields the
    /// entity does not carry are treated as `Null`.
    #[must_use]
    pub fn validate(&self, entity: &Entity) -> ValidationResult {
        let mut errors = Vec::new();

        if entity.entity_type() != self.name {
            errors.push(format!(
                "entity of type `{}` checked against schema `{}`",
                entity.entity_type(),
                self.name
            ));
        }
        for name in entity.field_names() {
            if !self.field_schemas.contains_key(name) {
                errors.push(format!("{name} is not a field of {}", self.name));
            }
        }

        for schema in self.field_schemas.values() {
            let value = entity.get(&schema.name).unwrap_or(&Value::Null);
            if value.is_null() {
                if !schema.allow_null {
                    errors.push(format!("{} is required", schema.name));
                }
                continue;
            }
            if !schema.accepts(value) {
                errors.push(format!(
                    "{} expects {:?}, found {}",
                    schema.name,
                    schema.field_type,
                    value.kind()
                ));
                continue;
            }
            match value {
                Value::String(s) if schema.length > 0 && s.chars().count() > schema.length => {
                    errors.push(format!(
                        "{} exceeds {} characters",
                        schema.name, schema.length
                    ));
                }
                Value::Enum(v) if schema.enum_name(*v).is_none() => {
                    errors.push(format!("{} has no member {v}", schema.name));
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Invalid { errors }
        }
    }
}
