//! Per-entity, per-operation input schemas.
//!
//! A schema is derived entirely from entity metadata:
//!
//! | Operation | Accepted fields       | Required                 |
//! |-----------|-----------------------|--------------------------|
//! | create    | creatable fields      | metadata `required`      |
//! | update    | updatable fields      | none, but at least one   |
//!
//! Keys the schema does not accept are stripped from the validated output,
//! never reported. This absorbs mass-assignment attempts (`__proto__`,
//! `constructor`, `is_admin`) without revealing internal column names.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use fieldline_core::{EntityMetadata, FieldDef, FieldType, ValidationError, ValidationErrorKind};

/// Write operation a schema validates input for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "create"),
            Operation::Update => write!(f, "update"),
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            other => Err(format!("unknown operation '{}', expected create or update", other)),
        }
    }
}

/// Validation rule for one accepted field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    pub def: FieldDef,
    /// Mandatory for this operation.
    pub required: bool,
    pattern: Option<Regex>,
}

impl FieldRule {
    fn new(name: &str, def: &FieldDef, required: bool) -> Self {
        let pattern = def.pattern.as_deref().and_then(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                // The registry rejects bad patterns at load; this only guards hand-built metadata.
                tracing::warn!(field = %name, error = %e, "Ignoring invalid field pattern");
                None
            }
        });
        Self {
            def: def.clone(),
            required,
            pattern,
        }
    }

    fn check(&self, name: &str, value: &Value) -> Result<(), ValidationError> {
        if value.is_null() {
            return if self.def.nullable {
                Ok(())
            } else {
                Err(ValidationError::not_nullable(name))
            };
        }

        let def = &self.def;
        let type_error = || ValidationError::invalid_type(name, &def.field_type.to_string());

        match def.field_type {
            FieldType::String | FieldType::Text | FieldType::Email => {
                let s = value.as_str().ok_or_else(type_error)?;
                if def.field_type == FieldType::Email && !looks_like_email(s) {
                    return Err(ValidationError::for_field(
                        ValidationErrorKind::PatternMismatch,
                        name,
                        format!("Field '{}' must be a valid email address", name),
                    ));
                }
                self.check_string(name, s)?;
            }
            FieldType::Integer => {
                let n = value.as_i64().ok_or_else(type_error)?;
                self.check_number(name, n as f64)?;
            }
            FieldType::Decimal => {
                let n = match value {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                }
                .ok_or_else(type_error)?;
                self.check_number(name, n)?;
            }
            FieldType::Boolean => {
                value.as_bool().ok_or_else(type_error)?;
            }
            FieldType::Date => {
                let s = value.as_str().ok_or_else(type_error)?;
                chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| type_error())?;
            }
            FieldType::Timestamp => {
                let s = value.as_str().ok_or_else(type_error)?;
                chrono::DateTime::parse_from_rfc3339(s).map_err(|_| type_error())?;
            }
            FieldType::Json => {}
        }
        Ok(())
    }

    fn check_string(&self, name: &str, s: &str) -> Result<(), ValidationError> {
        let def = &self.def;
        let len = s.chars().count();
        if let Some(min) = def.min_length {
            if len < min {
                return Err(ValidationError::out_of_range(
                    name,
                    format!("Field '{}' must be at least {} characters", name, min),
                ));
            }
        }
        if let Some(max) = def.max_length {
            if len > max {
                return Err(ValidationError::out_of_range(
                    name,
                    format!("Field '{}' must be at most {} characters", name, max),
                ));
            }
        }
        if let (Some(re), Some(src)) = (&self.pattern, &def.pattern) {
            if !re.is_match(s) {
                return Err(ValidationError::pattern_mismatch(name, src));
            }
        }
        if !def.enum_values.is_empty() && !def.enum_values.iter().any(|v| v == s) {
            return Err(ValidationError::value_not_allowed(
                name,
                &Value::String(s.to_string()),
                &def.enum_values,
            ));
        }
        Ok(())
    }

    fn check_number(&self, name: &str, n: f64) -> Result<(), ValidationError> {
        if let Some(min) = self.def.min {
            if n < min {
                return Err(ValidationError::out_of_range(
                    name,
                    format!("Field '{}' must be at least {}", name, min),
                ));
            }
        }
        if let Some(max) = self.def.max {
            if n > max {
                return Err(ValidationError::out_of_range(
                    name,
                    format!("Field '{}' must be at most {}", name, max),
                ));
            }
        }
        Ok(())
    }

    fn json_schema(&self) -> Value {
        let def = &self.def;
        let mut obj = Map::new();
        let (types, format): (Vec<&str>, Option<&str>) = match def.field_type {
            FieldType::String | FieldType::Text => (vec!["string"], None),
            FieldType::Email => (vec!["string"], Some("email")),
            FieldType::Integer => (vec!["integer"], None),
            FieldType::Decimal => (vec!["number", "string"], None),
            FieldType::Boolean => (vec!["boolean"], None),
            FieldType::Date => (vec!["string"], Some("date")),
            FieldType::Timestamp => (vec!["string"], Some("date-time")),
            FieldType::Json => (vec![], None),
        };
        if !types.is_empty() {
            let mut types: Vec<Value> = types.into_iter().map(|t| json!(t)).collect();
            if def.nullable {
                types.push(json!("null"));
            }
            let value = if types.len() == 1 { types.remove(0) } else { Value::Array(types) };
            obj.insert("type".to_string(), value);
        }
        if let Some(f) = format {
            obj.insert("format".to_string(), json!(f));
        }
        if let Some(p) = &def.pattern {
            obj.insert("pattern".to_string(), json!(p));
        }
        if !def.enum_values.is_empty() {
            let mut values: Vec<Value> = def.enum_values.iter().map(|v| json!(v)).collect();
            if def.nullable {
                values.push(Value::Null);
            }
            obj.insert("enum".to_string(), Value::Array(values));
        }
        if let Some(min) = def.min {
            obj.insert("minimum".to_string(), json!(min));
        }
        if let Some(max) = def.max {
            obj.insert("maximum".to_string(), json!(max));
        }
        if let Some(min) = def.min_length {
            obj.insert("minLength".to_string(), json!(min));
        }
        if let Some(max) = def.max_length {
            obj.insert("maxLength".to_string(), json!(max));
        }
        if let Some(desc) = &def.description {
            obj.insert("description".to_string(), json!(desc));
        }
        Value::Object(obj)
    }
}

/// Input schema for one `(entity, operation)` pair. Immutable once built.
#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub entity: String,
    pub operation: Operation,
    fields: BTreeMap<String, FieldRule>,
}

impl EntitySchema {
    /// Accepted field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|k| k.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&FieldRule> {
        self.fields.get(name)
    }

    /// Fields that must be present.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, r)| r.required)
            .map(|(k, _)| k.as_str())
    }

    /// Keep only accepted keys.
    pub fn strip(&self, input: &Map<String, Value>) -> Map<String, Value> {
        input
            .iter()
            .filter(|(k, _)| self.fields.contains_key(k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Validate input and return it with unaccepted keys removed.
    ///
    /// All field failures are collected into one error.
    pub fn validate(&self, input: &Value) -> Result<Map<String, Value>, ValidationError> {
        let Value::Object(obj) = input else {
            return Err(ValidationError::new(
                ValidationErrorKind::InvalidType,
                "Input must be a JSON object",
            ));
        };

        let output = self.strip(obj);
        let stripped = obj.len() - output.len();
        if stripped > 0 {
            tracing::debug!(
                entity = %self.entity,
                operation = %self.operation,
                stripped,
                "Stripped unaccepted input keys"
            );
        }

        if self.operation == Operation::Update && output.is_empty() {
            return Err(ValidationError::empty_input());
        }

        let mut errors = Vec::new();
        for name in self.required_fields() {
            if output.get(name).map(Value::is_null).unwrap_or(true) {
                errors.push(ValidationError::required_field_missing(&self.entity, name));
            }
        }
        for (name, value) in &output {
            if let Some(rule) = self.fields.get(name) {
                if let Err(e) = rule.check(name, value) {
                    if !(value.is_null() && rule.required) {
                        errors.push(e);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(output)
        } else {
            Err(ValidationError::aggregate(&self.entity, errors))
        }
    }

    /// JSON Schema (draft 2020-12) describing accepted input.
    ///
    /// `additionalProperties` stays open because unknown keys are stripped,
    /// not rejected.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .fields
            .iter()
            .map(|(name, rule)| (name.clone(), rule.json_schema()))
            .collect();
        let required: Vec<&str> = self.required_fields().collect();

        let mut schema = json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "title": format!("{} {}", self.entity, self.operation),
            "type": "object",
            "properties": properties,
        });
        if let Value::Object(obj) = &mut schema {
            if !required.is_empty() {
                obj.insert("required".to_string(), json!(required));
            }
            if self.operation == Operation::Update {
                obj.insert("minProperties".to_string(), json!(1));
            }
        }
        schema
    }
}

/// Derive the input schema for an entity and operation.
pub fn build_entity_schema(meta: &EntityMetadata, operation: Operation) -> EntitySchema {
    let fields: BTreeMap<String, FieldRule> = match operation {
        Operation::Create => meta
            .creatable_fields()
            .map(|(name, def)| (name.to_string(), FieldRule::new(name, def, def.required)))
            .collect(),
        Operation::Update => meta
            .updatable_fields()
            .map(|(name, def)| (name.to_string(), FieldRule::new(name, def, false)))
            .collect(),
    };
    EntitySchema {
        entity: meta.entity_key.clone(),
        operation,
        fields,
    }
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldline_core::EntityRegistry;
    use pretty_assertions::assert_eq;

    fn registry() -> EntityRegistry {
        EntityRegistry::builtin().unwrap()
    }

    fn schema(entity: &str, op: Operation) -> EntitySchema {
        build_entity_schema(registry().get(entity).unwrap(), op)
    }

    #[test]
    fn test_create_strips_undeclared_and_prototype_keys() {
        let s = schema("user", Operation::Create);
        let input: Value = serde_json::from_str(
            r#"{"email":"a@b.com","first_name":"J","last_name":"D","role_id":1,
                "__proto__":{"isAdmin":true},"constructor":{"x":1},"is_active":true,"id":99}"#,
        )
        .unwrap();
        let out = s.validate(&input).unwrap();
        let mut keys: Vec<&str> = out.keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["email", "first_name", "last_name", "role_id"]);
        assert!(!Value::Object(out).to_string().contains("isAdmin"));
    }

    #[test]
    fn test_create_requires_required_fields() {
        let s = schema("user", Operation::Create);
        let err = s
            .validate(&json!({"email": "a@b.com", "first_name": "J"}))
            .unwrap_err();
        let fields: Vec<&str> = err.details.iter().map(|d| d.field.as_str()).collect();
        assert_eq!(fields, vec!["last_name", "role_id"]);
    }

    #[test]
    fn test_required_null_reports_missing_once() {
        let s = schema("user", Operation::Create);
        let err = s
            .validate(&json!({"email": null, "first_name": "J", "last_name": "D", "role_id": 1}))
            .unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::RequiredFieldMissing);
        assert_eq!(err.field(), Some("email"));
    }

    #[test]
    fn test_update_rejects_empty_object() {
        let s = schema("work_order", Operation::Update);
        let err = s.validate(&json!({})).unwrap_err();
        assert!(err.message.to_lowercase().contains("at least one field"));

        // Input with only unaccepted keys is empty too.
        let err = s.validate(&json!({"customer_id": 4, "__proto__": {}})).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::EmptyInput);
    }

    #[test]
    fn test_update_accepts_any_single_updatable_field() {
        let s = schema("work_order", Operation::Update);
        assert!(s.validate(&json!({"title": "Replace filter"})).is_ok());
        assert!(s.validate(&json!({"status": "completed"})).is_ok());
        assert!(s.validate(&json!({"completed_date": "2024-05-01"})).is_ok());
        assert!(s.validate(&json!({"is_active": false})).is_ok());
    }

    #[test]
    fn test_every_single_updatable_field_is_accepted() {
        let registry = registry();
        for meta in registry.iter() {
            let s = build_entity_schema(meta, Operation::Update);
            for name in s.field_names() {
                let rule = s.field(name).unwrap();
                if !rule.def.nullable {
                    continue;
                }
                let mut input = Map::new();
                input.insert(name.to_string(), Value::Null);
                let out = s.validate(&Value::Object(input));
                assert!(out.is_ok(), "{}.{}: {:?}", meta.entity_key, name, out);
            }
        }
    }

    #[test]
    fn test_field_checks() {
        let s = schema("invoice", Operation::Create);
        let base = json!({"invoice_number": "INV-0001", "customer_id": 3, "amount": "120.50"});
        assert!(s.validate(&base).is_ok());

        let mut bad = base.clone();
        bad["invoice_number"] = json!("0001");
        assert_eq!(s.validate(&bad).unwrap_err().kind, ValidationErrorKind::PatternMismatch);

        let mut bad = base.clone();
        bad["status"] = json!("lost");
        assert_eq!(s.validate(&bad).unwrap_err().kind, ValidationErrorKind::ValueNotAllowed);

        let mut bad = base.clone();
        bad["amount"] = json!(-1);
        assert_eq!(s.validate(&bad).unwrap_err().kind, ValidationErrorKind::OutOfRange);

        let mut bad = base.clone();
        bad["customer_id"] = json!("three");
        assert_eq!(s.validate(&bad).unwrap_err().kind, ValidationErrorKind::InvalidType);

        let mut bad = base;
        bad["due_date"] = json!("tomorrow");
        assert_eq!(s.validate(&bad).unwrap_err().field(), Some("due_date"));
    }

    #[test]
    fn test_non_nullable_rejects_null() {
        let s = schema("work_order", Operation::Update);
        let err = s.validate(&json!({"status": null})).unwrap_err();
        assert_eq!(err.kind, ValidationErrorKind::NotNullable);
    }

    #[test]
    fn test_non_object_input() {
        let s = schema("role", Operation::Create);
        assert_eq!(
            s.validate(&json!(["name"])).unwrap_err().kind,
            ValidationErrorKind::InvalidType
        );
    }

    #[test]
    fn test_immutable_not_in_update_schema() {
        let s = schema("invoice", Operation::Update);
        let names: Vec<&str> = s.field_names().collect();
        assert!(!names.contains(&"invoice_number"));
        assert!(!names.contains(&"customer_id"));
        assert!(names.contains(&"status"));
    }

    #[test]
    fn test_json_schema_matches_validation() {
        let s = schema("user", Operation::Create);
        let js = s.to_json_schema();
        let validator = jsonschema::validator_for(&js).unwrap();

        assert!(validator.is_valid(&json!({
            "email": "a@b.com", "first_name": "J", "last_name": "D", "role_id": 1
        })));
        assert!(!validator.is_valid(&json!({"email": "a@b.com"})));
        assert!(!validator.is_valid(&json!({
            "email": "a@b.com", "first_name": "J", "last_name": "D", "role_id": "one"
        })));
        // Extra keys are accepted by the document and stripped by validate().
        assert!(validator.is_valid(&json!({
            "email": "a@b.com", "first_name": "J", "last_name": "D", "role_id": 1, "junk": 1
        })));
    }

    #[test]
    fn test_update_json_schema_requires_one_property() {
        let js = schema("role", Operation::Update).to_json_schema();
        assert_eq!(js["minProperties"], json!(1));
        assert!(js.get("required").is_none());
        let validator = jsonschema::validator_for(&js).unwrap();
        assert!(!validator.is_valid(&json!({})));
        assert!(validator.is_valid(&json!({"description": null})));
    }

    #[test]
    fn test_operation_parse() {
        assert_eq!("CREATE".parse::<Operation>().unwrap(), Operation::Create);
        assert!("delete".parse::<Operation>().is_err());
    }
}
