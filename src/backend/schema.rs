//! Backend configuration schemas and decoding.
//!
//! Configuration bodies are JSON object trees. Decoding a body against a
//! [`ConfigSchema`] yields a [`ConfigValue`] that carries every schema
//! attribute, with unset attributes present as `null`. Two decoded values are
//! compared with plain structural equality.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// A raw, undecoded configuration body.
pub type ConfigBody = Map<String, Value>;

/// The value type an attribute accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Bool,
    Number,
    List,
    Map,
}

impl AttributeKind {
    /// Null is accepted for every kind and means "unset".
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (AttributeKind::String, Value::String(_)) => true,
            (AttributeKind::Bool, Value::Bool(_)) => true,
            (AttributeKind::Number, Value::Number(_)) => true,
            (AttributeKind::List, Value::Array(_)) => true,
            (AttributeKind::Map, Value::Object(_)) => true,
            _ => false,
        }
    }

    /// Convert a scalar to this kind when the conversion loses nothing.
    ///
    /// Command-line values carry no type of their own, so `123` may be meant
    /// as a string and `"3"` as a number. Returns `None` when `value` cannot
    /// be used for this kind.
    pub fn coerce(&self, value: Value) -> Option<Value> {
        if self.accepts(&value) {
            return Some(value);
        }
        match (self, value) {
            (AttributeKind::String, Value::Number(n)) => Some(Value::String(n.to_string())),
            (AttributeKind::String, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (AttributeKind::Number, Value::String(s)) => {
                serde_json::from_str::<serde_json::Number>(s.trim())
                    .ok()
                    .map(Value::Number)
            }
            (AttributeKind::Bool, Value::String(s)) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttributeKind::String => "string",
            AttributeKind::Bool => "bool",
            AttributeKind::Number => "number",
            AttributeKind::List => "list",
            AttributeKind::Map => "map",
        }
    }
}

/// One configurable attribute of a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub kind: AttributeKind,
    pub required: bool,
    /// Sensitive values are never echoed when prompting.
    pub sensitive: bool,
    pub description: String,
}

impl Attribute {
    pub fn optional(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            sensitive: false,
            description: String::new(),
        }
    }

    pub fn required(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            required: true,
            ..Self::optional(name, kind)
        }
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Errors from decoding a body against a schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("Unsupported argument: an argument named \"{name}\" is not expected here")]
    UnsupportedArgument { name: String },

    #[error("Incorrect attribute value type: \"{name}\" requires a {expected}")]
    IncorrectType { name: String, expected: &'static str },

    #[error("Missing required argument: the argument \"{name}\" is required")]
    MissingRequired { name: String },

    #[error("Backend configuration must be an object, found {found}")]
    NotAnObject { found: &'static str },
}

/// The set of attributes a backend accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigSchema {
    attributes: Vec<Attribute>,
}

impl ConfigSchema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Decode a body, enforcing required attributes.
    pub fn decode(&self, body: &ConfigBody) -> Result<ConfigValue, DecodeError> {
        self.decode_with(body, true)
    }

    /// Decode a body as if no attribute were required.
    ///
    /// Declared configuration is decoded this way: required values may still
    /// arrive through interactive input or be rejected by `prepare_config`.
    pub fn decode_none_required(&self, body: &ConfigBody) -> Result<ConfigValue, DecodeError> {
        self.decode_with(body, false)
    }

    /// Decode a previously serialized value (for example a cached record).
    pub fn decode_raw(&self, raw: &Value) -> Result<ConfigValue, DecodeError> {
        match raw {
            Value::Null => self.decode_with(&ConfigBody::new(), false),
            Value::Object(body) => self.decode_with(body, false),
            other => Err(DecodeError::NotAnObject {
                found: json_type_name(other),
            }),
        }
    }

    fn decode_with(&self, body: &ConfigBody, enforce_required: bool) -> Result<ConfigValue, DecodeError> {
        if let Some(name) = body.keys().find(|k| self.attribute(k).is_none()) {
            return Err(DecodeError::UnsupportedArgument { name: name.clone() });
        }

        let mut values = BTreeMap::new();
        for attr in &self.attributes {
            let value = body.get(&attr.name).cloned().unwrap_or(Value::Null);
            let value = attr.kind.coerce(value).ok_or_else(|| DecodeError::IncorrectType {
                name: attr.name.clone(),
                expected: attr.kind.label(),
            })?;
            if enforce_required && attr.required && value.is_null() {
                return Err(DecodeError::MissingRequired {
                    name: attr.name.clone(),
                });
            }
            values.insert(attr.name.clone(), value);
        }
        Ok(ConfigValue(values))
    }
}

/// A configuration body decoded against a schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigValue(BTreeMap<String, Value>);

impl ConfigValue {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.0.insert(name.into(), value);
    }

    pub fn is_null(&self, name: &str) -> bool {
        self.get(name).is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Serialize to the canonical JSON form stored in the cached record.
    pub fn to_raw(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> ConfigSchema {
        ConfigSchema::new(vec![
            Attribute::required("address", AttributeKind::String),
            Attribute::optional("retry_max", AttributeKind::Number),
        ])
    }

    fn body(value: Value) -> ConfigBody {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_decode_fills_unset_attributes_with_null() {
        let value = schema()
            .decode(&body(json!({"address": "https://x"})))
            .unwrap();
        assert_eq!(value.get_str("address"), Some("https://x"));
        assert!(value.is_null("retry_max"));
        assert_eq!(value.to_raw(), json!({"address": "https://x", "retry_max": null}));
    }

    #[test]
    fn test_decode_rejects_unknown_attribute() {
        let err = schema()
            .decode(&body(json!({"address": "x", "bucket": "b"})))
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnsupportedArgument {
                name: "bucket".to_string()
            }
        );
    }

    #[test]
    fn test_decode_rejects_wrong_kind() {
        let err = schema()
            .decode(&body(json!({"address": "x", "retry_max": "three"})))
            .unwrap_err();
        assert!(matches!(err, DecodeError::IncorrectType { ref name, .. } if name == "retry_max"));
    }

    #[test]
    fn test_decode_converts_scalars_to_attribute_kind() {
        let schema = ConfigSchema::new(vec![
            Attribute::optional("lock_id", AttributeKind::String),
            Attribute::optional("retry_max", AttributeKind::Number),
            Attribute::optional("skip", AttributeKind::Bool),
        ]);
        let value = schema
            .decode(&body(json!({"lock_id": 123, "retry_max": "4", "skip": "true"})))
            .unwrap();
        assert_eq!(
            value.to_raw(),
            json!({"lock_id": "123", "retry_max": 4, "skip": true})
        );
    }

    #[test]
    fn test_decode_rejects_lossy_conversions() {
        let schema = ConfigSchema::new(vec![
            Attribute::optional("skip", AttributeKind::Bool),
            Attribute::optional("tags", AttributeKind::List),
        ]);
        assert!(schema.decode(&body(json!({"skip": "yes"}))).is_err());
        assert!(schema.decode(&body(json!({"skip": 1}))).is_err());
        assert!(schema.decode(&body(json!({"tags": "a,b"}))).is_err());
    }

    #[test]
    fn test_required_only_enforced_when_asked() {
        let empty = ConfigBody::new();
        assert!(matches!(
            schema().decode(&empty),
            Err(DecodeError::MissingRequired { .. })
        ));
        assert!(schema().decode_none_required(&empty).is_ok());
    }

    #[test]
    fn test_decode_raw_round_trips_serialized_value() {
        let decoded = schema().decode(&body(json!({"address": "x"}))).unwrap();
        let again = schema().decode_raw(&decoded.to_raw()).unwrap();
        assert_eq!(decoded, again);
    }

    #[test]
    fn test_decode_raw_rejects_non_object() {
        assert_eq!(
            schema().decode_raw(&json!("garbage")),
            Err(DecodeError::NotAnObject { found: "string" })
        );
    }
}
