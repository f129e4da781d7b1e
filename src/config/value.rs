//! TOML values as configuration bodies.

use serde_json::{Number, Value};
use thiserror::Error;

use crate::backend::ConfigBody;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("The value of \"{key}\" is not a finite number.")]
    NonFinite { key: String },
}

/// Convert a TOML table into a configuration body.
///
/// Datetimes become their RFC 3339 string form. NaN and infinities have no
/// JSON form and are rejected.
pub fn table_to_body(table: toml::Table) -> Result<ConfigBody, ConvertError> {
    table
        .into_iter()
        .map(|(key, value)| -> Result<(String, Value), ConvertError> {
            let value = to_json(value, &key)?;
            Ok((key, value))
        })
        .collect()
}

/// Convert one TOML value; `key` names it in errors.
pub fn to_json(value: toml::Value, key: &str) -> Result<Value, ConvertError> {
    let converted = match value {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::from(i),
        toml::Value::Float(f) => Number::from_f64(f)
            .map(Value::Number)
            .ok_or_else(|| ConvertError::NonFinite { key: key.to_string() })?,
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| to_json(item, key))
                .collect::<Result<_, _>>()?,
        ),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(name, item)| -> Result<(String, Value), ConvertError> {
                    let item = to_json(item, &format!("{}.{}", key, name))?;
                    Ok((name, item))
                })
                .collect::<Result<_, _>>()?,
        ),
    };
    Ok(converted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(content: &str) -> toml::Table {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_scalars_keep_their_types() {
        let body = table_to_body(parse("a = \"s\"\nb = 3\nc = 1.5\nd = true\n")).unwrap();
        assert_eq!(Value::Object(body), json!({"a": "s", "b": 3, "c": 1.5, "d": true}));
    }

    #[test]
    fn test_datetimes_become_strings() {
        let body = table_to_body(parse("day = 2024-01-01\nat = 1979-05-27T07:32:00Z\n")).unwrap();
        assert_eq!(body["day"], json!("2024-01-01"));
        assert_eq!(body["at"], json!("1979-05-27T07:32:00Z"));
    }

    #[test]
    fn test_non_finite_floats_are_rejected() {
        for raw in ["nan", "inf", "-inf"] {
            let err = table_to_body(parse(&format!("retry_max = {}\n", raw))).unwrap_err();
            assert_eq!(
                err,
                ConvertError::NonFinite {
                    key: "retry_max".to_string()
                }
            );
        }
    }

    #[test]
    fn test_nested_errors_name_the_path() {
        let err = table_to_body(parse("[headers]\nlimit = nan\n")).unwrap_err();
        assert_eq!(
            err,
            ConvertError::NonFinite {
                key: "headers.limit".to_string()
            }
        );
    }

    #[test]
    fn test_arrays_and_tables_convert_recursively() {
        let body = table_to_body(parse("list = [1, 2024-01-01]\n[map]\nk = \"v\"\n")).unwrap();
        assert_eq!(body["list"], json!([1, "2024-01-01"]));
        assert_eq!(body["map"], json!({"k": "v"}));
    }
}
