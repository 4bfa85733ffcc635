use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::error::ScriptError;

/// A single script parameter as configured on the entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(untagged)]
#[ts(export)]
pub enum ParamValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl ParamValue {
    /// Numeric view used by expressions. Booleans read as 1/0, text is parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            ParamValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Ordered parameter map, parsed from the JSON object a host stores per entity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScriptParameters(IndexMap<String, ParamValue>);

impl ScriptParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object. Empty input means no parameters. Nested objects,
    /// arrays and nulls are dropped since expressions cannot read them.
    pub fn parse(json: &str) -> Result<Self, ScriptError> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(json).map_err(|e| ScriptError::Parameters {
            message: e.to_string(),
        })?;
        let Value::Object(map) = value else {
            return Err(ScriptError::Parameters {
                message: "expected a JSON object".into(),
            });
        };

        let mut params = IndexMap::with_capacity(map.len());
        for (name, value) in map {
            let param = match value {
                Value::Bool(b) => ParamValue::Bool(b),
                Value::Number(n) => match n.as_f64() {
                    Some(n) => ParamValue::Number(n),
                    None => continue,
                },
                Value::String(s) => ParamValue::Text(s),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    log::debug!("[Script] ignoring non-scalar parameter '{name}'");
                    continue;
                }
            };
            params.insert(name, param);
        }
        Ok(Self(params))
    }

    pub fn insert(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ParamValue::as_number)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_values_in_order() {
        let params =
            ScriptParameters::parse(r#"{"speed": 2.5, "enabled": true, "label": "x", "bias": "0.5"}"#)
                .unwrap();
        assert_eq!(params.len(), 4);
        assert_eq!(params.number("speed"), Some(2.5));
        assert_eq!(params.number("enabled"), Some(1.0));
        assert_eq!(params.number("label"), None);
        assert_eq!(params.number("bias"), Some(0.5));
        assert_eq!(params.get("label"), Some(&ParamValue::Text("x".into())));
    }

    #[test]
    fn drops_nested_values() {
        let params = ScriptParameters::parse(r#"{"a": [1, 2], "b": {"c": 1}, "d": null, "e": 3}"#).unwrap();
        assert_eq!(params.len(), 1);
        assert_eq!(params.number("e"), Some(3.0));
    }

    #[test]
    fn empty_input_is_no_parameters() {
        assert!(ScriptParameters::parse("").unwrap().is_empty());
        assert!(ScriptParameters::parse("  ").unwrap().is_empty());
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(
            ScriptParameters::parse("[1, 2]"),
            Err(ScriptError::Parameters { .. })
        ));
        assert!(ScriptParameters::parse("{not json").is_err());
    }
}
