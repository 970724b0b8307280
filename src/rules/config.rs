//! Untyped rule record as read from the rule file.

use serde_json::{Map, Value};

use crate::error::RuleError;

/// One object of the rule file: a `type` discriminator plus type-specific
/// fields. Accessors report errors against the record's type name.
#[derive(Debug, Clone, Default)]
pub struct RuleConfig {
    fields: Map<String, Value>,
}

impl RuleConfig {
    /// Wrap a JSON value; `None` unless it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// The `type` field, if present and a string.
    pub fn rule_type(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    fn type_name(&self) -> String {
        self.rule_type().unwrap_or("<untyped>").to_string()
    }

    /// A required string field.
    pub fn require_str(&self, field: &str) -> Result<&str, RuleError> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .ok_or_else(|| RuleError::MissingField {
                rule_type: self.type_name(),
                field: field.to_string(),
            })
    }

    /// An optional string field; non-string values are treated as absent.
    pub fn opt_str(&self, field: &str) -> Option<&str> {
        self.fields.get(field).and_then(Value::as_str)
    }

    /// An optional boolean field; non-boolean values are treated as absent.
    pub fn opt_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    /// An optional list of strings. Present but not a list of strings is an error.
    pub fn string_list(&self, field: &str) -> Result<Option<Vec<String>>, RuleError> {
        let Some(value) = self.fields.get(field) else {
            return Ok(None);
        };
        let invalid = || RuleError::InvalidField {
            rule_type: self.type_name(),
            field: field.to_string(),
            reason: "expected a list of strings".to_string(),
        };
        let items = value.as_array().ok_or_else(invalid)?;
        items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// Error for a field that is present but unusable.
    pub fn invalid(&self, field: &str, reason: impl Into<String>) -> RuleError {
        RuleError::InvalidField {
            rule_type: self.type_name(),
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
