//! Module argument extraction and validation.

use serde_json::Value;

/// A module argument failed validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParameterValidationError {
    /// A required argument is missing.
    #[error("missing required argument '{0}'")]
    Missing(String),

    /// An argument has the wrong JSON type.
    #[error("invalid type for '{name}': expected {expected}, got {actual}")]
    InvalidType {
        /// Argument name.
        name: String,
        /// Expected JSON type.
        expected: &'static str,
        /// Actual JSON type.
        actual: &'static str,
    },

    /// An argument has an unacceptable value.
    #[error("'{name}' is invalid: {message}")]
    InvalidValue {
        /// Argument name.
        name: String,
        /// Why it is invalid.
        message: String,
    },

    /// An argument the module does not declare.
    #[error("unknown argument '{0}'")]
    Unknown(String),

    /// Arguments that are individually fine but not together.
    #[error("{0}")]
    Conflict(String),
}

impl ParameterValidationError {
    /// Create an invalid type error for `value`.
    pub fn invalid_type(name: &str, expected: &'static str, value: &Value) -> Self {
        Self::InvalidType {
            name: name.to_string(),
            expected,
            actual: json_type(value),
        }
    }

    /// Create an invalid value error.
    pub fn invalid_value(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

/// Result type for argument validation.
pub type ParamResult<T> = std::result::Result<T, ParameterValidationError>;

/// Name of a value's JSON type.
pub fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Typed accessors over a module's argument object.
///
/// Absent and `null` arguments are treated alike.
pub trait ParamExt {
    /// A required string.
    fn required_str(&self, name: &str) -> ParamResult<&str>;

    /// An optional string.
    fn optional_str(&self, name: &str) -> ParamResult<Option<&str>>;

    /// An optional unsigned integer with default.
    fn optional_u64(&self, name: &str, default: u64) -> ParamResult<u64>;

    /// An optional boolean with default.
    fn optional_bool(&self, name: &str, default: bool) -> ParamResult<bool>;

    /// An optional array of strings; absent yields an empty list.
    fn optional_str_list(&self, name: &str) -> ParamResult<Vec<String>>;

    /// An optional object; absent yields an empty object.
    fn optional_object(&self, name: &str) -> ParamResult<Value>;
}

fn present<'a>(args: &'a Value, name: &str) -> Option<&'a Value> {
    args.get(name).filter(|v| !v.is_null())
}

impl ParamExt for Value {
    fn required_str(&self, name: &str) -> ParamResult<&str> {
        self.optional_str(name)?
            .ok_or_else(|| ParameterValidationError::Missing(name.to_string()))
    }

    fn optional_str(&self, name: &str) -> ParamResult<Option<&str>> {
        match present(self, name) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(ParameterValidationError::invalid_type(name, "string", other)),
        }
    }

    fn optional_u64(&self, name: &str, default: u64) -> ParamResult<u64> {
        match present(self, name) {
            None => Ok(default),
            Some(v) => v
                .as_u64()
                .ok_or_else(|| ParameterValidationError::invalid_type(name, "unsigned integer", v)),
        }
    }

    fn optional_bool(&self, name: &str, default: bool) -> ParamResult<bool> {
        match present(self, name) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(ParameterValidationError::invalid_type(name, "boolean", other)),
        }
    }

    fn optional_str_list(&self, name: &str) -> ParamResult<Vec<String>> {
        match present(self, name) {
            None => Ok(Vec::new()),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| ParameterValidationError::invalid_type(name, "array of strings", item))
                })
                .collect(),
            Some(other) => Err(ParameterValidationError::invalid_type(name, "array", other)),
        }
    }

    fn optional_object(&self, name: &str) -> ParamResult<Value> {
        match present(self, name) {
            None => Ok(Value::Object(Default::default())),
            Some(v @ Value::Object(_)) => Ok(v.clone()),
            Some(other) => Err(ParameterValidationError::invalid_type(name, "object", other)),
        }
    }
}

/// Reject arguments not listed under the schema's `properties`.
pub fn check_known_arguments(schema: &Value, args: &Value) -> ParamResult<()> {
    let Some(args) = args.as_object() else {
        return Err(ParameterValidationError::invalid_type("arguments", "object", args));
    };
    let properties = schema.get("properties").and_then(Value::as_object);
    for name in args.keys() {
        if !properties.is_some_and(|p| p.contains_key(name)) {
            return Err(ParameterValidationError::Unknown(name.clone()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let args = json!({"name": "Chromium", "wait": 5, "release": false, "urls": ["a", "b"], "gone": null});
        assert_eq!(args.required_str("name").unwrap(), "Chromium");
        assert_eq!(args.optional_str("gone").unwrap(), None);
        assert_eq!(args.optional_u64("wait", 1).unwrap(), 5);
        assert_eq!(args.optional_u64("jitter", 0).unwrap(), 0);
        assert!(!args.optional_bool("release", true).unwrap());
        assert_eq!(args.optional_str_list("urls").unwrap(), vec!["a", "b"]);
        assert!(args.optional_str_list("file").unwrap().is_empty());
    }

    #[test]
    fn test_type_errors() {
        let args = json!({"name": 3, "urls": ["a", 1], "wait": -1});
        assert_eq!(
            args.required_str("name").unwrap_err(),
            ParameterValidationError::InvalidType {
                name: "name".into(),
                expected: "string",
                actual: "number",
            }
        );
        assert!(args.optional_str_list("urls").is_err());
        assert!(args.optional_u64("wait", 0).is_err());
        assert_eq!(
            json!({}).required_str("name").unwrap_err(),
            ParameterValidationError::Missing("name".into())
        );
    }

    #[test]
    fn test_unknown_arguments() {
        let schema = json!({"type": "object", "properties": {"name": {"type": "string"}}});
        assert!(check_known_arguments(&schema, &json!({"name": "x"})).is_ok());
        assert_eq!(
            check_known_arguments(&schema, &json!({"nmae": "x"})).unwrap_err(),
            ParameterValidationError::Unknown("nmae".into())
        );
        assert!(check_known_arguments(&schema, &json!([1])).is_err());
    }
}
