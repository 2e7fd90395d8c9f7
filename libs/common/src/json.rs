use serde::de::Error as DeError;
use serde_json::{from_str, Error as SerdeError, Map, Value};

/// Parses a JSON document that must be an object, as used by the `variables` and
/// `extensions` parameters of a GET request.
pub fn parse_json_object(value: &str) -> Result<Map<String, Value>, SerdeError> {
  match from_str::<Value>(value)? {
    Value::Object(v) => Ok(v),
    Value::Null => Ok(Map::new()),
    other => Err(DeError::custom(format!(
      "expected a JSON object, found {}",
      json_kind(&other)
    ))),
  }
}

fn json_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}
