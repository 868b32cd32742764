//! Truthy-string-aware boolean conversion for evaluated conditions.

use serde_json::Value;
use thiserror::Error;

const TRUE_STRINGS: [&str; 6] = ["y", "yes", "on", "1", "true", "t"];
const FALSE_STRINGS: [&str; 6] = ["n", "no", "off", "0", "false", "f"];

/// A condition evaluated to something that has no boolean reading.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("the value '{value}' is not a valid boolean")]
pub struct NotABoolean {
    pub value: Value,
}

/// Convert an evaluated value to a boolean.
///
/// Accepts native booleans, the numbers 0 and 1, and the usual yes/no string
/// spellings (case-insensitive, surrounding whitespace ignored).
pub fn boolean(value: &Value) -> Result<bool, NotABoolean> {
    let parsed = match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => match number.as_f64() {
            Some(n) if n == 1.0 => Some(true),
            Some(n) if n == 0.0 => Some(false),
            _ => None,
        },
        Value::String(text) => {
            let normalized = text.trim().to_lowercase();
            if TRUE_STRINGS.contains(&normalized.as_str()) {
                Some(true)
            } else if FALSE_STRINGS.contains(&normalized.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    };
    parsed.ok_or_else(|| NotABoolean {
        value: value.clone(),
    })
}
