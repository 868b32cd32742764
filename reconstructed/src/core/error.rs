//! Error types for the two failure phases of a program.
//!
//! [`ParseError`] is raised while building the instruction tree and is always
//! fatal for the whole load. [`RuntimeError`] is raised while running the
//! program for a host; it can be caught by a `block`'s `rescue` list, or
//! reaches the per-host driver which applies the configured strictness.

use thiserror::Error;

use crate::core::boolean::NotABoolean;
use crate::io::inventory::InventoryError;
use crate::io::template::TemplateError;

/// Schema or validation error found while parsing instruction records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("instruction record must be a mapping")]
    NotAMapping,

    #[error("instruction record has no 'action' field")]
    MissingAction,

    #[error("'action' field must be a string")]
    ActionNotAString,

    #[error("unknown action '{0}'")]
    UnknownAction(String),

    #[error("{action}: unsupported fields: {}", fields.join(", "))]
    UnsupportedFields {
        action: &'static str,
        fields: Vec<String>,
    },

    #[error("{action}: missing '{field}' field")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    #[error("{action}: {message}")]
    Invalid {
        action: &'static str,
        message: String,
    },

    /// Error in a top-level instruction record.
    #[error("instruction #{index}: {inner}")]
    AtIndex {
        index: usize,
        inner: Box<ParseError>,
    },

    /// Error inside one of a `block`'s nested instruction lists.
    #[error("{action}: {field}[{index}]: {inner}")]
    Nested {
        action: &'static str,
        field: &'static str,
        index: usize,
        inner: Box<ParseError>,
    },
}

impl ParseError {
    pub(crate) fn invalid(action: &'static str, message: impl Into<String>) -> Self {
        ParseError::Invalid {
            action,
            message: message.into(),
        }
    }
}

/// Recoverable error raised while executing instructions for a host.
///
/// The `Display` output is the message exposed to `rescue` lists through the
/// `reconstructed_error` variable.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Inventory(#[from] InventoryError),

    #[error(transparent)]
    Condition(#[from] NotABoolean),

    #[error("template '{0}' did not evaluate to a list")]
    LoopNotAList(String),

    #[error("{action}: '{template}' did not coalesce into a string")]
    NotAString {
        action: &'static str,
        template: String,
    },

    #[error("{action}: '{name}' is not a valid group name")]
    InvalidGroupName { action: &'static str, name: String },

    #[error("{action}: '{name}' is not a valid variable name")]
    InvalidVariableName { action: &'static str, name: String },

    #[error("{action}: group '{group}' does not exist")]
    MissingGroup { action: &'static str, group: String },

    /// Raised by the `fail` action.
    #[error("{0}")]
    Failed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_fields_are_listed() {
        let err = ParseError::UnsupportedFields {
            action: "stop",
            fields: vec!["group".to_string(), "name".to_string()],
        };
        assert_eq!(err.to_string(), "stop: unsupported fields: group, name");
    }

    #[test]
    fn nested_errors_report_their_position() {
        let err = ParseError::Nested {
            action: "block",
            field: "rescue",
            index: 2,
            inner: Box::new(ParseError::UnknownAction("nope".to_string())),
        };
        assert_eq!(err.to_string(), "block: rescue[2]: unknown action 'nope'");
    }

    #[test]
    fn wrapped_errors_are_not_repeated_in_the_chain() {
        let err = anyhow::Error::new(ParseError::AtIndex {
            index: 0,
            inner: Box::new(ParseError::UnknownAction("explode".to_string())),
        });
        assert_eq!(format!("{err:#}"), "instruction #0: unknown action 'explode'");
    }

    #[test]
    fn failed_message_is_displayed_verbatim() {
        let err = RuntimeError::Failed("host is broken".to_string());
        assert_eq!(err.to_string(), "host is broken");
    }
}
