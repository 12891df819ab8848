//! Error types for dynamic field access.

use super::schema::{Cardinality, ValueKind};

/// Errors raised by field lookup, kind checks and index checks.
///
/// Every accessor reports exactly one of these synchronously; nothing is
/// retried or swallowed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    /// No field of that name exists in the message schema
    #[error("field '{field}' not found in message '{message}'")]
    FieldNotFound { message: String, field: String },

    /// The field exists but was declared with another kind
    #[error("field '{field}' is declared as {declared}, not {requested}")]
    FieldKindMismatch {
        field: String,
        declared: ValueKind,
        requested: ValueKind,
    },

    /// A singular accessor was used on a repeated field
    #[error("field '{0}' is repeated, use the indexed accessor")]
    FieldIsRepeated(String),

    /// A repeated accessor was used on a singular field
    #[error("field '{0}' is singular, it has no indices")]
    FieldIsSingular(String),

    /// Repeated-field index outside `0..len`
    #[error("index {index} is out of range for field '{field}' (length {len})")]
    IndexOutOfRange { field: String, index: i32, len: usize },

    /// Numeric value not declared by the field's enum
    #[error("value {value} is not a constant of enum '{enum_name}' (field '{field}')")]
    EnumValueInvalid {
        field: String,
        enum_name: String,
        value: i32,
    },

    /// Constant name not declared by the field's enum
    #[error("'{name}' is not a constant of enum '{enum_name}' (field '{field}')")]
    EnumNameInvalid {
        field: String,
        enum_name: String,
        name: String,
    },

    /// Value does not fit the field's numeric kind
    #[error("value {value} does not fit {kind} field '{field}'")]
    ValueOutOfRange {
        field: String,
        kind: ValueKind,
        value: String,
    },

    /// A nested message of another type was assigned to a message field
    #[error("field '{field}' holds '{expected}' messages, got '{found}'")]
    MessageTypeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Schema construction rejected
    #[error("invalid schema '{schema}': {reason}")]
    InvalidSchema { schema: String, reason: String },

    /// Incoming wire bytes could not be decoded
    #[error("failed to decode '{message}': {reason}")]
    Decode { message: String, reason: String },
}

impl FieldError {
    pub(crate) fn cardinality(field: &str, declared: Cardinality) -> Self {
        match declared {
            Cardinality::Repeated => FieldError::FieldIsRepeated(field.to_string()),
            Cardinality::Singular => FieldError::FieldIsSingular(field.to_string()),
        }
    }
}
