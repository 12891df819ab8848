//! Schema types for dynamic user messages.
//!
//! A [`MessageSchema`] is the runtime stand-in for a compiled protobuf
//! message descriptor: an ordered list of named, numbered fields, each with a
//! kind and a cardinality. Schemas are immutable once built and shared via
//! `Arc`.

use std::collections::HashSet;
use std::sync::Arc;

use super::error::FieldError;
use super::value::FieldValue;

/// Highest field number protobuf allows.
pub const MAX_FIELD_NUMBER: u32 = (1 << 29) - 1;

/// Field numbers reserved by the protobuf implementation.
const RESERVED_FIELD_NUMBERS: std::ops::RangeInclusive<u32> = 19000..=19999;

/// The kind of a value, without the nested schema payload.
///
/// This is what callers request when they pick a typed accessor and what
/// errors report back.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    Bool,
    String,
    Enum,
    Message,
}

/// Whether a field holds one value or an ordered sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Cardinality {
    #[default]
    Singular,
    Repeated,
}

/// Declared kind of a field.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Float,
    Double,
    Bool,
    String,
    /// Numeric discriminant validated against the enum's constants
    Enum(Arc<EnumSchema>),
    /// Nested message type
    Message(Arc<MessageSchema>),
}

impl FieldKind {
    /// Kind tag used for accessor checks.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            FieldKind::Int32 => ValueKind::Int32,
            FieldKind::Int64 => ValueKind::Int64,
            FieldKind::Uint32 => ValueKind::Uint32,
            FieldKind::Uint64 => ValueKind::Uint64,
            FieldKind::Float => ValueKind::Float,
            FieldKind::Double => ValueKind::Double,
            FieldKind::Bool => ValueKind::Bool,
            FieldKind::String => ValueKind::String,
            FieldKind::Enum(_) => ValueKind::Enum,
            FieldKind::Message(_) => ValueKind::Message,
        }
    }

    /// Check if this is a scalar kind (anything but a nested message).
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldKind::Message(_))
    }

    /// Nested schema, for message fields.
    pub fn message_schema(&self) -> Option<&Arc<MessageSchema>> {
        match self {
            FieldKind::Message(schema) => Some(schema),
            _ => None,
        }
    }

    /// Enum schema, for enum fields.
    pub fn enum_schema(&self) -> Option<&Arc<EnumSchema>> {
        match self {
            FieldKind::Enum(schema) => Some(schema),
            _ => None,
        }
    }
}

/// One named constant of an enum.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumConstant {
    pub name: String,
    pub number: i32,
}

/// Schema of a protobuf enum: a closed set of named numeric constants.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumSchema {
    pub name: String,
    pub constants: Vec<EnumConstant>,
}

impl EnumSchema {
    /// Create a builder for the enum with the given name.
    pub fn builder(name: &str) -> EnumSchemaBuilder {
        EnumSchemaBuilder {
            name: name.to_string(),
            constants: Vec::new(),
        }
    }

    /// Check if `number` is a declared constant.
    pub fn contains(&self, number: i32) -> bool {
        self.constants.iter().any(|c| c.number == number)
    }

    /// Name of the constant with this number.
    pub fn name_of(&self, number: i32) -> Option<&str> {
        self.constants
            .iter()
            .find(|c| c.number == number)
            .map(|c| c.name.as_str())
    }

    /// Number of the constant with this name.
    pub fn number_of(&self, name: &str) -> Option<i32> {
        self.constants
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.number)
    }

    /// First declared constant, the protobuf default.
    pub fn default_number(&self) -> i32 {
        self.constants.first().map(|c| c.number).unwrap_or(0)
    }
}

/// Builder for [`EnumSchema`].
pub struct EnumSchemaBuilder {
    name: String,
    constants: Vec<EnumConstant>,
}

impl EnumSchemaBuilder {
    /// Declare a constant.
    pub fn constant(mut self, name: &str, number: i32) -> Self {
        self.constants.push(EnumConstant {
            name: name.to_string(),
            number,
        });
        self
    }

    /// Build the enum schema.
    ///
    /// Rejects empty enums and duplicate constant names.
    pub fn build(self) -> Result<Arc<EnumSchema>, FieldError> {
        if self.constants.is_empty() {
            return Err(FieldError::InvalidSchema {
                schema: self.name,
                reason: "enum declares no constants".into(),
            });
        }
        let mut seen = HashSet::new();
        for constant in &self.constants {
            if !seen.insert(constant.name.as_str()) {
                return Err(FieldError::InvalidSchema {
                    schema: self.name.clone(),
                    reason: format!("duplicate enum constant '{}'", constant.name),
                });
            }
        }
        Ok(Arc::new(EnumSchema {
            name: self.name,
            constants: self.constants,
        }))
    }
}

/// Schema for a single message field.
#[derive(Clone, Debug)]
pub struct FieldSchema {
    /// Field name
    pub name: String,
    /// Protobuf field number (wire tag)
    pub number: u32,
    /// Declared kind
    pub kind: FieldKind,
    /// Singular or repeated
    pub cardinality: Cardinality,
    /// Optional default value (singular fields only)
    pub default_value: Option<FieldValue>,
}

impl FieldSchema {
    /// Create a new singular field schema.
    pub fn new(name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            number,
            kind,
            cardinality: Cardinality::Singular,
            default_value: None,
        }
    }

    /// Create a new repeated field schema.
    pub fn repeated(name: impl Into<String>, number: u32, kind: FieldKind) -> Self {
        Self {
            cardinality: Cardinality::Repeated,
            ..Self::new(name, number, kind)
        }
    }

    /// Set the default value for this field.
    pub fn with_default(mut self, value: FieldValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn is_repeated(&self) -> bool {
        self.cardinality == Cardinality::Repeated
    }

    fn validate(&self, schema: &str) -> Result<(), FieldError> {
        let invalid = |reason: String| FieldError::InvalidSchema {
            schema: schema.to_string(),
            reason,
        };

        if self.name.is_empty() {
            return Err(invalid("field with empty name".into()));
        }
        if self.number == 0
            || self.number > MAX_FIELD_NUMBER
            || RESERVED_FIELD_NUMBERS.contains(&self.number)
        {
            return Err(invalid(format!(
                "field '{}' has invalid number {}",
                self.name, self.number
            )));
        }

        let Some(default) = &self.default_value else {
            return Ok(());
        };
        if self.is_repeated() {
            return Err(invalid(format!(
                "repeated field '{}' cannot carry a default",
                self.name
            )));
        }
        if default.kind() != self.kind.value_kind() || !self.kind.is_scalar() {
            return Err(invalid(format!(
                "default for field '{}' is {}, field is {}",
                self.name,
                default.kind(),
                self.kind.value_kind()
            )));
        }
        if let (FieldKind::Enum(enum_schema), FieldValue::Enum(number)) = (&self.kind, default)
            && !enum_schema.contains(*number)
        {
            return Err(invalid(format!(
                "default {} for field '{}' is not a constant of '{}'",
                number, self.name, enum_schema.name
            )));
        }
        Ok(())
    }
}

/// Complete schema for a user message type.
#[derive(Clone, Debug)]
pub struct MessageSchema {
    /// Message type name, e.g. "CCSUsrMsg_SayText2"
    pub name: String,
    /// Fields in declaration order
    pub fields: Vec<FieldSchema>,
}

impl MessageSchema {
    /// Get field by name.
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Get field index by name.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Get field index by wire number.
    pub fn field_index_by_number(&self, number: u32) -> Option<usize> {
        self.fields.iter().position(|f| f.number == number)
    }

    /// Create a builder for programmatic schema construction.
    pub fn builder(name: &str) -> MessageSchemaBuilder {
        MessageSchemaBuilder::new(name)
    }

    /// Number of fields in this message.
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Iterate over field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl PartialEq for MessageSchema {
    fn eq(&self, other: &Self) -> bool {
        // Schemas are equal if they have the same type name
        self.name == other.name
    }
}

/// Builder for creating schemas programmatically.
pub struct MessageSchemaBuilder {
    name: String,
    fields: Vec<FieldSchema>,
}

impl MessageSchemaBuilder {
    /// Create a new builder for the given message name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Add a singular field.
    pub fn field(mut self, name: &str, number: u32, kind: FieldKind) -> Self {
        self.fields.push(FieldSchema::new(name, number, kind));
        self
    }

    /// Add a repeated field.
    pub fn repeated(mut self, name: &str, number: u32, kind: FieldKind) -> Self {
        self.fields.push(FieldSchema::repeated(name, number, kind));
        self
    }

    /// Add a singular field with a default value.
    pub fn field_with_default(
        mut self,
        name: &str,
        number: u32,
        kind: FieldKind,
        default: FieldValue,
    ) -> Self {
        self.fields
            .push(FieldSchema::new(name, number, kind).with_default(default));
        self
    }

    /// Build the message schema.
    ///
    /// Field names and numbers must be unique; numbers must be valid protobuf
    /// tags; defaults must match their field's kind.
    pub fn build(self) -> Result<Arc<MessageSchema>, FieldError> {
        if self.name.is_empty() {
            return Err(FieldError::InvalidSchema {
                schema: self.name,
                reason: "message with empty name".into(),
            });
        }

        let mut names = HashSet::new();
        let mut numbers = HashSet::new();
        for field in &self.fields {
            field.validate(&self.name)?;
            if !names.insert(field.name.as_str()) {
                return Err(FieldError::InvalidSchema {
                    schema: self.name.clone(),
                    reason: format!("duplicate field name '{}'", field.name),
                });
            }
            if !numbers.insert(field.number) {
                return Err(FieldError::InvalidSchema {
                    schema: self.name.clone(),
                    reason: format!("duplicate field number {}", field.number),
                });
            }
        }

        Ok(Arc::new(MessageSchema {
            name: self.name,
            fields: self.fields,
        }))
    }
}
