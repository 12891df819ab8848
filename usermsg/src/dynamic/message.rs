//! Dynamic message container and the field-access engine.
//!
//! Every typed accessor (`get_int32`, `add_string`, `mutable_repeated_message`,
//! ...) is a thin wrapper over four checks performed in one place:
//! name resolution, kind check, cardinality check and index check.

use std::sync::Arc;

use super::error::FieldError;
use super::schema::{Cardinality, FieldKind, FieldSchema, MessageSchema, ValueKind};
use super::value::{FieldValue, ScalarValue, default_for_kind};

#[derive(Clone, Debug, PartialEq)]
enum Slot {
    Singular { value: FieldValue, present: bool },
    Repeated(Vec<FieldValue>),
}

impl Slot {
    fn for_field(field: &FieldSchema) -> Self {
        match field.cardinality {
            Cardinality::Singular => Slot::Singular {
                value: field
                    .default_value
                    .clone()
                    .unwrap_or_else(|| default_for_kind(&field.kind)),
                present: false,
            },
            Cardinality::Repeated => Slot::Repeated(Vec::new()),
        }
    }
}

/// Borrowed view of one field, yielded by [`DynamicMessage::fields`].
#[derive(Clone, Copy, Debug)]
pub enum FieldEntry<'a> {
    Singular {
        schema: &'a FieldSchema,
        value: &'a FieldValue,
        present: bool,
    },
    Repeated {
        schema: &'a FieldSchema,
        values: &'a [FieldValue],
    },
}

impl<'a> FieldEntry<'a> {
    pub fn schema(&self) -> &'a FieldSchema {
        match self {
            FieldEntry::Singular { schema, .. } | FieldEntry::Repeated { schema, .. } => schema,
        }
    }
}

/// A user message whose type is known only at runtime.
///
/// Nested and repeated sub-messages are owned by their parent. Handles to
/// them are ordinary borrows, so a handle cannot outlive the parent or be
/// used while the parent is mutated elsewhere.
#[derive(Clone, Debug)]
pub struct DynamicMessage {
    schema: Arc<MessageSchema>,
    slots: Vec<Slot>,
}

impl DynamicMessage {
    /// Create a new message with every field at its default and unset.
    pub fn new(schema: &Arc<MessageSchema>) -> Self {
        Self {
            schema: Arc::clone(schema),
            slots: schema.fields.iter().map(Slot::for_field).collect(),
        }
    }

    /// Create a message builder for the given schema.
    pub fn builder(schema: &Arc<MessageSchema>) -> DynamicMessageBuilder {
        DynamicMessageBuilder::new(schema)
    }

    /// Get the message schema.
    pub fn schema(&self) -> &MessageSchema {
        &self.schema
    }

    /// Get the schema as an Arc (for sharing).
    pub fn schema_arc(&self) -> Arc<MessageSchema> {
        Arc::clone(&self.schema)
    }

    /// Iterate over all fields in declaration order.
    pub fn fields(&self) -> impl Iterator<Item = FieldEntry<'_>> {
        self.schema
            .fields
            .iter()
            .zip(self.slots.iter())
            .map(|(schema, slot)| match slot {
                Slot::Singular { value, present } => FieldEntry::Singular {
                    schema,
                    value,
                    present: *present,
                },
                Slot::Repeated(values) => FieldEntry::Repeated { schema, values },
            })
    }

    // ------------------------------------------------------------------
    // Validated core
    // ------------------------------------------------------------------

    fn resolve(&self, name: &str) -> Result<usize, FieldError> {
        self.schema
            .field_index(name)
            .ok_or_else(|| FieldError::FieldNotFound {
                message: self.schema.name.clone(),
                field: name.to_string(),
            })
    }

    fn check_kind(field: &FieldSchema, requested: ValueKind) -> Result<(), FieldError> {
        let declared = field.kind.value_kind();
        if declared != requested {
            return Err(FieldError::FieldKindMismatch {
                field: field.name.clone(),
                declared,
                requested,
            });
        }
        Ok(())
    }

    fn check_cardinality(field: &FieldSchema, expected: Cardinality) -> Result<(), FieldError> {
        if field.cardinality != expected {
            return Err(FieldError::cardinality(&field.name, field.cardinality));
        }
        Ok(())
    }

    fn check_index(field: &FieldSchema, index: i32, len: usize) -> Result<usize, FieldError> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < len)
            .ok_or_else(|| FieldError::IndexOutOfRange {
                field: field.name.clone(),
                index,
                len,
            })
    }

    /// Enum values must be declared constants; nested messages must be of
    /// the field's message type.
    fn check_value(field: &FieldSchema, value: &FieldValue) -> Result<(), FieldError> {
        match (&field.kind, value) {
            (FieldKind::Enum(schema), FieldValue::Enum(number)) if !schema.contains(*number) => {
                Err(FieldError::EnumValueInvalid {
                    field: field.name.clone(),
                    enum_name: schema.name.clone(),
                    value: *number,
                })
            }
            (FieldKind::Message(schema), FieldValue::Message(msg))
                if msg.schema().name != schema.name =>
            {
                Err(FieldError::MessageTypeMismatch {
                    field: field.name.clone(),
                    expected: schema.name.clone(),
                    found: msg.schema().name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// Resolve a field and check its kind, then its cardinality.
    fn locate(
        &self,
        name: &str,
        kind: ValueKind,
        cardinality: Cardinality,
    ) -> Result<usize, FieldError> {
        let idx = self.resolve(name)?;
        let field = &self.schema.fields[idx];
        Self::check_kind(field, kind)?;
        Self::check_cardinality(field, cardinality)?;
        Ok(idx)
    }

    fn singular(&self, idx: usize) -> Result<&FieldValue, FieldError> {
        match &self.slots[idx] {
            Slot::Singular { value, .. } => Ok(value),
            Slot::Repeated(_) => Err(FieldError::FieldIsRepeated(
                self.schema.fields[idx].name.clone(),
            )),
        }
    }

    fn singular_mut(&mut self, idx: usize) -> Result<&mut FieldValue, FieldError> {
        match &mut self.slots[idx] {
            Slot::Singular { value, present } => {
                *present = true;
                Ok(value)
            }
            Slot::Repeated(_) => Err(FieldError::FieldIsRepeated(
                self.schema.fields[idx].name.clone(),
            )),
        }
    }

    fn list(&self, idx: usize) -> Result<&[FieldValue], FieldError> {
        match &self.slots[idx] {
            Slot::Repeated(values) => Ok(values),
            Slot::Singular { .. } => Err(FieldError::FieldIsSingular(
                self.schema.fields[idx].name.clone(),
            )),
        }
    }

    fn list_mut(&mut self, idx: usize) -> Result<&mut Vec<FieldValue>, FieldError> {
        match &mut self.slots[idx] {
            Slot::Repeated(values) => Ok(values),
            Slot::Singular { .. } => Err(FieldError::FieldIsSingular(
                self.schema.fields[idx].name.clone(),
            )),
        }
    }

    // ------------------------------------------------------------------
    // FieldValue level access
    // ------------------------------------------------------------------

    /// Read a singular field of any kind.
    pub fn get_value(&self, name: &str) -> Result<&FieldValue, FieldError> {
        let idx = self.resolve(name)?;
        Self::check_cardinality(&self.schema.fields[idx], Cardinality::Singular)?;
        self.singular(idx)
    }

    /// Read one slot of a repeated field of any kind.
    pub fn get_repeated_value(&self, name: &str, index: i32) -> Result<&FieldValue, FieldError> {
        let idx = self.resolve(name)?;
        let field = &self.schema.fields[idx];
        Self::check_cardinality(field, Cardinality::Repeated)?;
        let values = self.list(idx)?;
        let i = Self::check_index(field, index, values.len())?;
        Ok(&values[i])
    }

    /// Write a singular field. The value's kind must match the declared kind.
    pub fn set_value(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError> {
        let idx = self.locate(name, value.kind(), Cardinality::Singular)?;
        Self::check_value(&self.schema.fields[idx], &value)?;
        *self.singular_mut(idx)? = value;
        Ok(())
    }

    /// Overwrite an existing slot of a repeated field. Never grows the field.
    pub fn set_repeated_value(
        &mut self,
        name: &str,
        index: i32,
        value: FieldValue,
    ) -> Result<(), FieldError> {
        let idx = self.locate(name, value.kind(), Cardinality::Repeated)?;
        let schema = Arc::clone(&self.schema);
        let field = &schema.fields[idx];
        Self::check_value(field, &value)?;
        let values = self.list_mut(idx)?;
        let i = Self::check_index(field, index, values.len())?;
        values[i] = value;
        Ok(())
    }

    /// Append a value to a repeated field.
    pub fn add_value(&mut self, name: &str, value: FieldValue) -> Result<(), FieldError> {
        let idx = self.locate(name, value.kind(), Cardinality::Repeated)?;
        Self::check_value(&self.schema.fields[idx], &value)?;
        self.list_mut(idx)?.push(value);
        Ok(())
    }

    /// Current length of a repeated field.
    pub fn repeated_length(&self, name: &str) -> Result<usize, FieldError> {
        let idx = self.resolve(name)?;
        Self::check_cardinality(&self.schema.fields[idx], Cardinality::Repeated)?;
        Ok(self.list(idx)?.len())
    }

    /// Whether a singular field was set, or a repeated field is non-empty.
    pub fn has_field(&self, name: &str) -> Result<bool, FieldError> {
        let idx = self.resolve(name)?;
        Ok(match &self.slots[idx] {
            Slot::Singular { present, .. } => *present,
            Slot::Repeated(values) => !values.is_empty(),
        })
    }

    /// Reset a field to its default and mark it unset.
    pub fn clear_field(&mut self, name: &str) -> Result<(), FieldError> {
        let idx = self.resolve(name)?;
        self.slots[idx] = Slot::for_field(&self.schema.fields[idx]);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Generic typed access
    // ------------------------------------------------------------------

    fn extract<T: ScalarValue>(field: &str, value: &FieldValue) -> Result<T, FieldError> {
        T::from_value(value).ok_or_else(|| FieldError::FieldKindMismatch {
            field: field.to_string(),
            declared: value.kind(),
            requested: T::KIND,
        })
    }

    /// Read a singular scalar field as `T`.
    pub fn get<T: ScalarValue>(&self, name: &str) -> Result<T, FieldError> {
        let idx = self.locate(name, T::KIND, Cardinality::Singular)?;
        Self::extract(name, self.singular(idx)?)
    }

    /// Read one slot of a repeated scalar field as `T`.
    pub fn get_repeated<T: ScalarValue>(&self, name: &str, index: i32) -> Result<T, FieldError> {
        let idx = self.locate(name, T::KIND, Cardinality::Repeated)?;
        let values = self.list(idx)?;
        let i = Self::check_index(&self.schema.fields[idx], index, values.len())?;
        Self::extract(name, &values[i])
    }

    /// Write a singular scalar field.
    pub fn set<T: ScalarValue>(&mut self, name: &str, value: T) -> Result<(), FieldError> {
        self.set_value(name, value.into_value())
    }

    /// Overwrite one slot of a repeated scalar field.
    pub fn set_repeated<T: ScalarValue>(
        &mut self,
        name: &str,
        index: i32,
        value: T,
    ) -> Result<(), FieldError> {
        self.set_repeated_value(name, index, value.into_value())
    }

    /// Append to a repeated scalar field.
    pub fn add<T: ScalarValue>(&mut self, name: &str, value: T) -> Result<(), FieldError> {
        self.add_value(name, value.into_value())
    }

    // ------------------------------------------------------------------
    // Strings
    // ------------------------------------------------------------------

    pub fn get_string(&self, name: &str) -> Result<&str, FieldError> {
        let idx = self.locate(name, ValueKind::String, Cardinality::Singular)?;
        let value = self.singular(idx)?;
        value.as_str().ok_or_else(|| FieldError::FieldKindMismatch {
            field: name.to_string(),
            declared: value.kind(),
            requested: ValueKind::String,
        })
    }

    pub fn get_repeated_string(&self, name: &str, index: i32) -> Result<&str, FieldError> {
        let idx = self.locate(name, ValueKind::String, Cardinality::Repeated)?;
        let values = self.list(idx)?;
        let i = Self::check_index(&self.schema.fields[idx], index, values.len())?;
        values[i].as_str().ok_or_else(|| FieldError::FieldKindMismatch {
            field: name.to_string(),
            declared: values[i].kind(),
            requested: ValueKind::String,
        })
    }

    pub fn set_string(&mut self, name: &str, value: impl Into<String>) -> Result<(), FieldError> {
        self.set_value(name, FieldValue::String(value.into()))
    }

    pub fn set_repeated_string(
        &mut self,
        name: &str,
        index: i32,
        value: impl Into<String>,
    ) -> Result<(), FieldError> {
        self.set_repeated_value(name, index, FieldValue::String(value.into()))
    }

    pub fn add_string(&mut self, name: &str, value: impl Into<String>) -> Result<(), FieldError> {
        self.add_value(name, FieldValue::String(value.into()))
    }

    // ------------------------------------------------------------------
    // Enums
    // ------------------------------------------------------------------

    /// Read an enum field's numeric discriminant.
    pub fn get_enum(&self, name: &str) -> Result<i32, FieldError> {
        let idx = self.locate(name, ValueKind::Enum, Cardinality::Singular)?;
        let value = self.singular(idx)?;
        value.as_enum().ok_or_else(|| FieldError::FieldKindMismatch {
            field: name.to_string(),
            declared: value.kind(),
            requested: ValueKind::Enum,
        })
    }

    pub fn get_repeated_enum(&self, name: &str, index: i32) -> Result<i32, FieldError> {
        let idx = self.locate(name, ValueKind::Enum, Cardinality::Repeated)?;
        let values = self.list(idx)?;
        let i = Self::check_index(&self.schema.fields[idx], index, values.len())?;
        values[i].as_enum().ok_or_else(|| FieldError::FieldKindMismatch {
            field: name.to_string(),
            declared: values[i].kind(),
            requested: ValueKind::Enum,
        })
    }

    /// Write an enum field. Fails with `EnumValueInvalid` for undeclared numbers.
    pub fn set_enum(&mut self, name: &str, value: i32) -> Result<(), FieldError> {
        self.set_value(name, FieldValue::Enum(value))
    }

    pub fn set_repeated_enum(&mut self, name: &str, index: i32, value: i32) -> Result<(), FieldError> {
        self.set_repeated_value(name, index, FieldValue::Enum(value))
    }

    pub fn add_enum(&mut self, name: &str, value: i32) -> Result<(), FieldError> {
        self.add_value(name, FieldValue::Enum(value))
    }

    // ------------------------------------------------------------------
    // Nested messages
    // ------------------------------------------------------------------

    fn message_ref<'a>(field: &str, value: &'a FieldValue) -> Result<&'a DynamicMessage, FieldError> {
        value.as_message().ok_or_else(|| FieldError::FieldKindMismatch {
            field: field.to_string(),
            declared: value.kind(),
            requested: ValueKind::Message,
        })
    }

    fn message_mut<'a>(
        field: &str,
        value: &'a mut FieldValue,
    ) -> Result<&'a mut DynamicMessage, FieldError> {
        let declared = value.kind();
        value
            .as_message_mut()
            .ok_or_else(|| FieldError::FieldKindMismatch {
                field: field.to_string(),
                declared,
                requested: ValueKind::Message,
            })
    }

    /// Borrow a singular nested message.
    ///
    /// An unset field yields its default instance. The handle borrows `self`,
    /// so it cannot outlive the parent:
    ///
    /// ```compile_fail
    /// use usermsg::dynamic::{DynamicMessage, FieldKind, MessageSchema};
    ///
    /// let color = MessageSchema::builder("Color").field("r", 1, FieldKind::Int32).build().unwrap();
    /// let fade = MessageSchema::builder("Fade")
    ///     .field("clr", 1, FieldKind::Message(color))
    ///     .build()
    ///     .unwrap();
    /// let msg = DynamicMessage::new(&fade);
    /// let clr = msg.get_message("clr").unwrap();
    /// drop(msg);
    /// let _ = clr.get_int32("r");
    /// ```
    pub fn get_message(&self, name: &str) -> Result<&DynamicMessage, FieldError> {
        let idx = self.locate(name, ValueKind::Message, Cardinality::Singular)?;
        Self::message_ref(name, self.singular(idx)?)
    }

    /// Mutably borrow a singular nested message, marking it present.
    pub fn mutable_message(&mut self, name: &str) -> Result<&mut DynamicMessage, FieldError> {
        let idx = self.locate(name, ValueKind::Message, Cardinality::Singular)?;
        Self::message_mut(name, self.singular_mut(idx)?)
    }

    /// Borrow one nested message of a repeated field.
    pub fn get_repeated_message(&self, name: &str, index: i32) -> Result<&DynamicMessage, FieldError> {
        let value = {
            let idx = self.locate(name, ValueKind::Message, Cardinality::Repeated)?;
            let values = self.list(idx)?;
            let i = Self::check_index(&self.schema.fields[idx], index, values.len())?;
            &values[i]
        };
        Self::message_ref(name, value)
    }

    /// Mutably borrow one nested message of a repeated field.
    ///
    /// `index == len` appends a new default message; anything past that is
    /// `IndexOutOfRange`.
    pub fn mutable_repeated_message(
        &mut self,
        name: &str,
        index: i32,
    ) -> Result<&mut DynamicMessage, FieldError> {
        let idx = self.locate(name, ValueKind::Message, Cardinality::Repeated)?;
        let schema = Arc::clone(&self.schema);
        let field = &schema.fields[idx];
        let values = self.list_mut(idx)?;
        let len = values.len();
        let i = usize::try_from(index)
            .ok()
            .filter(|&i| i <= len)
            .ok_or_else(|| FieldError::IndexOutOfRange {
                field: field.name.clone(),
                index,
                len,
            })?;
        if i == len {
            values.push(default_for_kind(&field.kind));
        }
        Self::message_mut(name, &mut values[i])
    }

    /// Append a default nested message to a repeated field and borrow it.
    pub fn add_message(&mut self, name: &str) -> Result<&mut DynamicMessage, FieldError> {
        let len = self.repeated_length(name)?;
        let index = i32::try_from(len).map_err(|_| FieldError::IndexOutOfRange {
            field: name.to_string(),
            index: i32::MAX,
            len,
        })?;
        self.mutable_repeated_message(name, index)
    }
}

/// Macro to generate the per-kind accessor table over the generic core.
macro_rules! impl_kind_accessors {
    ($($ty:ty => $get:ident, $get_repeated:ident, $set:ident, $set_repeated:ident, $add:ident);* $(;)?) => {
        impl DynamicMessage {
            $(
                #[doc = concat!("Read a singular `", stringify!($ty), "` field.")]
                pub fn $get(&self, name: &str) -> Result<$ty, FieldError> {
                    self.get::<$ty>(name)
                }

                #[doc = concat!("Read one slot of a repeated `", stringify!($ty), "` field.")]
                pub fn $get_repeated(&self, name: &str, index: i32) -> Result<$ty, FieldError> {
                    self.get_repeated::<$ty>(name, index)
                }

                #[doc = concat!("Write a singular `", stringify!($ty), "` field.")]
                pub fn $set(&mut self, name: &str, value: $ty) -> Result<(), FieldError> {
                    self.set::<$ty>(name, value)
                }

                #[doc = concat!("Overwrite one slot of a repeated `", stringify!($ty), "` field.")]
                pub fn $set_repeated(&mut self, name: &str, index: i32, value: $ty) -> Result<(), FieldError> {
                    self.set_repeated::<$ty>(name, index, value)
                }

                #[doc = concat!("Append to a repeated `", stringify!($ty), "` field.")]
                pub fn $add(&mut self, name: &str, value: $ty) -> Result<(), FieldError> {
                    self.add::<$ty>(name, value)
                }
            )*
        }
    };
}

impl_kind_accessors! {
    i32 => get_int32, get_repeated_int32, set_int32, set_repeated_int32, add_int32;
    i64 => get_int64, get_repeated_int64, set_int64, set_repeated_int64, add_int64;
    u32 => get_uint32, get_repeated_uint32, set_uint32, set_repeated_uint32, add_uint32;
    u64 => get_uint64, get_repeated_uint64, set_uint64, set_repeated_uint64, add_uint64;
    f32 => get_float, get_repeated_float, set_float, set_repeated_float, add_float;
    f64 => get_double, get_repeated_double, set_double, set_repeated_double, add_double;
    bool => get_bool, get_repeated_bool, set_bool, set_repeated_bool, add_bool;
}

impl PartialEq for DynamicMessage {
    fn eq(&self, other: &Self) -> bool {
        // Messages are equal if schemas match and all slots are equal
        self.schema == other.schema && self.slots == other.slots
    }
}

/// Builder for creating DynamicMessage with initial values.
pub struct DynamicMessageBuilder {
    msg: DynamicMessage,
}

impl DynamicMessageBuilder {
    /// Create a new builder for the given schema.
    pub fn new(schema: &Arc<MessageSchema>) -> Self {
        Self {
            msg: DynamicMessage::new(schema),
        }
    }

    /// Set a singular scalar field.
    pub fn set<T: ScalarValue>(mut self, name: &str, value: T) -> Result<Self, FieldError> {
        self.msg.set(name, value)?;
        Ok(self)
    }

    /// Append to a repeated scalar field.
    pub fn add<T: ScalarValue>(mut self, name: &str, value: T) -> Result<Self, FieldError> {
        self.msg.add(name, value)?;
        Ok(self)
    }

    /// Set a singular field from a raw value (enums, nested messages).
    pub fn set_value(mut self, name: &str, value: FieldValue) -> Result<Self, FieldError> {
        self.msg.set_value(name, value)?;
        Ok(self)
    }

    /// Build the message; unset fields keep their defaults.
    pub fn build(self) -> DynamicMessage {
        self.msg
    }
}
