//! Runtime representation of field values.
//!
//! [`FieldValue`] is the tagged union every accessor funnels through. The
//! [`ScalarValue`] trait ties each Rust scalar type to exactly one
//! [`ValueKind`], which is what keeps the typed accessors from coercing across
//! kinds.

use super::message::DynamicMessage;
use super::schema::{FieldKind, ValueKind};

/// Runtime representation of one field value.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Int32(i32),
    Int64(i64),
    Uint32(u32),
    Uint64(u64),
    Float(f32),
    Double(f64),
    Bool(bool),
    String(String),
    /// Enum discriminant
    Enum(i32),
    /// Nested message
    Message(Box<DynamicMessage>),
}

/// Macro to generate accessor methods for primitive types.
macro_rules! impl_primitive_accessors {
    ($($method:ident -> $variant:ident : $ty:ty),* $(,)?) => {
        impl FieldValue {
            $(
                #[doc = concat!("Try to extract as ", stringify!($ty), ".")]
                pub fn $method(&self) -> Option<$ty> {
                    match self {
                        FieldValue::$variant(v) => Some(*v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

impl_primitive_accessors! {
    as_i32 -> Int32: i32,
    as_i64 -> Int64: i64,
    as_u32 -> Uint32: u32,
    as_u64 -> Uint64: u64,
    as_f32 -> Float: f32,
    as_f64 -> Double: f64,
    as_bool -> Bool: bool,
    as_enum -> Enum: i32,
}

impl FieldValue {
    /// Kind tag of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            FieldValue::Int32(_) => ValueKind::Int32,
            FieldValue::Int64(_) => ValueKind::Int64,
            FieldValue::Uint32(_) => ValueKind::Uint32,
            FieldValue::Uint64(_) => ValueKind::Uint64,
            FieldValue::Float(_) => ValueKind::Float,
            FieldValue::Double(_) => ValueKind::Double,
            FieldValue::Bool(_) => ValueKind::Bool,
            FieldValue::String(_) => ValueKind::String,
            FieldValue::Enum(_) => ValueKind::Enum,
            FieldValue::Message(_) => ValueKind::Message,
        }
    }

    /// Try to extract as a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Try to extract as a message reference.
    pub fn as_message(&self) -> Option<&DynamicMessage> {
        match self {
            FieldValue::Message(v) => Some(v),
            _ => None,
        }
    }

    /// Try to extract as a mutable message reference.
    pub fn as_message_mut(&mut self) -> Option<&mut DynamicMessage> {
        match self {
            FieldValue::Message(v) => Some(v),
            _ => None,
        }
    }
}

/// A Rust type bound to exactly one scalar [`ValueKind`].
pub trait ScalarValue: Sized {
    const KIND: ValueKind;

    fn into_value(self) -> FieldValue;

    fn from_value(value: &FieldValue) -> Option<Self>;
}

/// Macro to implement ScalarValue for copyable primitives.
macro_rules! impl_scalar_value {
    ($($ty:ty => $variant:ident, $accessor:ident);* $(;)?) => {
        $(
            impl ScalarValue for $ty {
                const KIND: ValueKind = ValueKind::$variant;

                fn into_value(self) -> FieldValue {
                    FieldValue::$variant(self)
                }

                fn from_value(value: &FieldValue) -> Option<Self> {
                    value.$accessor()
                }
            }
        )*
    };
}

impl_scalar_value! {
    i32 => Int32, as_i32;
    i64 => Int64, as_i64;
    u32 => Uint32, as_u32;
    u64 => Uint64, as_u64;
    f32 => Float, as_f32;
    f64 => Double, as_f64;
    bool => Bool, as_bool;
}

impl ScalarValue for String {
    const KIND: ValueKind = ValueKind::String;

    fn into_value(self) -> FieldValue {
        FieldValue::String(self)
    }

    fn from_value(value: &FieldValue) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

/// Create the default value for a given field kind.
///
/// Enums default to their first declared constant, nested messages to an
/// instance with every field at its default.
pub fn default_for_kind(kind: &FieldKind) -> FieldValue {
    match kind {
        FieldKind::Int32 => FieldValue::Int32(0),
        FieldKind::Int64 => FieldValue::Int64(0),
        FieldKind::Uint32 => FieldValue::Uint32(0),
        FieldKind::Uint64 => FieldValue::Uint64(0),
        FieldKind::Float => FieldValue::Float(0.0),
        FieldKind::Double => FieldValue::Double(0.0),
        FieldKind::Bool => FieldValue::Bool(false),
        FieldKind::String => FieldValue::String(String::new()),
        FieldKind::Enum(schema) => FieldValue::Enum(schema.default_number()),
        FieldKind::Message(schema) => FieldValue::Message(Box::new(DynamicMessage::new(schema))),
    }
}
