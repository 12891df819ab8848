//! Populate dynamic messages from JSON trees and render them back.
//!
//! Objects map to messages, arrays to repeated fields, `null` leaves a field
//! at its default. Every value still passes through the typed setters, so a
//! JSON string aimed at an `int32` field is a `FieldKindMismatch`, exactly
//! as `set_string` on that field would be.

use serde_json::{Map, Number, Value};

use super::error::FieldError;
use super::message::{DynamicMessage, FieldEntry};
use super::schema::{FieldKind, FieldSchema, ValueKind};
use super::value::FieldValue;

fn json_kind(value: &Value) -> ValueKind {
    match value {
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(n) if n.is_u64() => ValueKind::Uint64,
        Value::Number(n) if n.is_i64() => ValueKind::Int64,
        Value::Number(_) => ValueKind::Double,
        Value::String(_) => ValueKind::String,
        Value::Object(_) | Value::Array(_) | Value::Null => ValueKind::Message,
    }
}

fn mismatch(field: &FieldSchema, value: &Value) -> FieldError {
    FieldError::FieldKindMismatch {
        field: field.name.clone(),
        declared: field.kind.value_kind(),
        requested: json_kind(value),
    }
}

fn out_of_range(field: &FieldSchema, value: &Value) -> FieldError {
    FieldError::ValueOutOfRange {
        field: field.name.clone(),
        kind: field.kind.value_kind(),
        value: value.to_string(),
    }
}

/// Signed view of a JSON integer. Integers past `i64::MAX` are out of range
/// for every signed kind, not a kind mismatch.
fn signed(field: &FieldSchema, value: &Value, n: &Number) -> Result<i64, FieldError> {
    match n.as_i64() {
        Some(v) => Ok(v),
        None if n.is_u64() => Err(out_of_range(field, value)),
        None => Err(mismatch(field, value)),
    }
}

/// Convert one JSON scalar to the field's declared kind.
fn scalar_value(field: &FieldSchema, value: &Value) -> Result<FieldValue, FieldError> {
    let converted = match (&field.kind, value) {
        (FieldKind::Int32, Value::Number(n)) => {
            let v = signed(field, value, n)?;
            FieldValue::Int32(i32::try_from(v).map_err(|_| out_of_range(field, value))?)
        }
        (FieldKind::Int64, Value::Number(n)) => FieldValue::Int64(signed(field, value, n)?),
        (FieldKind::Uint32, Value::Number(n)) => {
            if n.is_i64() && !n.is_u64() {
                return Err(out_of_range(field, value));
            }
            let v = n.as_u64().ok_or_else(|| mismatch(field, value))?;
            FieldValue::Uint32(u32::try_from(v).map_err(|_| out_of_range(field, value))?)
        }
        (FieldKind::Uint64, Value::Number(n)) => {
            if n.is_i64() && !n.is_u64() {
                return Err(out_of_range(field, value));
            }
            FieldValue::Uint64(n.as_u64().ok_or_else(|| mismatch(field, value))?)
        }
        (FieldKind::Float, Value::Number(n)) => {
            let wide = n.as_f64().ok_or_else(|| mismatch(field, value))?;
            let narrow = wide as f32;
            if wide.is_finite() && narrow.is_infinite() {
                return Err(out_of_range(field, value));
            }
            FieldValue::Float(narrow)
        }
        (FieldKind::Double, Value::Number(n)) => {
            FieldValue::Double(n.as_f64().ok_or_else(|| mismatch(field, value))?)
        }
        (FieldKind::Bool, Value::Bool(b)) => FieldValue::Bool(*b),
        (FieldKind::String, Value::String(s)) => FieldValue::String(s.clone()),
        (FieldKind::Enum(_), Value::Number(n)) => {
            let v = signed(field, value, n)?;
            FieldValue::Enum(i32::try_from(v).map_err(|_| out_of_range(field, value))?)
        }
        (FieldKind::Enum(schema), Value::String(name)) => {
            let number = schema
                .number_of(name)
                .ok_or_else(|| FieldError::EnumNameInvalid {
                    field: field.name.clone(),
                    enum_name: schema.name.clone(),
                    name: name.clone(),
                })?;
            FieldValue::Enum(number)
        }
        _ => return Err(mismatch(field, value)),
    };
    Ok(converted)
}

fn populate_field(msg: &mut DynamicMessage, field: &FieldSchema, value: &Value) -> Result<(), FieldError> {
    if value.is_null() {
        return Ok(());
    }

    match (field.is_repeated(), value) {
        (true, Value::Array(items)) => {
            msg.clear_field(&field.name)?;
            for item in items {
                match &field.kind {
                    FieldKind::Message(_) => populate_in_place(msg.add_message(&field.name)?, item)?,
                    _ => msg.add_value(&field.name, scalar_value(field, item)?)?,
                }
            }
            Ok(())
        }
        (true, _) => Err(FieldError::FieldIsRepeated(field.name.clone())),
        (false, Value::Array(_)) => Err(FieldError::FieldIsSingular(field.name.clone())),
        (false, _) => match &field.kind {
            FieldKind::Message(_) => populate_in_place(msg.mutable_message(&field.name)?, value),
            _ => msg.set_value(&field.name, scalar_value(field, value)?),
        },
    }
}

/// Set every field named in the JSON object `data` on `msg`.
///
/// Fields absent from `data` are left untouched. On error `msg` is left
/// exactly as it was.
pub fn populate(msg: &mut DynamicMessage, data: &Value) -> Result<(), FieldError> {
    let mut staged = msg.clone();
    populate_in_place(&mut staged, data)?;
    *msg = staged;
    Ok(())
}

fn populate_in_place(msg: &mut DynamicMessage, data: &Value) -> Result<(), FieldError> {
    let Value::Object(entries) = data else {
        return Err(FieldError::FieldKindMismatch {
            field: msg.schema().name.clone(),
            declared: ValueKind::Message,
            requested: json_kind(data),
        });
    };

    let schema = msg.schema_arc();
    for (name, value) in entries {
        let field = schema.field(name).ok_or_else(|| FieldError::FieldNotFound {
            message: schema.name.clone(),
            field: name.clone(),
        })?;
        populate_field(msg, field, value)?;
    }
    Ok(())
}

fn value_to_json(field: &FieldSchema, value: &FieldValue) -> Value {
    match value {
        FieldValue::Int32(v) => Value::from(*v),
        FieldValue::Int64(v) => Value::from(*v),
        FieldValue::Uint32(v) => Value::from(*v),
        FieldValue::Uint64(v) => Value::from(*v),
        FieldValue::Float(v) => Value::from(*v),
        FieldValue::Double(v) => Value::from(*v),
        FieldValue::Bool(v) => Value::from(*v),
        FieldValue::String(v) => Value::from(v.as_str()),
        FieldValue::Enum(v) => match field.kind.enum_schema().and_then(|s| s.name_of(*v)) {
            Some(name) => Value::from(name),
            None => Value::from(*v),
        },
        FieldValue::Message(msg) => to_json(msg),
    }
}

/// Render `msg` as a JSON object, every field included.
///
/// Enum values are rendered by constant name.
pub fn to_json(msg: &DynamicMessage) -> Value {
    let mut out = Map::new();
    for entry in msg.fields() {
        let rendered = match entry {
            FieldEntry::Singular { schema, value, .. } => value_to_json(schema, value),
            FieldEntry::Repeated { schema, values } => Value::Array(
                values.iter().map(|v| value_to_json(schema, v)).collect(),
            ),
        };
        out.insert(entry.schema().name.clone(), rendered);
    }
    Value::Object(out)
}

impl DynamicMessage {
    /// See [`populate`].
    pub fn populate_from_json(&mut self, data: &Value) -> Result<(), FieldError> {
        populate(self, data)
    }

    /// See [`to_json`].
    pub fn to_json(&self) -> Value {
        to_json(self)
    }
}
