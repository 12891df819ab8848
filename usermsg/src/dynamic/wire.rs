//! Protobuf wire encoding for dynamic messages.
//!
//! Uses the field-level primitives of `prost::encoding`; the schema supplies
//! the tags and kinds a generated `prost::Message` impl would hard-code.
//! Singular fields are written only when present; repeated scalars are
//! written unpacked and read in either form.

use std::sync::Arc;

use prost::encoding::{self, DecodeContext, WireType};

use super::error::FieldError;
use super::message::{DynamicMessage, FieldEntry};
use super::schema::{FieldKind, FieldSchema, MessageSchema};
use super::value::FieldValue;

fn encode_value(tag: u32, value: &FieldValue, buf: &mut Vec<u8>) {
    match value {
        FieldValue::Int32(v) | FieldValue::Enum(v) => encoding::int32::encode(tag, v, buf),
        FieldValue::Int64(v) => encoding::int64::encode(tag, v, buf),
        FieldValue::Uint32(v) => encoding::uint32::encode(tag, v, buf),
        FieldValue::Uint64(v) => encoding::uint64::encode(tag, v, buf),
        FieldValue::Float(v) => encoding::float::encode(tag, v, buf),
        FieldValue::Double(v) => encoding::double::encode(tag, v, buf),
        FieldValue::Bool(v) => encoding::bool::encode(tag, v, buf),
        FieldValue::String(v) => encoding::string::encode(tag, v, buf),
        FieldValue::Message(msg) => {
            let nested = msg.encode();
            encoding::encode_key(tag, WireType::LengthDelimited, buf);
            encoding::encode_varint(nested.len() as u64, buf);
            buf.extend_from_slice(&nested);
        }
    }
}

/// Split off one length-delimited record.
fn length_delimited<'a>(
    field: &FieldSchema,
    wire_type: WireType,
    buf: &mut &'a [u8],
    message: &str,
) -> Result<&'a [u8], FieldError> {
    let err = |e: prost::DecodeError| FieldError::Decode {
        message: message.to_string(),
        reason: format!("field '{}': {}", field.name, e),
    };
    encoding::check_wire_type(WireType::LengthDelimited, wire_type).map_err(err)?;
    let len = encoding::decode_varint(buf).map_err(err)?;
    let data: &'a [u8] = *buf;
    let len = usize::try_from(len)
        .ok()
        .filter(|&len| len <= data.len())
        .ok_or_else(|| FieldError::Decode {
            message: message.to_string(),
            reason: format!("field '{}': nested length {} overruns buffer", field.name, len),
        })?;
    let (record, rest) = data.split_at(len);
    *buf = rest;
    Ok(record)
}

/// Decode one occurrence of `field`. Packed repeated scalars yield several values.
fn decode_values(
    field: &FieldSchema,
    wire_type: WireType,
    buf: &mut &[u8],
    message: &str,
) -> Result<Vec<FieldValue>, FieldError> {
    let err = |e: prost::DecodeError| FieldError::Decode {
        message: message.to_string(),
        reason: format!("field '{}': {}", field.name, e),
    };

    macro_rules! merge_scalars {
        ($module:ident, $ty:ty, $variant:ident) => {{
            let mut values: Vec<$ty> = Vec::new();
            encoding::$module::merge_repeated(wire_type, &mut values, buf, DecodeContext::default())
                .map_err(err)?;
            values.into_iter().map(FieldValue::$variant).collect()
        }};
    }

    let values = match &field.kind {
        FieldKind::Int32 => merge_scalars!(int32, i32, Int32),
        FieldKind::Int64 => merge_scalars!(int64, i64, Int64),
        FieldKind::Uint32 => merge_scalars!(uint32, u32, Uint32),
        FieldKind::Uint64 => merge_scalars!(uint64, u64, Uint64),
        FieldKind::Float => merge_scalars!(float, f32, Float),
        FieldKind::Double => merge_scalars!(double, f64, Double),
        FieldKind::Bool => merge_scalars!(bool, bool, Bool),
        FieldKind::String => merge_scalars!(string, String, String),
        FieldKind::Enum(_) => merge_scalars!(int32, i32, Enum),
        FieldKind::Message(schema) => {
            let nested = length_delimited(field, wire_type, buf, message)?;
            vec![FieldValue::Message(Box::new(DynamicMessage::decode(
                nested, schema,
            )?))]
        }
    };
    Ok(values)
}

impl DynamicMessage {
    /// Encode to protobuf wire bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_to(&mut buf);
        buf
    }

    /// Append the protobuf encoding to `buf`.
    pub fn encode_to(&self, buf: &mut Vec<u8>) {
        for entry in self.fields() {
            match entry {
                FieldEntry::Singular {
                    schema,
                    value,
                    present: true,
                } => encode_value(schema.number, value, buf),
                FieldEntry::Singular { present: false, .. } => {}
                FieldEntry::Repeated { schema, values } => {
                    for value in values {
                        encode_value(schema.number, value, buf);
                    }
                }
            }
        }
    }

    /// Decode protobuf wire bytes against `schema`.
    ///
    /// Unknown field numbers are skipped. Decoded values go through the same
    /// checks as the setters, so an undeclared enum number is rejected.
    pub fn decode(data: &[u8], schema: &Arc<MessageSchema>) -> Result<Self, FieldError> {
        let mut msg = DynamicMessage::new(schema);
        msg.merge(data)?;
        Ok(msg)
    }

    /// Merge protobuf wire bytes into this message.
    ///
    /// Repeated fields are appended to. A singular nested message is merged
    /// recursively rather than replaced.
    pub fn merge(&mut self, data: &[u8]) -> Result<(), FieldError> {
        let schema = self.schema_arc();
        let mut buf = data;
        let err = |e: prost::DecodeError| FieldError::Decode {
            message: schema.name.clone(),
            reason: e.to_string(),
        };

        while !buf.is_empty() {
            let (tag, wire_type) = encoding::decode_key(&mut buf).map_err(err)?;
            let Some(idx) = schema.field_index_by_number(tag) else {
                encoding::skip_field(wire_type, tag, &mut buf, DecodeContext::default())
                    .map_err(err)?;
                continue;
            };

            let field = &schema.fields[idx];
            if matches!(field.kind, FieldKind::Message(_)) && !field.is_repeated() {
                let nested = length_delimited(field, wire_type, &mut buf, &schema.name)?;
                self.mutable_message(&field.name)?.merge(nested)?;
                continue;
            }
            for value in decode_values(field, wire_type, &mut buf, &schema.name)? {
                if field.is_repeated() {
                    self.add_value(&field.name, value)?;
                } else {
                    self.set_value(&field.name, value)?;
                }
            }
        }
        Ok(())
    }
}
