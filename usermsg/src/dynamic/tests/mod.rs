//! Tests for the dynamic field-access engine.

mod schema_tests;
mod wire_tests;

use std::sync::Arc;

use crate::dynamic::{EnumSchema, FieldKind, MessageSchema};

pub(super) fn color_enum() -> Arc<EnumSchema> {
    EnumSchema::builder("Color")
        .constant("RED", 0)
        .constant("GREEN", 1)
        .constant("BLUE", 5)
        .build()
        .unwrap()
}

pub(super) fn point_schema() -> Arc<MessageSchema> {
    MessageSchema::builder("Point")
        .field("x", 1, FieldKind::Int32)
        .field("y", 2, FieldKind::Int32)
        .build()
        .unwrap()
}

/// One singular and one repeated field of every kind.
pub(super) fn all_kinds_schema() -> Arc<MessageSchema> {
    MessageSchema::builder("AllKinds")
        .field("i32", 1, FieldKind::Int32)
        .field("i64", 2, FieldKind::Int64)
        .field("u32", 3, FieldKind::Uint32)
        .field("u64", 4, FieldKind::Uint64)
        .field("f32", 5, FieldKind::Float)
        .field("f64", 6, FieldKind::Double)
        .field("flag", 7, FieldKind::Bool)
        .field("text", 8, FieldKind::String)
        .field("color", 9, FieldKind::Enum(color_enum()))
        .field("origin", 10, FieldKind::Message(point_schema()))
        .repeated("items", 11, FieldKind::Int32)
        .repeated("big", 12, FieldKind::Int64)
        .repeated("ids", 13, FieldKind::Uint32)
        .repeated("wide_ids", 14, FieldKind::Uint64)
        .repeated("weights", 15, FieldKind::Float)
        .repeated("scores", 16, FieldKind::Double)
        .repeated("flags", 17, FieldKind::Bool)
        .repeated("params", 18, FieldKind::String)
        .repeated("palette", 19, FieldKind::Enum(color_enum()))
        .repeated("path", 20, FieldKind::Message(point_schema()))
        .build()
        .unwrap()
}
