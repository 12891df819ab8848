//! Tests for schema construction and validation.

use std::str::FromStr;

use strum::IntoEnumIterator;

use super::{all_kinds_schema, color_enum};
use crate::dynamic::{
    Cardinality, EnumSchema, FieldError, FieldKind, FieldValue, MessageSchema, ValueKind,
};

#[test]
fn test_schema_lookup() {
    let schema = all_kinds_schema();

    assert_eq!(schema.field_count(), 20);
    let field = schema.field("palette").unwrap();
    assert_eq!(field.number, 19);
    assert_eq!(field.cardinality, Cardinality::Repeated);
    assert_eq!(field.kind.value_kind(), ValueKind::Enum);
    assert_eq!(schema.field_index("i64"), Some(1));
    assert_eq!(schema.field_index_by_number(10), Some(9));
    assert!(schema.field("missing").is_none());

    let origin = schema.field("origin").unwrap();
    assert!(!origin.kind.is_scalar());
    assert_eq!(origin.kind.message_schema().unwrap().name, "Point");
}

#[test]
fn test_duplicate_names_and_numbers_rejected() {
    let err = MessageSchema::builder("Dup")
        .field("a", 1, FieldKind::Int32)
        .field("a", 2, FieldKind::Int32)
        .build()
        .unwrap_err();
    assert!(matches!(err, FieldError::InvalidSchema { ref reason, .. } if reason.contains("'a'")));

    let err = MessageSchema::builder("Dup")
        .field("a", 1, FieldKind::Int32)
        .field("b", 1, FieldKind::Int32)
        .build()
        .unwrap_err();
    assert!(matches!(err, FieldError::InvalidSchema { .. }));
}

#[test]
fn test_invalid_field_numbers_rejected() {
    for number in [0, 19000, 19999, 1 << 29] {
        let result = MessageSchema::builder("Bad")
            .field("a", number, FieldKind::Bool)
            .build();
        assert!(result.is_err(), "number {} accepted", number);
    }
    assert!(
        MessageSchema::builder("Ok")
            .field("a", (1 << 29) - 1, FieldKind::Bool)
            .build()
            .is_ok()
    );
}

#[test]
fn test_defaults_validated() {
    let wrong_kind = MessageSchema::builder("Bad")
        .field_with_default("a", 1, FieldKind::Int32, FieldValue::Bool(true))
        .build();
    assert!(matches!(wrong_kind, Err(FieldError::InvalidSchema { .. })));

    let undeclared = MessageSchema::builder("Bad")
        .field_with_default("c", 1, FieldKind::Enum(color_enum()), FieldValue::Enum(3))
        .build();
    assert!(matches!(undeclared, Err(FieldError::InvalidSchema { .. })));

    let ok = MessageSchema::builder("Good")
        .field_with_default("c", 1, FieldKind::Enum(color_enum()), FieldValue::Enum(5))
        .build();
    assert!(ok.is_ok());
}

#[test]
fn test_enum_schema() {
    let color = color_enum();
    assert!(color.contains(5));
    assert!(!color.contains(2));
    assert_eq!(color.name_of(1), Some("GREEN"));
    assert_eq!(color.number_of("BLUE"), Some(5));
    assert_eq!(color.default_number(), 0);

    assert!(EnumSchema::builder("Empty").build().is_err());
    assert!(
        EnumSchema::builder("Twice")
            .constant("A", 0)
            .constant("A", 1)
            .build()
            .is_err()
    );
}

#[test]
fn test_value_kind_names() {
    assert_eq!(ValueKind::Uint64.to_string(), "uint64");
    assert_eq!(ValueKind::from_str("double").unwrap(), ValueKind::Double);
    assert_eq!(ValueKind::iter().count(), 10);
}

#[test]
fn test_schema_equality_by_name() {
    let a = MessageSchema::builder("Same").field("x", 1, FieldKind::Int32).build().unwrap();
    let b = MessageSchema::builder("Same").field("y", 2, FieldKind::Bool).build().unwrap();
    assert_eq!(*a, *b);
}
