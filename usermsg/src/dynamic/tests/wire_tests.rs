//! Tests for protobuf wire encoding and decoding.

use super::{all_kinds_schema, point_schema};
use crate::dynamic::{DynamicMessage, FieldError};

#[test]
fn test_unset_fields_are_not_written() {
    let schema = all_kinds_schema();
    let msg = DynamicMessage::new(&schema);
    assert!(msg.encode().is_empty());
}

#[test]
fn test_known_encoding() {
    let schema = point_schema();
    let mut msg = DynamicMessage::new(&schema);
    msg.set_int32("x", 150).unwrap();
    assert_eq!(msg.encode(), vec![0x08, 0x96, 0x01]);

    // Explicitly set zero is still written
    msg.set_int32("y", 0).unwrap();
    assert_eq!(msg.encode(), vec![0x08, 0x96, 0x01, 0x10, 0x00]);
}

#[test]
fn test_nested_and_repeated_encoding() {
    let schema = all_kinds_schema();
    let mut msg = DynamicMessage::new(&schema);
    msg.mutable_message("origin").unwrap().set_int32("x", 1).unwrap();
    msg.add_string("params", "ab").unwrap();
    msg.add_string("params", "c").unwrap();

    assert_eq!(
        msg.encode(),
        vec![
            0x52, 0x02, 0x08, 0x01, // origin { x: 1 }
            0x92, 0x01, 0x02, b'a', b'b', // params[0]
            0x92, 0x01, 0x01, b'c', // params[1]
        ]
    );
}

#[test]
fn test_encode_decode_preserves_values() {
    let schema = all_kinds_schema();
    let mut msg = DynamicMessage::new(&schema);
    msg.set_int32("i32", -5).unwrap();
    msg.set_uint64("u64", u64::MAX).unwrap();
    msg.set_float("f32", 0.5).unwrap();
    msg.set_string("text", "héllo").unwrap();
    msg.set_enum("color", 5).unwrap();
    msg.mutable_message("origin").unwrap().set_int32("y", -2).unwrap();
    msg.add_bool("flags", false).unwrap();
    msg.add_bool("flags", true).unwrap();
    msg.add_message("path").unwrap().set_int32("x", 9).unwrap();

    let decoded = DynamicMessage::decode(&msg.encode(), &schema).unwrap();
    assert_eq!(decoded, msg);
    assert_eq!(decoded.get_string("text").unwrap(), "héllo");
    assert_eq!(decoded.get_message("origin").unwrap().get_int32("y").unwrap(), -2);
    assert!(!decoded.has_field("i64").unwrap());
}

#[test]
fn test_decode_packed_repeated() {
    let schema = all_kinds_schema();
    // items (11), packed: 1, 2, 3
    let bytes = [0x5A, 0x03, 0x01, 0x02, 0x03];
    let msg = DynamicMessage::decode(&bytes, &schema).unwrap();
    assert_eq!(msg.repeated_length("items").unwrap(), 3);
    assert_eq!(msg.get_repeated_int32("items", 2).unwrap(), 3);
}

#[test]
fn test_decode_skips_unknown_fields() {
    let schema = point_schema();
    // field 7 varint, field 9 length-delimited, then x = 4
    let bytes = [0x38, 0x01, 0x4A, 0x02, 0xFF, 0xFF, 0x08, 0x04];
    let msg = DynamicMessage::decode(&bytes, &schema).unwrap();
    assert_eq!(msg.get_int32("x").unwrap(), 4);
    assert!(!msg.has_field("y").unwrap());
}

#[test]
fn test_decode_errors() {
    let schema = point_schema();

    // Truncated varint
    assert!(matches!(
        DynamicMessage::decode(&[0x08, 0x96], &schema),
        Err(FieldError::Decode { .. })
    ));
    // Wrong wire type for a nested message
    let all = all_kinds_schema();
    assert!(matches!(
        DynamicMessage::decode(&[0x50, 0x01], &all),
        Err(FieldError::Decode { .. })
    ));
    // Nested length past the end
    assert!(matches!(
        DynamicMessage::decode(&[0x52, 0x05, 0x08], &all),
        Err(FieldError::Decode { .. })
    ));
}

#[test]
fn test_decode_rejects_undeclared_enum() {
    let schema = all_kinds_schema();
    // color (9) = 2, not a Color constant
    assert!(matches!(
        DynamicMessage::decode(&[0x48, 0x02], &schema),
        Err(FieldError::EnumValueInvalid { value: 2, .. })
    ));
}

#[test]
fn test_repeated_nested_occurrences_merge() {
    let schema = all_kinds_schema();
    // origin { x: 1 } followed by origin { y: 2 }
    let bytes = [0x52, 0x02, 0x08, 0x01, 0x52, 0x02, 0x10, 0x02];
    let msg = DynamicMessage::decode(&bytes, &schema).unwrap();
    let origin = msg.get_message("origin").unwrap();
    assert_eq!(origin.get_int32("x").unwrap(), 1);
    assert_eq!(origin.get_int32("y").unwrap(), 2);
}

#[test]
fn test_merge_into_populated_message() {
    let schema = all_kinds_schema();
    let mut msg = DynamicMessage::new(&schema);
    msg.set_int32("i32", 7).unwrap();
    msg.add_string("params", "a").unwrap();

    let mut update = DynamicMessage::new(&schema);
    update.add_string("params", "b").unwrap();
    update.mutable_message("origin").unwrap().set_int32("y", 3).unwrap();
    msg.merge(&update.encode()).unwrap();

    assert_eq!(msg.get_int32("i32").unwrap(), 7);
    assert_eq!(msg.repeated_length("params").unwrap(), 2);
    assert_eq!(msg.get_repeated_string("params", 1).unwrap(), "b");
    assert_eq!(msg.get_message("origin").unwrap().get_int32("y").unwrap(), 3);
}
