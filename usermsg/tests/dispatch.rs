use std::sync::Arc;

use serde_json::json;
use usermsg::error::SendFailure;
use usermsg::{
    Builder, ChannelTransport, DeliveredMessage, DialogType, Dispatcher, DispatcherBuilder, Error,
    FieldError, MessageRegistry, RecipientSet,
};

fn dispatcher() -> (Dispatcher, flume::Receiver<DeliveredMessage>) {
    let mut registry = MessageRegistry::bundled().unwrap();
    registry.register_legacy("ShowMenu", 40).unwrap();
    let (transport, rx) = ChannelTransport::pair();
    let dispatcher = DispatcherBuilder::default()
        .with_registry(registry)
        .with_transport(Arc::new(transport))
        .build()
        .unwrap();
    (dispatcher, rx)
}

#[test]
fn test_saytext2_to_one_recipient() {
    let (dispatcher, rx) = dispatcher();

    let mut msg = dispatcher
        .create(Arc::new(RecipientSet::single(1)), "SayText2")
        .unwrap();
    assert!(msg.is_protobuf());
    msg.protobuf_mut().unwrap().set_string("text", "hello").unwrap();
    let receipt = msg.send().unwrap();

    assert_eq!(receipt.message_name, "SayText2");
    assert_eq!(receipt.message_index, 6);
    assert_eq!(receipt.recipients, 1);

    let delivered: Vec<_> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].recipient, 1);
    assert_eq!(delivered[0].message_index, 6);
    assert!(delivered[0].is_protobuf);

    let decoded = delivered[0].decode(&dispatcher.registry()).unwrap();
    assert_eq!(decoded.get_string("text").unwrap(), "hello");
    assert!(!decoded.has_field("ent_idx").unwrap());
}

#[test]
fn test_create_message_vguimenu() {
    let (dispatcher, rx) = dispatcher();

    dispatcher
        .create_message(
            Arc::new(RecipientSet::single(3)),
            "VGUIMenu",
            &json!({"panel_name": "info", "show": true}),
        )
        .unwrap();

    let delivered: Vec<_> = rx.try_iter().collect();
    assert_eq!(delivered.len(), 1);
    let decoded = delivered[0].decode(&dispatcher.registry()).unwrap();
    assert_eq!(decoded.get_string("panel_name").unwrap(), "info");
    assert!(decoded.get_bool("show").unwrap());
    assert_eq!(decoded.repeated_length("subkeys").unwrap(), 0);
}

#[test]
fn test_create_message_with_nested_subkeys() {
    let (dispatcher, rx) = dispatcher();
    let recipients: RecipientSet = (1..=4).collect();

    let receipt = dispatcher
        .create_message(
            Arc::new(recipients),
            "VGUIMenu",
            &json!({
                "panel_name": "info",
                "subkeys": [
                    {"name": "title", "str": "Rules"},
                    {"name": "type", "str": "2"},
                ],
            }),
        )
        .unwrap();
    assert_eq!(receipt.recipients, 4);

    let delivered: Vec<_> = rx.try_iter().collect();
    assert_eq!(
        delivered.iter().map(|m| m.recipient).collect::<Vec<_>>(),
        vec![1, 2, 3, 4]
    );
    let decoded = delivered[2].decode(&dispatcher.registry()).unwrap();
    let subkey = decoded.get_repeated_message("subkeys", 1).unwrap();
    assert_eq!(subkey.get_string("str").unwrap(), "2");
}

#[test]
fn test_create_dialog() {
    let (dispatcher, rx) = dispatcher();

    dispatcher
        .create_dialog(
            Arc::new(RecipientSet::single(2)),
            DialogType::Menu,
            &json!({
                "title": "Pick",
                "level": 1,
                "time": 20,
                "color": {"r": 255, "g": 0, "b": 0, "a": 255},
                "options": [{"msg": "One", "command": "say 1"}],
            }),
        )
        .unwrap();

    let decoded = rx.try_recv().unwrap().decode(&dispatcher.registry()).unwrap();
    assert_eq!(decoded.get_enum("type").unwrap(), DialogType::Menu.value());
    assert_eq!(decoded.to_json()["type"], "MENU");
    assert_eq!(decoded.get_message("color").unwrap().get_int32("r").unwrap(), 255);
    assert_eq!(
        decoded
            .get_repeated_message("options", 0)
            .unwrap()
            .get_string("command")
            .unwrap(),
        "say 1"
    );
}

#[test]
fn test_unknown_type_is_rejected() {
    let (dispatcher, rx) = dispatcher();
    let err = dispatcher
        .create_message(Arc::new(RecipientSet::single(1)), "NoSuchMessage", &json!({}))
        .unwrap_err();
    assert!(matches!(err, Error::UnknownMessageType(name) if name == "NoSuchMessage"));
    assert!(rx.is_empty());
}

#[test]
fn test_bad_data_is_not_sent() {
    let (dispatcher, rx) = dispatcher();
    let err = dispatcher
        .create_message(
            Arc::new(RecipientSet::single(1)),
            "SayText2",
            &json!({"text": 12}),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Field(FieldError::FieldKindMismatch { .. })
    ));
    assert!(rx.is_empty());
}

#[test]
fn test_empty_recipients_fail_send() {
    let (dispatcher, rx) = dispatcher();
    let err = dispatcher
        .create_message(Arc::new(RecipientSet::new()), "SayText2", &json!({"text": "x"}))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SendFailed {
            reason: SendFailure::NoRecipients,
            ..
        }
    ));
    assert!(rx.is_empty());
}

#[test]
fn test_transport_failure_is_one_aggregate_error() {
    let (dispatcher, rx) = dispatcher();
    drop(rx);
    let err = dispatcher
        .create_message(Arc::new(RecipientSet::single(1)), "HintText", &json!({"text": "x"}))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::SendFailed {
            reason: SendFailure::Transport(_),
            ..
        }
    ));
}

#[test]
fn test_legacy_message_through_dispatcher() {
    let (dispatcher, rx) = dispatcher();

    let mut msg = dispatcher
        .create(Arc::new(RecipientSet::single(5).with_reliable(true)), "ShowMenu")
        .unwrap();
    assert!(!msg.is_protobuf());
    assert!(matches!(
        msg.populate(&json!({"text": "x"})),
        Err(Error::BufferKindMismatch { .. })
    ));
    msg.legacy_mut().unwrap().write_string("->1. Go").unwrap();
    msg.send().unwrap();

    let delivered = rx.try_recv().unwrap();
    assert!(delivered.reliable);
    assert!(matches!(
        delivered.decode(&dispatcher.registry()),
        Err(Error::BufferKindMismatch { .. })
    ));
    assert_eq!(
        delivered.legacy_reader().unwrap().read_string().unwrap(),
        "->1. Go"
    );
}

#[test]
fn test_runtime_registration() {
    let (dispatcher, rx) = dispatcher();
    let schema = usermsg::MessageSchema::builder("CCSUsrMsg_Rumble")
        .field("index", 1, usermsg::FieldKind::Int32)
        .field("data", 2, usermsg::FieldKind::Int32)
        .field("flags", 3, usermsg::FieldKind::Int32)
        .build()
        .unwrap();
    dispatcher.register_protobuf("Rumble", 19, schema).unwrap();
    assert!(matches!(
        dispatcher.register_legacy("Other", 19),
        Err(Error::DuplicateMessageIndex { index: 19, .. })
    ));

    dispatcher
        .create_message(Arc::new(RecipientSet::single(1)), "Rumble", &json!({"data": 3}))
        .unwrap();
    let decoded = rx.try_recv().unwrap().decode(&dispatcher.registry()).unwrap();
    assert_eq!(decoded.get_int32("data").unwrap(), 3);
}

#[test]
fn test_failed_populate_keeps_envelope_contents() {
    let (dispatcher, rx) = dispatcher();

    let mut msg = dispatcher
        .create(Arc::new(RecipientSet::single(1)), "SayText2")
        .unwrap();
    msg.protobuf_mut().unwrap().add_string("params", "keep").unwrap();
    assert!(matches!(
        msg.populate(&json!({"chat": true, "params": ["new", 5]})),
        Err(Error::Field(FieldError::FieldKindMismatch { .. }))
    ));
    msg.send().unwrap();

    let decoded = rx.try_recv().unwrap().decode(&dispatcher.registry()).unwrap();
    assert!(!decoded.has_field("chat").unwrap());
    assert_eq!(decoded.repeated_length("params").unwrap(), 1);
    assert_eq!(decoded.get_repeated_string("params", 0).unwrap(), "keep");
}
