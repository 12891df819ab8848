//! User message type registry.
//!
//! Maps a message type name to its numeric index and wire format. The
//! envelope resolves names here; receivers resolve indices here.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use strum::IntoEnumIterator;
use tracing::{debug, error};

use crate::dynamic::{EnumConstant, EnumSchema, FieldError, FieldKind, MessageSchema};
use crate::error::{Error, Result};

/// How a registered message type is carried on the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageFormat {
    /// Structured message described by a schema
    Protobuf(Arc<MessageSchema>),
    /// Bit-packed legacy buffer
    Legacy,
}

/// One registered user message type.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisteredMessage {
    pub name: String,
    pub index: i32,
    pub format: MessageFormat,
}

impl RegisteredMessage {
    pub fn is_protobuf(&self) -> bool {
        matches!(self.format, MessageFormat::Protobuf(_))
    }

    pub fn schema(&self) -> Option<&Arc<MessageSchema>> {
        match &self.format {
            MessageFormat::Protobuf(schema) => Some(schema),
            MessageFormat::Legacy => None,
        }
    }
}

/// Presentation kinds for plugin dialogs.
///
/// The discriminants are the engine's values and are sent as-is.
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
    strum::FromRepr,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[repr(i32)]
pub enum DialogType {
    /// Just an on screen message
    Msg = 0,
    /// An options menu
    Menu = 1,
    /// A richtext dialog
    Text = 2,
    /// An entry box
    Entry = 3,
    /// Ask the client to connect to a specified IP address
    AskConnect = 4,
}

impl DialogType {
    pub fn value(self) -> i32 {
        self as i32
    }

    /// Enum schema used by the `Dialog` message's `type` field.
    pub fn enum_schema() -> Arc<EnumSchema> {
        Arc::new(EnumSchema {
            name: "DIALOG_TYPE".to_string(),
            constants: DialogType::iter()
                .map(|d| EnumConstant {
                    name: d.to_string(),
                    number: d.value(),
                })
                .collect(),
        })
    }
}

/// Registry of user message types, keyed by name and by index.
#[derive(Clone, Debug, Default)]
pub struct MessageRegistry {
    by_name: HashMap<String, RegisteredMessage>,
    by_index: HashMap<i32, String>,
}

impl MessageRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the bundled user messages.
    pub fn bundled() -> Result<Self> {
        let mut registry = Self::new();
        for (name, index, schema) in bundled_messages()? {
            registry.register_protobuf(name, index, schema)?;
        }
        debug!("[REG] Bundled registry ready: {} types", registry.len());
        Ok(registry)
    }

    /// Get the process-wide registry (lazily initialised from [`bundled`]).
    ///
    /// [`bundled`]: MessageRegistry::bundled
    pub fn global() -> &'static RwLock<MessageRegistry> {
        static REGISTRY: OnceLock<RwLock<MessageRegistry>> = OnceLock::new();
        REGISTRY.get_or_init(|| {
            let registry = MessageRegistry::bundled().unwrap_or_else(|e| {
                error!("[REG] Failed to build bundled registry: {}", e);
                MessageRegistry::new()
            });
            RwLock::new(registry)
        })
    }

    /// Register a message type.
    ///
    /// Re-registering a name replaces it; an index already owned by another
    /// name is rejected.
    pub fn register(&mut self, message: RegisteredMessage) -> Result<()> {
        if let Some(existing) = self.by_index.get(&message.index)
            && *existing != message.name
        {
            return Err(Error::DuplicateMessageIndex {
                index: message.index,
                existing: existing.clone(),
            });
        }
        if let Some(previous) = self.by_name.get(&message.name) {
            self.by_index.remove(&previous.index);
        }
        debug!(
            "[REG] Registered '{}' index={} protobuf={}",
            message.name,
            message.index,
            message.is_protobuf()
        );
        self.by_index.insert(message.index, message.name.clone());
        self.by_name.insert(message.name.clone(), message);
        Ok(())
    }

    pub fn register_protobuf(
        &mut self,
        name: &str,
        index: i32,
        schema: Arc<MessageSchema>,
    ) -> Result<()> {
        self.register(RegisteredMessage {
            name: name.to_string(),
            index,
            format: MessageFormat::Protobuf(schema),
        })
    }

    pub fn register_legacy(&mut self, name: &str, index: i32) -> Result<()> {
        self.register(RegisteredMessage {
            name: name.to_string(),
            index,
            format: MessageFormat::Legacy,
        })
    }

    /// Get a message type by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredMessage> {
        self.by_name.get(name)
    }

    /// Get a message type by name, failing with `UnknownMessageType`.
    pub fn resolve(&self, name: &str) -> Result<&RegisteredMessage> {
        self.get(name)
            .ok_or_else(|| Error::UnknownMessageType(name.to_string()))
    }

    /// Get a message type by index.
    pub fn by_index(&self, index: i32) -> Option<&RegisteredMessage> {
        self.by_index
            .get(&index)
            .and_then(|name| self.by_name.get(name))
    }

    /// Get a message type by index, failing with `UnknownMessageIndex`.
    pub fn resolve_index(&self, index: i32) -> Result<&RegisteredMessage> {
        self.by_index(index)
            .ok_or(Error::UnknownMessageIndex(index))
    }

    /// Check if a type is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// List all registered type names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.by_name.keys().map(|s| s.as_str())
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Clear all registered types.
    pub fn clear(&mut self) {
        self.by_name.clear();
        self.by_index.clear();
    }
}

// Bundled user messages

fn bundled_messages() -> std::result::Result<Vec<(&'static str, i32, Arc<MessageSchema>)>, FieldError> {
    let subkey = MessageSchema::builder("CCSUsrMsg_VGUIMenu.Subkey")
        .field("name", 1, FieldKind::String)
        .field("str", 2, FieldKind::String)
        .build()?;
    let vgui_menu = MessageSchema::builder("CCSUsrMsg_VGUIMenu")
        .field("panel_name", 1, FieldKind::String)
        .field("show", 2, FieldKind::Bool)
        .repeated("subkeys", 3, FieldKind::Message(subkey))
        .build()?;

    let say_text = MessageSchema::builder("CCSUsrMsg_SayText")
        .field("ent_idx", 1, FieldKind::Int32)
        .field("text", 2, FieldKind::String)
        .field("chat", 3, FieldKind::Bool)
        .field("textallchat", 4, FieldKind::Bool)
        .build()?;

    let say_text2 = MessageSchema::builder("CCSUsrMsg_SayText2")
        .field("ent_idx", 1, FieldKind::Int32)
        .field("chat", 2, FieldKind::Bool)
        .field("msg_name", 3, FieldKind::String)
        .repeated("params", 4, FieldKind::String)
        .field("textallchat", 5, FieldKind::Bool)
        .field("text", 6, FieldKind::String)
        .build()?;

    let text_msg = MessageSchema::builder("CCSUsrMsg_TextMsg")
        .field("msg_dst", 1, FieldKind::Int32)
        .repeated("params", 3, FieldKind::String)
        .build()?;

    let shake = MessageSchema::builder("CCSUsrMsg_Shake")
        .field("command", 1, FieldKind::Int32)
        .field("local_amplitude", 2, FieldKind::Float)
        .field("frequency", 3, FieldKind::Float)
        .field("duration", 4, FieldKind::Float)
        .build()?;

    let rgba = MessageSchema::builder("CMsgRGBA")
        .field("r", 1, FieldKind::Int32)
        .field("g", 2, FieldKind::Int32)
        .field("b", 3, FieldKind::Int32)
        .field("a", 4, FieldKind::Int32)
        .build()?;
    let fade = MessageSchema::builder("CCSUsrMsg_Fade")
        .field("duration", 1, FieldKind::Int32)
        .field("hold_time", 2, FieldKind::Int32)
        .field("flags", 3, FieldKind::Int32)
        .field("clr", 4, FieldKind::Message(rgba.clone()))
        .build()?;

    let hint_text = MessageSchema::builder("CCSUsrMsg_HintText")
        .field("text", 1, FieldKind::String)
        .build()?;

    let key_hint_text = MessageSchema::builder("CCSUsrMsg_KeyHintText")
        .repeated("hints", 1, FieldKind::String)
        .build()?;

    let dialog_option = MessageSchema::builder("CPluginMsg_Dialog.Option")
        .field("msg", 1, FieldKind::String)
        .field("command", 2, FieldKind::String)
        .build()?;
    let dialog = MessageSchema::builder("CPluginMsg_Dialog")
        .field("type", 1, FieldKind::Enum(DialogType::enum_schema()))
        .field("title", 2, FieldKind::String)
        .field("msg", 3, FieldKind::String)
        .field("level", 4, FieldKind::Int32)
        .field("time", 5, FieldKind::Int32)
        .field("color", 6, FieldKind::Message(rgba))
        .field("command", 7, FieldKind::String)
        .repeated("options", 8, FieldKind::Message(dialog_option))
        .build()?;

    Ok(vec![
        ("VGUIMenu", 1, vgui_menu),
        ("SayText", 5, say_text),
        ("SayText2", 6, say_text2),
        ("TextMsg", 7, text_msg),
        ("Shake", 12, shake),
        ("Fade", 13, fade),
        ("HintText", 23, hint_text),
        ("KeyHintText", 24, key_hint_text),
        ("Dialog", 64, dialog),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_basic_operations() {
        let mut registry = MessageRegistry::new();
        assert!(registry.is_empty());

        registry.register_legacy("ShowMenu", 40).unwrap();

        assert_eq!(registry.len(), 1);
        assert!(registry.contains("ShowMenu"));
        let msg = registry.resolve("ShowMenu").unwrap();
        assert_eq!(msg.index, 40);
        assert!(!msg.is_protobuf());
        assert_eq!(registry.by_index(40).unwrap().name, "ShowMenu");
    }

    #[test]
    fn test_unknown_lookups() {
        let registry = MessageRegistry::new();
        assert!(matches!(
            registry.resolve("Nope"),
            Err(Error::UnknownMessageType(name)) if name == "Nope"
        ));
        assert!(matches!(
            registry.resolve_index(3),
            Err(Error::UnknownMessageIndex(3))
        ));
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let mut registry = MessageRegistry::new();
        registry.register_legacy("Geiger", 2).unwrap();
        let err = registry.register_legacy("Train", 2).unwrap_err();
        assert!(matches!(
            err,
            Error::DuplicateMessageIndex { index: 2, ref existing } if existing == "Geiger"
        ));
    }

    #[test]
    fn test_reregister_moves_index() {
        let mut registry = MessageRegistry::new();
        registry.register_legacy("Geiger", 2).unwrap();
        registry.register_legacy("Geiger", 3).unwrap();
        assert!(registry.by_index(2).is_none());
        assert_eq!(registry.by_index(3).unwrap().name, "Geiger");
        registry.register_legacy("Train", 2).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_bundled_types() {
        let registry = MessageRegistry::bundled().unwrap();
        let say = registry.resolve("SayText2").unwrap();
        assert_eq!(say.index, 6);
        assert!(say.schema().unwrap().field("text").is_some());
        assert!(registry.resolve("VGUIMenu").unwrap().is_protobuf());
        assert_eq!(registry.by_index(64).unwrap().name, "Dialog");
    }

    #[test]
    fn test_global_registry_is_bundled() {
        assert!(MessageRegistry::global().read().contains("SayText2"));
    }

    #[test]
    fn test_dialog_type_values() {
        assert_eq!(DialogType::Msg.value(), 0);
        assert_eq!(DialogType::AskConnect.value(), 4);
        assert_eq!(DialogType::AskConnect.to_string(), "ASKCONNECT");
        assert_eq!("MENU".parse::<DialogType>().unwrap(), DialogType::Menu);
        assert_eq!(DialogType::from_repr(2), Some(DialogType::Text));

        let schema = DialogType::enum_schema();
        assert_eq!(schema.constants.len(), 5);
        assert_eq!(schema.number_of("ENTRY"), Some(3));
    }
}
