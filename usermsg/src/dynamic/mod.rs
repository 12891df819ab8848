//! Dynamic user-message support.
//!
//! Message types are described at runtime by a [`MessageSchema`]; calling
//! code names fields (and indices, for repeated fields) and the accessors
//! resolve, kind-check, bounds-check and mutate.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  MessageSchema  │────▶│   FieldSchema   │
//! │  (type info)    │     │ (kind, number,  │
//! └────────┬────────┘     │  cardinality)   │
//!          │              └────────┬────────┘
//!          ▼                       ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │ DynamicMessage  │────▶│   FieldValue    │
//! │   (container)   │     │    (values)     │
//! └────────┬────────┘     └─────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ protobuf encode │
//! │    / decode     │
//! └─────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust
//! use usermsg::dynamic::{DynamicMessage, FieldKind, MessageSchema};
//!
//! let schema = MessageSchema::builder("CCSUsrMsg_TextMsg")
//!     .field("msg_dst", 1, FieldKind::Int32)
//!     .repeated("params", 3, FieldKind::String)
//!     .build()?;
//!
//! let mut msg = DynamicMessage::new(&schema);
//! msg.set_int32("msg_dst", 3)?;
//! msg.add_string("params", "#SFUI_Notice_Round_Draw")?;
//!
//! let bytes = msg.encode();
//! let decoded = DynamicMessage::decode(&bytes, &schema)?;
//! assert_eq!(decoded.get_repeated_string("params", 0)?, "#SFUI_Notice_Round_Draw");
//! # Ok::<(), usermsg::dynamic::FieldError>(())
//! ```

pub mod error;
pub mod json;
pub mod message;
pub mod schema;
pub mod value;
pub mod wire;

#[cfg(test)]
mod tests;

// Re-export main types
pub use error::FieldError;
pub use message::{DynamicMessage, DynamicMessageBuilder, FieldEntry};
pub use schema::{
    Cardinality, EnumConstant, EnumSchema, EnumSchemaBuilder, FieldKind, FieldSchema,
    MessageSchema, MessageSchemaBuilder, ValueKind,
};
pub use value::{FieldValue, ScalarValue};
